use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::{Config, get_config_dir, show_config};
use crate::embeddings::OllamaClient;
use crate::ingest::{IngestRequest, IngestionResponse, Ingestor};
use crate::local::LocalIndexStore;
use crate::sparse::SparseEncoder;
use crate::store::{LanceClient, Payload, VectorStore};

/// Resolve the configuration directory and load settings from it
#[inline]
pub fn load_config(config_dir: Option<PathBuf>) -> Result<Config> {
    let dir = match config_dir {
        Some(dir) => dir,
        None => get_config_dir().context("Failed to determine configuration directory")?,
    };
    Config::load(&dir)
}

/// Wire the ingestion pipeline from configuration
#[inline]
pub fn build_ingestor(config: &Config) -> Result<Ingestor> {
    let client = LanceClient::from_config(config).context("Failed to set up vector store")?;
    let store = VectorStore::new(Arc::new(client), config.store.clone());
    let dense = OllamaClient::from_config(config).context("Failed to set up Ollama client")?;

    Ok(Ingestor::new(
        SparseEncoder::new(config.sparse.clone()),
        Arc::new(dense),
        store,
        LocalIndexStore::new(config.local_index_path()),
    ))
}

/// Print the configuration, writing a default file first if none exists
#[inline]
pub fn configure(config: &Config, show: bool) -> Result<()> {
    if !show && !config.config_file_path().exists() {
        config.save().context("Failed to write default configuration")?;
        println!(
            "Wrote default configuration to {}",
            config.config_file_path().display()
        );
    }
    println!("{}", show_config(config)?);
    Ok(())
}

/// Ingest chunk files into the vector store or the local index
#[inline]
pub async fn ingest(
    config: &Config,
    collection_name: String,
    file_paths: Vec<PathBuf>,
    file_dir: Option<PathBuf>,
    local: bool,
) -> Result<()> {
    let ingestor = build_ingestor(config)?;
    let request = IngestRequest {
        collection_name,
        file_paths,
        file_dir,
    };

    let response = if local {
        ingestor.ingest_local(&request).await
    } else {
        ingestor.ingest(&request).await
    };
    report(&response)
}

fn report(response: &IngestionResponse) -> Result<()> {
    println!("[{}] {}", response.status_code, response.message);
    if response.is_success() {
        Ok(())
    } else {
        bail!("ingestion failed with status {}", response.status_code)
    }
}

/// Show a collection's size and vocabulary, and optionally one stored point
#[inline]
pub async fn inspect(config: &Config, collection: &str, id: Option<Uuid>) -> Result<()> {
    let client = Arc::new(LanceClient::from_config(config)?);
    let store = VectorStore::new(client.clone(), config.store.clone());

    let count = store.count(collection).await?;
    info!("Inspecting collection '{}'", collection);
    println!("Collection: {}", collection);
    println!("  Points (including vocabulary record): {}", count);

    let indexed = client.indexed_columns(collection).await?;
    if indexed.contains(&config.store.dense_field_name) {
        println!("  Dense index: built");
    } else {
        println!(
            "  Dense index: pending ({} rows needed)",
            config.store.index_min_rows
        );
    }

    match store.vocabulary(collection).await? {
        Some(vocabulary) => println!("  Vocabulary terms: {}", vocabulary.len()),
        None => println!("  Vocabulary: missing"),
    }

    if let Some(id) = id {
        match store.retrieve(collection, id).await? {
            Some(point) => {
                println!();
                println!("Point {}", point.id);
                println!("  Dense dimensions: {}", point.dense.len());
                println!("  Sparse entries: {}", point.sparse.len());
                match point.payload {
                    Payload::Document { text, metadata } => {
                        println!("  Metadata: {}", serde_json::to_string(&metadata)?);
                        println!("  Text: {}", text);
                    }
                    Payload::Vocabulary { vocabulary } => {
                        println!("  Vocabulary record with {} terms", vocabulary.len());
                    }
                }
            }
            None => println!("Point {} not found", id),
        }
    }

    Ok(())
}
