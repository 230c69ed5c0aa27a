use anyhow::Result;
use clap::{Parser, Subcommand};
use hybrid_index::commands::{configure, ingest, inspect, load_config};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "hybrid-index")]
#[command(about = "Hybrid dense + BM25 sparse indexing into LanceDB or local JSON indexes")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and default data directories
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the configuration, writing defaults on first use
    Config {
        /// Only show the current configuration
        #[arg(long)]
        show: bool,
    },
    /// Ingest JSON-lines chunk files into a vector store collection
    Ingest {
        /// Target collection
        collection: String,
        /// Chunk files to ingest
        files: Vec<PathBuf>,
        /// Ingest every *.jsonl file in this directory instead
        #[arg(long, conflicts_with = "files")]
        dir: Option<PathBuf>,
    },
    /// Build an offline JSON index for a collection
    IngestLocal {
        /// Target collection
        collection: String,
        /// Chunk files to ingest
        files: Vec<PathBuf>,
        /// Ingest every *.jsonl file in this directory instead
        #[arg(long, conflicts_with = "files")]
        dir: Option<PathBuf>,
    },
    /// Show a stored collection
    Inspect {
        collection: String,
        /// Print the point with this id
        #[arg(long)]
        id: Option<Uuid>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config_dir)?;

    match cli.command {
        Commands::Config { show } => {
            configure(&config, show)?;
        }
        Commands::Ingest {
            collection,
            files,
            dir,
        } => {
            ingest(&config, collection, files, dir, false).await?;
        }
        Commands::IngestLocal {
            collection,
            files,
            dir,
        } => {
            ingest(&config, collection, files, dir, true).await?;
        }
        Commands::Inspect { collection, id } => {
            inspect(&config, &collection, id).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_command() {
        let cli = Cli::try_parse_from(["hybrid-index", "config", "--show"])
            .expect("should parse config command");

        assert!(matches!(cli.command, Commands::Config { show: true }));
        assert!(cli.config_dir.is_none());
    }

    #[test]
    fn ingest_command_with_files() {
        let cli = Cli::try_parse_from(["hybrid-index", "ingest", "docs", "a.jsonl", "b.jsonl"])
            .expect("should parse ingest command");

        match cli.command {
            Commands::Ingest {
                collection,
                files,
                dir,
            } => {
                assert_eq!(collection, "docs");
                assert_eq!(files, vec![PathBuf::from("a.jsonl"), PathBuf::from("b.jsonl")]);
                assert!(dir.is_none());
            }
            _ => panic!("expected ingest command"),
        }
    }

    #[test]
    fn ingest_local_command_with_dir() {
        let cli = Cli::try_parse_from([
            "hybrid-index",
            "--config-dir",
            "/tmp/hybrid",
            "ingest-local",
            "acme",
            "--dir",
            "chunks",
        ])
        .expect("should parse ingest-local command");

        assert_eq!(cli.config_dir, Some(PathBuf::from("/tmp/hybrid")));
        match cli.command {
            Commands::IngestLocal { collection, dir, .. } => {
                assert_eq!(collection, "acme");
                assert_eq!(dir, Some(PathBuf::from("chunks")));
            }
            _ => panic!("expected ingest-local command"),
        }
    }

    #[test]
    fn files_and_dir_conflict() {
        let cli = Cli::try_parse_from([
            "hybrid-index",
            "ingest",
            "docs",
            "a.jsonl",
            "--dir",
            "chunks",
        ]);
        assert!(cli.is_err());
    }

    #[test]
    fn inspect_command_parses_uuid() {
        let cli = Cli::try_parse_from([
            "hybrid-index",
            "inspect",
            "docs",
            "--id",
            "00000000-0000-0000-0000-000000000000",
        ])
        .expect("should parse inspect command");

        match cli.command {
            Commands::Inspect { collection, id } => {
                assert_eq!(collection, "docs");
                assert_eq!(id, Some(Uuid::nil()));
            }
            _ => panic!("expected inspect command"),
        }

        assert!(Cli::try_parse_from(["hybrid-index", "inspect", "docs", "--id", "nope"]).is_err());
    }
}
