
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::sparse::SparseConfig;
use crate::store::StoreConfig;

pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sparse: SparseConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
            batch_size: 16,
        }
    }
}

/// Offline index output
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LocalConfig {
    /// Root for per-collection JSON indexes; `<base_dir>/indexes` when unset
    pub path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid field name: '{0}' (use letters, digits and '_')")]
    InvalidFieldName(String),
    #[error("Dense and sparse fields must have different names, both are '{0}'")]
    DuplicateFieldNames(String),
    #[error("Invalid HNSW m: {0} (must be between 4 and 128)")]
    InvalidHnswM(u32),
    #[error("Invalid HNSW ef_construct: {0} (must be between 4 and 1000)")]
    InvalidHnswEfConstruct(u32),
    #[error("Invalid store timeout: {0} (must be between 1 and 300 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid BM25 k1: {0} (must be between 0 and 10)")]
    InvalidK1(f64),
    #[error("Invalid BM25 b: {0} (must be between 0 and 1)")]
    InvalidB(f64),
    #[error("Invalid BM25 delta: {0} (must be between 0 and 10)")]
    InvalidDelta(f64),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default configuration directory, `<config_dir>/hybrid-index`
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .or_else(dirs::home_dir)
            .map(|dir| dir.join("hybrid-index"))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        validate_store(&self.store)?;
        validate_sparse(&self.sparse)?;
        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join(CONFIG_FILE_NAME)
    }

    /// Directory of the embedded LanceDB database
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.get_base_dir().join("vectors")
    }

    /// Root of the offline JSON indexes
    #[inline]
    pub fn local_index_path(&self) -> PathBuf {
        self.local
            .path
            .clone()
            .unwrap_or_else(|| self.get_base_dir().join("indexes"))
    }
}

fn validate_store(store: &StoreConfig) -> Result<(), ConfigError> {
    if !(64..=4096).contains(&store.embedding_dimension) {
        return Err(ConfigError::InvalidEmbeddingDimension(
            store.embedding_dimension,
        ));
    }

    for name in [&store.dense_field_name, &store.sparse_field_name] {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ConfigError::InvalidFieldName(name.clone()));
        }
    }
    if store.dense_field_name == store.sparse_field_name {
        return Err(ConfigError::DuplicateFieldNames(
            store.dense_field_name.clone(),
        ));
    }

    if !(4..=128).contains(&store.hnsw_m) {
        return Err(ConfigError::InvalidHnswM(store.hnsw_m));
    }
    if !(4..=1000).contains(&store.hnsw_ef_construct) {
        return Err(ConfigError::InvalidHnswEfConstruct(store.hnsw_ef_construct));
    }
    if !(1..=300).contains(&store.timeout_secs) {
        return Err(ConfigError::InvalidTimeout(store.timeout_secs));
    }

    Ok(())
}

fn validate_sparse(sparse: &SparseConfig) -> Result<(), ConfigError> {
    if !(0.0..=10.0).contains(&sparse.k1) {
        return Err(ConfigError::InvalidK1(sparse.k1));
    }
    if !(0.0..=1.0).contains(&sparse.b) {
        return Err(ConfigError::InvalidB(sparse.b));
    }
    if !(0.0..=10.0).contains(&sparse.delta) {
        return Err(ConfigError::InvalidDelta(sparse.delta));
    }
    Ok(())
}

impl OllamaConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        Ok(())
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }
}
