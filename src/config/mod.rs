// Configuration management
// TOML settings for the store, sparse encoder, embedder and local indexes

pub mod settings;


pub use settings::{CONFIG_FILE_NAME, Config, ConfigError, LocalConfig, OllamaConfig};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}

/// Render the effective configuration as TOML
#[inline]
pub fn show_config(config: &Config) -> anyhow::Result<String> {
    let body = toml::to_string_pretty(config)?;
    Ok(format!(
        "# {}\n{}",
        config.config_file_path().display(),
        body
    ))
}
