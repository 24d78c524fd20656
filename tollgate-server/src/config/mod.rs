//! Configuration module for tollgate-server.
//!
//! Handles loading configuration from TOML files and environment variables,
//! validating it and converting it into the core runtime types.

pub mod file;

use crate::config::file::{ChainSection, FileConfig};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tollgate_core::config::{AssetConfig, ChainConfig, DispatchConfig, HttpConfig, TelegramConfig};
use tollgate_core::sources::AssetUnits;
use tollgate_sdk::objects::Chain;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Loaded configuration result containing all parts.
#[derive(Debug)]
pub struct LoadedConfig {
    pub chains: Vec<ChainConfig>,
    pub http: HttpConfig,
    pub dispatch: DispatchConfig,
    pub telegram: Option<TelegramConfig>,
}

impl LoadedConfig {
    /// Parse, validate and convert a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let file_config: FileConfig = toml::from_str(content)?;
        validate(&file_config)?;
        Ok(build_loaded_config(file_config))
    }
}

/// Configuration loader for a file on disk.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
        }
    }

    /// Read, validate and convert the configuration file.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        LoadedConfig::from_toml(&config_content)
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    if config.chains.is_empty() {
        return Err(ConfigError::ValidationError(
            "at least one [[chains]] entry is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for chain in &config.chains {
        if !seen.insert(chain.chain) {
            return Err(ConfigError::ValidationError(format!(
                "chain {} is configured more than once",
                chain.chain
            )));
        }
        validate_chain(chain)?;
    }

    if config.dispatch.interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "dispatch interval_secs must be positive".to_string(),
        ));
    }
    if config.dispatch.batch_size == 0 {
        return Err(ConfigError::ValidationError(
            "dispatch batch_size must be positive".to_string(),
        ));
    }
    if config.dispatch.merchant_secret.is_empty() {
        return Err(ConfigError::ValidationError(
            "dispatch merchant_secret must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_chain(chain: &ChainSection) -> Result<(), ConfigError> {
    let name = chain.chain;
    let invalid = |reason: &str| ConfigError::ValidationError(format!("chain {name}: {reason}"));

    if chain.interval_secs == 0 {
        return Err(invalid("interval_secs must be positive"));
    }
    if chain.page_size == 0 {
        return Err(invalid("page_size must be positive"));
    }
    if chain.decimals > AssetUnits::MAX_DECIMALS {
        return Err(invalid("decimals must not exceed 28"));
    }
    if chain.asset_type.trim().is_empty() {
        return Err(invalid("asset_type must not be empty"));
    }
    if chain.deposit_marker.trim().is_empty() {
        return Err(invalid("deposit_marker must not be empty"));
    }
    if chain.chain == Chain::Polygon && chain.evm_chain_id.is_none() {
        return Err(invalid("evm_chain_id is required"));
    }
    Ok(())
}

fn build_loaded_config(file_config: FileConfig) -> LoadedConfig {
    let chains = file_config.chains.into_iter().map(convert_chain).collect();

    LoadedConfig {
        chains,
        http: HttpConfig {
            timeout: Duration::from_secs(file_config.http.timeout_secs),
            retries: file_config.http.retries,
        },
        dispatch: DispatchConfig::new(
            Duration::from_secs(file_config.dispatch.interval_secs),
            file_config.dispatch.max_retry,
            file_config.dispatch.batch_size,
            file_config.dispatch.merchant_secret.into_bytes(),
        ),
        telegram: file_config
            .telegram
            .map(|t| TelegramConfig {
                bot_token: t.bot_token,
                chat_id: t.chat_id,
            })
            .filter(TelegramConfig::is_configured),
    }
}

fn convert_chain(c: ChainSection) -> ChainConfig {
    ChainConfig {
        chain: c.chain,
        interval: Duration::from_secs(c.interval_secs),
        endpoint: c.endpoint,
        api_key: c.api_key.filter(|k| !k.is_empty()),
        asset: AssetConfig {
            asset_type: c.asset_type,
            decimals: c.decimals,
        },
        deposit_marker: c.deposit_marker,
        page_size: c.page_size,
        evm_chain_id: c.evm_chain_id,
    }
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}
