/// `load_config` module: resolves the runtime configuration of every pipeline process.
///
/// Resolution order, later steps winning:
/// 1. built-in defaults
/// 2. an optional YAML file (every key optional)
/// 3. environment variables (`BROKER_URI`, `BROKER_EXCHANGE`, `BROKER_QUEUE`,
///    `BROKER_TIMEOUT_SECS`, `STORAGE_URI`, `STORAGE_POOL_SIZE`, `PORT`, `BATCH_SOURCE_PATH`,
///    `CONSUMER_CONCURRENCY`)
///
/// CLI flags are applied on top by [`crate::cli::run`].
///
/// # Errors
/// Unreadable or unparsable files, non-numeric values for numeric keys and unsupported storage
/// schemes are reported as `anyhow::Error` and surfaced at the CLI boundary.
use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{error, info};

use crate::store::StoreKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub broker_url: String,
    pub exchange: String,
    /// Queue name; also the routing key producers publish with.
    pub queue: String,
    pub broker_timeout_secs: u64,
    pub storage_uri: String,
    pub storage_pool_size: usize,
    pub port: u16,
    pub source_path: PathBuf,
    pub consumer_concurrency: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            broker_url: "nats://127.0.0.1:4222".to_string(),
            exchange: "panto_exchange".to_string(),
            queue: "xray_data_queue".to_string(),
            broker_timeout_secs: 5,
            storage_uri: "memory://".to_string(),
            storage_pool_size: 8,
            port: 3000,
            source_path: PathBuf::from("data/sample-data.json"),
            consumer_concurrency: 4,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    broker_url: Option<String>,
    exchange: Option<String>,
    queue: Option<String>,
    broker_timeout_secs: Option<u64>,
    storage_uri: Option<String>,
    storage_pool_size: Option<usize>,
    port: Option<u16>,
    source_path: Option<PathBuf>,
    consumer_concurrency: Option<usize>,
}

impl FileConfig {
    fn apply_to(self, config: &mut AppConfig) {
        if let Some(value) = self.broker_url {
            config.broker_url = value;
        }
        if let Some(value) = self.exchange {
            config.exchange = value;
        }
        if let Some(value) = self.queue {
            config.queue = value;
        }
        if let Some(value) = self.broker_timeout_secs {
            config.broker_timeout_secs = value;
        }
        if let Some(value) = self.storage_uri {
            config.storage_uri = value;
        }
        if let Some(value) = self.storage_pool_size {
            config.storage_pool_size = value;
        }
        if let Some(value) = self.port {
            config.port = value;
        }
        if let Some(value) = self.source_path {
            config.source_path = value;
        }
        if let Some(value) = self.consumer_concurrency {
            config.consumer_concurrency = value;
        }
    }
}

/// Load the configuration, optionally reading a YAML file first.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let mut config = AppConfig::default();

    if let Some(path_ref) = path {
        info!(config_path = ?path_ref, "Loading configuration from file");

        let config_content = match fs::read_to_string(path_ref) {
            Ok(content) => {
                info!(config_path = ?path_ref, "Config file read successfully");
                content
            }
            Err(e) => {
                error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
                return Err(anyhow!("Failed to read config file {:?}: {}", path_ref, e));
            }
        };

        let file: FileConfig = if config_content.trim().is_empty() {
            FileConfig::default()
        } else {
            match serde_yaml::from_str(&config_content) {
                Ok(conf) => {
                    info!(config_path = ?path_ref, "Parsed config YAML successfully");
                    conf
                }
                Err(e) => {
                    error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
                    return Err(anyhow!("Failed to parse config YAML: {e}"));
                }
            }
        };
        file.apply_to(&mut config);
    }

    env_override("BROKER_URI", &mut config.broker_url)?;
    env_override("BROKER_EXCHANGE", &mut config.exchange)?;
    env_override("BROKER_QUEUE", &mut config.queue)?;
    env_override("BROKER_TIMEOUT_SECS", &mut config.broker_timeout_secs)?;
    env_override("STORAGE_URI", &mut config.storage_uri)?;
    env_override("STORAGE_POOL_SIZE", &mut config.storage_pool_size)?;
    env_override("PORT", &mut config.port)?;
    env_override("BATCH_SOURCE_PATH", &mut config.source_path)?;
    env_override("CONSUMER_CONCURRENCY", &mut config.consumer_concurrency)?;

    validate(&config)?;
    info!(
        exchange = %config.exchange,
        queue = %config.queue,
        port = config.port,
        "Configuration resolved"
    );
    Ok(config)
}

fn env_override<T>(key: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Ok(raw) = std::env::var(key) else {
        return Ok(());
    };
    match raw.parse::<T>() {
        Ok(value) => {
            *target = value;
            Ok(())
        }
        Err(e) => {
            error!(key, value = %raw, error = %e, "Invalid value in environment");
            Err(anyhow!("Invalid value for {key}: '{raw}' ({e})"))
        }
    }
}

fn validate(config: &AppConfig) -> Result<()> {
    if config.exchange.is_empty() || config.queue.is_empty() {
        return Err(anyhow!("Exchange and queue names must not be empty"));
    }
    if config.consumer_concurrency == 0 {
        return Err(anyhow!("consumer_concurrency must be at least 1"));
    }
    StoreKind::from_uri(&config.storage_uri)?;
    Ok(())
}
