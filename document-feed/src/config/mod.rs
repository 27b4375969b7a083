use crate::feed::{FeedConfig, DEFAULT_MAX_PAGE_SIZE, DEFAULT_PAGE_SIZE};
use crate::services::uploader::DEFAULT_MAX_UPLOAD_BYTES;
use service_core::config as core_config;
use service_core::error::AppError;
use service_core::retry::RetryConfig;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DocumentFeedConfig {
    pub common: core_config::Config,
    pub gateway: GatewayBackend,
    pub mongodb: MongoConfig,
    pub storage: StorageConfig,
    pub feed: FeedConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub local_path: String,
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayBackend {
    Mongodb,
    Memory,
}

impl FromStr for GatewayBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mongodb" | "mongo" => Ok(GatewayBackend::Mongodb),
            "memory" => Ok(GatewayBackend::Memory),
            _ => Err(format!("Invalid gateway backend: {}", s)),
        }
    }
}

impl DocumentFeedConfig {
    pub fn load() -> Result<Self, AppError> {
        // Load common config (handles .env and APP__ prefix)
        let common = core_config::Config::load()?;
        Self::from_lookup(common, |key| env::var(key).ok())
    }

    /// Build the service sections from `lookup`, which maps a variable
    /// name to its value.
    pub fn from_lookup<F>(mut common: core_config::Config, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let is_prod = lookup("ENVIRONMENT").as_deref() == Some("prod");
        let get = |key: &str, default: Option<&str>| get_env(&lookup, key, default, is_prod);

        if let Some(level) = lookup("LOG_LEVEL") {
            common.log_level = level;
        }
        if let Some(endpoint) = lookup("OTLP_ENDPOINT").filter(|e| !e.is_empty()) {
            common.otlp_endpoint = Some(endpoint);
        }

        let gateway: GatewayBackend = get("GATEWAY_BACKEND", Some("memory"))?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        // Only the MongoDB backend needs a URI outside production.
        let uri_default = match gateway {
            GatewayBackend::Memory => Some("mongodb://localhost:27017"),
            GatewayBackend::Mongodb => None,
        };

        let port = common.port;
        let page_size = parse_number(
            "FEED_PAGE_SIZE",
            get("FEED_PAGE_SIZE", Some(&DEFAULT_PAGE_SIZE.to_string()))?,
        )?;
        let max_page_size = parse_number(
            "FEED_MAX_PAGE_SIZE",
            get("FEED_MAX_PAGE_SIZE", Some(&DEFAULT_MAX_PAGE_SIZE.to_string()))?,
        )?;

        let replay_timeout_ms: u64 = parse_number(
            "FEED_REPLAY_TIMEOUT_MS",
            get("FEED_REPLAY_TIMEOUT_MS", Some("5000"))?,
        )?;
        let setup_retries: u32 =
            parse_number("FEED_SETUP_RETRIES", get("FEED_SETUP_RETRIES", Some("2"))?)?;

        let feed = FeedConfig {
            page_size,
            max_page_size,
            replay_timeout: Duration::from_millis(replay_timeout_ms),
            setup_retry: RetryConfig {
                max_retries: setup_retries,
                ..RetryConfig::quick()
            },
        };
        feed.validate()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("FEED_PAGE_SIZE: {}", e)))?;

        Ok(DocumentFeedConfig {
            gateway,
            mongodb: MongoConfig {
                uri: get("MONGODB_URI", uri_default)?,
                database: get("MONGODB_DATABASE", Some("document_feed"))?,
            },
            storage: StorageConfig {
                local_path: get("STORAGE_LOCAL_PATH", Some("storage"))?,
                public_base_url: get(
                    "STORAGE_PUBLIC_BASE_URL",
                    Some(&format!("http://localhost:{}", port)),
                )?,
            },
            feed,
            upload: UploadConfig {
                max_bytes: parse_number(
                    "UPLOAD_MAX_BYTES",
                    get("UPLOAD_MAX_BYTES", Some(&DEFAULT_MAX_UPLOAD_BYTES.to_string()))?,
                )?,
            },
            common,
        })
    }
}

fn parse_number<T: FromStr>(key: &str, value: String) -> Result<T, AppError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| {
        AppError::ConfigError(anyhow::anyhow!("{} has invalid value {:?}: {}", key, value, e))
    })
}

fn get_env<F>(lookup: &F, key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(val) => Ok(val),
        None => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}
