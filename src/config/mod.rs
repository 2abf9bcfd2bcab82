//! Service configuration
//!
//! Configuration is layered with `figment`: built-in defaults, then an
//! optional TOML file, then `IMAGE_RESIZER_`-prefixed environment variables
//! (`__` separates nested keys, e.g. `IMAGE_RESIZER_CACHE__MAX_AGE=2h`), then
//! the legacy environment names of the original deployment (`S3_BUCKET`,
//! `CACHE_MAX_AGE`, ...). The result is validated once and handed to the
//! orchestrator as an immutable value.

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
    value::Uncased,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use defaults::*;

/// Legacy environment variable names mapped onto configuration keys.
const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("S3_ENDPOINT", "storage.endpoint"),
    ("S3_BUCKET", "storage.bucket"),
    ("S3_KEY", "storage.access_key"),
    ("S3_SECRET", "storage.secret_key"),
    ("S3_REGION", "storage.region"),
    ("STORAGE_LOCAL_PREFIX", "cache.local_root"),
    ("STORAGE_CLOUD_ENABLED", "cache.remote_enabled"),
    ("STORAGE_CLOUD_PREFIX", "cache.remote_prefix"),
    ("CACHE_MAX_AGE", "cache.max_age"),
    ("NOTFOUND_FILENAME", "images.not_found_file"),
    ("PORT", "web.port"),
    ("VERBOSE", "logging.verbose"),
];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub web: WebConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub images: ImagesConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

/// Object store holding the originals and the remote cache tier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Custom S3 endpoint; empty uses the AWS regional endpoint, `file:///path`
    /// selects the filesystem backend
    pub endpoint: String,
    pub bucket: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: String,
    /// Address objects as `{endpoint}/{bucket}/{key}` (MinIO and similar)
    pub path_style: bool,
    /// Prefix prepended to request paths when fetching originals
    pub source_prefix: String,
    #[serde(with = "duration_serde::duration")]
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub local_root: PathBuf,
    pub remote_enabled: bool,
    pub remote_prefix: String,
    /// Freshness window advertised to clients and used as the re-upload threshold
    #[serde(with = "duration_serde::duration")]
    pub max_age: Duration,
    /// Freshness window for not-found and error responses
    #[serde(with = "duration_serde::duration")]
    pub error_max_age: Duration,
    /// Re-run cache population on hits so a stale remote copy gets refreshed
    pub backfill_on_hit: bool,
    /// Collapse concurrent misses for the same cache key into one transform
    pub single_flight: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagesConfig {
    pub not_found_file: PathBuf,
    pub jpeg_quality: u8,
    #[serde(with = "duration_serde::duration")]
    pub transform_timeout: Duration,
    #[serde(with = "duration_serde::duration")]
    pub optimizer_timeout: Duration,
    /// Output extension -> optimizer argv; `{file}` is replaced by the artifact path
    pub optimizers: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    pub verbose: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            bucket: String::new(),
            access_key: None,
            secret_key: None,
            region: DEFAULT_REGION.to_string(),
            path_style: DEFAULT_PATH_STYLE,
            source_prefix: String::new(),
            request_timeout: Duration::from_secs(DEFAULT_STORAGE_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            local_root: PathBuf::from(DEFAULT_LOCAL_CACHE_ROOT),
            remote_enabled: DEFAULT_REMOTE_CACHE_ENABLED,
            remote_prefix: String::new(),
            max_age: Duration::from_secs(DEFAULT_CACHE_MAX_AGE_SECS),
            error_max_age: Duration::from_secs(DEFAULT_ERROR_MAX_AGE_SECS),
            backfill_on_hit: DEFAULT_BACKFILL_ON_HIT,
            single_flight: DEFAULT_SINGLE_FLIGHT,
        }
    }
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            not_found_file: PathBuf::from(DEFAULT_NOT_FOUND_FILE),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            transform_timeout: Duration::from_secs(DEFAULT_TRANSFORM_TIMEOUT_SECS),
            optimizer_timeout: Duration::from_secs(DEFAULT_OPTIMIZER_TIMEOUT_SECS),
            optimizers: BTreeMap::new(),
        }
    }
}

impl StorageConfig {
    /// Root directory when the endpoint selects the filesystem backend
    pub fn filesystem_root(&self) -> Option<PathBuf> {
        self.endpoint.strip_prefix("file://").map(PathBuf::from)
    }

    /// Custom S3 endpoint, `None` for the SDK's regional default
    pub fn endpoint_url(&self) -> Option<&str> {
        let endpoint = self.endpoint.trim_end_matches('/');
        (!endpoint.is_empty() && self.filesystem_root().is_none()).then_some(endpoint)
    }
}

impl Config {
    /// Load configuration from `CONFIG_FILE` (default `config.toml`) and the environment
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from_file(&config_file)
    }

    /// Load configuration from a TOML file (optional) layered with the environment
    pub fn load_from_file(config_file: &str) -> Result<Self> {
        if std::path::Path::new(config_file).exists() {
            info!("Loading configuration from: {}", config_file);
        } else {
            info!(
                "Configuration file {} not found, using defaults and environment",
                config_file
            );
        }

        let config: Self = Self::figment(config_file)
            .extract()
            .with_context(|| format!("Failed to load configuration from {config_file}"))?;
        config.validate()?;
        Ok(config)
    }

    /// The layered configuration sources, lowest precedence first
    pub fn figment(config_file: &str) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(legacy_env())
    }

    /// Reject configurations the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.cache.max_age.is_zero() {
            anyhow::bail!("cache.max_age must be greater than zero");
        }
        if !(1..=100).contains(&self.images.jpeg_quality) {
            anyhow::bail!(
                "images.jpeg_quality must be between 1 and 100, got {}",
                self.images.jpeg_quality
            );
        }
        if self.storage.filesystem_root().is_none() && self.storage.bucket.is_empty() {
            anyhow::bail!("storage.bucket is required unless storage.endpoint is a file:// path");
        }
        for (extension, argv) in &self.images.optimizers {
            if argv.is_empty() {
                anyhow::bail!("images.optimizers.{extension} must name a program");
            }
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.web.host, self.web.port)
            .parse()
            .with_context(|| {
                format!(
                    "Invalid listen address {}:{}",
                    self.web.host, self.web.port
                )
            })
    }
}

fn legacy_env() -> Env {
    let keys: Vec<&str> = LEGACY_ENV_KEYS.iter().map(|(env, _)| *env).collect();
    Env::raw().only(&keys).map(|key| {
        LEGACY_ENV_KEYS
            .iter()
            .find(|(env, _)| key.as_str().eq_ignore_ascii_case(env))
            .map(|(_, path)| Uncased::from(*path))
            .unwrap_or_else(|| Uncased::from(key.as_str()))
    })
}
