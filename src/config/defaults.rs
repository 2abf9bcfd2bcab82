/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Web server defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;

// Object store defaults
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_PATH_STYLE: bool = false;
pub const DEFAULT_STORAGE_REQUEST_TIMEOUT_SECS: u64 = 30;

// Cache defaults
pub const DEFAULT_LOCAL_CACHE_ROOT: &str = "./cache/";
pub const DEFAULT_REMOTE_CACHE_ENABLED: bool = true;
pub const DEFAULT_CACHE_MAX_AGE_SECS: u64 = 7200;
pub const DEFAULT_ERROR_MAX_AGE_SECS: u64 = 60;
pub const DEFAULT_BACKFILL_ON_HIT: bool = false;
pub const DEFAULT_SINGLE_FLIGHT: bool = true;

// Image defaults
pub const DEFAULT_NOT_FOUND_FILE: &str = "./static/no_image.png";
pub const DEFAULT_JPEG_QUALITY: u8 = 85;
pub const DEFAULT_TRANSFORM_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_OPTIMIZER_TIMEOUT_SECS: u64 = 30;

// Environment
pub const ENV_PREFIX: &str = "IMAGE_RESIZER_";
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";
