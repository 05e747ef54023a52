//! Configuration types for rom-dl
//!
//! The library does not read the frontend's settings file itself. The host
//! deserializes (or builds) a [`Config`] and hands it to
//! [`RomDownloader::new`](crate::RomDownloader::new).

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf, time::Duration};

/// Where files go and how the transport behaves
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Root ROM directory (default: "./roms")
    #[serde(default = "default_roms_dir")]
    pub roms_dir: PathBuf,

    /// Platform identifier → destination folder
    ///
    /// Relative folders are resolved against `roms_dir`. Platforms missing from the
    /// map download into `<roms_dir>/<platform>`.
    #[serde(default)]
    pub platform_folders: HashMap<String, PathBuf>,

    /// Connect and per-read timeout for HTTP transfers (default: 30 seconds)
    #[serde(default = "default_http_timeout", with = "duration_serde")]
    pub http_timeout: Duration,

    /// User-Agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Write buffer size for streamed payloads (default: 8 KiB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Check free disk space before writing when the size is known (default: true)
    #[serde(default = "default_true")]
    pub check_disk_space: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            roms_dir: default_roms_dir(),
            platform_folders: HashMap::new(),
            http_timeout: default_http_timeout(),
            user_agent: default_user_agent(),
            chunk_size: default_chunk_size(),
            check_disk_space: true,
        }
    }
}

impl DownloadConfig {
    /// Destination directory for a platform
    ///
    /// Falls back to `<roms_dir>/<platform>` when the platform has no configured folder.
    pub fn platform_dir(&self, platform: &str) -> PathBuf {
        match self.platform_folders.get(platform) {
            Some(folder) if folder.is_absolute() => folder.clone(),
            Some(folder) => self.roms_dir.join(folder),
            None => self.roms_dir.join(platform),
        }
    }
}

/// Token-gated file host settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Display name of the file host, used in messages
    #[serde(default = "default_provider_name")]
    pub name: String,

    /// Host suffixes that route a URL through the token-gated API
    #[serde(default = "default_provider_hosts")]
    pub hosts: Vec<String>,

    /// Base URL of the file-host API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// File holding the API key (one line, user-editable)
    #[serde(default)]
    pub api_key_path: Option<PathBuf>,

    /// Inline API key, takes precedence over `api_key_path`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Retry policy for the token exchange and transfer
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            hosts: default_provider_hosts(),
            api_base: default_api_base(),
            api_key_path: None,
            api_key: None,
            retry: RetryConfig::default(),
        }
    }
}

/// Retry configuration for transient failures
///
/// The defaults give a fixed schedule: 10 attempts in total, 10 seconds apart.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one (default: 10)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 10 seconds)
    #[serde(default = "default_retry_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 10 seconds)
    #[serde(default = "default_retry_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier applied to the delay after each retry (default: 1.0, i.e. fixed)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_retry_delay(),
            max_delay: default_retry_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

/// Archive extraction configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Platform folder name → suffix appended to a single extracted top-level directory
    #[serde(default = "default_rename_rules")]
    pub rename_rules: HashMap<String, String>,

    /// Apply owner read/write file modes and traversable directory modes (default: true)
    #[serde(default = "default_true")]
    pub normalize_permissions: bool,

    /// JSON allow-list of accepted extensions per platform folder
    #[serde(default)]
    pub extensions_file: Option<PathBuf>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            rename_rules: default_rename_rules(),
            normalize_permissions: true,
            extensions_file: None,
        }
    }
}

/// Main configuration for RomDownloader
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Destinations and transport settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Token-gated file host settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Archive handling
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Download history file (default: "./history.json")
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,
}

fn default_roms_dir() -> PathBuf {
    PathBuf::from("./roms")
}

fn default_history_path() -> PathBuf {
    PathBuf::from("./history.json")
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string()
}

fn default_chunk_size() -> usize {
    8 * 1024
}

fn default_true() -> bool {
    true
}

fn default_provider_name() -> String {
    "1fichier".to_string()
}

fn default_provider_hosts() -> Vec<String> {
    vec!["1fichier.com".to_string()]
}

fn default_api_base() -> String {
    "https://api.1fichier.com".to_string()
}

fn default_max_attempts() -> u32 {
    10
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_rename_rules() -> HashMap<String, String> {
    HashMap::from([("ps3".to_string(), ".ps3".to_string())])
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
