//! Bootstrap configuration loaded from TOML
//!
//! Configuration file resolution follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. `TUNECAST_CONFIG` environment variable
//! 3. Platform config directory (`<config_dir>/tunecast/config.toml`)
//! 4. Built-in defaults (no file)
//!
//! A missing file is never fatal: a warning is logged and defaults are used.
//! A file that exists but fails to parse is reported as an error.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "TUNECAST_CONFIG";

/// Root of the TOML bootstrap configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub autoplay: AutoplayConfig,

    /// Spotify Web API credentials (optional, tier 1 fails over without them)
    #[serde(default)]
    pub spotify: Option<SpotifyCredentials>,

    /// Tidal public API token (optional, tier 1 fails over without it)
    #[serde(default)]
    pub tidal: Option<TidalCredentials>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Resolution cache sizing
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            max_entries: default_cache_max_entries(),
        }
    }
}

/// Batch resolution pacing
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    /// Tracks resolved concurrently per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Failed tracks itemized in the summary (the rest are only counted)
    #[serde(default = "default_failure_sample_cap")]
    pub failure_sample_cap: usize,

    /// Progress is reported every N processed tracks (and on the last one)
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,

    /// Pause between chunks
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
}

impl BatchConfig {
    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            failure_sample_cap: default_failure_sample_cap(),
            progress_interval: default_progress_interval(),
            chunk_delay_ms: default_chunk_delay_ms(),
        }
    }
}

/// Media extraction and platform resolver settings
#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    /// Path or name of the yt-dlp executable
    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: PathBuf,

    #[serde(default = "default_extraction_timeout_secs")]
    pub extraction_timeout_secs: u64,

    /// Ranked candidates requested per free-text search
    #[serde(default = "default_search_candidates")]
    pub search_candidates: usize,

    /// Upper bound on continuation pages followed per collection
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_initial_backoff_ms")]
    pub retry_initial_backoff_ms: u64,

    #[serde(default = "default_retry_max_backoff_ms")]
    pub retry_max_backoff_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl ResolverConfig {
    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: default_ytdlp_path(),
            extraction_timeout_secs: default_extraction_timeout_secs(),
            search_candidates: default_search_candidates(),
            max_pages: default_max_pages(),
            retry_attempts: default_retry_attempts(),
            retry_initial_backoff_ms: default_retry_initial_backoff_ms(),
            retry_max_backoff_ms: default_retry_max_backoff_ms(),
            user_agent: default_user_agent(),
        }
    }
}

/// Autoplay continuation settings
#[derive(Debug, Clone, Deserialize)]
pub struct AutoplayConfig {
    /// Maximum related tracks enqueued per continuation
    #[serde(default = "default_related_limit")]
    pub related_limit: usize,
}

impl Default for AutoplayConfig {
    fn default() -> Self {
        Self {
            related_limit: default_related_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TidalCredentials {
    pub token: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    2 * 60 * 60
}

fn default_cache_max_entries() -> usize {
    5000
}

fn default_chunk_size() -> usize {
    50
}

fn default_failure_sample_cap() -> usize {
    5
}

fn default_progress_interval() -> usize {
    10
}

fn default_chunk_delay_ms() -> u64 {
    500
}

fn default_ytdlp_path() -> PathBuf {
    PathBuf::from("yt-dlp")
}

fn default_extraction_timeout_secs() -> u64 {
    30
}

fn default_search_candidates() -> usize {
    5
}

fn default_max_pages() -> usize {
    100
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_initial_backoff_ms() -> u64 {
    250
}

fn default_retry_max_backoff_ms() -> u64 {
    4000
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
        .to_string()
}

fn default_related_limit() -> usize {
    10
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Resolve and load configuration following the priority order
    ///
    /// Returns built-in defaults (with a warning) when no file can be found.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_path) {
            Some(path) if path.exists() => {
                info!(path = %path.display(), "Loading configuration");
                Self::from_file(&path)
            }
            Some(path) => {
                warn!(
                    path = %path.display(),
                    "Configuration file not found, using built-in defaults"
                );
                Ok(Self::default())
            }
            None => {
                warn!("No configuration file available, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.batch.chunk_size == 0 {
            return Err(Error::Config("batch.chunk_size must be at least 1".to_string()));
        }
        if self.batch.progress_interval == 0 {
            return Err(Error::Config(
                "batch.progress_interval must be at least 1".to_string(),
            ));
        }
        if self.cache.max_entries == 0 {
            return Err(Error::Config("cache.max_entries must be at least 1".to_string()));
        }
        if self.resolver.search_candidates == 0 {
            return Err(Error::Config(
                "resolver.search_candidates must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pick the configuration file path by priority
///
/// Only the platform default location is checked for existence; explicit
/// paths are returned as given so the caller can report them missing.
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    dirs::config_dir()
        .map(|d| d.join("tunecast").join("config.toml"))
        .filter(|p| p.exists())
}
