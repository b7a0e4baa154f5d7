//! Service configuration.
//!
//! Settings resolve in priority order: environment variables override the
//! TOML file, the TOML file overrides built-in defaults. The TOML file is
//! `paperscope.toml` in the working directory unless `PAPERSCOPE_CONFIG`
//! points elsewhere. A missing file is not an error; a malformed one is.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default arXiv feed categories, joined the way the feed URL expects.
pub const DEFAULT_ARXIV_QUERY: &str = "cs.AI+cs.CV+cs.LG+cs.CL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Bind address for the HTTP server.
    pub host: String,
    /// Bind port for the HTTP server.
    pub port: u16,
    /// Root directory for the on-disk cache.
    pub cache_dir: PathBuf,
    /// When false, cache reads miss and cache writes are dropped.
    pub cache_enabled: bool,
    /// Entries older than this are treated as absent.
    pub cache_ttl_hours: u64,
    /// Feed categories used when a request does not name its own.
    pub arxiv_query: String,
    /// Maximum number of recommendations returned per run.
    pub max_results: usize,
    /// Identifiers per detail-fetch batch.
    pub batch_size: usize,
    /// Look up code repository links for recommended papers.
    pub fetch_code_links: bool,
    /// Retry attempts for a failed detail-fetch request.
    pub feed_retries: u32,
    /// Seconds between detail-fetch requests (also the retry spacing).
    pub feed_retry_delay_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cache_dir: PathBuf::from("./cache"),
            cache_enabled: true,
            cache_ttl_hours: 24,
            arxiv_query: DEFAULT_ARXIV_QUERY.to_string(),
            max_results: 50,
            batch_size: 50,
            fetch_code_links: false,
            feed_retries: 10,
            feed_retry_delay_secs: 10,
        }
    }
}

impl Settings {
    /// Resolve settings from defaults, the config file, and the environment.
    pub fn load() -> Result<Self> {
        let path = std::env::var("PAPERSCOPE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("paperscope.toml"));

        let mut settings = if path.exists() {
            let loaded = Self::load_from_path(&path)?;
            tracing::info!("Loaded configuration from {}", path.display());
            loaded
        } else {
            tracing::info!(
                "No config file at {}, using built-in defaults",
                path.display()
            );
            Self::default()
        };

        settings.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(settings)
    }

    /// Parse settings from a TOML file. Unspecified fields keep defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let settings: Settings = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(settings)
    }

    /// Apply `PAPERSCOPE_*` environment overrides.
    ///
    /// Takes a lookup closure so tests can drive it without touching
    /// process-global state. Unparseable values are logged and skipped.
    pub fn apply_env_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get("PAPERSCOPE_HOST") {
            self.host = v;
        }
        if let Some(v) = get("PAPERSCOPE_PORT") {
            match v.parse() {
                Ok(port) => self.port = port,
                Err(_) => tracing::warn!("Ignoring invalid PAPERSCOPE_PORT: {}", v),
            }
        }
        if let Some(v) = get("PAPERSCOPE_CACHE_DIR") {
            self.cache_dir = PathBuf::from(v);
        }
        if let Some(v) = get("PAPERSCOPE_CACHE_ENABLED") {
            match parse_bool(&v) {
                Some(enabled) => self.cache_enabled = enabled,
                None => tracing::warn!("Ignoring invalid PAPERSCOPE_CACHE_ENABLED: {}", v),
            }
        }
        if let Some(v) = get("PAPERSCOPE_CACHE_TTL_HOURS") {
            match v.parse() {
                Ok(hours) => self.cache_ttl_hours = hours,
                Err(_) => tracing::warn!("Ignoring invalid PAPERSCOPE_CACHE_TTL_HOURS: {}", v),
            }
        }
        if let Some(v) = get("PAPERSCOPE_ARXIV_QUERY") {
            self.arxiv_query = v;
        }
        if let Some(v) = get("PAPERSCOPE_MAX_RESULTS") {
            match v.parse() {
                Ok(n) => self.max_results = n,
                Err(_) => tracing::warn!("Ignoring invalid PAPERSCOPE_MAX_RESULTS: {}", v),
            }
        }
        if let Some(v) = get("PAPERSCOPE_BATCH_SIZE") {
            match v.parse::<usize>() {
                Ok(n) if n > 0 => self.batch_size = n,
                _ => tracing::warn!("Ignoring invalid PAPERSCOPE_BATCH_SIZE: {}", v),
            }
        }
        if let Some(v) = get("PAPERSCOPE_FETCH_CODE_LINKS") {
            match parse_bool(&v) {
                Some(enabled) => self.fetch_code_links = enabled,
                None => tracing::warn!("Ignoring invalid PAPERSCOPE_FETCH_CODE_LINKS: {}", v),
            }
        }
        if let Some(v) = get("PAPERSCOPE_FEED_RETRIES") {
            match v.parse() {
                Ok(n) => self.feed_retries = n,
                Err(_) => tracing::warn!("Ignoring invalid PAPERSCOPE_FEED_RETRIES: {}", v),
            }
        }
        if let Some(v) = get("PAPERSCOPE_FEED_RETRY_DELAY_SECS") {
            match v.parse() {
                Ok(n) => self.feed_retry_delay_secs = n,
                Err(_) => {
                    tracing::warn!("Ignoring invalid PAPERSCOPE_FEED_RETRY_DELAY_SECS: {}", v)
                }
            }
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
