//! Configuration file parser for ~/.config/subsweep/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde, though a warning is logged for each one
//! since they are usually typos.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration
// ============================================================================

/// Top-level application configuration.
///
/// Every field has a default, so any subset of keys can be specified.
/// `Debug` masks `session_token`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the subscription backend.
    pub backend_url: String,

    /// Session cookie for the backend (alternative to SUBSWEEP_SESSION env var).
    /// Env var takes precedence over config file.
    pub session_token: Option<String>,

    /// Number of channels analyzed concurrently per chunk.
    pub concurrency: usize,

    /// Attempts per channel before a rate-limited request falls back to "no uploads".
    pub max_attempts: u32,

    /// Fixed delay before retrying a rate-limited analysis request.
    pub rate_limit_backoff_ms: u64,

    /// Per-request timeout.
    pub request_timeout_secs: u64,

    /// Default recency threshold used by `list` and `unsubscribe --targets`.
    pub threshold_months: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:10000".to_string(),
            session_token: None,
            concurrency: 5,
            max_attempts: 3,
            rate_limit_backoff_ms: 1000,
            request_timeout_secs: 30,
            threshold_months: 2,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("backend_url", &self.backend_url)
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("concurrency", &self.concurrency)
            .field("max_attempts", &self.max_attempts)
            .field("rate_limit_backoff_ms", &self.rate_limit_backoff_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("threshold_months", &self.threshold_months)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 7] = [
        "backend_url",
        "session_token",
        "concurrency",
        "max_attempts",
        "rate_limit_backoff_ms",
        "request_timeout_secs",
        "threshold_months",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = std::fs::read_to_string(path)?;

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            backend = %config.backend_url,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Chunk size for analysis; a zero in the file is treated as one.
    pub fn concurrency(&self) -> usize {
        self.concurrency.max(1)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_millis(self.rate_limit_backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

// ============================================================================
// Tests
// ============================================================================
