// Session configuration.
//
// File: `~/.canvasdeck/config.toml`. Every field has a default, so a missing
// or partial file is fine. A handful of environment variables override the
// file for deployment (see `SessionConfig::apply_env`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use canvasdeck_common::protocol::canvas::DEFAULT_CSRF_HEADER;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::persistence::backoff::RetryPolicy;

/// Default autosave debounce window.
const DEFAULT_DEBOUNCE_MS: u64 = 3_000;
/// Minimum allowed debounce window.
const MIN_DEBOUNCE_MS: u64 = 2_000;
/// Maximum allowed debounce window.
const MAX_DEBOUNCE_MS: u64 = 5_000;
/// Reference tab limit.
const DEFAULT_MAX_OPEN: usize = 8;

/// Root directory for canvasdeck client state: `~/.canvasdeck/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".canvasdeck"))
}

/// Path to the config file: `~/.canvasdeck/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub remote: RemoteConfig,
    pub autosave: AutoSaveConfig,
    pub tabs: TabsConfig,
    /// Log filter directive (e.g. `info`, `canvasdeck_session=debug`).
    pub log_filter: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            autosave: AutoSaveConfig::default(),
            tabs: TabsConfig::default(),
            log_filter: "info".into(),
        }
    }
}

impl SessionConfig {
    /// Load from `~/.canvasdeck/config.toml` and apply environment overrides.
    /// Falls back to defaults if the file doesn't exist or can't be parsed.
    pub fn load() -> Self {
        let mut config = config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default();
        config.apply_env();
        config
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply environment overrides.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `CANVASDECK_BASE_URL` | `remote.base_url` |
    /// | `CANVASDECK_CSRF_TOKEN` | `remote.csrf_token` |
    /// | `CANVASDECK_LOG_FILTER` | `log_filter` |
    pub fn apply_env(&mut self) {
        self.apply_env_fn(|key| std::env::var(key));
    }

    /// Testable variant that accepts an environment lookup function.
    fn apply_env_fn<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        if let Ok(base_url) = env("CANVASDECK_BASE_URL") {
            self.remote.base_url = base_url;
        }
        if let Ok(token) = env("CANVASDECK_CSRF_TOKEN") {
            self.remote.csrf_token = Some(token);
        }
        if let Ok(filter) = env("CANVASDECK_LOG_FILTER") {
            self.log_filter = filter;
        }
    }
}

/// Remote canvas API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL; pages live at `{base_url}/{page_id}/canvas`.
    pub base_url: String,
    /// Anti-forgery header name.
    pub csrf_header: String,
    /// Anti-forgery token sent with every request, if any.
    pub csrf_token: Option<String>,
    /// Per-request timeout. Elapsing counts as a transient failure.
    pub request_timeout_ms: u64,
    /// Send `If-Match` with the last known etag on writes.
    pub optimistic_concurrency: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api/pages".into(),
            csrf_header: DEFAULT_CSRF_HEADER.into(),
            csrf_token: None,
            request_timeout_ms: 15_000,
            optimistic_concurrency: false,
        }
    }
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }
}

/// Autosave debounce and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AutoSaveConfig {
    /// Quiet period after the last edit before saving, clamped to [2000, 5000].
    pub debounce_ms: u64,
    /// First retry delay after a transient failure.
    pub retry_base_delay_ms: u64,
    /// Upper bound on any single retry delay.
    pub retry_max_delay_ms: u64,
    /// Attempts (including the first) before a transient failure is surfaced.
    pub max_attempts: u32,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            retry_base_delay_ms: retry.base_delay.as_millis() as u64,
            retry_max_delay_ms: retry.max_delay.as_millis() as u64,
            max_attempts: retry.max_attempts,
        }
    }
}

impl AutoSaveConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.clamp(MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
            self.max_attempts,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TabsConfig {
    /// Maximum simultaneously open pages (at least 1).
    pub max_open: usize,
}

impl Default for TabsConfig {
    fn default() -> Self {
        Self { max_open: DEFAULT_MAX_OPEN }
    }
}

impl TabsConfig {
    pub fn max_open(&self) -> usize {
        self.max_open.max(1)
    }
}
