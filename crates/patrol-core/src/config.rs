//! Configuration for the List Service client (C10).
//!
//! Resolution order: built-in defaults → TOML config file → environment
//! variable overrides. `server` and `key` are the only required options;
//! their absence (or an unsupported `server` scheme) is a fatal
//! [`ConfigError`] raised at construction, never surfaced as a recoverable
//! update/lookup failure.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const DEFAULT_VERSION: &str = "3.0";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;
const DEFAULT_RETRY_SECS: u64 = 30;
const DEFAULT_DATA_FILE_PATH: &str = "/tmp/patrol-data.json";

/// Resolved client configuration (§6 "Configuration (enumerated)").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatrolConfig {
    /// Base URL of the List Service. Required.
    pub server: String,
    /// API key. Required.
    pub key: String,
    /// Chunk-store implementation selector. The only reference
    /// implementation shipped is `"memory"`.
    pub storage: String,
    /// Protocol version string sent as `pver`.
    pub version: String,
    /// Path to the scratch-state file (§4.8).
    pub data_file_path: PathBuf,
    /// Per-request HTTP timeout, in seconds.
    pub http_timeout_secs: u64,
    /// `User-Agent` header override. Defaults to `<client-name> client {VERSION}`.
    pub user_agent: Option<String>,
    /// Overrides the server-supplied `CACHELIFETIME` for full-hash records when set.
    pub cache_time_secs: Option<u64>,
    /// Fallback poll interval, in seconds, used when the server omits `n:`.
    pub default_retry_secs: u64,
}

impl Default for PatrolConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            key: String::new(),
            storage: "memory".to_string(),
            version: DEFAULT_VERSION.to_string(),
            data_file_path: PathBuf::from(DEFAULT_DATA_FILE_PATH),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            user_agent: None,
            cache_time_secs: None,
            default_retry_secs: DEFAULT_RETRY_SECS,
        }
    }
}

impl PatrolConfig {
    /// Load configuration: defaults → TOML file (if present) → env overrides,
    /// then validate. The file path is `$PATROL_CONFIG` if set, otherwise
    /// `~/.config/patrol/config.toml`.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            PatrolConfig::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Build directly from a TOML string (used by tests and `--config`).
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let mut config: PatrolConfig =
            toml::from_str(text).map_err(|e| ConfigError::ParseFailed(PathBuf::from("<inline>"), e))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn file_path() -> PathBuf {
        std::env::var("PATROL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PATROL_SERVER") {
            self.server = v;
        }
        if let Ok(v) = std::env::var("PATROL_KEY") {
            self.key = v;
        }
        if let Ok(v) = std::env::var("PATROL_STORAGE") {
            self.storage = v;
        }
        if let Ok(v) = std::env::var("PATROL_VERSION") {
            self.version = v;
        }
        if let Ok(v) = std::env::var("PATROL_DATA_FILE_PATH") {
            self.data_file_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("PATROL_HTTP_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse() {
                self.http_timeout_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("PATROL_USER_AGENT") {
            self.user_agent = Some(v);
        }
        if let Ok(v) = std::env::var("PATROL_CACHE_TIME_SECS") {
            if let Ok(secs) = v.parse() {
                self.cache_time_secs = Some(secs);
            }
        }
        if let Ok(v) = std::env::var("PATROL_DEFAULT_RETRY_SECS") {
            if let Ok(secs) = v.parse() {
                self.default_retry_secs = secs;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.is_empty() {
            return Err(ConfigError::MissingRequired("server"));
        }
        if self.key.is_empty() {
            return Err(ConfigError::MissingRequired("key"));
        }
        if !self.server.starts_with("http://") && !self.server.starts_with("https://") {
            return Err(ConfigError::BadServerUrl(self.server.clone()));
        }
        Ok(())
    }

    /// `User-Agent` to send, honoring the configured override.
    pub fn user_agent_or_default(&self, client_name: &str, client_version: &str) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("{client_name} client {client_version}"))
    }
}

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("patrol")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("/tmp"))
}
