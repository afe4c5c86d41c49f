//! Configuration file support for worthboard.
//!
//! Loads optional TOML config from `~/.config/worthboard/config.toml`.
//! Command-line flags and environment variables take precedence.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Application configuration loaded from TOML file.
#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Balance RPC URL (e.g., "https://mainnet.infura.io/v3/<project>")
    pub rpc_url: Option<String>,
    /// Timeout for a single balance lookup, in seconds
    pub rpc_timeout_seconds: Option<u64>,
    /// Server bind address (e.g., "127.0.0.1:3000")
    pub bind: Option<String>,
    /// Port to listen on all interfaces; overrides `bind`
    pub port: Option<u16>,
    /// Postgres URL for user records (None = in-memory store)
    pub database_url: Option<String>,
    /// Redis URL for the score cache (None = in-process cache)
    pub redis_url: Option<String>,
    /// Maximum in-process cache entries (default: 10000)
    pub cache_max_entries: Option<u64>,
    /// Conditional-write rounds per update before giving up (default: 3)
    pub max_store_attempts: Option<u32>,
    /// Allowed CORS origins (None/empty = allow any)
    pub allowed_origins: Option<Vec<String>>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_default()
            .join("worthboard")
            .join("config.toml")
    }

    /// Load config from the default path, falling back to defaults on any error.
    pub fn load() -> Self {
        Self::load_from(&Self::default_path())
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "loaded config");
                    config
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read config, using defaults");
                Self::default()
            }
        }
    }
}
