//! Configuration system for barge.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $BARGE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/barge/config.toml
//!   3. ~/.config/barge/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::dag::DEFAULT_CHUNK_SIZE;
use crate::wire::MAX_PAYLOAD;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BargeConfig {
    pub identity: IdentityConfig,
    pub retrieval: RetrievalConfig,
    pub serve: ServeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Hex key file for `barge serve`. Auto-generated on first run.
    pub key_path: PathBuf,
}

/// Knobs for one retrieval. Timeouts are not assumptions about the peer;
/// tune them here, not in code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Maximum fetches in flight at once. Must be at least 1.
    pub concurrency: usize,
    /// How long a want may go unanswered before it is re-sent.
    pub want_timeout_ms: u64,
    /// Total want attempts per block, including the first.
    pub max_attempts: u32,
    /// Dial plus hello exchange.
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    /// Listen multiaddr, /ip4|ip6/<addr>/tcp/<port>.
    pub listen: String,
    /// Leaf size when importing files.
    pub chunk_size: usize,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            key_path: config_dir().join("peer.key"),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            want_timeout_ms: 30_000,
            max_attempts: 3,
            connect_timeout_ms: 10_000,
        }
    }
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            listen: "/ip4/127.0.0.1/tcp/4001".to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl RetrievalConfig {
    pub fn want_timeout(&self) -> Duration {
        Duration::from_millis(self.want_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

pub fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("barge")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: &'static str },
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl BargeConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            Self::from_toml(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            BargeConfig::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("BARGE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&BargeConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply BARGE_* overrides. `lookup` is the environment in production
    /// and a map in tests, so tests never touch process env.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("BARGE_RETRIEVAL__CONCURRENCY").and_then(|v| v.parse().ok()) {
            self.retrieval.concurrency = v;
        }
        if let Some(v) = lookup("BARGE_RETRIEVAL__WANT_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.retrieval.want_timeout_ms = v;
        }
        if let Some(v) = lookup("BARGE_RETRIEVAL__MAX_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.retrieval.max_attempts = v;
        }
        if let Some(v) = lookup("BARGE_RETRIEVAL__CONNECT_TIMEOUT_MS").and_then(|v| v.parse().ok())
        {
            self.retrieval.connect_timeout_ms = v;
        }
        if let Some(v) = lookup("BARGE_SERVE__LISTEN") {
            self.serve.listen = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retrieval.concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "retrieval.concurrency",
                reason: "must be at least 1",
            });
        }
        if self.retrieval.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "retrieval.max_attempts",
                reason: "must be at least 1",
            });
        }
        if self.serve.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                key: "serve.chunk_size",
                reason: "must be non-zero",
            });
        }
        if self.serve.chunk_size > MAX_PAYLOAD {
            return Err(ConfigError::Invalid {
                key: "serve.chunk_size",
                reason: "must not exceed the wire payload limit",
            });
        }
        Ok(())
    }
}
