//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{DtrError, Result};

/// Upper bound for `store.busy_timeout_ms`.
const MAX_BUSY_TIMEOUT_MS: u64 = 600_000;

/// Full dtr configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub server: ServerConfig,
    pub history: HistoryConfig,
    pub logging: LoggingConfig,
    /// File this configuration was loaded from (or would be).
    #[serde(skip)]
    pub config_file: PathBuf,
}

/// Tree database location and locking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HistoryConfig {
    /// Do not append a snapshot identical to the node's latest record.
    pub skip_identical_snapshots: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    pub activity_log: PathBuf,
    pub activity_log_enabled: bool,
}

fn home_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(
        || {
            eprintln!("[DTR-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
            PathBuf::from("/tmp")
        },
        PathBuf::from,
    )
}

fn data_dir() -> PathBuf {
    home_dir().join(".local").join("share").join("dtr")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: data_dir().join("tree.sqlite3"),
            busy_timeout_ms: 5_000,
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind.parse().map_err(|error| DtrError::InvalidConfig {
            details: format!("server.bind {:?} is not a socket address: {error}", self.bind),
        })
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            skip_identical_snapshots: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            activity_log: data_dir().join("activity.jsonl"),
            activity_log_enabled: true,
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        home_dir().join(".config").join("dtr").join("config.toml")
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| DtrError::io(&path_buf, source))?;
            Self::from_toml_str(&raw)?
        } else if path.is_some() {
            return Err(DtrError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document without env overrides or validation.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|error| DtrError::Serialization {
            context: "toml",
            details: error.to_string(),
        })
    }

    /// Deterministic hash of the effective config for startup logging.
    ///
    /// FNV-1a over the canonical JSON form, stable across processes and releases.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("DTR_STORE_PATH") {
            self.store.path = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("DTR_STORE_BUSY_TIMEOUT_MS") {
            self.store.busy_timeout_ms = parse_env("DTR_STORE_BUSY_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = lookup("DTR_SERVER_BIND") {
            self.server.bind = raw;
        }
        if let Some(raw) = lookup("DTR_HISTORY_SKIP_IDENTICAL_SNAPSHOTS") {
            self.history.skip_identical_snapshots =
                parse_env("DTR_HISTORY_SKIP_IDENTICAL_SNAPSHOTS", &raw)?;
        }
        if let Some(raw) = lookup("DTR_LOG_LEVEL") {
            self.logging.level = raw;
        }
        if let Some(raw) = lookup("DTR_ACTIVITY_LOG") {
            self.logging.activity_log = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("DTR_ACTIVITY_LOG_ENABLED") {
            self.logging.activity_log_enabled = parse_env("DTR_ACTIVITY_LOG_ENABLED", &raw)?;
        }
        Ok(())
    }

    /// Expand a leading `~/` in every configured path.
    fn normalize_paths(&mut self) {
        for path in [&mut self.store.path, &mut self.logging.activity_log] {
            if let Ok(rest) = path.strip_prefix("~") {
                *path = home_dir().join(rest);
            }
        }
    }

    /// Check value ranges and formats.
    pub fn validate(&self) -> Result<()> {
        if self.store.path.as_os_str().is_empty() {
            return Err(DtrError::InvalidConfig {
                details: "store.path must not be empty".to_string(),
            });
        }
        if self.store.busy_timeout_ms == 0 || self.store.busy_timeout_ms > MAX_BUSY_TIMEOUT_MS {
            return Err(DtrError::InvalidConfig {
                details: format!(
                    "store.busy_timeout_ms must be in [1, {MAX_BUSY_TIMEOUT_MS}], got {}",
                    self.store.busy_timeout_ms
                ),
            });
        }
        self.server.socket_addr()?;
        if let Err(error) = tracing_subscriber::EnvFilter::try_new(&self.logging.level) {
            return Err(DtrError::InvalidConfig {
                details: format!("logging.level {:?}: {error}", self.logging.level),
            });
        }
        if self.logging.activity_log_enabled && self.logging.activity_log.as_os_str().is_empty() {
            return Err(DtrError::InvalidConfig {
                details: "logging.activity_log must be set when the activity log is enabled"
                    .to_string(),
            });
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|error| DtrError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}

#[cfg(test)]
mod tests {
    use super::{Config, DtrError};
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        cfg.validate().unwrap();
        assert!(cfg.history.skip_identical_snapshots);
        assert_eq!(cfg.server.bind, "127.0.0.1:8080");
    }

    #[test]
    fn partial_toml_keeps_section_defaults() {
        let cfg = Config::from_toml_str(
            "[store]\npath = \"/srv/dtr/tree.db\"\n\n[history]\nskip_identical_snapshots = false\n",
        )
        .unwrap();
        assert_eq!(cfg.store.path, PathBuf::from("/srv/dtr/tree.db"));
        assert_eq!(cfg.store.busy_timeout_ms, 5_000);
        assert!(!cfg.history.skip_identical_snapshots);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn env_overrides_apply() {
        let env = vars(&[
            ("DTR_STORE_PATH", "/tmp/x.db"),
            ("DTR_STORE_BUSY_TIMEOUT_MS", "250"),
            ("DTR_SERVER_BIND", "0.0.0.0:9000"),
            ("DTR_ACTIVITY_LOG_ENABLED", "false"),
        ]);
        let mut cfg = Config::default();
        cfg.apply_env_overrides_from(|name| env.get(name).cloned())
            .unwrap();
        assert_eq!(cfg.store.path, PathBuf::from("/tmp/x.db"));
        assert_eq!(cfg.store.busy_timeout_ms, 250);
        assert_eq!(cfg.server.bind, "0.0.0.0:9000");
        assert!(!cfg.logging.activity_log_enabled);
    }

    #[test]
    fn bad_env_value_is_a_parse_error() {
        let env = vars(&[("DTR_HISTORY_SKIP_IDENTICAL_SNAPSHOTS", "maybe")]);
        let err = Config::default()
            .apply_env_overrides_from(|name| env.get(name).cloned())
            .unwrap_err();
        assert!(matches!(err, DtrError::ConfigParse { context: "env", .. }));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = Config::default();
        cfg.server.bind = "not-an-address".to_string();
        assert_eq!(cfg.validate().unwrap_err().code(), "DTR-1001");

        let mut cfg = Config::default();
        cfg.store.busy_timeout_ms = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, DtrError::MissingConfig { .. }));
    }

    #[test]
    fn load_reads_file_and_records_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nbind = \"127.0.0.1:7000\"\n").unwrap();
        let cfg = Config::load(Some(&path)).unwrap();
        assert_eq!(cfg.config_file, path);
        assert_eq!(cfg.server.socket_addr().unwrap().port(), 7000);
    }

    #[test]
    fn stable_hash_is_deterministic_and_sensitive() {
        let a = Config::default();
        let mut b = a.clone();
        assert_eq!(a.stable_hash().unwrap(), b.stable_hash().unwrap());
        b.history.skip_identical_snapshots = false;
        assert_ne!(a.stable_hash().unwrap(), b.stable_hash().unwrap());
    }

    #[test]
    fn rendered_toml_parses_back() {
        let cfg = Config::default();
        let rendered = cfg.to_toml_string().unwrap();
        let mut parsed = Config::from_toml_str(&rendered).unwrap();
        parsed.config_file = cfg.config_file.clone();
        assert_eq!(parsed, cfg);
    }
}
