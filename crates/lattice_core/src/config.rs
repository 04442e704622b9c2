//! Runtime configuration.
//!
//! # Responsibility
//! - Load manager settings from a JSON document.
//! - Validate settings before the manager is built.
//!
//! # Invariants
//! - Every field has a default; an empty object is a valid configuration.
//! - `stop_timeout_secs` is never zero after validation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default bound for `stop_within` / `standby_within`.
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// How `reload` applies pending stash changes while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadStrategy {
    /// Apply the stash in place; unaffected components keep running.
    Unstash,
    /// Standby, apply the stash, then resume.
    #[default]
    Standby,
    /// Full stop, apply the stash, then start again.
    Restart,
}

impl ReloadStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unstash => "unstash",
            Self::Standby => "standby",
            Self::Restart => "restart",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub stop_timeout_secs: u64,
    pub reload_strategy: ReloadStrategy,
    /// Bare component names ignored at registration.
    pub blacklist: BTreeSet<String>,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stop_timeout_secs: DEFAULT_STOP_TIMEOUT_SECS,
            reload_strategy: ReloadStrategy::default(),
            blacklist: BTreeSet::new(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_dir: None,
        }
    }
}

impl RuntimeConfig {
    /// Reads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stop_timeout_secs == 0 {
            return Err(ConfigError::ZeroStopTimeout);
        }
        if self.blacklist.iter().any(|entry| entry.trim().is_empty()) {
            return Err(ConfigError::BlankBlacklistEntry);
        }
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::EmptyLogLevel);
        }
        Ok(())
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    ZeroStopTimeout,
    BlankBlacklistEntry,
    EmptyLogLevel,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid runtime config: {err}"),
            Self::ZeroStopTimeout => write!(f, "stop_timeout_secs must be greater than zero"),
            Self::BlankBlacklistEntry => write!(f, "blacklist entries must not be blank"),
            Self::EmptyLogLevel => write!(f, "log_level must not be empty"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, ReloadStrategy, RuntimeConfig};
    use std::time::Duration;

    #[test]
    fn empty_object_uses_defaults() {
        let config = RuntimeConfig::from_json_str("{}").expect("defaults");
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.stop_timeout(), Duration::from_secs(20));
        assert_eq!(config.reload_strategy, ReloadStrategy::Standby);
    }

    #[test]
    fn parses_every_field() {
        let config = RuntimeConfig::from_json_str(
            r#"{
                "stop_timeout_secs": 3,
                "reload_strategy": "restart",
                "blacklist": ["org.acme.legacy"],
                "log_level": "debug",
                "log_dir": "/tmp/lattice-logs"
            }"#,
        )
        .expect("full config");
        assert_eq!(config.stop_timeout_secs, 3);
        assert_eq!(config.reload_strategy, ReloadStrategy::Restart);
        assert!(config.blacklist.contains("org.acme.legacy"));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn rejects_invalid_values() {
        let err = RuntimeConfig::from_json_str(r#"{"stop_timeout_secs": 0}"#)
            .expect_err("zero timeout");
        assert!(matches!(err, ConfigError::ZeroStopTimeout));

        let err = RuntimeConfig::from_json_str(r#"{"blacklist": ["  "]}"#)
            .expect_err("blank entry");
        assert!(matches!(err, ConfigError::BlankBlacklistEntry));

        let err = RuntimeConfig::from_json_str(r#"{"reload_strategy": "hot"}"#)
            .expect_err("unknown strategy");
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = RuntimeConfig::from_json_str(r#"{"stop_timeout": 5}"#)
            .expect_err("unknown field");
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
