//! tickheap configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, TickheapError};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickheapConfig {
    #[serde(default)]
    pub timer: TimerConfig,
    /// `tracing-subscriber` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_log_filter() -> String { "info".into() }

impl Default for TickheapConfig {
    fn default() -> Self {
        Self {
            timer: TimerConfig::default(),
            log_filter: default_log_filter(),
        }
    }
}

impl TickheapConfig {
    /// Load config from the default path (~/.tickheap/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse config from TOML text and validate it.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| TickheapError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engines cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.timer.validate()
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tickheap")
            .join("config.toml")
    }
}

/// Which concurrency strategy drives the scheduling core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// One owner loop consumes every mutation from a command channel.
    #[default]
    Serialized,
    /// Callers mutate the task set directly under a mutex.
    SharedLock,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Serialized => write!(f, "serialized"),
            Strategy::SharedLock => write!(f, "shared_lock"),
        }
    }
}

impl std::str::FromStr for Strategy {
    type Err = TickheapError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "serialized" => Ok(Strategy::Serialized),
            "shared_lock" | "shared-lock" | "lock" => Ok(Strategy::SharedLock),
            other => Err(TickheapError::Config(format!("Unknown strategy: {other}"))),
        }
    }
}

/// Timer engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Polling granularity of the tick loop.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default)]
    pub strategy: Strategy,
    /// Initial capacity of the priority store.
    #[serde(default = "default_heap_capacity")]
    pub heap_capacity: usize,
}

fn default_tick_interval_ms() -> u64 { 100 }
fn default_heap_capacity() -> usize { 4 }

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            strategy: Strategy::default(),
            heap_capacity: default_heap_capacity(),
        }
    }
}

impl TimerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(TickheapError::Config(
                "timer.tick_interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TickheapConfig::default();
        assert_eq!(config.timer.tick_interval(), Duration::from_millis(100));
        assert_eq!(config.timer.strategy, Strategy::Serialized);
        assert_eq!(config.timer.heap_capacity, 4);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_parse_partial() {
        let config = TickheapConfig::parse(
            r#"
            [timer]
            strategy = "shared_lock"
            tick_interval_ms = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.timer.strategy, Strategy::SharedLock);
        assert_eq!(config.timer.tick_interval_ms, 10);
        assert_eq!(config.timer.heap_capacity, 4);
    }

    #[test]
    fn test_zero_tick_rejected() {
        let err = TickheapConfig::parse("[timer]\ntick_interval_ms = 0\n").unwrap_err();
        assert!(matches!(err, TickheapError::Config(_)));
    }

    #[test]
    fn test_load_from_missing_file() {
        let path = std::env::temp_dir().join("tickheap-test-missing").join("config.toml");
        let err = TickheapConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, TickheapError::Io(_)), "{err}");
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("serialized".parse::<Strategy>().unwrap(), Strategy::Serialized);
        assert_eq!("shared-lock".parse::<Strategy>().unwrap(), Strategy::SharedLock);
        assert!("actor".parse::<Strategy>().is_err());
    }
}
