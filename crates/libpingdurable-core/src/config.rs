//! Run configuration
//!
//! `PingConfig` is assembled exactly once at startup from three layers:
//! built-in defaults, an optional TOML file (`[ping]` table) and command-line
//! overrides. Once built it is never mutated.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::{format_duration, parse_duration};
use crate::error::ConfigError;
use crate::transport::SessionOptions;

/// Immutable configuration for a single two-phase run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingConfig {
    /// Number of messages to send; 0 sends until another condition stops it (default 100)
    pub num_messages: u64,
    /// Maximum length of the send phase; zero means unlimited (default 30S)
    pub duration: Duration,
    /// Publish rate in messages per second; 0 disables throttling (default 20)
    pub rate: u32,
    /// Number of publishes covered by each transaction commit (default 10)
    pub commit_batch_size: u32,
    /// Payload size of each message in bytes (default 0)
    pub message_size: usize,
    /// Publish inside transactions (default true)
    pub transacted: bool,
    /// Request persistent delivery (default true)
    pub persistent: bool,
    /// Destination queue name (default "ping")
    pub queue: String,
    /// Idle timeout applied to every pull in the receive phase (default 3S)
    pub receive_timeout: Duration,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            num_messages: crate::DEFAULT_NUM_MESSAGES,
            duration: crate::DEFAULT_DURATION,
            rate: crate::DEFAULT_RATE,
            commit_batch_size: crate::DEFAULT_COMMIT_BATCH_SIZE,
            message_size: 0,
            transacted: true,
            persistent: true,
            queue: crate::DEFAULT_QUEUE.to_string(),
            receive_timeout: crate::DEFAULT_RECEIVE_TIMEOUT,
        }
    }
}

/// On-disk configuration file layout
///
/// ```toml
/// [ping]
/// num_messages = 500
/// duration = "1M"
/// rate = 50
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub ping: ConfigOverrides,
}

/// A partial configuration layer; unset fields keep the value from the layer below
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_messages: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_batch_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transacted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistent: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive_timeout: Option<String>,
}

impl ConfigFile {
    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let file: ConfigFile = toml::from_str(&content)?;
        Ok(file)
    }
}

impl PingConfig {
    /// Build the configuration from defaults, an optional file layer and CLI overrides
    pub fn build(
        file: Option<&ConfigFile>,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let mut config = PingConfig::default();
        if let Some(file) = file {
            config.apply(&file.ping)?;
        }
        config.apply(overrides)?;
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, layer: &ConfigOverrides) -> Result<(), ConfigError> {
        if let Some(n) = layer.num_messages {
            self.num_messages = n;
        }
        if let Some(ref spec) = layer.duration {
            self.duration = parse_duration(spec)?;
        }
        if let Some(rate) = layer.rate {
            self.rate = rate;
        }
        if let Some(size) = layer.commit_batch_size {
            self.commit_batch_size = size;
        }
        if let Some(size) = layer.message_size {
            self.message_size = size;
        }
        if let Some(transacted) = layer.transacted {
            self.transacted = transacted;
        }
        if let Some(persistent) = layer.persistent {
            self.persistent = persistent;
        }
        if let Some(ref queue) = layer.queue {
            self.queue = queue.clone();
        }
        if let Some(ref spec) = layer.receive_timeout {
            self.receive_timeout = parse_duration(spec)?;
        }
        Ok(())
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.commit_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "commit_batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.receive_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "receive_timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.queue.is_empty()
            || self.queue.chars().all(|c| c == '.')
            || !self
                .queue
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            return Err(ConfigError::InvalidValue {
                field: "queue",
                reason: format!(
                    "'{}' must use only letters, digits, '.', '_' or '-' and not be all dots",
                    self.queue
                ),
            });
        }
        Ok(())
    }

    /// Number of publishes between commits as seen by the batcher.
    ///
    /// Non-transacted sessions auto-commit every publish.
    pub fn effective_batch_size(&self) -> u32 {
        if self.transacted {
            self.commit_batch_size
        } else {
            1
        }
    }

    /// Session options handed to the transport
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            queue: self.queue.clone(),
            transacted: self.transacted,
            persistent: self.persistent,
            commit_batch_size: self.commit_batch_size,
        }
    }

    /// Render the configuration as a file layer (used for the run report)
    pub fn to_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            num_messages: Some(self.num_messages),
            duration: Some(format_duration(self.duration)),
            rate: Some(self.rate),
            commit_batch_size: Some(self.commit_batch_size),
            message_size: Some(self.message_size),
            transacted: Some(self.transacted),
            persistent: Some(self.persistent),
            queue: Some(self.queue.clone()),
            receive_timeout: Some(format_duration(self.receive_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = PingConfig::build(None, &ConfigOverrides::default()).unwrap();
        assert_eq!(config.num_messages, 100);
        assert_eq!(config.duration, Duration::from_secs(30));
        assert_eq!(config.rate, 20);
        assert_eq!(config.commit_batch_size, 10);
        assert!(config.transacted);
        assert!(config.persistent);
        assert_eq!(config.queue, "ping");
        assert_eq!(config.receive_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_cli_overrides_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pingdurable.toml");
        std::fs::write(
            &path,
            "[ping]\nnum_messages = 500\nduration = \"1M\"\nrate = 5\n",
        )
        .unwrap();

        let file = ConfigFile::load(&path).unwrap();
        let overrides = ConfigOverrides {
            rate: Some(0),
            ..Default::default()
        };
        let config = PingConfig::build(Some(&file), &overrides).unwrap();

        assert_eq!(config.num_messages, 500);
        assert_eq!(config.duration, Duration::from_secs(60));
        assert_eq!(config.rate, 0);
    }

    #[test]
    fn test_unknown_file_key_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[ping]\nnum_mesages = 5\n").unwrap();

        assert!(matches!(
            ConfigFile::load(&path),
            Err(ConfigError::TomlParse(_))
        ));
    }

    #[test]
    fn test_invalid_values() {
        let overrides = ConfigOverrides {
            commit_batch_size: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            PingConfig::build(None, &overrides),
            Err(ConfigError::InvalidValue { field: "commit_batch_size", .. })
        ));

        let overrides = ConfigOverrides {
            duration: Some("forever".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            PingConfig::build(None, &overrides),
            Err(ConfigError::InvalidDuration(_))
        ));

        let overrides = ConfigOverrides {
            queue: Some("../escape".to_string()),
            ..Default::default()
        };
        assert!(PingConfig::build(None, &overrides).is_err());

        let overrides = ConfigOverrides {
            queue: Some("..".to_string()),
            ..Default::default()
        };
        assert!(PingConfig::build(None, &overrides).is_err());
    }

    #[test]
    fn test_effective_batch_size() {
        let mut config = PingConfig::default();
        assert_eq!(config.effective_batch_size(), 10);
        config.transacted = false;
        assert_eq!(config.effective_batch_size(), 1);
    }

    #[test]
    fn test_to_overrides_roundtrip() {
        let config = PingConfig {
            duration: Duration::from_secs(90),
            ..Default::default()
        };
        let rebuilt = PingConfig::build(None, &config.to_overrides()).unwrap();
        assert_eq!(rebuilt, config);
    }
}
