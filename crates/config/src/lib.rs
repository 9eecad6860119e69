//! Gollum configuration
//!
//! TOML-based configuration with sensible defaults. Plugin instances are
//! named tables tagged by `type`; streams may carry router tables with
//! overflow policy and formatter/filter chains.
//!
//! # Example
//!
//! ```toml
//! [consumers.stdin]
//! type = "console"
//! stream = ["console"]
//!
//! [producers.logfile]
//! type = "file"
//! stream = ["console", "_GOLLUM_"]
//! file = "/var/log/gollum/gollum.log"
//! rotate = true
//! compress = true
//! ```
//!
//! Parse with the `FromStr` trait or [`Config::from_file`].

mod chain;
mod consumers;
mod error;
mod global;
mod logging;
mod producers;
mod streams;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use std::collections::HashMap;

pub use chain::{FilterConfig, FormatterConfig};
pub use consumers::{
    ConsoleConsumerConfig, ConsumerConfig, ConsumersConfig, SocketConsumerConfig,
};
pub use error::{ConfigError, Result};
pub use global::GlobalConfig;
pub use logging::{LogConfig, LogLevel};
pub use producers::{
    ConsoleProducerConfig, ConsoleTarget, FileProducerConfig, NullProducerConfig,
    ProducerConfig, ProducersConfig, ScribeProducerConfig,
};
pub use streams::{OverflowPolicy, StreamConfig};

/// Main configuration structure
///
/// All sections are optional with defaults; validation requires at least
/// one enabled consumer and one enabled producer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Process-wide defaults
    pub global: GlobalConfig,

    /// Logging configuration
    pub log: LogConfig,

    /// Per-stream router tables
    pub streams: HashMap<String, StreamConfig>,

    /// Consumer instances
    pub consumers: ConsumersConfig,

    /// Producer instances
    pub producers: ProducersConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_str(&contents)
    }

    /// Names of all enabled producers
    pub fn enabled_producers(&self) -> Vec<&str> {
        self.producers
            .iter()
            .filter(|(_, p)| p.is_enabled())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Names of all enabled consumers
    pub fn enabled_consumers(&self) -> Vec<&str> {
        self.consumers
            .iter()
            .filter(|(_, c)| c.is_enabled())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        validation::validate_config(&config)?;
        Ok(config)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_parse() {
        let toml = r#"
[global]
channel_capacity = 1024
shutdown_timeout = "2s"

[log]
level = "debug"

[streams.console]
policy = "block"
block_deadline = "50ms"

[consumers.stdin]
type = "console"
stream = ["console"]

[consumers.tcp]
type = "socket"
port = 6000

[producers.logfile]
type = "file"
stream = ["console", "_GOLLUM_"]
file = "/var/log/gollum/gollum.log"
rotate = true
rotate_at = "00:00"
compress = true

[producers.scribe]
type = "scribe"
enable = false
host = "scribe.local"
"#;
        let config: Config = toml.parse().unwrap();

        assert_eq!(config.global.channel_capacity, 1024);
        assert_eq!(config.log.level, LogLevel::Debug);
        assert_eq!(
            config.streams.get("console").unwrap().policy,
            OverflowPolicy::Block
        );
        assert_eq!(config.consumers.len(), 2);
        assert_eq!(config.producers.len(), 2);

        let mut enabled = config.enabled_producers();
        enabled.sort_unstable();
        assert_eq!(enabled, ["logfile"]);
    }

    #[test]
    fn test_invalid_toml() {
        assert!("invalid { toml".parse::<Config>().is_err());
    }

    #[test]
    fn test_unknown_plugin_type_is_parse_error() {
        let toml = r#"
[consumers.stdin]
type = "carrier-pigeon"

[producers.out]
type = "console"
"#;
        assert!(matches!(
            toml.parse::<Config>().unwrap_err(),
            ConfigError::ParseError(_)
        ));
    }
}
