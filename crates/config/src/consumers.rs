//! Consumer configuration types
//!
//! Consumers are named instances stored as a map under `[consumers.*]`,
//! tagged by `type`.

use serde::Deserialize;
use std::collections::HashMap;

/// Container for all consumer instances
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConsumersConfig {
    /// Named consumer instances
    #[serde(flatten)]
    consumers: HashMap<String, ConsumerConfig>,
}

impl ConsumersConfig {
    /// Get a consumer by instance name
    pub fn get(&self, name: &str) -> Option<&ConsumerConfig> {
        self.consumers.get(name)
    }

    /// Iterate over all instances
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ConsumerConfig)> {
        self.consumers.iter()
    }

    /// Number of configured instances
    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    /// Whether no consumers are configured
    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }
}

/// Configuration for a single consumer instance
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConsumerConfig {
    /// Read lines from stdin
    Console(ConsoleConsumerConfig),

    /// Accept newline-delimited payloads over TCP
    Socket(SocketConsumerConfig),
}

impl ConsumerConfig {
    /// Whether the instance is enabled
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Console(c) => c.enable,
            Self::Socket(c) => c.enable,
        }
    }

    /// The plugin kind string used for constructor lookup
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Console(_) => "consumer.console",
            Self::Socket(_) => "consumer.socket",
        }
    }

    /// Streams this consumer posts to
    pub fn streams(&self) -> &[String] {
        match self {
            Self::Console(c) => &c.stream,
            Self::Socket(c) => &c.stream,
        }
    }
}

fn default_streams() -> Vec<String> {
    vec!["*".into()]
}

fn default_enable() -> bool {
    true
}

fn default_address() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    5880
}

/// Stdin line consumer
///
/// # Example
///
/// ```toml
/// [consumers.console]
/// type = "console"
/// stream = ["console"]
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsoleConsumerConfig {
    /// Whether this instance is enabled
    /// Default: true
    pub enable: bool,

    /// Streams each line is posted to
    /// Default: ["*"]
    pub stream: Vec<String>,
}

impl Default for ConsoleConsumerConfig {
    fn default() -> Self {
        Self {
            enable: default_enable(),
            stream: default_streams(),
        }
    }
}

/// TCP line consumer
///
/// # Example
///
/// ```toml
/// [consumers.tcp]
/// type = "socket"
/// address = "0.0.0.0"
/// port = 5880
/// stream = ["socket"]
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SocketConsumerConfig {
    /// Whether this instance is enabled
    /// Default: true
    pub enable: bool,

    /// Streams each line is posted to
    /// Default: ["*"]
    pub stream: Vec<String>,

    /// Listen address
    /// Default: 127.0.0.1
    pub address: String,

    /// Listen port
    /// Default: 5880
    pub port: u16,
}

impl Default for SocketConsumerConfig {
    fn default() -> Self {
        Self {
            enable: default_enable(),
            stream: default_streams(),
            address: default_address(),
            port: default_port(),
        }
    }
}
