//! Producer configuration types
//!
//! Producers are named instances stored as a map under `[producers.*]`,
//! tagged by `type`. Option names and defaults follow the classic file
//! and scribe producer surfaces.

use serde::Deserialize;
use std::collections::HashMap;

use crate::chain::FormatterConfig;

/// Container for all producer instances
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProducersConfig {
    /// Named producer instances
    #[serde(flatten)]
    producers: HashMap<String, ProducerConfig>,
}

impl ProducersConfig {
    /// Get a producer by instance name
    pub fn get(&self, name: &str) -> Option<&ProducerConfig> {
        self.producers.get(name)
    }

    /// Iterate over all instances
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ProducerConfig)> {
        self.producers.iter()
    }

    /// Number of configured instances
    pub fn len(&self) -> usize {
        self.producers.len()
    }

    /// Whether no producers are configured
    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }
}

/// Configuration for a single producer instance
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProducerConfig {
    /// Write to a file with rotation and compression
    File(FileProducerConfig),

    /// Send framed batches to a scribe-style endpoint
    Scribe(ScribeProducerConfig),

    /// Write formatted messages to stdout/stderr
    Console(ConsoleProducerConfig),

    /// Discard everything (benchmarking, routing tests)
    Null(NullProducerConfig),
}

impl ProducerConfig {
    /// Whether the instance is enabled
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::File(c) => c.enable,
            Self::Scribe(c) => c.enable,
            Self::Console(c) => c.enable,
            Self::Null(c) => c.enable,
        }
    }

    /// The plugin kind string used for constructor lookup
    pub fn kind(&self) -> &'static str {
        match self {
            Self::File(_) => "producer.file",
            Self::Scribe(_) => "producer.scribe",
            Self::Console(_) => "producer.console",
            Self::Null(_) => "producer.null",
        }
    }

    /// Streams this producer subscribes to
    pub fn streams(&self) -> &[String] {
        match self {
            Self::File(c) => &c.stream,
            Self::Scribe(c) => &c.stream,
            Self::Console(c) => &c.stream,
            Self::Null(c) => &c.stream,
        }
    }

    /// Producer-level formatter chain
    pub fn formatters(&self) -> &[FormatterConfig] {
        match self {
            Self::File(c) => &c.formatter,
            Self::Scribe(c) => &c.formatter,
            Self::Console(c) => &c.formatter,
            Self::Null(_) => &[],
        }
    }
}

fn default_enable() -> bool {
    true
}

fn default_streams() -> Vec<String> {
    vec!["*".into()]
}

/// File producer configuration
///
/// # Example
///
/// ```toml
/// [producers.logfile]
/// type = "file"
/// stream = ["console", "_GOLLUM_"]
/// file = "/var/log/gollum/gollum.log"
/// batch_size_max_kb = 8192
/// batch_size_byte = 8192
/// batch_timeout_sec = 5
/// rotate = true
/// rotate_timeout_min = 1440
/// rotate_size_mb = 1024
/// rotate_at = "00:00"
/// compress = true
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileProducerConfig {
    /// Whether this instance is enabled
    /// Default: true
    pub enable: bool,

    /// Streams to subscribe to; "*" subscribes to everything
    /// Default: ["*"]
    pub stream: Vec<String>,

    /// Path of the log file; directory, name and extension are derived
    /// Required when enabled
    pub file: String,

    /// Capacity of each batch buffer in KB; messages larger than this
    /// are rejected
    /// Default: 8192 (8 MB)
    pub batch_size_max_kb: usize,

    /// Bytes buffered before a flush is triggered
    /// Default: 8192
    pub batch_size_byte: usize,

    /// Seconds without a new message before a flush is triggered
    /// Default: 5
    pub batch_timeout_sec: u64,

    /// Enable the rotation policy
    /// Default: false
    pub rotate: bool,

    /// Rotate after this many minutes
    /// Default: 1440 (one day)
    pub rotate_timeout_min: u64,

    /// Rotate after the file reaches this size in MB
    /// Default: 1024
    pub rotate_size_mb: u64,

    /// Rotate when this "HH:MM" clock time is crossed; empty disables
    /// Default: ""
    pub rotate_at: String,

    /// Gzip rotated files in the background
    /// Default: false
    pub compress: bool,

    /// Producer-level formatter chain
    pub formatter: Vec<FormatterConfig>,
}

impl Default for FileProducerConfig {
    fn default() -> Self {
        Self {
            enable: default_enable(),
            stream: default_streams(),
            file: String::new(),
            batch_size_max_kb: 8192,
            batch_size_byte: 8192,
            batch_timeout_sec: 5,
            rotate: false,
            rotate_timeout_min: 1440,
            rotate_size_mb: 1024,
            rotate_at: String::new(),
            compress: false,
            formatter: Vec::new(),
        }
    }
}

impl FileProducerConfig {
    /// Parse `rotate_at` into (hour, minute)
    ///
    /// Returns `Ok(None)` when disabled (empty string).
    pub fn rotate_at_parsed(&self) -> Result<Option<(u32, u32)>, String> {
        if self.rotate_at.is_empty() {
            return Ok(None);
        }
        let (h, m) = self
            .rotate_at
            .split_once(':')
            .ok_or_else(|| format!("'{}' is not in HH:MM form", self.rotate_at))?;
        let hour: u32 = h.parse().map_err(|_| format!("bad hour '{h}'"))?;
        let minute: u32 = m.parse().map_err(|_| format!("bad minute '{m}'"))?;
        if hour > 23 || minute > 59 {
            return Err(format!("'{}' is out of range", self.rotate_at));
        }
        Ok(Some((hour, minute)))
    }
}

/// Scribe producer configuration
///
/// # Example
///
/// ```toml
/// [producers.scribe]
/// type = "scribe"
/// stream = ["console", "_GOLLUM_"]
/// host = "192.168.222.30"
/// port = 1463
/// buffer_size_kb = 1024
/// buffer_size_max_kb = 8192
/// batch_size_byte = 4096
/// batch_timeout_sec = 2
///
/// [producers.scribe.category]
/// "console" = "default"
/// "*" = "default"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScribeProducerConfig {
    /// Whether this instance is enabled
    /// Default: true
    pub enable: bool,

    /// Streams to subscribe to
    /// Default: ["*"]
    pub stream: Vec<String>,

    /// Endpoint host
    /// Required when enabled
    pub host: String,

    /// Endpoint port
    /// Default: 1463
    pub port: u16,

    /// Socket send buffer size in KB
    /// Default: 1024 (1 MB)
    pub buffer_size_kb: usize,

    /// Capacity of each batch buffer in KB
    /// Default: 8192 (8 MB)
    pub buffer_size_max_kb: usize,

    /// Bytes buffered before a flush is triggered
    /// Default: 8192
    pub batch_size_byte: usize,

    /// Seconds without a new message before a flush is triggered
    /// Default: 5
    pub batch_timeout_sec: u64,

    /// Stream name -> category mapping; "*" is the wildcard fallback
    /// Default: empty (everything maps to "default")
    pub category: HashMap<String, String>,

    /// Producer-level formatter chain
    pub formatter: Vec<FormatterConfig>,
}

impl Default for ScribeProducerConfig {
    fn default() -> Self {
        Self {
            enable: default_enable(),
            stream: default_streams(),
            host: String::new(),
            port: 1463,
            buffer_size_kb: 1024,
            buffer_size_max_kb: 8192,
            batch_size_byte: 8192,
            batch_timeout_sec: 5,
            category: HashMap::new(),
            formatter: Vec::new(),
        }
    }
}

/// Console output target
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleTarget {
    /// Write to stdout (default)
    #[default]
    Stdout,
    /// Write to stderr
    Stderr,
}

/// Console producer configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsoleProducerConfig {
    /// Whether this instance is enabled
    /// Default: true
    pub enable: bool,

    /// Streams to subscribe to
    /// Default: ["*"]
    pub stream: Vec<String>,

    /// Output target
    /// Default: stdout
    pub target: ConsoleTarget,

    /// Producer-level formatter chain
    pub formatter: Vec<FormatterConfig>,
}

impl Default for ConsoleProducerConfig {
    fn default() -> Self {
        Self {
            enable: default_enable(),
            stream: default_streams(),
            target: ConsoleTarget::Stdout,
            formatter: Vec::new(),
        }
    }
}

/// Null producer configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NullProducerConfig {
    /// Whether this instance is enabled
    /// Default: true
    pub enable: bool,

    /// Streams to subscribe to
    /// Default: ["*"]
    pub stream: Vec<String>,
}

impl Default for NullProducerConfig {
    fn default() -> Self {
        Self {
            enable: default_enable(),
            stream: default_streams(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_defaults_match_classic_surface() {
        let config = FileProducerConfig::default();
        assert_eq!(config.batch_size_max_kb, 8192);
        assert_eq!(config.batch_size_byte, 8192);
        assert_eq!(config.batch_timeout_sec, 5);
        assert!(!config.rotate);
        assert_eq!(config.rotate_timeout_min, 1440);
        assert_eq!(config.rotate_size_mb, 1024);
        assert!(config.rotate_at.is_empty());
        assert!(!config.compress);
    }

    #[test]
    fn test_scribe_defaults() {
        let config = ScribeProducerConfig::default();
        assert_eq!(config.port, 1463);
        assert_eq!(config.buffer_size_kb, 1024);
        assert_eq!(config.buffer_size_max_kb, 8192);
        assert!(config.category.is_empty());
    }

    #[test]
    fn test_rotate_at_parsing() {
        let mut config = FileProducerConfig::default();
        assert_eq!(config.rotate_at_parsed().unwrap(), None);

        config.rotate_at = "00:00".into();
        assert_eq!(config.rotate_at_parsed().unwrap(), Some((0, 0)));

        config.rotate_at = "23:59".into();
        assert_eq!(config.rotate_at_parsed().unwrap(), Some((23, 59)));

        config.rotate_at = "24:00".into();
        assert!(config.rotate_at_parsed().is_err());

        config.rotate_at = "midnight".into();
        assert!(config.rotate_at_parsed().is_err());
    }

    #[test]
    fn test_deserialize_map() {
        let config: ProducersConfig = toml::from_str(
            r#"
[logfile]
type = "file"
file = "/tmp/gollum.log"
rotate = true
compress = true
stream = ["console"]

[scribe]
type = "scribe"
host = "scribe.example.com"
batch_size_byte = 4096

[scribe.category]
"console" = "default"
"*" = "fallback"

[debug]
type = "console"
target = "stderr"

[sink]
type = "null"
enable = false
"#,
        )
        .unwrap();

        assert_eq!(config.len(), 4);
        assert_eq!(config.get("logfile").unwrap().kind(), "producer.file");
        assert_eq!(config.get("logfile").unwrap().streams(), ["console"]);

        if let Some(ProducerConfig::Scribe(s)) = config.get("scribe") {
            assert_eq!(s.host, "scribe.example.com");
            assert_eq!(s.batch_size_byte, 4096);
            assert_eq!(s.category.get("*").unwrap(), "fallback");
        } else {
            panic!("expected scribe config");
        }

        if let Some(ProducerConfig::Console(c)) = config.get("debug") {
            assert_eq!(c.target, ConsoleTarget::Stderr);
        } else {
            panic!("expected console config");
        }

        assert!(!config.get("sink").unwrap().is_enabled());
    }
}
