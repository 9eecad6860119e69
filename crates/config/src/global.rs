//! Global settings

use std::time::Duration;

use serde::Deserialize;

/// Process-wide defaults every plugin falls back to
///
/// # Example
///
/// ```toml
/// [global]
/// channel_capacity = 4096
/// shutdown_timeout = "3s"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Capacity of each producer's inbound message queue
    /// Default: 4096
    pub channel_capacity: usize,

    /// How long a stopping plugin may drain before its remaining
    /// messages count as lost
    /// Default: 3s
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 4096,
            shutdown_timeout: Duration::from_secs(3),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GlobalConfig::default();
        assert_eq!(config.channel_capacity, 4096);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_deserialize() {
        let config: GlobalConfig = toml::from_str(
            r#"
channel_capacity = 128
shutdown_timeout = "500ms"
"#,
        )
        .unwrap();
        assert_eq!(config.channel_capacity, 128);
        assert_eq!(config.shutdown_timeout, Duration::from_millis(500));
    }
}
