//! Per-stream router configuration

use std::time::Duration;

use serde::Deserialize;

use crate::chain::{FilterConfig, FormatterConfig};

/// Overflow behavior of a stream's router
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Wait with backoff up to `block_deadline`, then drop
    Block,
    /// Evict the oldest queued message
    DropOldest,
    /// Discard the arriving message (default)
    #[default]
    DropNewest,
}

/// Router configuration for one stream
///
/// Streams without a table still work - they get a default router with
/// drop-newest overflow and empty chains.
///
/// # Example
///
/// ```toml
/// [streams.console]
/// policy = "block"
/// block_deadline = "250ms"
/// formatter = [{ type = "timestamp" }]
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Overflow behavior
    /// Default: drop-newest
    pub policy: OverflowPolicy,

    /// Longest wait per subscriber when `policy = "block"`
    /// Default: 100ms
    #[serde(with = "humantime_serde")]
    pub block_deadline: Duration,

    /// Formatter chain applied before fan-out
    pub formatter: Vec<FormatterConfig>,

    /// Filter chain applied before formatting
    pub filter: Vec<FilterConfig>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            policy: OverflowPolicy::DropNewest,
            block_deadline: Duration::from_millis(100),
            formatter: Vec::new(),
            filter: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StreamConfig::default();
        assert_eq!(config.policy, OverflowPolicy::DropNewest);
        assert_eq!(config.block_deadline, Duration::from_millis(100));
        assert!(config.formatter.is_empty());
    }

    #[test]
    fn test_deserialize_policies() {
        for (s, expected) in [
            ("block", OverflowPolicy::Block),
            ("drop-oldest", OverflowPolicy::DropOldest),
            ("drop-newest", OverflowPolicy::DropNewest),
        ] {
            let toml = format!("policy = \"{s}\"");
            let config: StreamConfig = toml::from_str(&toml).unwrap();
            assert_eq!(config.policy, expected);
        }
    }

    #[test]
    fn test_full_stream_table() {
        let config: StreamConfig = toml::from_str(
            r#"
policy = "block"
block_deadline = "250ms"
formatter = [{ type = "forward" }]
filter = [{ type = "reg_exp", expression = "x" }]
"#,
        )
        .unwrap();
        assert_eq!(config.policy, OverflowPolicy::Block);
        assert_eq!(config.block_deadline, Duration::from_millis(250));
        assert_eq!(config.formatter.len(), 1);
        assert_eq!(config.filter.len(), 1);
    }
}
