//! Formatter and filter chain configuration
//!
//! Both streams and producers may carry a chain; entries are applied in
//! the order they appear.

use serde::Deserialize;

fn default_timestamp_format() -> String {
    "%Y-%m-%d %H:%M:%S %Z".into()
}

fn default_delimiter() -> String {
    "\n".into()
}

/// One formatter in a chain
///
/// # Example
///
/// ```toml
/// formatter = [
///     { type = "timestamp" },
///     { type = "envelope", prefix = "[", postfix = "]\n" },
/// ]
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FormatterConfig {
    /// Pass the payload through unchanged
    Forward,

    /// Prefix the payload with the message timestamp
    Timestamp {
        /// strftime format string
        /// Default: "%Y-%m-%d %H:%M:%S %Z"
        #[serde(default = "default_timestamp_format")]
        format: String,
    },

    /// Wrap the payload in a prefix and postfix
    Envelope {
        /// Text placed before the payload
        #[serde(default)]
        prefix: String,
        /// Text placed after the payload
        #[serde(default)]
        postfix: String,
    },

    /// Append a delimiter to the payload
    Delimiter {
        /// Delimiter text
        /// Default: "\n"
        #[serde(default = "default_delimiter")]
        delimiter: String,
    },

    /// Redirect the message to another stream
    StreamRoute {
        /// Target stream name
        stream: String,
    },
}

/// One filter in a chain
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterConfig {
    /// Keep only messages whose payload matches the expression
    RegExp {
        /// Regular expression applied to the payload
        expression: String,
    },
}
