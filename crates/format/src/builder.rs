//! Chain construction from configuration
//!
//! Turns `FormatterConfig`/`FilterConfig` lists into the core chains.
//! All validation happens here, at configure time - a chain that built
//! successfully cannot fail for config reasons at runtime.

use gollum_config::{FilterConfig, FormatterConfig};
use gollum_core::format::{Filter, Formatter, FilterChain, FormatterChain};
use gollum_core::PluginError;

use crate::filters::RegExpFilter;
use crate::formatters::{Delimiter, Envelope, Forward, StreamRoute, Timestamp};

/// Build a formatter chain for the named plugin
pub fn build_formatters(
    plugin: &str,
    configs: &[FormatterConfig],
) -> Result<FormatterChain, PluginError> {
    let mut formatters: Vec<Box<dyn Formatter>> = Vec::with_capacity(configs.len());
    for config in configs {
        formatters.push(match config {
            FormatterConfig::Forward => Box::new(Forward),
            FormatterConfig::Timestamp { format } => {
                validate_strftime(plugin, format)?;
                Box::new(Timestamp::new(format.clone()))
            }
            FormatterConfig::Envelope { prefix, postfix } => {
                Box::new(Envelope::new(prefix.as_bytes(), postfix.as_bytes()))
            }
            FormatterConfig::Delimiter { delimiter } => {
                Box::new(Delimiter::new(delimiter.as_bytes()))
            }
            FormatterConfig::StreamRoute { stream } => Box::new(StreamRoute::new(stream)),
        });
    }
    Ok(FormatterChain::new(formatters))
}

/// Build a filter chain for the named plugin
pub fn build_filters(
    plugin: &str,
    configs: &[FilterConfig],
) -> Result<FilterChain, PluginError> {
    let mut filters: Vec<Box<dyn Filter>> = Vec::with_capacity(configs.len());
    for config in configs {
        filters.push(match config {
            FilterConfig::RegExp { expression } => Box::new(
                RegExpFilter::new(expression).map_err(|e| {
                    PluginError::invalid_option(plugin, "filter", e.to_string())
                })?,
            ),
        });
    }
    Ok(FilterChain::new(filters))
}

/// Reject strftime strings chrono cannot render
///
/// Probe-renders once at configure time so the hot path can format
/// without a fallible branch.
fn validate_strftime(plugin: &str, format: &str) -> Result<(), PluginError> {
    use std::fmt::Write;

    let probe = chrono::DateTime::<chrono::Utc>::UNIX_EPOCH;
    let mut rendered = String::new();
    if write!(rendered, "{}", probe.format(format)).is_err() {
        return Err(PluginError::invalid_option(
            plugin,
            "formatter",
            format!("'{format}' is not a valid strftime format"),
        ));
    }
    Ok(())
}
