//! Formatter and filter traits
//!
//! Formatters rewrite a message (payload and possibly stream id) before
//! fan-out or before a producer serializes it into a batch; filters decide
//! whether a message passes at all. Both run synchronously on the hot path
//! and must never block.
//!
//! Concrete implementations live in `gollum-format`; this module only
//! defines the seams plus the fail-fast chains the router and producers
//! hold.

use thiserror::Error;

use crate::message::Message;

/// Error raised by a formatter
///
/// A failing formatter aborts the message: it is counted and dropped,
/// never propagated upstream.
#[derive(Debug, Error)]
#[error("formatter '{formatter}' failed: {message}")]
pub struct FormatError {
    /// Name of the failing formatter
    pub formatter: &'static str,
    /// What went wrong
    pub message: String,
}

impl FormatError {
    /// Create a new format error
    pub fn new(formatter: &'static str, message: impl Into<String>) -> Self {
        Self {
            formatter,
            message: message.into(),
        }
    }
}

/// Rewrites a message in-flight
pub trait Formatter: Send + Sync {
    /// Format the message, returning the (possibly new) message
    fn format(&self, msg: Message) -> Result<Message, FormatError>;

    /// Name for logging and diagnostics
    fn name(&self) -> &'static str;
}

/// Decides whether a message passes
pub trait Filter: Send + Sync {
    /// Whether the message is kept
    fn accepts(&self, msg: &Message) -> bool;

    /// Name for logging and diagnostics
    fn name(&self) -> &'static str;
}

/// Ordered formatter chain, applied first to last, fail-fast
#[derive(Default)]
pub struct FormatterChain {
    formatters: Vec<Box<dyn Formatter>>,
}

impl FormatterChain {
    /// Create a chain from an ordered list of formatters
    #[must_use]
    pub fn new(formatters: Vec<Box<dyn Formatter>>) -> Self {
        Self { formatters }
    }

    /// An empty, zero-cost chain
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether any formatters are configured
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.formatters.is_empty()
    }

    /// Names of all formatters in order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.formatters.iter().map(|f| f.name()).collect()
    }

    /// Run the message through every formatter in order
    ///
    /// The first error stops the chain; the caller counts and drops.
    pub fn format(&self, msg: Message) -> Result<Message, FormatError> {
        let mut current = msg;
        for formatter in &self.formatters {
            current = formatter.format(current)?;
        }
        Ok(current)
    }
}

impl std::fmt::Debug for FormatterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatterChain")
            .field("formatters", &self.names())
            .finish()
    }
}

/// Filter chain; a message passes only if every filter accepts it
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterChain {
    /// Create a chain from a list of filters
    #[must_use]
    pub fn new(filters: Vec<Box<dyn Filter>>) -> Self {
        Self { filters }
    }

    /// An empty chain accepting everything
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether any filters are configured
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Whether the message passes all filters
    #[must_use]
    pub fn accepts(&self, msg: &Message) -> bool {
        self.filters.iter().all(|f| f.accepts(msg))
    }

    /// Names of all filters in order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain")
            .field("filters", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamId;

    struct Suffix(&'static str);

    impl Formatter for Suffix {
        fn format(&self, mut msg: Message) -> Result<Message, FormatError> {
            let mut payload = msg.payload().to_vec();
            payload.extend_from_slice(self.0.as_bytes());
            msg.set_payload(payload);
            Ok(msg)
        }

        fn name(&self) -> &'static str {
            "suffix"
        }
    }

    struct Failing;

    impl Formatter for Failing {
        fn format(&self, _msg: Message) -> Result<Message, FormatError> {
            Err(FormatError::new("failing", "always fails"))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    struct MinLen(usize);

    impl Filter for MinLen {
        fn accepts(&self, msg: &Message) -> bool {
            msg.len() >= self.0
        }

        fn name(&self) -> &'static str {
            "min_len"
        }
    }

    #[test]
    fn test_chain_applies_in_order() {
        let chain = FormatterChain::new(vec![Box::new(Suffix("-a")), Box::new(Suffix("-b"))]);
        let msg = Message::new("x", StreamId::from_name("s"));

        let out = chain.format(msg).unwrap();
        assert_eq!(out.payload().as_ref(), b"x-a-b");
    }

    #[test]
    fn test_chain_fails_fast() {
        let chain = FormatterChain::new(vec![Box::new(Failing), Box::new(Suffix("-a"))]);
        let msg = Message::new("x", StreamId::from_name("s"));

        let err = chain.format(msg).unwrap_err();
        assert_eq!(err.formatter, "failing");
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let chain = FormatterChain::empty();
        let msg = Message::new("x", StreamId::from_name("s"));
        let out = chain.format(msg).unwrap();
        assert_eq!(out.payload().as_ref(), b"x");
    }

    #[test]
    fn test_filter_chain_all_must_accept() {
        let chain = FilterChain::new(vec![Box::new(MinLen(2)), Box::new(MinLen(4))]);

        assert!(chain.accepts(&Message::new("long enough", StreamId::from_name("s"))));
        assert!(!chain.accepts(&Message::new("abc", StreamId::from_name("s"))));
    }

    #[test]
    fn test_empty_filter_chain_accepts_all() {
        let chain = FilterChain::empty();
        assert!(chain.accepts(&Message::new("", StreamId::from_name("s"))));
    }
}
