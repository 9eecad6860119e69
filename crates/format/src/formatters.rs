//! Formatter implementations

use gollum_core::format::{FormatError, Formatter};
use gollum_core::{Message, StreamId};

/// Identity formatter - passes the payload through unchanged
pub struct Forward;

impl Formatter for Forward {
    fn format(&self, msg: Message) -> Result<Message, FormatError> {
        Ok(msg)
    }

    fn name(&self) -> &'static str {
        "forward"
    }
}

/// Prefixes the payload with the message timestamp
pub struct Timestamp {
    format: String,
}

impl Timestamp {
    /// Create with a strftime format string
    #[must_use]
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
        }
    }
}

impl Formatter for Timestamp {
    fn format(&self, mut msg: Message) -> Result<Message, FormatError> {
        let stamp = format!("{} ", msg.timestamp().format(&self.format));
        let mut payload = Vec::with_capacity(stamp.len() + msg.len());
        payload.extend_from_slice(stamp.as_bytes());
        payload.extend_from_slice(msg.payload());
        msg.set_payload(payload);
        Ok(msg)
    }

    fn name(&self) -> &'static str {
        "timestamp"
    }
}

/// Wraps the payload in a prefix and postfix
pub struct Envelope {
    prefix: Vec<u8>,
    postfix: Vec<u8>,
}

impl Envelope {
    /// Create with the given prefix and postfix text
    #[must_use]
    pub fn new(prefix: impl Into<Vec<u8>>, postfix: impl Into<Vec<u8>>) -> Self {
        Self {
            prefix: prefix.into(),
            postfix: postfix.into(),
        }
    }
}

impl Formatter for Envelope {
    fn format(&self, mut msg: Message) -> Result<Message, FormatError> {
        let mut payload =
            Vec::with_capacity(self.prefix.len() + msg.len() + self.postfix.len());
        payload.extend_from_slice(&self.prefix);
        payload.extend_from_slice(msg.payload());
        payload.extend_from_slice(&self.postfix);
        msg.set_payload(payload);
        Ok(msg)
    }

    fn name(&self) -> &'static str {
        "envelope"
    }
}

/// Appends a delimiter to the payload
///
/// The usual last chain entry for line-oriented sinks.
pub struct Delimiter {
    delimiter: Vec<u8>,
}

impl Delimiter {
    /// Create with the given delimiter text
    #[must_use]
    pub fn new(delimiter: impl Into<Vec<u8>>) -> Self {
        Self {
            delimiter: delimiter.into(),
        }
    }
}

impl Formatter for Delimiter {
    fn format(&self, mut msg: Message) -> Result<Message, FormatError> {
        let mut payload = msg.payload().to_vec();
        payload.extend_from_slice(&self.delimiter);
        msg.set_payload(payload);
        Ok(msg)
    }

    fn name(&self) -> &'static str {
        "delimiter"
    }
}

/// Redirects the message to another stream
///
/// The payload is untouched; only the routing target changes. The origin
/// stream stays visible via `orig_stream_id`.
pub struct StreamRoute {
    target: StreamId,
}

impl StreamRoute {
    /// Create a redirect to the named stream
    #[must_use]
    pub fn new(stream: &str) -> Self {
        Self {
            target: StreamId::from_name(stream),
        }
    }
}

impl Formatter for StreamRoute {
    fn format(&self, mut msg: Message) -> Result<Message, FormatError> {
        msg.set_stream_id(self.target);
        Ok(msg)
    }

    fn name(&self) -> &'static str {
        "stream_route"
    }
}
