//! Message - the record carried end-to-end through the pipeline
//!
//! A message is created once by a consumer, routed by stream id, and moved
//! (never shared mutably) from queue to queue. The payload is a refcounted
//! `Bytes` so fan-out to multiple producers stays cheap.

use std::collections::HashMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::stream::StreamId;

/// Process-wide message sequence counter; wraps at 2^64
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// String -> bytes metadata attached to a message
///
/// Keys are unique, last write wins. Both set and get are O(1).
#[derive(Debug, Clone, Default)]
pub struct Metadata(HashMap<String, Bytes>);

impl Metadata {
    /// Create an empty metadata map
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing any previous value for the key
    #[inline]
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Bytes>) {
        self.0.insert(key.into(), value.into());
    }

    /// Get a value by key
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Bytes> {
        self.0.get(key)
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over all entries
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Bytes)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A single message flowing through the pipeline
///
/// Owned exclusively by whichever queue currently holds it. After
/// [`Router::enqueue`](crate::Router::enqueue) only the stream id may be
/// rewritten, and only by a redirecting router or formatter.
#[derive(Debug, Clone)]
pub struct Message {
    payload: Bytes,
    stream_id: StreamId,
    orig_stream_id: StreamId,
    sequence: u64,
    timestamp: DateTime<Utc>,
    metadata: Metadata,
}

impl Message {
    /// Create a new message bound for the given stream
    ///
    /// Assigns the next process-unique sequence number. Construction is
    /// infallible.
    #[must_use]
    pub fn new(payload: impl Into<Bytes>, stream_id: StreamId) -> Self {
        Self {
            payload: payload.into(),
            stream_id,
            orig_stream_id: stream_id,
            sequence: SEQUENCE.fetch_add(1, Ordering::Relaxed),
            timestamp: Utc::now(),
            metadata: Metadata::new(),
        }
    }

    /// Current routing target
    #[inline]
    #[must_use]
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// The stream this message was originally posted to
    #[inline]
    #[must_use]
    pub fn orig_stream_id(&self) -> StreamId {
        self.orig_stream_id
    }

    /// Redirect the message to another stream, preserving the origin
    #[inline]
    pub fn set_stream_id(&mut self, stream_id: StreamId) {
        self.stream_id = stream_id;
    }

    /// Payload bytes
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Replace the payload (formatter chain rewrites)
    #[inline]
    pub fn set_payload(&mut self, payload: impl Into<Bytes>) {
        self.payload = payload.into();
    }

    /// Payload length in bytes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Process-unique sequence number assigned at creation
    #[inline]
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Wall-clock creation time
    #[inline]
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Metadata map
    #[inline]
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Mutable metadata map
    #[inline]
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Serialized form written to sinks - the (formatted) payload bytes
    #[inline]
    #[must_use]
    pub fn serialize(&self) -> Bytes {
        self.payload.clone()
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.payload))
    }
}
