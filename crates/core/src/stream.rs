//! Stream identifiers
//!
//! A stream is a named logical channel. Names are interned to a 64-bit
//! xxh3 hash once at the edge; everything downstream routes on the id.

use std::fmt;
use std::sync::LazyLock;

use xxhash_rust::xxh3::xxh3_64;

/// Name of the wildcard stream matching any stream in mapping lookups
pub const WILDCARD_STREAM: &str = "*";

/// Name of the in-process log stream
pub const LOG_INTERNAL_STREAM: &str = "_GOLLUM_";

static WILDCARD_STREAM_ID: LazyLock<StreamId> =
    LazyLock::new(|| StreamId::from_name(WILDCARD_STREAM));
static LOG_INTERNAL_STREAM_ID: LazyLock<StreamId> =
    LazyLock::new(|| StreamId::from_name(LOG_INTERNAL_STREAM));

/// Stream identifier - the 64-bit hash of a stream name
///
/// `Copy` and register-sized so routing never touches the name string.
/// The same name always yields the same id within (and across) processes;
/// the [`StreamRegistry`](crate::StreamRegistry) fail-louds if two distinct
/// names ever collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

impl StreamId {
    /// The reserved invalid id; never produced by hashing a name
    pub const INVALID: StreamId = StreamId(0);

    /// Hash a stream name into its id
    #[inline]
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        Self(xxh3_64(name.as_bytes()))
    }

    /// The wildcard stream id, matching any stream in mapping lookups
    #[inline]
    #[must_use]
    pub fn wildcard() -> Self {
        *WILDCARD_STREAM_ID
    }

    /// The internal log stream id
    #[inline]
    #[must_use]
    pub fn log_internal() -> Self {
        *LOG_INTERNAL_STREAM_ID
    }

    /// Raw hash value
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Whether this is the wildcard id
    #[inline]
    #[must_use]
    pub fn is_wildcard(self) -> bool {
        self == Self::wildcard()
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream:{:016x}", self.0)
    }
}

impl From<&str> for StreamId {
    #[inline]
    fn from(name: &str) -> Self {
        Self::from_name(name)
    }
}
