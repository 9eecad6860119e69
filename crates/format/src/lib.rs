//! Built-in formatters and filters
//!
//! Implementations of the `gollum-core` formatter/filter seams plus the
//! builder that turns configuration entries into chains. Formatters run
//! on the routing hot path - they rewrite payload bytes (or the stream
//! id) and nothing else.

mod builder;
mod filters;
mod formatters;

pub use builder::{build_filters, build_formatters};
pub use filters::RegExpFilter;
pub use formatters::{Delimiter, Envelope, Forward, StreamRoute, Timestamp};
