//! Gollum producers - the sink side of the pipeline
//!
//! Every producer embeds the core `ProducerBase` and runs the same
//! tickered event loop; what differs is the sink:
//!
//! - [`FileProducer`] - batched file writes with rotation and background
//!   gzip compression
//! - [`ScribeProducer`] - framed batch sends to a scribe-style endpoint
//!   with reconnect and retained-batch retry
//! - [`ConsoleProducer`] - formatted messages to stdout/stderr
//! - [`NullProducer`] - discards everything; keeps benchmarks honest

mod console;
mod file;
mod null;
mod scribe;

pub use console::ConsoleProducer;
pub use file::FileProducer;
pub use null::NullProducer;
pub use scribe::ScribeProducer;
