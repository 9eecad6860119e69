//! Gollum consumers - the source side of the pipeline
//!
//! Consumers turn external input into messages and hand them to the
//! routing fabric. Wire protocols are deliberately out of scope here;
//! both built-ins are line-oriented:
//!
//! - [`ConsoleConsumer`] - reads stdin
//! - [`SocketConsumer`] - accepts newline-delimited TCP payloads

mod console;
mod socket;

use std::sync::Arc;

use bytes::Bytes;
use gollum_core::{Message, StreamId, StreamRegistry};

pub use console::ConsoleConsumer;
pub use socket::SocketConsumer;

/// Post one payload to every configured stream
///
/// Streams share the payload bytes via refcount; each router still gets
/// its own message with its own sequence number.
pub(crate) async fn post_line(
    registry: &Arc<StreamRegistry>,
    streams: &[StreamId],
    payload: Vec<u8>,
) {
    let payload = Bytes::from(payload);
    for &id in streams {
        let msg = Message::new(payload.clone(), id);
        registry.get_router(id).enqueue(msg).await;
    }
}
