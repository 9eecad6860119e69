//! MessageBatch - double-buffered, size/time-triggered flush engine
//!
//! The batch owns a *front* buffer that the producer task appends to and a
//! *back* buffer that is either idle or being written to the sink by a
//! flush worker. A flush swaps the buffers, handing the filled front to
//! the worker; the swap is the only point where buffer ownership crosses
//! tasks, so the bytes themselves never need a lock.
//!
//! Invariants:
//! - the front buffer never exceeds `max_bytes`
//! - at most one flush is in flight
//! - a rejected append leaves the batch untouched
//! - after a successful flush the flushed buffer is empty
//!
//! A failed sink write may retain the back buffer (the error callback
//! decides); the retained buffer is re-sent by the next flush, before any
//! newer front data, preserving order.

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::message::Message;

#[cfg(test)]
#[path = "batch_test.rs"]
mod batch_test;

struct BackBuffer {
    buf: BytesMut,
    messages: usize,
    // A failed write left data behind; the next flush re-sends it.
    dirty: bool,
}

struct Shared {
    flush_in_flight: AtomicBool,
    back: Mutex<Option<BackBuffer>>,
    flush_done: Notify,
}

/// Double-buffered byte batch with asynchronous flushing
///
/// Owned by a single producer task; only flush completion runs elsewhere.
pub struct MessageBatch {
    front: BytesMut,
    front_messages: usize,
    max_bytes: usize,
    last_append: Instant,
    shared: Arc<Shared>,
    closed: bool,
}

impl MessageBatch {
    /// Create a batch whose buffers each hold at most `max_bytes`
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        let max_bytes = max_bytes.max(1);
        Self {
            front: BytesMut::with_capacity(max_bytes.min(1 << 20)),
            front_messages: 0,
            max_bytes,
            last_append: Instant::now(),
            shared: Arc::new(Shared {
                flush_in_flight: AtomicBool::new(false),
                back: Mutex::new(Some(BackBuffer {
                    buf: BytesMut::new(),
                    messages: 0,
                    dirty: false,
                })),
                flush_done: Notify::new(),
            }),
            closed: false,
        }
    }

    /// Buffer capacity per side
    #[inline]
    #[must_use]
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Bytes currently in the front buffer
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.front.len()
    }

    /// Whether the front buffer is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.front.is_empty()
    }

    /// Messages currently in the front buffer
    #[inline]
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.front_messages
    }

    /// Whether a flush worker currently owns the back buffer
    #[inline]
    #[must_use]
    pub fn flush_in_flight(&self) -> bool {
        self.shared.flush_in_flight.load(Ordering::Acquire)
    }

    /// Messages not yet confirmed written: front plus any retained back
    #[must_use]
    pub fn unflushed_messages(&self) -> usize {
        let retained = self
            .shared
            .back
            .lock()
            .unwrap()
            .as_ref()
            .map(|b| if b.dirty { b.messages } else { 0 })
            .unwrap_or(0);
        self.front_messages + retained
    }

    /// Try to append a message's serialized form to the front buffer
    ///
    /// Returns false without modifying the batch when the message does
    /// not fit - either because it is larger than the buffer capacity or
    /// because the front buffer is full. On a full front the caller
    /// triggers a flush and retries exactly once; a second false is a
    /// drop.
    #[must_use]
    pub fn append(&mut self, msg: &Message) -> bool {
        self.append_bytes(msg.payload())
    }

    /// Append pre-serialized bytes; same contract as [`append`](Self::append)
    #[must_use]
    pub fn append_bytes(&mut self, data: &[u8]) -> bool {
        if self.closed || data.len() > self.max_bytes {
            return false;
        }
        if self.front.len() + data.len() > self.max_bytes {
            return false;
        }
        self.front.extend_from_slice(data);
        self.front_messages += 1;
        self.last_append = Instant::now();
        true
    }

    /// Append, suspending while an in-flight flush blocks the swap
    ///
    /// Waits (up to `deadline`) for the running flush to complete and
    /// retries. Returns false when the message is oversized, the deadline
    /// fires, or the front is full with no flush pending - in the last
    /// case the caller must flush and try again.
    pub async fn append_or_block(&mut self, msg: &Message, deadline: Duration) -> bool {
        let give_up = Instant::now() + deadline;
        loop {
            if self.append(msg) {
                return true;
            }
            if self.closed || msg.len() > self.max_bytes {
                return false;
            }
            if !self.flush_in_flight() {
                return false;
            }
            let remaining = give_up.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            self.wait_for_flush(remaining).await;
        }
    }

    /// True iff the front buffer holds at least `threshold` bytes
    #[inline]
    #[must_use]
    pub fn reached_size_threshold(&self, threshold: usize) -> bool {
        self.front.len() >= threshold
    }

    /// True iff the front buffer is non-empty and no append happened for
    /// at least `threshold`
    #[inline]
    #[must_use]
    pub fn reached_time_threshold(&self, threshold: Duration) -> bool {
        self.front_messages > 0 && self.last_append.elapsed() >= threshold
    }

    /// Swap buffers and write the filled one to the sink on a worker task
    ///
    /// No-op when a flush is already in flight or there is nothing to
    /// write. `write` receives the buffer contents; when it resolves,
    /// `on_success` runs, or `on_error` decides whether the data is
    /// retained for retry (`true`) or discarded (`false`). Either way the
    /// buffer is released and the next flush may proceed.
    ///
    /// A buffer retained by a failed flush is re-sent by the next flush
    /// call, before any newer front data.
    pub fn flush<W, Fut, S, E>(&mut self, write: W, on_success: Option<S>, on_error: E)
    where
        W: FnOnce(Bytes) -> Fut + Send + 'static,
        Fut: Future<Output = io::Result<usize>> + Send + 'static,
        S: FnOnce() + Send + 'static,
        E: FnOnce(io::Error) -> bool + Send + 'static,
    {
        if self.closed {
            return;
        }
        if self
            .shared
            .flush_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        // The flag is ours, so the back buffer must be in its slot.
        let taken = self.shared.back.lock().unwrap().take();
        let Some(mut back) = taken else {
            self.release_idle();
            return;
        };

        if !back.dirty {
            if self.front_messages == 0 {
                self.shared.back.lock().unwrap().replace(back);
                self.release_idle();
                return;
            }
            // The handoff: the filled front becomes the flushing buffer,
            // the idle back becomes the fresh front.
            std::mem::swap(&mut self.front, &mut back.buf);
            back.messages = self.front_messages;
            self.front_messages = 0;
        }

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let messages = back.messages;
            let data = back.buf.split().freeze();

            // Bind before matching so the write future (and any payload
            // clone it captured) is dropped first; that keeps the
            // refcount at one and the buffer recovery copy-free.
            let result = write(data.clone()).await;
            match result {
                Ok(_written) => {
                    if let Some(cb) = on_success {
                        cb();
                    }
                    // Reclaim the allocation for the next swap when the
                    // sink did not hold on to the bytes.
                    let mut recovered = data.try_into_mut().unwrap_or_default();
                    recovered.clear();
                    back.buf = recovered;
                    back.messages = 0;
                    back.dirty = false;
                }
                Err(err) => {
                    if on_error(err) {
                        back.buf = data
                            .try_into_mut()
                            .unwrap_or_else(|bytes| BytesMut::from(bytes.as_ref()));
                        back.messages = messages;
                        back.dirty = true;
                    } else {
                        back.buf = BytesMut::new();
                        back.messages = 0;
                        back.dirty = false;
                    }
                }
            }

            shared.back.lock().unwrap().replace(back);
            shared.flush_in_flight.store(false, Ordering::Release);
            shared.flush_done.notify_waiters();
        });
    }

    /// Suspend until no flush is in flight or the timeout elapses
    ///
    /// Returns true when the batch is idle.
    pub async fn wait_for_flush(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                if !self.shared.flush_in_flight.load(Ordering::Acquire) {
                    return;
                }
                let notified = self.shared.flush_done.notified();
                if !self.shared.flush_in_flight.load(Ordering::Acquire) {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }

    /// Wait for any in-flight flush, then reject all further appends
    ///
    /// Returns true when the last flush completed within the timeout.
    pub async fn close(&mut self, timeout: Duration) -> bool {
        let idle = self.wait_for_flush(timeout).await;
        self.closed = true;
        idle
    }

    /// Whether the batch has been closed
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn release_idle(&self) {
        self.shared.flush_in_flight.store(false, Ordering::Release);
        self.shared.flush_done.notify_waiters();
    }
}

impl std::fmt::Debug for MessageBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBatch")
            .field("front_bytes", &self.front.len())
            .field("front_messages", &self.front_messages)
            .field("max_bytes", &self.max_bytes)
            .field("flush_in_flight", &self.flush_in_flight())
            .field("closed", &self.closed)
            .finish()
    }
}
