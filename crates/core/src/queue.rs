//! Bounded inbound message queue
//!
//! Every producer owns one of these; routers push into it, the producer
//! task pops from it. A plain channel cannot express the drop-oldest
//! overflow policy (the sender side must be able to evict the head), so
//! the queue is a mutex-guarded deque with a `Notify` for the single
//! consumer. Push paths never block.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::message::Message;

/// Bounded FIFO queue of messages with head eviction
///
/// Concurrent pushers (router fan-out), a single popping consumer
/// (the owning producer task). FIFO order is preserved per pusher.
pub struct MessageQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
}

struct Inner {
    items: VecDeque<Message>,
    closed: bool,
}

impl MessageQueue {
    /// Create a queue holding at most `capacity` messages
    #[must_use]
    pub fn bounded(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity.min(1024)),
                closed: false,
            }),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    /// Try to append a message without blocking
    ///
    /// Returns the message back on overflow or when the queue is closed.
    pub fn try_push(&self, msg: Message) -> Result<(), Message> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed || inner.items.len() >= self.capacity {
            return Err(msg);
        }
        inner.items.push_back(msg);
        drop(inner);
        self.notify.notify_one();
        Ok(())
    }

    /// Append a message, evicting the head on overflow
    ///
    /// Returns the evicted message, if any. Returns the pushed message
    /// itself when the queue is closed.
    pub fn push_evict(&self, msg: Message) -> Result<Option<Message>, Message> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(msg);
        }
        let evicted = if inner.items.len() >= self.capacity {
            inner.items.pop_front()
        } else {
            None
        };
        inner.items.push_back(msg);
        drop(inner);
        self.notify.notify_one();
        Ok(evicted)
    }

    /// Pop the next message, suspending until one is available
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<Message> {
        loop {
            // Arm the notification before checking, otherwise a push
            // between check and await is lost.
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(msg) = inner.items.pop_front() {
                    return Some(msg);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Pop the next message without blocking
    pub fn try_pop(&self) -> Option<Message> {
        self.inner.lock().unwrap().items.pop_front()
    }

    /// Number of queued messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    /// Whether the queue is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of messages the queue holds
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Close the queue; pending messages can still be popped
    pub fn close(&self) {
        self.inner.lock().unwrap().closed = true;
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    /// Whether the queue has been closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }
}

impl std::fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamId;

    fn msg(text: &str) -> Message {
        Message::new(text.as_bytes().to_vec(), StreamId::from_name("test"))
    }

    #[test]
    fn test_push_pop_fifo() {
        let q = MessageQueue::bounded(4);
        q.try_push(msg("a")).unwrap();
        q.try_push(msg("b")).unwrap();

        assert_eq!(q.try_pop().unwrap().payload().as_ref(), b"a");
        assert_eq!(q.try_pop().unwrap().payload().as_ref(), b"b");
        assert!(q.try_pop().is_none());
    }

    #[test]
    fn test_try_push_overflow_returns_message() {
        let q = MessageQueue::bounded(1);
        q.try_push(msg("a")).unwrap();

        let back = q.try_push(msg("b")).unwrap_err();
        assert_eq!(back.payload().as_ref(), b"b");
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_push_evict_drops_head() {
        let q = MessageQueue::bounded(2);
        q.try_push(msg("a")).unwrap();
        q.try_push(msg("b")).unwrap();

        let evicted = q.push_evict(msg("c")).unwrap().unwrap();
        assert_eq!(evicted.payload().as_ref(), b"a");
        assert_eq!(q.try_pop().unwrap().payload().as_ref(), b"b");
        assert_eq!(q.try_pop().unwrap().payload().as_ref(), b"c");
    }

    #[test]
    fn test_closed_rejects_push() {
        let q = MessageQueue::bounded(2);
        q.close();
        assert!(q.try_push(msg("a")).is_err());
        assert!(q.push_evict(msg("b")).is_err());
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let q = std::sync::Arc::new(MessageQueue::bounded(2));
        let q2 = std::sync::Arc::clone(&q);

        let popper = tokio::spawn(async move { q2.pop().await });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        q.try_push(msg("late")).unwrap();

        let got = popper.await.unwrap().unwrap();
        assert_eq!(got.payload().as_ref(), b"late");
    }

    #[tokio::test]
    async fn test_pop_returns_none_after_close_and_drain() {
        let q = MessageQueue::bounded(2);
        q.try_push(msg("last")).unwrap();
        q.close();

        assert!(q.pop().await.is_some());
        assert!(q.pop().await.is_none());
    }
}
