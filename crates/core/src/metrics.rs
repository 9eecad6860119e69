//! Pipeline counters
//!
//! Relaxed atomic counters shared between the routing fabric and the
//! coordinator. Eventually consistent, never authoritative - they exist
//! for operators, not for control flow.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one router / the pipeline as a whole
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Messages offered to a router
    enqueued: AtomicU64,

    /// Individual deliveries into producer queues
    routed: AtomicU64,

    /// Messages removed by a filter chain
    filtered: AtomicU64,

    /// Messages lost to queue overflow (any policy)
    dropped: AtomicU64,

    /// Messages rejected because they exceed a batch capacity
    oversized: AtomicU64,

    /// Messages aborted by a failing formatter
    format_errors: AtomicU64,

    /// Messages reported lost at shutdown (unflushed batches)
    lost: AtomicU64,
}

impl PipelineMetrics {
    /// All counters at zero
    #[inline]
    pub const fn new() -> Self {
        Self {
            enqueued: AtomicU64::new(0),
            routed: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            oversized: AtomicU64::new(0),
            format_errors: AtomicU64::new(0),
            lost: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_routed(&self) {
        self.routed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_oversized(&self) {
        self.oversized.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_format_error(&self) {
        self.format_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record `n` messages lost at shutdown
    #[inline]
    pub fn record_lost(&self, n: u64) {
        self.lost.fetch_add(n, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    #[must_use]
    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            routed: self.routed.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            oversized: self.oversized.load(Ordering::Relaxed),
            format_errors: self.format_errors.load(Ordering::Relaxed),
            lost: self.lost.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of [`PipelineMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineSnapshot {
    pub enqueued: u64,
    pub routed: u64,
    pub filtered: u64,
    pub dropped: u64,
    pub oversized: u64,
    pub format_errors: u64,
    pub lost: u64,
}

/// Log interval for aggregated drop reporting
const LOG_INTERVAL_MS: u64 = 1000;

/// Rate-limited drop logging
///
/// Overflow drops happen per message; logging each one would melt the
/// log stream exactly when the pipeline is already struggling. Drops are
/// aggregated and summarized at most once a second.
#[derive(Debug)]
pub struct DropTracker {
    interval_drops: AtomicU64,
    last_log_ms: AtomicU64,
}

impl DropTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            interval_drops: AtomicU64::new(0),
            last_log_ms: AtomicU64::new(now_ms()),
        }
    }

    /// Record one dropped message; emits an aggregated warning at most
    /// once per second. Returns true if a log line was emitted.
    pub fn record(&self, producer: &str) -> bool {
        self.interval_drops.fetch_add(1, Ordering::Relaxed);

        let now = now_ms();
        let last = self.last_log_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) < LOG_INTERVAL_MS {
            return false;
        }

        // Claim the log slot so concurrent droppers emit a single line.
        if self
            .last_log_ms
            .compare_exchange(last, now, Ordering::SeqCst, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }

        let drops = self.interval_drops.swap(0, Ordering::Relaxed);
        if drops == 0 {
            return false;
        }

        tracing::warn!(producer = %producer, dropped = drops,
            "messages dropped in the last second (queue overflow)");
        true
    }

    #[cfg(test)]
    pub fn pending(&self) -> u64 {
        self.interval_drops.load(Ordering::Relaxed)
    }
}

impl Default for DropTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
