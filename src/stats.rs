//! Per-property monitoring counters.
//!
//! One [`SpecStats`] lives inside each property session and is bumped
//! fire-and-forget from the hot path. Counters are relaxed atomics; nothing
//! reads them transactionally. [`StatsSnapshot`] is the serializable view
//! handed to callers.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Live counters for one property session.
#[derive(Debug, Default)]
pub struct SpecStats {
    events_processed: AtomicU64,
    monitors_created: AtomicU64,
    monitors_collected: AtomicU64,
    categories_matched: AtomicU64,
    handler_failures: AtomicU64,
    verdicts_dropped: AtomicU64,
}

impl SpecStats {
    pub(crate) fn record_event(&self) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_monitor_created(&self) {
        self.monitors_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_monitor_collected(&self) {
        self.monitors_collected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_category_matched(&self) {
        self.categories_matched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_handler_failure(&self) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_verdict_dropped(&self) {
        self.verdicts_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Events accepted by `advance`.
    #[must_use]
    pub fn events_processed(&self) -> u64 {
        self.events_processed.load(Ordering::Relaxed)
    }

    /// Monitors brought into existence, fresh and cloned alike.
    #[must_use]
    pub fn monitors_created(&self) -> u64 {
        self.monitors_created.load(Ordering::Relaxed)
    }

    /// Monitors removed by the garbage collector.
    #[must_use]
    pub fn monitors_collected(&self) -> u64 {
        self.monitors_collected.load(Ordering::Relaxed)
    }

    /// Category verdicts raised by transitions, including `fail`.
    #[must_use]
    pub fn categories_matched(&self) -> u64 {
        self.categories_matched.load(Ordering::Relaxed)
    }

    /// Handler invocations that panicked and were isolated.
    #[must_use]
    pub fn handler_failures(&self) -> u64 {
        self.handler_failures.load(Ordering::Relaxed)
    }

    /// Verdicts a full stream subscriber could not accept.
    #[must_use]
    pub fn verdicts_dropped(&self) -> u64 {
        self.verdicts_dropped.load(Ordering::Relaxed)
    }

    /// Captures the counters into a serializable snapshot.
    #[must_use]
    pub fn snapshot(&self, property: impl Into<String>) -> StatsSnapshot {
        StatsSnapshot {
            property: property.into(),
            events_processed: self.events_processed(),
            monitors_created: self.monitors_created(),
            monitors_collected: self.monitors_collected(),
            categories_matched: self.categories_matched(),
            handler_failures: self.handler_failures(),
            verdicts_dropped: self.verdicts_dropped(),
            captured_at: Utc::now(),
        }
    }
}

/// Point-in-time view of one property's counters. Intentionally
/// serializable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Property name the counters belong to.
    pub property: String,
    /// Events accepted by `advance`.
    pub events_processed: u64,
    /// Monitors brought into existence, fresh and cloned alike.
    pub monitors_created: u64,
    /// Monitors removed by the garbage collector.
    pub monitors_collected: u64,
    /// Category verdicts raised by transitions.
    pub categories_matched: u64,
    /// Handler invocations that panicked and were isolated.
    pub handler_failures: u64,
    /// Verdicts dropped by full stream subscribers.
    pub verdicts_dropped: u64,
    /// Wall-clock capture time.
    pub captured_at: DateTime<Utc>,
}
