//! Verdict dispatch to registered handlers.
//!
//! Transitions raise categories; the dispatcher delivers one
//! [`CategoryMatch`] per raised category per advanced combination to every
//! handler registered for that category, then to every catch-all handler.
//! Handlers run inline on the observing thread, each invocation isolated
//! with `catch_unwind`: a panicking handler is logged and counted, and
//! processing continues.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::combination::Combination;
use crate::event::SourceLocation;
use crate::stats::SpecStats;

/// One reported verdict: a category matched by one combination's slice.
#[derive(Debug, Clone)]
pub struct CategoryMatch {
    /// Name of the property that matched.
    pub property: String,
    /// The matched category; the implicit failure verdict reports as
    /// `fail`.
    pub category: String,
    /// The combination whose slice matched.
    pub combination: Combination,
    /// Observation time of the event that completed the match.
    pub observed_at: DateTime<Utc>,
    /// Source location of that event, when instrumentation supplied one.
    pub location: Option<SourceLocation>,
}

/// A callback receiving matched categories.
///
/// Handlers are invoked synchronously under the session lock; long-running
/// work belongs behind a [`VerdictStream`], not in a handler body.
pub trait CategoryHandler: Send {
    /// Called once per matched category per advanced combination.
    fn on_category_match(&self, matched: &CategoryMatch);
}

impl<F> CategoryHandler for F
where
    F: Fn(&CategoryMatch) + Send,
{
    fn on_category_match(&self, matched: &CategoryMatch) {
        self(matched);
    }
}

/// Per-session handler registry.
#[derive(Default)]
pub(crate) struct Dispatcher {
    by_category: HashMap<String, Vec<Box<dyn CategoryHandler>>>,
    catch_all: Vec<Box<dyn CategoryHandler>>,
}

impl Dispatcher {
    /// Registers a handler for one category name.
    pub fn register(&mut self, category: impl Into<String>, handler: Box<dyn CategoryHandler>) {
        self.by_category
            .entry(category.into())
            .or_default()
            .push(handler);
    }

    /// Registers a handler receiving every category.
    pub fn register_all(&mut self, handler: Box<dyn CategoryHandler>) {
        self.catch_all.push(handler);
    }

    /// Whether any handler is registered at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_category.is_empty() && self.catch_all.is_empty()
    }

    /// Delivers one match to every interested handler, isolating each
    /// invocation.
    pub fn dispatch(&self, matched: &CategoryMatch, stats: &SpecStats) {
        let interested = self
            .by_category
            .get(&matched.category)
            .into_iter()
            .flatten()
            .chain(&self.catch_all);
        for handler in interested {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler.on_category_match(matched)));
            if outcome.is_err() {
                stats.record_handler_failure();
                tracing::warn!(
                    property = %matched.property,
                    category = %matched.category,
                    "category handler panicked; isolating and continuing"
                );
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("categories", &self.by_category.len())
            .field("catch_all", &self.catch_all.len())
            .finish()
    }
}

/// A bounded, non-blocking subscription to matched categories.
///
/// The sending side is a [`CategoryHandler`] that never blocks the
/// monitored thread: verdicts beyond the buffer capacity are dropped and
/// counted, on the stream and in the session stats both.
#[derive(Debug)]
pub struct VerdictStream {
    rx: Receiver<CategoryMatch>,
    dropped: Arc<AtomicU64>,
}

impl VerdictStream {
    /// Blocks for the next verdict. `None` once the session is gone.
    #[must_use]
    pub fn recv(&self) -> Option<CategoryMatch> {
        self.rx.recv().ok()
    }

    /// The next verdict if one is buffered.
    #[must_use]
    pub fn try_recv(&self) -> Option<CategoryMatch> {
        self.rx.try_recv().ok()
    }

    /// Waits up to `timeout` for a verdict. `None` on timeout or once the
    /// session is gone.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<CategoryMatch> {
        match self.rx.recv_timeout(timeout) {
            Ok(matched) => Some(matched),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Verdicts this subscriber could not accept.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

struct StreamSender {
    tx: Sender<CategoryMatch>,
    dropped: Arc<AtomicU64>,
    stats: Arc<SpecStats>,
}

impl CategoryHandler for StreamSender {
    fn on_category_match(&self, matched: &CategoryMatch) {
        match self.tx.try_send(matched.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                self.stats.record_verdict_dropped();
            }
        }
    }
}

/// Builds the sending handler and subscriber handle of one verdict stream.
pub(crate) fn verdict_channel(
    capacity: usize,
    stats: Arc<SpecStats>,
) -> (Box<dyn CategoryHandler>, VerdictStream) {
    let (tx, rx) = bounded(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    let sender = StreamSender {
        tx,
        dropped: Arc::clone(&dropped),
        stats,
    };
    (Box::new(sender), VerdictStream { rx, dropped })
}
