//! Progress propagation to job consumers.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::ProgressError;

pub const PROGRESS_TOTAL: u8 = 100;

/// Reported when game retrieval begins.
pub const FETCHING_PERCENT: u8 = 5;

const FETCHED_PERCENT: u8 = 10;
const ANALYZING_CEILING: u8 = 99;

/// Receives `(percent, total, status)` updates. Fire-and-forget.
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: u8, total: u8, status: &str) -> Result<(), ProgressError>;
}

impl<F> ProgressSink for F
where
    F: Fn(u8, u8, &str) -> Result<(), ProgressError> + Send + Sync,
{
    fn report(&self, percent: u8, total: u8, status: &str) -> Result<(), ProgressError> {
        self(percent, total, status)
    }
}

/// Tracks run progress and forwards it to an optional sink.
///
/// Reported percentages never decrease. Sink errors and panics are logged and
/// dropped.
#[derive(Default)]
pub struct ProgressReporter {
    sink: Option<Arc<dyn ProgressSink>>,
    last: Mutex<Option<u8>>,
    total_positions: AtomicUsize,
    analyzed_positions: AtomicUsize,
}

impl ProgressReporter {
    pub fn new(sink: Option<Arc<dyn ProgressSink>>) -> Self {
        Self {
            sink,
            ..Self::default()
        }
    }

    /// Forward `percent` unless it would move progress backwards.
    pub fn report(&self, percent: u8, status: &str) {
        let percent = percent.min(PROGRESS_TOTAL);
        // Held across the sink call so updates reach it in order.
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if last.is_some_and(|prev| percent < prev) {
            tracing::trace!(percent, "Ignoring out-of-order progress update");
            return;
        }
        *last = Some(percent);

        tracing::debug!(percent, status, "Progress");
        let Some(sink) = &self.sink else {
            return;
        };
        match catch_unwind(AssertUnwindSafe(|| sink.report(percent, PROGRESS_TOTAL, status))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(percent, "Progress sink error: {}", e),
            Err(_) => tracing::warn!(percent, "Progress sink panicked"),
        }
    }

    /// Announce the fetched games and the number of positions to analyze.
    pub fn games_found(&self, games: usize, total_positions: usize) {
        self.total_positions.store(total_positions, Ordering::SeqCst);
        self.analyzed_positions.store(0, Ordering::SeqCst);
        self.report(
            FETCHED_PERCENT,
            &format!("Found {} games to analyze", games),
        );
    }

    /// Record `count` more completed positions.
    pub fn advance(&self, count: usize) {
        if count == 0 {
            return;
        }
        let analyzed = self.analyzed_positions.fetch_add(count, Ordering::SeqCst) + count;
        let total = self.total_positions.load(Ordering::SeqCst).max(1);
        self.report(
            analyzing_percent(analyzed, total),
            &format!("Analyzed {}/{} positions", analyzed.min(total), total),
        );
    }

    pub fn finish(&self, status: &str) {
        self.report(PROGRESS_TOTAL, status);
    }

    pub fn last_reported(&self) -> Option<u8> {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `min(10 + floor(90 * analyzed / total), 99)`
fn analyzing_percent(analyzed: usize, total: usize) -> u8 {
    let span = usize::from(PROGRESS_TOTAL - FETCHED_PERCENT);
    let percent = usize::from(FETCHED_PERCENT) + span * analyzed / total.max(1);
    percent.min(usize::from(ANALYZING_CEILING)) as u8
}
