//! Fingerprint-keyed cache of position analyses.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;

use crate::types::MoveAnalysis;

/// The engine's verdict for one fingerprint, shared by every occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionCacheEntry {
    pub played_move_eval: f64,
    pub best_moves: Vec<MoveAnalysis>,
}

impl PositionCacheEntry {
    /// Result recorded when the engine could not analyze the position.
    pub fn degraded() -> Self {
        Self {
            played_move_eval: 0.0,
            best_moves: Vec::new(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.best_moves.is_empty()
    }
}

/// Write-once cache keyed by FEN.
///
/// A slot is claimed under a mutex, then filled through a single
/// initialization cell, so concurrent callers for the same fingerprint wait
/// on one analysis instead of starting their own.
#[derive(Debug, Default)]
pub struct PositionCache {
    slots: Mutex<HashMap<String, Arc<OnceCell<PositionCacheEntry>>>>,
}

impl PositionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Completed entry for `fen`, if any.
    pub fn get(&self, fen: &str) -> Option<PositionCacheEntry> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(fen).and_then(|cell| cell.get().cloned())
    }

    /// Return the entry for `fen`, running `analyze` only if no other caller
    /// has produced (or is producing) it.
    ///
    /// An `Err` from `analyze` leaves the slot empty and is handed back to
    /// this caller; the next waiter on the slot runs its own `analyze`.
    pub async fn get_or_try_analyze<F, Fut>(
        &self,
        fen: &str,
        analyze: F,
    ) -> Result<PositionCacheEntry, PositionCacheEntry>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PositionCacheEntry, PositionCacheEntry>>,
    {
        let cell = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(fen.to_string()).or_default())
        };
        cell.get_or_try_init(analyze).await.cloned()
    }

    /// Number of completed entries.
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.values().filter(|cell| cell.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One run's view of a [`PositionCache`].
///
/// Completed analyses are written to the backing cache, which may outlive
/// the run. Degraded results stay in this view, so waiters in the same run
/// reuse them while a later run analyzes the position again.
#[derive(Debug)]
pub struct RunCache<'a> {
    positions: &'a PositionCache,
    degraded: Mutex<HashMap<String, PositionCacheEntry>>,
}

impl<'a> RunCache<'a> {
    pub fn new(positions: &'a PositionCache) -> Self {
        Self {
            positions,
            degraded: Mutex::new(HashMap::new()),
        }
    }

    /// Entry for `fen` from the backing cache or this run's degraded set.
    pub fn get(&self, fen: &str) -> Option<PositionCacheEntry> {
        self.positions.get(fen).or_else(|| self.degraded_entry(fen))
    }

    /// Return the entry for `fen`, running `analyze` at most once per run.
    ///
    /// `analyze` yields `None` when the engine could not produce a result;
    /// that position then reads as [`PositionCacheEntry::degraded`] for the
    /// rest of the run.
    pub async fn get_or_analyze<F, Fut>(&self, fen: &str, analyze: F) -> PositionCacheEntry
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<PositionCacheEntry>>,
    {
        let outcome = self
            .positions
            .get_or_try_analyze(fen, || async {
                if let Some(entry) = self.degraded_entry(fen) {
                    return Err(entry);
                }
                match analyze().await {
                    Some(entry) => Ok(entry),
                    None => {
                        let entry = PositionCacheEntry::degraded();
                        self.degraded
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .insert(fen.to_string(), entry.clone());
                        Err(entry)
                    }
                }
            })
            .await;
        outcome.unwrap_or_else(|entry| entry)
    }

    /// Number of positions degraded in this run.
    pub fn degraded_len(&self) -> usize {
        self.degraded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn degraded_entry(&self, fen: &str) -> Option<PositionCacheEntry> {
        self.degraded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(fen)
            .cloned()
    }
}
