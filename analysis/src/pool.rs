//! Bounded pool of engine processes.
//!
//! A semaphore admits at most `size` concurrent analyses. Handles are created
//! lazily, reused while alive, and replaced after they die. Every handle the
//! pool ever created is terminated either by [`EnginePool::close`] or when it
//! is returned to a closed pool.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use engine::{Engine, EngineError, EngineSpawner, PvLine, SearchLimits};
use tokio::sync::{Semaphore, SemaphorePermit};

/// How long a timed-out engine gets to acknowledge `stop`.
const STOP_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("engine pool is closed")]
    Closed,
    #[error("failed to start engine: {0}")]
    Spawn(#[source] EngineError),
}

/// Lifecycle of a pooled handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Idle,
    CheckedOut,
    Dead,
}

pub struct EnginePool<S: EngineSpawner> {
    spawner: S,
    gate: Semaphore,
    idle: Mutex<Vec<S::Engine>>,
    spawned: AtomicUsize,
    live: AtomicUsize,
    closed: AtomicBool,
    size: usize,
}

impl<S: EngineSpawner> EnginePool<S> {
    pub fn new(spawner: S, size: usize) -> Self {
        let size = size.max(1);
        Self {
            spawner,
            gate: Semaphore::new(size),
            idle: Mutex::new(Vec::with_capacity(size)),
            spawned: AtomicUsize::new(0),
            live: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            size,
        }
    }

    /// Start one handle eagerly so a missing engine fails the run up front.
    pub async fn warm_up(&self) -> Result<(), EngineError> {
        let engine = self.spawn_handle().await?;
        self.lock_idle().push(engine);
        Ok(())
    }

    /// Wait for admission, then check out an idle handle or start a new one.
    pub async fn acquire(&self) -> Result<PooledEngine<'_, S>, PoolError> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }
        let permit = self.gate.acquire().await.map_err(|_| PoolError::Closed)?;

        loop {
            let candidate = self.lock_idle().pop();
            match candidate {
                Some(mut engine) => {
                    if engine.is_alive() {
                        tracing::trace!(engine = engine.label(), "Reusing idle engine");
                        return Ok(PooledEngine::new(self, engine, permit));
                    }
                    tracing::warn!(engine = engine.label(), "Discarding dead idle engine");
                    self.live.fetch_sub(1, Ordering::SeqCst);
                    engine.shutdown().await;
                }
                None => break,
            }
        }

        let engine = self.spawn_handle().await.map_err(PoolError::Spawn)?;
        Ok(PooledEngine::new(self, engine, permit))
    }

    /// Terminate every idle handle and refuse further acquisitions.
    ///
    /// Idempotent. Handles checked out at the time are terminated when their
    /// guard is dropped; tasks waiting for admission get [`PoolError::Closed`].
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.gate.close();

        let idle = std::mem::take(&mut *self.lock_idle());
        tracing::debug!(
            idle = idle.len(),
            live = self.live_handles(),
            "Closing engine pool"
        );
        let count = idle.len();
        futures::future::join_all(idle.into_iter().map(|engine| engine.shutdown())).await;
        self.live.fetch_sub(count, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Handles currently owned by the pool or checked out.
    pub fn live_handles(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn idle_handles(&self) -> usize {
        self.lock_idle().len()
    }

    /// Total handles created over the pool's lifetime.
    pub fn spawned_handles(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    async fn spawn_handle(&self) -> Result<S::Engine, EngineError> {
        let id = self.spawned.fetch_add(1, Ordering::SeqCst) + 1;
        let engine = self.spawner.spawn(format!("engine-{}", id)).await?;
        self.live.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(engine = engine.label(), "Engine started");
        Ok(engine)
    }

    fn lock_idle(&self) -> std::sync::MutexGuard<'_, Vec<S::Engine>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A checked-out engine. Dropping it returns the handle to the pool, or
/// terminates it when it is dead, interrupted mid-call, or the pool closed.
pub struct PooledEngine<'a, S: EngineSpawner> {
    pool: &'a EnginePool<S>,
    engine: Option<S::Engine>,
    state: HandleState,
    in_flight: bool,
    // Released after `Drop::drop` has put the handle back.
    _permit: SemaphorePermit<'a>,
}

impl<'a, S: EngineSpawner> PooledEngine<'a, S> {
    fn new(pool: &'a EnginePool<S>, engine: S::Engine, permit: SemaphorePermit<'a>) -> Self {
        Self {
            pool,
            engine: Some(engine),
            state: HandleState::CheckedOut,
            in_flight: false,
            _permit: permit,
        }
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    pub fn label(&self) -> &str {
        self.engine.as_ref().map_or("released", |engine| engine.label())
    }

    /// Analyze `fen`, bounded by `limits.movetime + grace`.
    ///
    /// On timeout the search is stopped before returning, so a timed-out call
    /// takes up to `movetime + grace + 500ms`. If the engine does not
    /// acknowledge `stop` within those 500ms the handle is marked dead. Fatal
    /// engine errors also mark it dead.
    pub async fn analyze(
        &mut self,
        fen: &str,
        limits: SearchLimits,
        multipv: u32,
        grace: Duration,
    ) -> Result<Vec<PvLine>, EngineError> {
        let engine = self
            .engine
            .as_mut()
            .ok_or_else(|| EngineError::Dead("handle already released".to_string()))?;
        let deadline = limits.movetime + grace;

        self.in_flight = true;
        let outcome = tokio::time::timeout(deadline, engine.analyze(fen, limits, multipv)).await;
        self.in_flight = false;

        match outcome {
            Ok(Ok(lines)) => Ok(lines),
            Ok(Err(e)) => {
                if e.is_fatal_for_handle() {
                    tracing::warn!(engine = engine.label(), fen, "Engine died: {}", e);
                    self.state = HandleState::Dead;
                }
                Err(e)
            }
            Err(_) => {
                tracing::warn!(engine = engine.label(), fen, ?deadline, "Engine analysis timed out");
                self.in_flight = true;
                let recovered = tokio::time::timeout(STOP_DRAIN_TIMEOUT, engine.stop()).await;
                self.in_flight = false;
                if !matches!(recovered, Ok(Ok(()))) {
                    tracing::warn!(engine = engine.label(), "Engine did not recover after stop");
                    self.state = HandleState::Dead;
                }
                Err(EngineError::Timeout(deadline))
            }
        }
    }
}

impl<S: EngineSpawner> Drop for PooledEngine<'_, S> {
    fn drop(&mut self) {
        let Some(mut engine) = self.engine.take() else {
            return;
        };

        if self.state != HandleState::Dead && !self.in_flight {
            let mut idle = self.pool.lock_idle();
            // Checked under the idle lock so `close` cannot miss this handle.
            if !self.pool.is_closed() {
                self.state = HandleState::Idle;
                idle.push(engine);
                return;
            }
        }

        tracing::debug!(
            engine = engine.label(),
            state = ?self.state,
            in_flight = self.in_flight,
            "Terminating engine on release"
        );
        engine.terminate();
        self.pool.live.fetch_sub(1, Ordering::SeqCst);
    }
}
