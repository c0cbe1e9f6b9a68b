pub mod stockfish;
pub mod uci;

pub use stockfish::{StockfishConfig, StockfishEngine, StockfishSpawner};
pub use uci::{UciError, UciMessage};

use std::future::Future;
use std::time::Duration;

use cozy_chess::Move;

/// Events received from the engine
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Ready,
    /// `None` when the engine answers `bestmove (none)` (no legal moves).
    BestMove(Option<Move>),
    Info(EngineInfo),
}

/// Engine analysis information
#[derive(Debug, Clone, Default)]
pub struct EngineInfo {
    pub depth: Option<u32>,
    pub seldepth: Option<u32>,
    pub time_ms: Option<u64>,
    pub nodes: Option<u64>,
    pub score: Option<Score>,
    pub pv: Vec<Move>, // Principal variation
    pub multipv: Option<u32>,
    pub hashfull: Option<u16>,
    pub nps: Option<u64>,
}

/// Raw engine score, always from the side to move's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Centipawns(i32),
    Mate(i32), // Negative for being mated
}

/// Largest MultiPV value Stockfish accepts.
pub const MAX_MULTIPV: u32 = 500;

/// Budget for a single `go` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    pub movetime: Duration,
    pub depth: Option<u32>,
}

/// One principal variation of a multi-PV search.
#[derive(Debug, Clone, PartialEq)]
pub struct PvLine {
    /// 1-based rank of the line, 1 being the engine's best.
    pub multipv: u32,
    pub score: Score,
    pub pv: Vec<Move>,
    pub depth: Option<u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to start engine: {0}")]
    Spawn(String),
    #[error("engine did not finish within {0:?}")]
    Timeout(Duration),
    #[error("engine process is dead: {0}")]
    Dead(String),
    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Whether the handle that produced this error can no longer be trusted.
    pub fn is_fatal_for_handle(&self) -> bool {
        matches!(self, Self::Dead(_) | Self::Io(_))
    }
}

/// A single analysis engine process.
///
/// Methods return `impl Future + Send` so pooled handles can be driven from
/// any tokio task.
pub trait Engine: Send {
    /// Label used in logs (e.g. `engine-3`).
    fn label(&self) -> &str;

    /// Search `fen` and return up to `multipv` lines, best first.
    fn analyze(
        &mut self,
        fen: &str,
        limits: SearchLimits,
        multipv: u32,
    ) -> impl Future<Output = Result<Vec<PvLine>, EngineError>> + Send;

    /// Abort an in-progress search and drain its output.
    /// A no-op when the engine is idle.
    fn stop(&mut self) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Whether the underlying process is still running.
    fn is_alive(&mut self) -> bool;

    /// Best-effort synchronous kill, usable from `Drop`.
    fn terminate(&mut self);

    /// Graceful shutdown: ask the engine to quit, then kill it.
    fn shutdown(self) -> impl Future<Output = ()> + Send;
}

/// Creates engine processes on demand.
pub trait EngineSpawner: Send + Sync {
    type Engine: Engine + 'static;

    fn spawn(
        &self,
        label: String,
    ) -> impl Future<Output = Result<Self::Engine, EngineError>> + Send;
}
