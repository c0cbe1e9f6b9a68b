//! Game-review analysis pipeline.
//!
//! Games are analyzed in fixed-width batches. Within a game, positions are
//! deduplicated by FEN and each unique position is sent once to a bounded
//! pool of UCI engines; results are cached per fingerprint and projected
//! back onto every occurrence.

pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod game;
pub mod pool;
pub mod progress;
pub mod run;
pub mod service;
pub mod types;

pub use batch::BatchScheduler;
pub use cache::{PositionCache, PositionCacheEntry, RunCache};
pub use config::{AnalysisConfig, CacheScope};
pub use error::{AnalysisError, ProgressError};
pub use game::GameAnalyzer;
pub use pool::{EnginePool, HandleState, PoolError, PooledEngine};
pub use progress::{ProgressReporter, ProgressSink, PROGRESS_TOTAL};
pub use run::Orchestrator;
pub use service::{cache_key, AnalysisService, GameSource, NoResultCache, ResultCache, SourceError};
pub use types::{AnalysisResult, Game, GameAnalysis, MoveAnalysis, Position, PositionAnalysis};

pub use tokio_util::sync::CancellationToken;
