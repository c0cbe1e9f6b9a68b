use engine::EngineError;

use crate::pool::PoolError;
use crate::service::SourceError;

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// No engine could be started when the run began.
    #[error("analysis engine unavailable: {0}")]
    EngineUnavailable(#[source] EngineError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("malformed game {game_id}: {reason}")]
    MalformedGame { game_id: String, reason: String },

    #[error("failed to fetch games: {0}")]
    Source(#[from] SourceError),

    #[error("analysis run cancelled")]
    Cancelled,
}

/// A progress sink refused an update.
#[derive(Debug, thiserror::Error)]
#[error("progress sink failed: {0}")]
pub struct ProgressError(pub String);
