//! Player-level entry point: result cache, game retrieval, analysis run.

use std::future::Future;

use engine::EngineSpawner;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::AnalysisError;
use crate::progress::FETCHING_PERCENT;
use crate::run::Orchestrator;
use crate::types::{AnalysisResult, Game};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("player not found: {0}")]
    PlayerNotFound(String),
    #[error("game archive unavailable: {0}")]
    Unavailable(String),
    #[error("invalid game data: {0}")]
    InvalidData(String),
}

/// Supplies a player's recent games, already normalized into positions.
pub trait GameSource: Send + Sync {
    fn fetch_games(
        &self,
        player: &str,
        max_games: usize,
    ) -> impl Future<Output = Result<Vec<Game>, SourceError>> + Send;
}

/// Stores finished results. Expiry is up to the implementation.
pub trait ResultCache: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = Option<AnalysisResult>> + Send;
    fn set(&self, key: &str, result: &AnalysisResult) -> impl Future<Output = ()> + Send;
}

/// A [`ResultCache`] that never stores anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResultCache;

impl ResultCache for NoResultCache {
    async fn get(&self, _key: &str) -> Option<AnalysisResult> {
        None
    }

    async fn set(&self, _key: &str, _result: &AnalysisResult) {}
}

/// Result cache key for a player.
pub fn cache_key(player: &str) -> String {
    format!("analysis:{}", player)
}

pub struct AnalysisService<S, G, C = NoResultCache> {
    orchestrator: Orchestrator<S>,
    source: G,
    cache: C,
}

impl<S, G, C> AnalysisService<S, G, C>
where
    S: EngineSpawner + Clone,
    G: GameSource,
    C: ResultCache,
{
    pub fn new(orchestrator: Orchestrator<S>, source: G, cache: C) -> Self {
        Self {
            orchestrator,
            source,
            cache,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator<S> {
        &self.orchestrator
    }

    /// Analyze `player`'s recent games, serving a cached result when present.
    ///
    /// `analysis_time` covers the cache lookup and game retrieval as well as
    /// the engine work.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn analyze_player(
        &self,
        player: &str,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, AnalysisError> {
        let started = Instant::now();
        let key = cache_key(player);
        if let Some(cached) = self.cache.get(&key).await {
            tracing::info!(games = cached.games.len(), "Returning cached analysis");
            return Ok(cached);
        }

        let reporter = self.orchestrator.reporter();
        reporter.report(FETCHING_PERCENT, &format!("Fetching games for {}", player));

        let max_games = self.orchestrator.config().max_games;
        let mut games = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AnalysisError::Cancelled),
            fetched = self.source.fetch_games(player, max_games) => fetched?,
        };
        games.truncate(max_games);
        tracing::info!(games = games.len(), "Fetched games");

        let result = self
            .orchestrator
            .execute(&games, &reporter, cancel, started)
            .await?;
        self.cache.set(&key, &result).await;
        Ok(result)
    }
}
