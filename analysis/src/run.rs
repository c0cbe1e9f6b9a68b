//! End-to-end analysis runs.

use std::sync::Arc;

use engine::EngineSpawner;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::batch::BatchScheduler;
use crate::cache::{PositionCache, RunCache};
use crate::config::{AnalysisConfig, CacheScope};
use crate::error::AnalysisError;
use crate::game::GameAnalyzer;
use crate::pool::EnginePool;
use crate::progress::{ProgressReporter, ProgressSink};
use crate::types::{AnalysisResult, Game};

/// Drives one analysis run per call: engine pool, position cache, batch
/// scheduling and progress reporting.
pub struct Orchestrator<S> {
    spawner: S,
    config: AnalysisConfig,
    shared_cache: Arc<PositionCache>,
    progress_sink: Option<Arc<dyn ProgressSink>>,
}

impl<S: EngineSpawner + Clone> Orchestrator<S> {
    pub fn new(spawner: S, config: AnalysisConfig) -> Self {
        Self {
            spawner,
            config,
            shared_cache: Arc::new(PositionCache::new()),
            progress_sink: None,
        }
    }

    /// Use `cache` for runs configured with [`CacheScope::Shared`].
    pub fn with_shared_cache(mut self, cache: Arc<PositionCache>) -> Self {
        self.shared_cache = cache;
        self
    }

    /// Register the sink that receives progress for subsequent runs.
    pub fn register_progress_sink(&mut self, sink: Arc<dyn ProgressSink>) {
        self.progress_sink = Some(sink);
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn shared_cache(&self) -> &Arc<PositionCache> {
        &self.shared_cache
    }

    pub async fn run(&self, games: &[Game]) -> Result<AnalysisResult, AnalysisError> {
        self.run_with_cancel(games, &CancellationToken::new()).await
    }

    /// Like [`run`](Self::run), but aborts with [`AnalysisError::Cancelled`]
    /// once `cancel` fires. Outstanding engine calls are terminated and
    /// partial results are discarded.
    pub async fn run_with_cancel(
        &self,
        games: &[Game],
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, AnalysisError> {
        let reporter = self.reporter();
        self.execute(games, &reporter, cancel, Instant::now()).await
    }

    pub(crate) fn reporter(&self) -> ProgressReporter {
        ProgressReporter::new(self.progress_sink.clone())
    }

    /// Run the pipeline over `games`. `analysis_time` is measured from
    /// `started`.
    pub(crate) async fn execute(
        &self,
        games: &[Game],
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<AnalysisResult, AnalysisError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("analysis_run", %run_id, games = games.len());
        self.execute_inner(games, reporter, cancel, started)
            .instrument(span)
            .await
    }

    async fn execute_inner(
        &self,
        games: &[Game],
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<AnalysisResult, AnalysisError> {
        if games.is_empty() {
            tracing::info!("No games to analyze");
            reporter.finish("No games found");
            return Ok(AnalysisResult::new(Vec::new(), started.elapsed()));
        }

        let total_positions: usize = games.iter().map(|game| game.moves.len()).sum();
        reporter.games_found(games.len(), total_positions);
        tracing::info!(
            total_positions,
            pool_size = self.config.pool_size,
            batch_width = self.config.batch_width,
            cache_scope = ?self.config.cache_scope,
            "Starting analysis"
        );

        let pool = EnginePool::new(self.spawner.clone(), self.config.pool_size);
        let run_positions;
        let positions: &PositionCache = match self.config.cache_scope {
            CacheScope::Run => {
                run_positions = PositionCache::new();
                &run_positions
            }
            CacheScope::Shared => &self.shared_cache,
        };
        let cache = RunCache::new(positions);

        let pipeline = async {
            pool.warm_up()
                .await
                .map_err(AnalysisError::EngineUnavailable)?;
            let analyzer = GameAnalyzer::new(&pool, &cache, reporter, &self.config);
            let scheduler = BatchScheduler::new(self.config.batch_width);
            Ok::<_, AnalysisError>(scheduler.run(games, |game| analyzer.analyze(game)).await)
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AnalysisError::Cancelled),
            result = pipeline => result,
        };

        // Every exit path tears the engines down here.
        pool.close().await;

        let analyses = match outcome {
            Ok(analyses) => analyses,
            Err(e) => {
                tracing::warn!(spawned = pool.spawned_handles(), "Analysis run aborted: {}", e);
                return Err(e);
            }
        };

        let result = AnalysisResult::new(analyses, started.elapsed());
        tracing::info!(
            analysis_time = result.analysis_time,
            engines = pool.spawned_handles(),
            cached_positions = positions.len(),
            degraded_positions = cache.degraded_len(),
            "Analysis complete"
        );
        reporter.finish("Analysis complete");
        Ok(result)
    }
}
