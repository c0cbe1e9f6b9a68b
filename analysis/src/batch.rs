//! Fixed-width batching of per-game analyses.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::future::join_all;
use futures::FutureExt;

use crate::error::AnalysisError;
use crate::types::{Game, GameAnalysis};

/// Runs games in sequential batches; batch *i* finishes before *i+1* starts.
#[derive(Debug, Clone, Copy)]
pub struct BatchScheduler {
    width: usize,
}

impl BatchScheduler {
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Analyze `games` with `analyze`, preserving input order.
    ///
    /// A game whose analysis fails or panics is reported as an empty
    /// [`GameAnalysis`] with its id and time control.
    pub async fn run<'g, F, Fut>(&self, games: &'g [Game], analyze: F) -> Vec<GameAnalysis>
    where
        F: Fn(&'g Game) -> Fut,
        Fut: Future<Output = Result<GameAnalysis, AnalysisError>>,
    {
        let mut results = Vec::with_capacity(games.len());

        for (index, batch) in games.chunks(self.width).enumerate() {
            tracing::debug!(batch = index + 1, games = batch.len(), "Starting game batch");

            let outcomes = join_all(
                batch
                    .iter()
                    .map(|game| AssertUnwindSafe(analyze(game)).catch_unwind()),
            )
            .await;

            for (game, outcome) in batch.iter().zip(outcomes) {
                let analysis = match outcome {
                    Ok(Ok(analysis)) => analysis,
                    Ok(Err(e)) => {
                        tracing::warn!(game_id = %game.game_id, "Game analysis failed: {}", e);
                        GameAnalysis::empty(game)
                    }
                    Err(_) => {
                        tracing::error!(game_id = %game.game_id, "Game analysis panicked");
                        GameAnalysis::empty(game)
                    }
                };
                results.push(analysis);
            }
        }

        results
    }
}
