//! Per-game analysis with position deduplication.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use chess::{parse_fen, san_or_uci, AnalysisScore};
use engine::{EngineSpawner, PvLine, Score};
use futures::future::join_all;
use smallvec::{smallvec, SmallVec};

use crate::cache::{PositionCacheEntry, RunCache};
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::pool::EnginePool;
use crate::progress::ProgressReporter;
use crate::types::{Game, GameAnalysis, MoveAnalysis, Position, PositionAnalysis};

/// Positions of one game sharing a fingerprint, as indices into `game.moves`.
struct FenGroup<'g> {
    fen: &'g str,
    occurrences: SmallVec<[usize; 4]>,
}

pub struct GameAnalyzer<'a, S: EngineSpawner> {
    pool: &'a EnginePool<S>,
    cache: &'a RunCache<'a>,
    progress: &'a ProgressReporter,
    config: &'a AnalysisConfig,
}

impl<'a, S: EngineSpawner> GameAnalyzer<'a, S> {
    pub fn new(
        pool: &'a EnginePool<S>,
        cache: &'a RunCache<'a>,
        progress: &'a ProgressReporter,
        config: &'a AnalysisConfig,
    ) -> Self {
        Self {
            pool,
            cache,
            progress,
            config,
        }
    }

    /// Analyze every position of `game`, running the engine once per unique
    /// fingerprint not already in the cache.
    #[tracing::instrument(level = "debug", skip_all, fields(game_id = %game.game_id))]
    pub async fn analyze(&self, game: &Game) -> Result<GameAnalysis, AnalysisError> {
        if let Err(e) = validate(game) {
            self.progress.advance(game.moves.len());
            return Err(e);
        }

        let groups = group_by_fen(&game.moves);
        let mut entries: Vec<Option<PositionCacheEntry>> = vec![None; groups.len()];
        let mut pending = Vec::new();

        for (slot, group) in groups.iter().enumerate() {
            match self.cache.get(group.fen) {
                Some(entry) => {
                    entries[slot] = Some(entry);
                    self.progress.advance(group.occurrences.len());
                }
                None => pending.push(slot),
            }
        }

        tracing::debug!(
            positions = game.moves.len(),
            unique = groups.len(),
            pending = pending.len(),
            "Analyzing game"
        );

        let analyzed = join_all(pending.into_iter().map(|slot| {
            let group = &groups[slot];
            let first = &game.moves[group.occurrences[0]];
            async move {
                let entry = self
                    .cache
                    .get_or_analyze(group.fen, || self.evaluate(first))
                    .await;
                self.progress.advance(group.occurrences.len());
                (slot, entry)
            }
        }))
        .await;
        for (slot, entry) in analyzed {
            entries[slot] = Some(entry);
        }

        let mut positions: Vec<Option<PositionAnalysis>> = vec![None; game.moves.len()];
        for (group, entry) in groups.iter().zip(entries) {
            let entry = entry.unwrap_or_else(PositionCacheEntry::degraded);
            for &index in &group.occurrences {
                positions[index] = Some(project(&game.moves[index], &entry));
            }
        }

        let mut moves: Vec<PositionAnalysis> = positions.into_iter().flatten().collect();
        moves.sort_by_key(|position| position.move_number);

        Ok(GameAnalysis {
            game_id: game.game_id.clone(),
            time_control: game.time_control.clone(),
            moves,
        })
    }

    /// Run the engine on one position. `None` marks the position degraded.
    async fn evaluate(&self, position: &Position) -> Option<PositionCacheEntry> {
        match self.try_evaluate(position).await {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(
                    fen = %position.fen,
                    move_number = position.move_number,
                    "Position analysis degraded: {}",
                    e
                );
                None
            }
        }
    }

    async fn try_evaluate(&self, position: &Position) -> Result<PositionCacheEntry, AnalysisError> {
        let mut engine = self.pool.acquire().await?;
        let lines = engine
            .analyze(
                &position.fen,
                self.config.search_limits(),
                self.config.candidates,
                self.config.grace,
            )
            .await?;
        drop(engine);

        Ok(entry_from_lines(position, &lines, self.config.candidates))
    }
}

fn validate(game: &Game) -> Result<(), AnalysisError> {
    let malformed = |reason: &str| AnalysisError::MalformedGame {
        game_id: game.game_id.clone(),
        reason: reason.to_string(),
    };
    if game.moves.is_empty() {
        return Err(malformed("empty move list"));
    }
    if let Some(position) = game.moves.iter().find(|p| p.fen.trim().is_empty()) {
        return Err(malformed(&format!(
            "empty fingerprint at move {}",
            position.move_number
        )));
    }
    Ok(())
}

/// Group positions by fingerprint, in order of first occurrence.
fn group_by_fen(positions: &[Position]) -> Vec<FenGroup<'_>> {
    let mut groups: Vec<FenGroup<'_>> = Vec::new();
    let mut by_fen: HashMap<&str, usize> = HashMap::new();

    for (index, position) in positions.iter().enumerate() {
        match by_fen.entry(position.fen.as_str()) {
            Entry::Occupied(slot) => groups[*slot.get()].occurrences.push(index),
            Entry::Vacant(slot) => {
                slot.insert(groups.len());
                groups.push(FenGroup {
                    fen: position.fen.as_str(),
                    occurrences: smallvec![index],
                });
            }
        }
    }
    groups
}

/// Render engine lines as candidate moves and look up the played move.
fn entry_from_lines(position: &Position, lines: &[PvLine], candidates: u32) -> PositionCacheEntry {
    let board = parse_fen(&position.fen).ok();
    if board.is_none() {
        tracing::debug!(fen = %position.fen, "Unparsable FEN, keeping engine moves in UCI");
    }

    let best_moves: Vec<MoveAnalysis> = lines
        .iter()
        .take(candidates as usize)
        .filter_map(|line| {
            let first = *line.pv.first()?;
            Some(MoveAnalysis {
                mv: san_or_uci(board.as_ref(), first),
                eval: score_to_pawns(line.score),
            })
        })
        .collect();

    let played_move_eval = best_moves
        .iter()
        .find(|candidate| candidate.mv == position.played_move)
        .map_or(0.0, |candidate| candidate.eval);

    PositionCacheEntry {
        played_move_eval,
        best_moves,
    }
}

fn score_to_pawns(score: Score) -> f64 {
    let score = match score {
        Score::Centipawns(cp) => AnalysisScore::Centipawns(cp),
        Score::Mate(moves) => AnalysisScore::Mate(moves),
    };
    score.to_pawns()
}

fn project(position: &Position, entry: &PositionCacheEntry) -> PositionAnalysis {
    PositionAnalysis {
        fen: position.fen.clone(),
        move_number: position.move_number,
        played_move: position.played_move.clone(),
        played_move_eval: entry.played_move_eval,
        best_moves: entry.best_moves.clone(),
    }
}
