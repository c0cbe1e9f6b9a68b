//! Run configuration for the analysis pipeline.
//!
//! Every value has a compile-time default and can be overridden through an
//! environment variable; unparsable values fall back to the default.

use std::str::FromStr;
use std::time::Duration;

use engine::{SearchLimits, MAX_MULTIPV};

const DEFAULT_ANALYSIS_TIME_SECS: f64 = 2.0;
const DEFAULT_ANALYSIS_DEPTH: u32 = 18;
const DEFAULT_CANDIDATE_MOVES: u32 = 3;
const DEFAULT_POOL_SIZE: usize = 8;
const DEFAULT_BATCH_WIDTH: usize = 3;
const DEFAULT_GRACE_SECS: f64 = 2.0;
const DEFAULT_MAX_GAMES: usize = 5;

/// Lifetime of the position cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheScope {
    /// A fresh cache for every run.
    #[default]
    Run,
    /// Reuse the caller's long-lived cache across runs.
    Shared,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    /// Engine search time per position.
    pub time_limit: Duration,
    pub depth: u32,
    /// Number of candidate moves (MultiPV) per position.
    pub candidates: u32,
    /// Maximum concurrent engine analyses, and so maximum engine processes.
    pub pool_size: usize,
    /// Games analyzed concurrently per batch.
    pub batch_width: usize,
    /// Extra time an engine gets beyond `time_limit` before the call times out.
    pub grace: Duration,
    pub cache_scope: CacheScope,
    /// Upper bound on games taken from a source.
    pub max_games: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_secs_f64(DEFAULT_ANALYSIS_TIME_SECS),
            depth: DEFAULT_ANALYSIS_DEPTH,
            candidates: DEFAULT_CANDIDATE_MOVES,
            pool_size: DEFAULT_POOL_SIZE,
            batch_width: DEFAULT_BATCH_WIDTH,
            grace: Duration::from_secs_f64(DEFAULT_GRACE_SECS),
            cache_scope: CacheScope::Run,
            max_games: DEFAULT_MAX_GAMES,
        }
    }
}

impl AnalysisConfig {
    /// Build a config from the environment.
    ///
    /// Reads `ANALYSIS_TIME`, `ANALYSIS_DEPTH`, `CANDIDATE_MOVES`,
    /// `ENGINE_POOL_SIZE`, `GAME_BATCH_WIDTH`, `ENGINE_GRACE_SECS` and
    /// `MAX_GAMES`.
    pub fn from_env() -> Self {
        Self {
            time_limit: env_secs("ANALYSIS_TIME", DEFAULT_ANALYSIS_TIME_SECS),
            depth: env_or("ANALYSIS_DEPTH", DEFAULT_ANALYSIS_DEPTH),
            candidates: clamp_candidates(env_or("CANDIDATE_MOVES", DEFAULT_CANDIDATE_MOVES)),
            pool_size: env_or("ENGINE_POOL_SIZE", DEFAULT_POOL_SIZE),
            batch_width: env_or("GAME_BATCH_WIDTH", DEFAULT_BATCH_WIDTH),
            grace: env_secs("ENGINE_GRACE_SECS", DEFAULT_GRACE_SECS),
            cache_scope: CacheScope::Run,
            max_games: env_or("MAX_GAMES", DEFAULT_MAX_GAMES),
        }
    }

    pub fn search_limits(&self) -> SearchLimits {
        SearchLimits {
            movetime: self.time_limit,
            depth: Some(self.depth),
        }
    }

    /// Upper bound for one engine call before it counts as timed out.
    pub fn call_deadline(&self) -> Duration {
        self.time_limit + self.grace
    }
}

/// Keep a candidate count within what an engine accepts as MultiPV.
fn clamp_candidates(requested: u32) -> u32 {
    requested.clamp(1, MAX_MULTIPV)
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(value) => value.trim().parse().unwrap_or(default),
        Err(_) => default,
    }
}

fn env_secs(key: &str, default: f64) -> Duration {
    let secs = env_or(key, default);
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::from_secs_f64(default)
    }
}
