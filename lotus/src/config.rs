//! Runtime configuration for the Lotus CLI.
//!
//! Engine and logging tunables. Every value has a compile-time default and can
//! be overridden via a dedicated environment variable. Analysis settings live
//! in [`analysis::AnalysisConfig::from_env`].

use std::path::PathBuf;

use engine::StockfishConfig;

/// Default search threads per engine process.
const DEFAULT_ENGINE_THREADS: u32 = 1;

/// Default transposition table size per engine process, in MB.
const DEFAULT_ENGINE_HASH_MB: u32 = 64;

/// Get the Stockfish executable path.
///
/// Priority:
/// 1. `STOCKFISH_PATH` env variable if set and non-empty
/// 2. `None`, letting the engine crate probe common install locations
pub fn get_stockfish_path() -> Option<PathBuf> {
    std::env::var("STOCKFISH_PATH")
        .ok()
        .filter(|path| !path.trim().is_empty())
        .map(PathBuf::from)
}

/// Get the search thread count per engine.
///
/// Priority:
/// 1. `STOCKFISH_THREADS` env variable if set (falls back to default if the
///    value cannot be parsed as a `u32`)
/// 2. `1` as fallback
pub fn get_engine_threads() -> u32 {
    if let Ok(threads) = std::env::var("STOCKFISH_THREADS") {
        return threads.parse().unwrap_or(DEFAULT_ENGINE_THREADS);
    }

    DEFAULT_ENGINE_THREADS
}

/// Get the hash size per engine in MB.
///
/// Priority:
/// 1. `STOCKFISH_HASH_MB` env variable if set (falls back to default if the
///    value cannot be parsed as a `u32`)
/// 2. `64` as fallback
pub fn get_engine_hash_mb() -> u32 {
    if let Ok(hash) = std::env::var("STOCKFISH_HASH_MB") {
        return hash.parse().unwrap_or(DEFAULT_ENGINE_HASH_MB);
    }

    DEFAULT_ENGINE_HASH_MB
}

/// Get the directory for rolling log files.
///
/// `LOTUS_LOG_DIR` if set; otherwise logs go to stderr only.
pub fn get_log_dir() -> Option<PathBuf> {
    std::env::var("LOTUS_LOG_DIR").ok().map(PathBuf::from)
}

/// Engine process settings assembled from the getters above.
pub fn stockfish_config() -> StockfishConfig {
    StockfishConfig {
        path: get_stockfish_path(),
        threads: Some(get_engine_threads()),
        hash_mb: Some(get_engine_hash_mb()),
        ..StockfishConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_engine_threads_default() {
        match std::env::var("STOCKFISH_THREADS") {
            Ok(_) => {}
            Err(_) => assert_eq!(get_engine_threads(), DEFAULT_ENGINE_THREADS),
        }
    }

    #[test]
    fn test_get_engine_hash_mb_default() {
        match std::env::var("STOCKFISH_HASH_MB") {
            Ok(_) => {}
            Err(_) => assert_eq!(get_engine_hash_mb(), DEFAULT_ENGINE_HASH_MB),
        }
    }

    #[test]
    fn test_stockfish_config_uses_env_path() {
        let config = stockfish_config();
        assert_eq!(config.path, get_stockfish_path());
        assert!(config.args.is_empty());
    }
}
