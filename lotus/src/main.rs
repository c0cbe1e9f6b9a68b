//! Lotus CLI - engine-backed review of a player's recent games.
//!
//! `lotus analyze --games games.json` reads a normalized game list, runs every
//! position through a pool of Stockfish processes and prints the resulting
//! move evaluations as JSON.
//!
//! Engine and analysis tunables come from the environment (see [`config`] and
//! [`analysis::AnalysisConfig::from_env`]); command-line flags override them.
//! Logs go to stderr, and additionally to a daily rolling file when
//! `LOTUS_LOG_DIR` is set.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use analysis::{
    AnalysisConfig, AnalysisError, AnalysisService, CancellationToken, NoResultCache,
    Orchestrator, ProgressError,
};
use clap::{Args, Parser, Subcommand};
use engine::{StockfishSpawner, MAX_MULTIPV};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod source;

use source::JsonGameSource;

/// Top-level CLI arguments for Lotus.
#[derive(Parser)]
#[command(name = "lotus", about = "Engine analysis of recent chess games")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze games from a JSON file and print the evaluations.
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// JSON file holding an array of normalized games.
    #[arg(short, long)]
    games: PathBuf,

    /// Player the games belong to.
    #[arg(short, long, default_value = "anonymous")]
    player: String,

    /// Engine search time per position, in seconds.
    #[arg(long)]
    time: Option<f64>,

    /// Engine search depth limit.
    #[arg(long)]
    depth: Option<u32>,

    /// Candidate moves reported per position.
    #[arg(long)]
    candidates: Option<u32>,

    /// Maximum concurrent engine processes.
    #[arg(long)]
    pool_size: Option<usize>,

    /// Games analyzed concurrently.
    #[arg(long)]
    batch_width: Option<usize>,

    /// Maximum games taken from the file.
    #[arg(long)]
    max_games: Option<usize>,

    /// Write the result here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// Error type for CLI operations.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to write result: {0}")]
    Output(#[from] std::io::Error),
}

/// Overlay command-line flags on the environment-derived config.
fn apply_overrides(config: &mut AnalysisConfig, args: &AnalyzeArgs) -> Result<(), CliError> {
    if let Some(time) = args.time {
        if !time.is_finite() || time <= 0.0 {
            return Err(CliError::InvalidArgument(format!(
                "--time must be a positive number of seconds, got {}",
                time
            )));
        }
        config.time_limit = Duration::from_secs_f64(time);
    }
    if let Some(depth) = args.depth {
        config.depth = depth;
    }
    if let Some(candidates) = args.candidates {
        if candidates == 0 || candidates > MAX_MULTIPV {
            return Err(CliError::InvalidArgument(format!(
                "--candidates must be between 1 and {}",
                MAX_MULTIPV
            )));
        }
        config.candidates = candidates;
    }
    if let Some(pool_size) = args.pool_size {
        config.pool_size = pool_size.max(1);
    }
    if let Some(batch_width) = args.batch_width {
        config.batch_width = batch_width.max(1);
    }
    if let Some(max_games) = args.max_games {
        config.max_games = max_games;
    }
    Ok(())
}

/// Install the tracing subscriber. The returned guard flushes the log file
/// and must be held until exit.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let (file_layer, guard) = match config::get_log_dir() {
        Some(log_dir) => {
            let file_appender = tracing_appender::rolling::daily(log_dir, "lotus");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    guard
}

async fn run_analyze(args: AnalyzeArgs) -> Result<(), CliError> {
    let mut analysis_config = AnalysisConfig::from_env();
    apply_overrides(&mut analysis_config, &args)?;
    tracing::debug!(?analysis_config, "Resolved analysis config");

    let spawner = StockfishSpawner::new(config::stockfish_config());
    let mut orchestrator = Orchestrator::new(spawner, analysis_config);
    orchestrator.register_progress_sink(Arc::new(
        |percent: u8, total: u8, status: &str| -> Result<(), ProgressError> {
            tracing::info!(percent, total, "{}", status);
            Ok(())
        },
    ));
    let service = AnalysisService::new(
        orchestrator,
        JsonGameSource::new(&args.games),
        NoResultCache,
    );

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling analysis");
            ctrl_c.cancel();
        }
    });

    let result = service.analyze_player(&args.player, &cancel).await?;
    let json = serde_json::to_string_pretty(&result)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, json)?;
            tracing::info!(path = %path.display(), games = result.games.len(), "Result written");
        }
        None => println!("{}", json),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze(args) => run_analyze(args).await?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> AnalyzeArgs {
        let cli = Cli::try_parse_from(args).expect("arguments should parse");
        match cli.command {
            Commands::Analyze(args) => args,
        }
    }

    #[test]
    fn test_parse_analyze_defaults() {
        let args = parse(&["lotus", "analyze", "--games", "games.json"]);
        assert_eq!(args.games, PathBuf::from("games.json"));
        assert_eq!(args.player, "anonymous");
        assert!(args.time.is_none());
        assert!(args.output.is_none());
    }

    #[test]
    fn test_overrides_apply() {
        let args = parse(&[
            "lotus",
            "analyze",
            "-g",
            "games.json",
            "--player",
            "alice",
            "--time",
            "0.5",
            "--depth",
            "12",
            "--candidates",
            "5",
            "--pool-size",
            "2",
            "--batch-width",
            "1",
        ]);
        let mut config = AnalysisConfig::default();
        apply_overrides(&mut config, &args).unwrap();

        assert_eq!(config.time_limit, Duration::from_millis(500));
        assert_eq!(config.depth, 12);
        assert_eq!(config.candidates, 5);
        assert_eq!(config.pool_size, 2);
        assert_eq!(config.batch_width, 1);
        assert_eq!(config.max_games, AnalysisConfig::default().max_games);
    }

    #[test]
    fn test_invalid_overrides_are_rejected() {
        let mut config = AnalysisConfig::default();
        let args = parse(&["lotus", "analyze", "-g", "g.json", "--time", "0"]);
        assert!(matches!(
            apply_overrides(&mut config, &args),
            Err(CliError::InvalidArgument(_))
        ));

        let args = parse(&["lotus", "analyze", "-g", "g.json", "--candidates", "0"]);
        assert!(apply_overrides(&mut config, &args).is_err());

        let args = parse(&["lotus", "analyze", "-g", "g.json", "--candidates", "501"]);
        assert!(apply_overrides(&mut config, &args).is_err());
    }

    #[test]
    fn test_games_flag_is_required() {
        assert!(Cli::try_parse_from(["lotus", "analyze"]).is_err());
    }
}
