use crate::uci::{parse_uci_message, UciMessage};
use crate::{
    Engine, EngineError, EngineEvent, EngineInfo, EngineSpawner, PvLine, SearchLimits, MAX_MULTIPV,
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::mpsc;

/// How long the engine gets to answer the `uci` / `isready` handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a `quit` may take before the process is killed.
const QUIT_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for spawning and tuning a Stockfish process.
#[derive(Debug, Clone, Default)]
pub struct StockfishConfig {
    /// Executable path. Probed from common install locations when `None`.
    pub path: Option<PathBuf>,
    /// Extra command-line arguments passed to the executable.
    pub args: Vec<String>,
    pub threads: Option<u32>,
    pub hash_mb: Option<u32>,
    pub label: Option<String>,
}

/// Counters from the latest `info` line of a search, for trace logs.
#[derive(Debug, Default, Clone, Copy)]
struct SearchStats {
    depth: Option<u32>,
    seldepth: Option<u32>,
    nodes: Option<u64>,
    nps: Option<u64>,
    time_ms: Option<u64>,
    hashfull: Option<u16>,
}

impl SearchStats {
    fn record(&mut self, info: &EngineInfo) {
        if info.nodes.is_none() {
            return;
        }
        *self = Self {
            depth: info.depth,
            seldepth: info.seldepth,
            nodes: info.nodes,
            nps: info.nps,
            time_ms: info.time_ms,
            hashfull: info.hashfull,
        };
    }
}

/// One Stockfish process speaking UCI over stdin/stdout.
///
/// Output is read by a background task and forwarded as [`EngineEvent`]s; when
/// the process closes stdout the channel closes and the handle reports dead.
pub struct StockfishEngine {
    label: String,
    process: Child,
    stdin: ChildStdin,
    event_rx: mpsc::Receiver<EngineEvent>,
    multipv: u32,
    searching: bool,
}

impl StockfishEngine {
    /// Spawn a new Stockfish instance and complete the UCI handshake.
    #[tracing::instrument(level = "debug", skip(config), fields(label = ?config.label))]
    pub async fn spawn_with_config(config: StockfishConfig) -> Result<Self, EngineError> {
        let label = config.label.clone().unwrap_or_else(|| "stockfish".to_string());
        let path = match config.path.clone() {
            Some(path) => path,
            None => find_stockfish_path()
                .ok_or_else(|| EngineError::Spawn("Stockfish not found".to_string()))?,
        };
        tracing::debug!(engine = %label, path = %path.display(), "Spawning Stockfish process");

        let mut process = tokio::process::Command::new(&path)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                tracing::error!(engine = %label, "Failed to spawn Stockfish: {}", e);
                EngineError::Spawn(format!("{}: {}", path.display(), e))
            })?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| EngineError::Spawn("Failed to get stdin".to_string()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| EngineError::Spawn("Failed to get stdout".to_string()))?;

        let (event_tx, event_rx) = mpsc::channel::<EngineEvent>(256);

        // Spawn output reader task
        let reader_label = label.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        tracing::debug!(engine = %reader_label, "Stockfish stdout EOF - engine closed");
                        break;
                    }
                    Ok(_) => {
                        let trimmed = line.trim();
                        tracing::trace!(engine = %reader_label, "UCI << {}", trimmed);

                        let event = match parse_uci_message(trimmed) {
                            Ok(UciMessage::UciOk) | Ok(UciMessage::ReadyOk) => EngineEvent::Ready,
                            Ok(UciMessage::BestMove { mv, .. }) => EngineEvent::BestMove(mv),
                            Ok(UciMessage::Info(info)) => EngineEvent::Info(info),
                            Ok(UciMessage::Id { .. }) => continue,
                            Err(_) => {
                                tracing::trace!(engine = %reader_label, "Ignoring UCI line: {}", trimmed);
                                continue;
                            }
                        };

                        if event_tx.send(event).await.is_err() {
                            // Handle dropped; nobody is listening anymore.
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(engine = %reader_label, "Error reading from Stockfish stdout: {}", e);
                        break;
                    }
                }
            }
            tracing::debug!(engine = %reader_label, "Output reader task exiting");
        });

        let mut engine = Self {
            label,
            process,
            stdin,
            event_rx,
            multipv: 1,
            searching: false,
        };

        engine.send("uci").await?;
        engine.wait_ready().await?;

        if let Some(threads) = config.threads {
            let threads = threads.clamp(1, 16);
            engine
                .send(&format!("setoption name Threads value {}", threads))
                .await?;
        }
        if let Some(hash_mb) = config.hash_mb {
            let hash_mb = hash_mb.clamp(1, 2048);
            engine
                .send(&format!("setoption name Hash value {}", hash_mb))
                .await?;
        }
        engine.send("isready").await?;
        engine.wait_ready().await?;

        tracing::info!(engine = %engine.label, "Stockfish engine spawned and initialized");
        Ok(engine)
    }

    async fn send(&mut self, cmd: &str) -> Result<(), EngineError> {
        tracing::trace!(engine = %self.label, "UCI >> {}", cmd);
        let line = format!("{}\n", cmd);
        let written = match self.stdin.write_all(line.as_bytes()).await {
            Ok(()) => self.stdin.flush().await,
            Err(e) => Err(e),
        };
        written.map_err(|e| EngineError::Dead(format!("{}: write failed: {}", self.label, e)))
    }

    async fn wait_ready(&mut self) -> Result<(), EngineError> {
        let label = self.label.clone();
        let rx = &mut self.event_rx;
        let wait = async {
            while let Some(event) = rx.recv().await {
                if matches!(event, EngineEvent::Ready) {
                    return Ok(());
                }
            }
            Err(EngineError::Dead(format!(
                "{}: closed before completing handshake",
                label
            )))
        };

        match tokio::time::timeout(HANDSHAKE_TIMEOUT, wait).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(engine = %self.label, "Timeout waiting for engine to respond");
                Err(EngineError::Timeout(HANDSHAKE_TIMEOUT))
            }
        }
    }

    /// Consume events until the current search reports `bestmove`.
    async fn drain_search(&mut self) -> Result<(), EngineError> {
        while self.searching {
            match self.event_rx.recv().await {
                Some(EngineEvent::BestMove(_)) => self.searching = false,
                Some(_) => {}
                None => return Err(self.closed()),
            }
        }
        Ok(())
    }

    fn closed(&self) -> EngineError {
        EngineError::Dead(format!("{}: output stream closed", self.label))
    }
}

impl Engine for StockfishEngine {
    fn label(&self) -> &str {
        &self.label
    }

    async fn analyze(
        &mut self,
        fen: &str,
        limits: SearchLimits,
        multipv: u32,
    ) -> Result<Vec<PvLine>, EngineError> {
        // A previous call may have been abandoned mid-search.
        self.drain_search().await?;

        let multipv = multipv.clamp(1, MAX_MULTIPV);
        if multipv != self.multipv {
            self.send(&format!("setoption name MultiPV value {}", multipv))
                .await?;
            self.multipv = multipv;
        }

        self.send(&format!("position fen {}", fen)).await?;
        let mut go = format!("go movetime {}", limits.movetime.as_millis());
        if let Some(depth) = limits.depth {
            go.push_str(&format!(" depth {}", depth));
        }
        self.send(&go).await?;
        self.searching = true;

        let mut lines: Vec<Option<PvLine>> = vec![None; multipv as usize];
        let mut stats = SearchStats::default();
        loop {
            match self.event_rx.recv().await {
                Some(EngineEvent::Info(info)) => {
                    stats.record(&info);
                    let Some(score) = info.score else { continue };
                    if info.pv.is_empty() {
                        continue;
                    }
                    let rank = info.multipv.unwrap_or(1).max(1);
                    if let Some(slot) = lines.get_mut(rank as usize - 1) {
                        *slot = Some(PvLine {
                            multipv: rank,
                            score,
                            pv: info.pv,
                            depth: info.depth,
                        });
                    }
                }
                Some(EngineEvent::BestMove(_)) => {
                    self.searching = false;
                    tracing::trace!(engine = %self.label, fen, ?stats, "Search finished");
                    break;
                }
                Some(EngineEvent::Ready) => {}
                None => {
                    tracing::warn!(engine = %self.label, fen, "Engine closed during analysis");
                    return Err(self.closed());
                }
            }
        }

        Ok(lines.into_iter().flatten().collect())
    }

    async fn stop(&mut self) -> Result<(), EngineError> {
        if !self.searching {
            return Ok(());
        }
        tracing::debug!(engine = %self.label, "Sending stop command to engine");
        self.send("stop").await?;
        self.drain_search().await
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.process.try_wait(), Ok(None))
    }

    fn terminate(&mut self) {
        let _ = self.process.start_kill();
    }

    async fn shutdown(mut self) {
        tracing::debug!(engine = %self.label, "Shutting down Stockfish");
        let _ = self.send("quit").await;
        if tokio::time::timeout(QUIT_TIMEOUT, self.process.wait())
            .await
            .is_err()
        {
            tracing::warn!(engine = %self.label, "Stockfish ignored quit, killing");
            let _ = self.process.kill().await;
        }
    }
}

/// Spawns [`StockfishEngine`]s that share one configuration.
#[derive(Debug, Clone, Default)]
pub struct StockfishSpawner {
    config: StockfishConfig,
}

impl StockfishSpawner {
    pub fn new(config: StockfishConfig) -> Self {
        Self { config }
    }
}

impl EngineSpawner for StockfishSpawner {
    type Engine = StockfishEngine;

    async fn spawn(&self, label: String) -> Result<StockfishEngine, EngineError> {
        StockfishEngine::spawn_with_config(StockfishConfig {
            label: Some(label),
            ..self.config.clone()
        })
        .await
    }
}

/// Find Stockfish executable in common locations
fn find_stockfish_path() -> Option<PathBuf> {
    let paths = [
        "/usr/local/bin/stockfish",
        "/usr/bin/stockfish",
        "/opt/homebrew/bin/stockfish",
        "/usr/games/stockfish",
    ];

    paths
        .iter()
        .map(Path::new)
        .find(|path| path.exists())
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("PATH").and_then(|dirs| find_in_path_list(&dirs)))
}

/// First `stockfish` file in a `PATH`-style directory list.
fn find_in_path_list(dirs: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(dirs)
        .map(|dir| dir.join("stockfish"))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_list_lookup() {
        let empty = tempfile::tempdir().expect("failed to create temp dir");
        let bin = tempfile::tempdir().expect("failed to create temp dir");
        std::fs::write(bin.path().join("stockfish"), "").unwrap();

        let dirs = std::env::join_paths([empty.path(), bin.path()]).unwrap();
        assert_eq!(
            find_in_path_list(&dirs),
            Some(bin.path().join("stockfish"))
        );

        let dirs = std::env::join_paths([empty.path()]).unwrap();
        assert_eq!(find_in_path_list(&dirs), None);
    }

    #[test]
    fn test_search_stats_keep_last_counted_line() {
        let mut stats = SearchStats::default();
        stats.record(&EngineInfo {
            depth: Some(10),
            nodes: Some(5000),
            ..EngineInfo::default()
        });
        stats.record(&EngineInfo {
            depth: Some(11),
            ..EngineInfo::default()
        });
        assert_eq!(stats.depth, Some(10));
        assert_eq!(stats.nodes, Some(5000));
    }
}
