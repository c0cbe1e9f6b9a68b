//! Scripted in-process engine for pipeline tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use analysis::{AnalysisConfig, Game, Position, ProgressError, ProgressSink};
use engine::uci::parse_uci_move;
use engine::{Engine, EngineError, EngineSpawner, PvLine, Score, SearchLimits};

pub const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
pub const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";
pub const AFTER_E4_E5: &str = "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2";
pub const AFTER_NF3: &str = "rnbqkbnr/pppp1ppp/8/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R b KQkq - 1 2";

/// What the mock does when asked to analyze a FEN.
#[derive(Debug, Clone)]
pub enum Behavior {
    Answer(Vec<PvLine>),
    /// Never answers; `stop` recovers the handle.
    Hang,
    /// Never answers and never acknowledges `stop`.
    Wedge,
    /// The process dies mid-search.
    Crash,
}

#[derive(Debug, Clone)]
struct Script {
    delay: Duration,
    behavior: Behavior,
}

#[derive(Debug, Default)]
pub struct MockState {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    spawned: AtomicUsize,
    terminated: AtomicUsize,
    fail_spawn: AtomicBool,
    processes: Mutex<Vec<Arc<AtomicBool>>>,
}

/// Spawner handing out [`MockEngine`]s that share one [`MockState`].
#[derive(Debug, Clone, Default)]
pub struct MockSpawner {
    pub state: Arc<MockState>,
}

impl MockSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, fen: &str, delay: Duration, behavior: Behavior) -> &Self {
        self.state
            .scripts
            .lock()
            .unwrap()
            .insert(fen.to_string(), Script { delay, behavior });
        self
    }

    pub fn answer(&self, fen: &str, lines: Vec<PvLine>) -> &Self {
        self.script(fen, Duration::from_millis(5), Behavior::Answer(lines))
    }

    pub fn fail_spawns(&self) {
        self.state.fail_spawn.store(true, Ordering::SeqCst);
    }

    /// Every engine process started so far exits on its own.
    pub fn kill_all(&self) {
        for process in self.state.processes.lock().unwrap().iter() {
            process.store(false, Ordering::SeqCst);
        }
    }

    pub fn calls_for(&self, fen: &str) -> usize {
        self.state.calls.lock().unwrap().get(fen).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state.calls.lock().unwrap().values().sum()
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn spawned(&self) -> usize {
        self.state.spawned.load(Ordering::SeqCst)
    }

    pub fn terminated(&self) -> usize {
        self.state.terminated.load(Ordering::SeqCst)
    }
}

impl EngineSpawner for MockSpawner {
    type Engine = MockEngine;

    async fn spawn(&self, label: String) -> Result<MockEngine, EngineError> {
        if self.state.fail_spawn.load(Ordering::SeqCst) {
            return Err(EngineError::Spawn("mock engine refused to start".to_string()));
        }
        self.state.spawned.fetch_add(1, Ordering::SeqCst);
        let alive = Arc::new(AtomicBool::new(true));
        self.state.processes.lock().unwrap().push(Arc::clone(&alive));
        Ok(MockEngine {
            label,
            state: Arc::clone(&self.state),
            alive,
            wedged: false,
        })
    }
}

pub struct MockEngine {
    label: String,
    state: Arc<MockState>,
    alive: Arc<AtomicBool>,
    wedged: bool,
}

struct InFlight<'a>(&'a MockState);

impl<'a> InFlight<'a> {
    fn enter(state: &'a MockState) -> Self {
        let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(state)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Engine for MockEngine {
    fn label(&self) -> &str {
        &self.label
    }

    async fn analyze(
        &mut self,
        fen: &str,
        _limits: SearchLimits,
        multipv: u32,
    ) -> Result<Vec<PvLine>, EngineError> {
        *self
            .state
            .calls
            .lock()
            .unwrap()
            .entry(fen.to_string())
            .or_default() += 1;
        let script = self.state.scripts.lock().unwrap().get(fen).cloned();
        let state = Arc::clone(&self.state);
        let _flight = InFlight::enter(&state);

        let Some(script) = script else {
            tokio::time::sleep(Duration::from_millis(5)).await;
            return Ok(vec![line(1, 0, "a2a3")]);
        };
        tokio::time::sleep(script.delay).await;

        match script.behavior {
            Behavior::Answer(lines) => Ok(lines.into_iter().take(multipv as usize).collect()),
            Behavior::Hang => std::future::pending().await,
            Behavior::Wedge => {
                self.wedged = true;
                std::future::pending().await
            }
            Behavior::Crash => {
                self.terminate();
                Err(EngineError::Dead(format!("{}: output stream closed", self.label)))
            }
        }
    }

    async fn stop(&mut self) -> Result<(), EngineError> {
        if self.wedged {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    fn is_alive(&mut self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Counts only processes that were still running.
    fn terminate(&mut self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            self.state.terminated.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn shutdown(mut self) {
        self.terminate();
    }
}

pub fn line(rank: u32, cp: i32, uci: &str) -> PvLine {
    PvLine {
        multipv: rank,
        score: Score::Centipawns(cp),
        pv: vec![parse_uci_move(uci).unwrap()],
        depth: Some(18),
    }
}

pub fn mate_line(rank: u32, moves: i32, uci: &str) -> PvLine {
    PvLine {
        score: Score::Mate(moves),
        ..line(rank, 0, uci)
    }
}

/// Opening lines for the FEN constants above.
pub fn script_opening(spawner: &MockSpawner) {
    spawner
        .answer(
            START,
            vec![line(1, 30, "e2e4"), line(2, 25, "d2d4"), line(3, 20, "g1f3")],
        )
        .answer(AFTER_E4, vec![line(1, -25, "c7c5"), line(2, -30, "e7e5")])
        .answer(AFTER_E4_E5, vec![line(1, 40, "g1f3"), line(2, 20, "f1c4")])
        .answer(AFTER_NF3, vec![line(1, -35, "b8c6"), line(2, -50, "g8f6")]);
}

pub fn position(move_number: u32, fen: &str, played_move: &str) -> Position {
    Position {
        move_number,
        fen: fen.to_string(),
        played_move: played_move.to_string(),
    }
}

pub fn game(id: &str, moves: Vec<Position>) -> Game {
    Game {
        game_id: id.to_string(),
        time_control: "600".to_string(),
        moves,
    }
}

/// The four opening positions of 1. e4 e5 2. Nf3 Nc6.
pub fn opening_game(id: &str) -> Game {
    game(
        id,
        vec![
            position(1, START, "e4"),
            position(1, AFTER_E4, "e5"),
            position(2, AFTER_E4_E5, "Nf3"),
            position(2, AFTER_NF3, "Nc6"),
        ],
    )
}

pub fn fast_config(pool_size: usize) -> AnalysisConfig {
    AnalysisConfig {
        time_limit: Duration::from_millis(100),
        grace: Duration::from_millis(50),
        pool_size,
        ..AnalysisConfig::default()
    }
}

pub type ProgressLog = Arc<Mutex<Vec<(u8, u8, String)>>>;

/// A progress sink that records every call.
pub fn recording_sink() -> (Arc<dyn ProgressSink>, ProgressLog) {
    let log: ProgressLog = Arc::default();
    let sink_log = Arc::clone(&log);
    let sink = move |percent: u8, total: u8, status: &str| -> Result<(), ProgressError> {
        sink_log
            .lock()
            .unwrap()
            .push((percent, total, status.to_string()));
        Ok(())
    };
    (Arc::new(sink), log)
}
