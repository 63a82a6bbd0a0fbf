//! In-process engine that plays a fixed list of moves.
//!
//! Used to exercise sessions and matches deterministically without
//! spawning processes. When its script runs out the engine plays the first
//! legal move in the position.

use super::{resolve_move, Engine, EngineError, EngineLauncher, SearchLimit};
use crate::board::Board;
use crate::config::EngineDefinition;
use shakmaty::{Color, Move, Position};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What a scripted engine plays.
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Moves played when the engine has White, in order.
    pub white: Vec<String>,
    /// Moves played when the engine has Black, in order.
    pub black: Vec<String>,
    /// Simulated thinking time per move.
    pub delay: Duration,
    /// Fail with a protocol error after this many moves.
    pub fail_after: Option<usize>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_white<S: AsRef<str>>(mut self, moves: &[S]) -> Self {
        self.white = moves.iter().map(|m| m.as_ref().to_string()).collect();
        self
    }

    pub fn as_black<S: AsRef<str>>(mut self, moves: &[S]) -> Self {
        self.black = moves.iter().map(|m| m.as_ref().to_string()).collect();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_after(mut self, moves: usize) -> Self {
        self.fail_after = Some(moves);
        self
    }
}

/// A started scripted engine.
pub struct ScriptedEngine {
    name: String,
    script: Script,
    played: usize,
    stopped: Option<Arc<AtomicUsize>>,
}

impl ScriptedEngine {
    pub fn new(name: impl Into<String>, script: Script) -> Self {
        Self {
            name: name.into(),
            script,
            played: 0,
            stopped: None,
        }
    }

    fn scripted_move(&self, board: &Board) -> Option<&str> {
        let line = match board.turn() {
            Color::White => &self.script.white,
            Color::Black => &self.script.black,
        };
        line.get(board.ply_count() / 2).map(String::as_str)
    }
}

impl Engine for ScriptedEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn play(&mut self, board: &Board, _limit: SearchLimit) -> Result<Move, EngineError> {
        if !self.script.delay.is_zero() {
            tokio::time::sleep(self.script.delay).await;
        }

        if self.script.fail_after.is_some_and(|n| self.played >= n) {
            return Err(EngineError::Protocol {
                engine: self.name.clone(),
                reason: format!("scripted failure after {} moves", self.played),
            });
        }

        let mv = match self.scripted_move(board) {
            Some(text) => resolve_move(&self.name, board, text)?,
            None => board
                .position()
                .legal_moves()
                .first()
                .cloned()
                .ok_or_else(|| EngineError::Protocol {
                    engine: self.name.clone(),
                    reason: "no legal move available".to_string(),
                })?,
        };
        self.played += 1;
        Ok(mv)
    }

    async fn stop(&mut self) {
        if let Some(counter) = self.stopped.take() {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Launches scripted engines by definition name.
///
/// Keeps count of launched and stopped engines so callers can check that
/// every engine was shut down.
#[derive(Debug, Clone, Default)]
pub struct ScriptedLauncher {
    scripts: HashMap<String, Script>,
    launched: Arc<AtomicUsize>,
    stopped: Arc<AtomicUsize>,
}

impl ScriptedLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(mut self, name: impl Into<String>, script: Script) -> Self {
        self.scripts.insert(name.into(), script);
        self
    }

    pub fn launched(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl EngineLauncher for ScriptedLauncher {
    type Engine = ScriptedEngine;

    async fn start(&self, definition: &EngineDefinition) -> Result<ScriptedEngine, EngineError> {
        let script = self
            .scripts
            .get(&definition.name)
            .cloned()
            .ok_or_else(|| EngineError::Startup {
                engine: definition.name.clone(),
                reason: "no script for this engine".to_string(),
            })?;

        self.launched.fetch_add(1, Ordering::SeqCst);
        let mut engine = ScriptedEngine::new(definition.name.clone(), script);
        engine.stopped = Some(Arc::clone(&self.stopped));
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movetime() -> SearchLimit {
        SearchLimit::MoveTime(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn plays_script_for_its_colour() {
        let script = Script::new().as_white(&["e2e4", "g1f3"]).as_black(&["e7e5"]);
        let mut engine = ScriptedEngine::new("s", script);

        let mut board = Board::new();
        let mv = engine.play(&board, movetime()).await.unwrap();
        assert_eq!(mv, board.parse_uci("e2e4").unwrap());
        board.push(mv).unwrap();

        let mv = engine.play(&board, movetime()).await.unwrap();
        assert_eq!(mv, board.parse_uci("e7e5").unwrap());
        board.push(mv).unwrap();

        let mv = engine.play(&board, movetime()).await.unwrap();
        assert_eq!(mv, board.parse_uci("g1f3").unwrap());
    }

    #[tokio::test]
    async fn exhausted_script_falls_back_to_a_legal_move() {
        let mut engine = ScriptedEngine::new("s", Script::new());
        let board = Board::new();

        let mv = engine.play(&board, movetime()).await.unwrap();
        assert!(board.position().legal_moves().contains(&mv));
    }

    #[tokio::test]
    async fn illegal_scripted_move_is_a_protocol_error() {
        let mut engine = ScriptedEngine::new("s", Script::new().as_white(&["e2e5"]));
        let result = engine.play(&Board::new(), movetime()).await;
        assert!(matches!(result, Err(EngineError::Protocol { .. })));
    }

    #[tokio::test]
    async fn fails_after_configured_moves() {
        let mut engine = ScriptedEngine::new("s", Script::new().failing_after(1));
        let mut board = Board::new();

        let mv = engine.play(&board, movetime()).await.unwrap();
        board.push(mv).unwrap();
        let mv = board.position().legal_moves()[0].clone();
        board.push(mv).unwrap();

        assert!(engine.play(&board, movetime()).await.is_err());
    }

    #[tokio::test]
    async fn launcher_counts_starts_and_stops() {
        let launcher = ScriptedLauncher::new().with_script("a", Script::new());
        let def = EngineDefinition::new("a", "/bin/a");

        let mut engine = launcher.start(&def).await.unwrap();
        assert_eq!(launcher.launched(), 1);
        assert_eq!(launcher.stopped(), 0);

        engine.stop().await;
        engine.stop().await;
        assert_eq!(launcher.stopped(), 1);
    }

    #[tokio::test]
    async fn unknown_engine_fails_to_start() {
        let launcher = ScriptedLauncher::new();
        let def = EngineDefinition::new("missing", "/bin/missing");
        let result = launcher.start(&def).await;
        assert!(matches!(result, Err(EngineError::Startup { .. })));
    }
}
