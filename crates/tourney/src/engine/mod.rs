//! Engine capability: something that picks moves for a position.
//!
//! Two implementations exist:
//!
//! - [`process::UciEngine`] - an engine subprocess spoken to over UCI
//! - [`scripted::ScriptedEngine`] - an in-process engine that plays a fixed
//!   script, used for tests and dry runs
//!
//! Game sessions and the match scheduler only see the [`Engine`] and
//! [`EngineLauncher`] traits.

pub mod process;
pub mod scripted;

use crate::board::Board;
use crate::config::EngineDefinition;
use chrono::TimeDelta;
use shakmaty::Move;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while starting or talking to an engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The process could not be launched or did not finish the handshake.
    #[error("engine '{engine}' failed to start: {reason}")]
    Startup { engine: String, reason: String },
    /// The engine answered with something unusable.
    #[error("engine '{engine}' protocol error: {reason}")]
    Protocol { engine: String, reason: String },
    /// No answer within the hard deadline.
    #[error("engine '{engine}' did not answer within {waited:?}")]
    Timeout { engine: String, waited: Duration },
    /// Reading from or writing to the engine failed.
    #[error("engine '{engine}' I/O error: {source}")]
    Io {
        engine: String,
        source: std::io::Error,
    },
}

/// How long the engine may think about one move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchLimit {
    /// Fixed time per move. A hint to the engine, not enforced.
    MoveTime(Duration),
    /// Remaining clock time of both sides.
    Clock { white: TimeDelta, black: TimeDelta },
}

impl SearchLimit {
    /// The time the side to move is allowed to use, clamped at zero.
    pub fn budget_for(&self, white_to_move: bool) -> Duration {
        match *self {
            SearchLimit::MoveTime(d) => d,
            SearchLimit::Clock { white, black } => {
                let own = if white_to_move { white } else { black };
                own.to_std().unwrap_or(Duration::ZERO)
            }
        }
    }
}

/// A started engine that can be asked for moves.
pub trait Engine: Send {
    /// Name the engine reported (or was configured with).
    fn name(&self) -> &str;

    /// Searches the board's current position and returns the chosen move.
    ///
    /// The returned move is legal in that position.
    fn play(
        &mut self,
        board: &Board,
        limit: SearchLimit,
    ) -> impl Future<Output = Result<Move, EngineError>> + Send;

    /// Shuts the engine down. Safe to call more than once and after errors.
    fn stop(&mut self) -> impl Future<Output = ()> + Send;
}

/// Starts engines from their definitions.
pub trait EngineLauncher: Send + Sync + 'static {
    type Engine: Engine + 'static;

    /// Launches one fresh engine instance, configured and ready to play.
    fn start(
        &self,
        definition: &EngineDefinition,
    ) -> impl Future<Output = Result<Self::Engine, EngineError>> + Send;
}

/// Turns an engine's move string into a legal move for `board`.
pub(crate) fn resolve_move(engine: &str, board: &Board, text: &str) -> Result<Move, EngineError> {
    if uci::is_null_move(text) {
        return Err(EngineError::Protocol {
            engine: engine.to_string(),
            reason: format!("null move '{}' in a live position", text),
        });
    }
    board.parse_uci(text).map_err(|e| EngineError::Protocol {
        engine: engine.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movetime_budget_ignores_side() {
        let limit = SearchLimit::MoveTime(Duration::from_millis(100));
        assert_eq!(limit.budget_for(true), Duration::from_millis(100));
        assert_eq!(limit.budget_for(false), Duration::from_millis(100));
    }

    #[test]
    fn clock_budget_uses_own_time() {
        let limit = SearchLimit::Clock {
            white: TimeDelta::milliseconds(3000),
            black: TimeDelta::milliseconds(500),
        };
        assert_eq!(limit.budget_for(true), Duration::from_millis(3000));
        assert_eq!(limit.budget_for(false), Duration::from_millis(500));
    }

    #[test]
    fn negative_clock_budget_is_zero() {
        let limit = SearchLimit::Clock {
            white: TimeDelta::milliseconds(-20),
            black: TimeDelta::milliseconds(500),
        };
        assert_eq!(limit.budget_for(true), Duration::ZERO);
    }

    #[test]
    fn resolve_move_rejects_null_and_illegal_moves() {
        let board = Board::new();
        assert!(matches!(
            resolve_move("x", &board, "0000"),
            Err(EngineError::Protocol { .. })
        ));
        assert!(matches!(
            resolve_move("x", &board, "e2e5"),
            Err(EngineError::Protocol { .. })
        ));
        assert!(resolve_move("x", &board, "e2e4").is_ok());
    }

    #[test]
    fn error_messages_name_the_engine() {
        let err = EngineError::Timeout {
            engine: "slowpoke".to_string(),
            waited: Duration::from_secs(2),
        };
        assert!(err.to_string().contains("slowpoke"));
    }
}
