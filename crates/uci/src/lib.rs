//! UCI (Universal Chess Interface) protocol codec for the controlling side.
//!
//! This crate formats the commands a GUI or match runner sends to an engine
//! and parses the lines an engine writes back.
//!
//! # Commands sent to the engine
//!
//! - `uci` - Initialize engine, get id and options
//! - `setoption name <name> [value <value>]` - Configure an option
//! - `ucinewgame` - Announce that the next position belongs to a new game
//! - `isready` / `readyok` - Synchronization
//! - `position (startpos | fen <fen>) [moves <move>...]` - Set position
//! - `go (movetime <ms> | wtime <ms> btime <ms>)` - Start search
//! - `quit` - Exit engine
//!
//! # Messages read from the engine
//!
//! - `id name <name>` / `id author <author>`
//! - `uciok`, `readyok`
//! - `bestmove <move> [ponder <move>]`
//! - `info ...` (kept verbatim)

mod command;
mod message;

pub use command::{GoOptions, GuiCommand};
pub use message::EngineMessage;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum UciError {
    #[error("Empty message")]
    Empty,
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Null move tokens some engines send instead of a real best move.
pub const NULL_MOVES: [&str; 3] = ["0000", "(none)", "none"];

/// Returns true if `mv` is one of the null move spellings.
pub fn is_null_move(mv: &str) -> bool {
    NULL_MOVES.contains(&mv)
}
