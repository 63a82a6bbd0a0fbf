//! Tourney - pit two UCI chess engines against each other.
//!
//! This crate plays matches between two engine configurations, records every
//! decided game in SQLite and reports win/draw/loss statistics.
//!
//! # Modules
//!
//! - [`engine`] - Engine capability, UCI subprocess and scripted engines
//! - [`board`] - Position, move list and end-of-game rules
//! - [`clock`] - Per-side chess clock
//! - [`session`] - One game, played to a decision
//! - [`pgn`] - PGN transcripts
//! - [`storage`] - SQLite storage for engines and games
//! - [`summary`] - Win/draw/loss statistics
//! - [`scheduler`] - Concurrent match execution
//! - [`config`] - Engine definitions and runner configuration

pub mod board;
pub mod clock;
pub mod config;
pub mod engine;
pub mod pgn;
pub mod scheduler;
pub mod session;
pub mod storage;
pub mod summary;

pub use config::{EngineDefinition, OptionValue, TourneyConfig};
pub use scheduler::{MatchReport, MatchRunner};
pub use session::{EndingType, GameOutcome, GameSession, Score, TimeControl};
pub use storage::Store;
