//! One game between two engines.
//!
//! A [`GameSession`] owns the board and both clocks and asks the engines for
//! moves in turn until the game is decided:
//!
//! ```text
//! Idle ──step──▶ InProgress ──step──▶ ... ──step──▶ Decided(GameOutcome)
//! ```
//!
//! Each step starts the mover's clock, requests a move, stops the clock,
//! and then either flags the mover (clock mode, time below zero) or applies
//! the move and classifies the new position.

use crate::board::{Board, BoardError, Termination};
use crate::clock::{Clock, ClockError};
use crate::config::ConfigError;
use crate::engine::{Engine, EngineError, SearchLimit};
use crate::pgn::{self, GameTags};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use shakmaty::Color;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// How thinking time is limited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeControl {
    /// Each side has a budget for the whole game. Running out loses.
    Clock { initial: Duration },
    /// Fixed time per move, passed to the engine and not enforced.
    MoveTime(Duration),
}

impl Default for TimeControl {
    fn default() -> Self {
        TimeControl::Clock {
            initial: Duration::from_secs(60),
        }
    }
}

impl TimeControl {
    /// Value of the PGN `TimeControl` tag.
    pub fn pgn_tag(&self) -> String {
        match self {
            TimeControl::Clock { initial } => format!("{}", initial.as_secs_f64()),
            TimeControl::MoveTime(_) => "-".to_string(),
        }
    }

    /// Starting value of each clock. In per-move mode the clocks only
    /// count time used, so they start at zero.
    fn initial_budget(&self) -> Duration {
        match self {
            TimeControl::Clock { initial } => *initial,
            TimeControl::MoveTime(_) => Duration::ZERO,
        }
    }
}

impl FromStr for TimeControl {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidTimeControl(s.to_string());
        let (kind, millis) = s.trim().split_once(':').ok_or_else(invalid)?;
        let millis: u64 = millis.trim().parse().map_err(|_| invalid())?;
        let duration = Duration::from_millis(millis);

        match kind.trim() {
            "clock" => Ok(TimeControl::Clock { initial: duration }),
            "movetime" => Ok(TimeControl::MoveTime(duration)),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for TimeControl {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeControl> for String {
    fn from(tc: TimeControl) -> Self {
        tc.to_string()
    }
}

impl fmt::Display for TimeControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeControl::Clock { initial } => write!(f, "clock:{}", initial.as_millis()),
            TimeControl::MoveTime(d) => write!(f, "movetime:{}", d.as_millis()),
        }
    }
}

/// Per-game settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionSettings {
    pub time_control: TimeControl,
    /// Games reaching this many plies without a result end as `Unknown`.
    pub max_plies: Option<u32>,
}

/// Points scored by one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Score {
    Loss,
    Draw,
    Win,
}

impl Score {
    pub fn as_f64(self) -> f64 {
        match self {
            Score::Loss => 0.0,
            Score::Draw => 0.5,
            Score::Win => 1.0,
        }
    }

    /// The opponent's score.
    pub fn opposite(self) -> Self {
        match self {
            Score::Loss => Score::Win,
            Score::Draw => Score::Draw,
            Score::Win => Score::Loss,
        }
    }
}

/// Why a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndingType {
    Checkmate,
    Stalemate,
    FivefoldRepetition,
    InsufficientMaterial,
    SeventyFiveMoveRule,
    ClockExpired,
    Unknown,
}

impl EndingType {
    pub const ALL: [EndingType; 7] = [
        EndingType::Checkmate,
        EndingType::Stalemate,
        EndingType::FivefoldRepetition,
        EndingType::InsufficientMaterial,
        EndingType::SeventyFiveMoveRule,
        EndingType::ClockExpired,
        EndingType::Unknown,
    ];

    /// Name stored in the `ending_types` table.
    pub fn name(&self) -> &'static str {
        match self {
            EndingType::Checkmate => "Checkmate",
            EndingType::Stalemate => "Stalemate",
            EndingType::FivefoldRepetition => "Fivefold repetition",
            EndingType::InsufficientMaterial => "Insufficient material",
            EndingType::SeventyFiveMoveRule => "Seventy-five move rule",
            EndingType::ClockExpired => "Clock ran out",
            EndingType::Unknown => "Unknown",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.name() == name)
    }
}

impl fmt::Display for EndingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<Termination> for EndingType {
    fn from(t: Termination) -> Self {
        match t {
            Termination::Checkmate { .. } => EndingType::Checkmate,
            Termination::Stalemate => EndingType::Stalemate,
            Termination::FivefoldRepetition => EndingType::FivefoldRepetition,
            Termination::InsufficientMaterial => EndingType::InsufficientMaterial,
            Termination::SeventyFiveMoveRule => EndingType::SeventyFiveMoveRule,
        }
    }
}

/// Result of a decided game.
#[derive(Debug, Clone, PartialEq)]
pub struct GameOutcome {
    pub white_score: Score,
    pub black_score: Score,
    pub ending: EndingType,
    /// Moves in UCI notation, in playing order.
    pub moves: Vec<String>,
    /// Starting FEN, `None` for the standard position.
    pub start_fen: Option<String>,
    pub final_fen: String,
    pub pgn: String,
}

impl GameOutcome {
    /// PGN result token: `1-0`, `0-1` or `1/2-1/2`.
    pub fn result_token(&self) -> &'static str {
        match self.white_score {
            Score::Win => "1-0",
            Score::Loss => "0-1",
            Score::Draw => "1/2-1/2",
        }
    }
}

/// A game that could not be played to a result.
#[derive(Error, Debug)]
pub enum GameError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("clock misuse: {0}")]
    Clock(#[from] ClockError),
    #[error("engine move rejected: {0}")]
    IllegalMove(#[from] BoardError),
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    InProgress,
    Decided,
}

enum State {
    Idle,
    InProgress,
    Decided(GameOutcome),
}

/// Drives one game between two started engines.
pub struct GameSession<'a, E: Engine> {
    white: &'a mut E,
    black: &'a mut E,
    settings: SessionSettings,
    tags: GameTags,
    board: Board,
    white_clock: Clock,
    black_clock: Clock,
    state: State,
}

impl<'a, E: Engine> GameSession<'a, E> {
    /// A session from the standard starting position.
    pub fn new(white: &'a mut E, black: &'a mut E, settings: SessionSettings) -> Self {
        Self::from_board(white, black, settings, Board::new())
    }

    /// A session continuing from `board`.
    pub fn from_board(
        white: &'a mut E,
        black: &'a mut E,
        settings: SessionSettings,
        board: Board,
    ) -> Self {
        let tags = GameTags::new(white.name(), black.name());
        let budget = settings.time_control.initial_budget();
        Self {
            white,
            black,
            settings,
            tags,
            board,
            white_clock: Clock::new(budget),
            black_clock: Clock::new(budget),
            state: State::Idle,
        }
    }

    /// Replaces the PGN header values.
    pub fn with_tags(mut self, tags: GameTags) -> Self {
        self.tags = tags;
        self
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn clock(&self, color: Color) -> &Clock {
        match color {
            Color::White => &self.white_clock,
            Color::Black => &self.black_clock,
        }
    }

    pub fn state(&self) -> SessionState {
        match self.state {
            State::Idle => SessionState::Idle,
            State::InProgress => SessionState::InProgress,
            State::Decided(_) => SessionState::Decided,
        }
    }

    pub fn outcome(&self) -> Option<&GameOutcome> {
        match &self.state {
            State::Decided(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// Plays one ply, or decides a game that starts in a terminal position.
    ///
    /// Does nothing once the game is decided.
    ///
    /// # Errors
    ///
    /// Any engine failure, clock misuse or illegal move aborts the game.
    /// The session is left as it was and must not be recorded.
    pub async fn step(&mut self) -> Result<SessionState, GameError> {
        match self.state {
            State::Decided(_) => return Ok(SessionState::Decided),
            State::Idle => {
                self.state = State::InProgress;
                if let Some(termination) = self.board.termination() {
                    self.decide_by_rules(termination);
                    return Ok(self.state());
                }
            }
            State::InProgress => {}
        }

        let mover = self.board.turn();
        let limit = match self.settings.time_control {
            TimeControl::Clock { .. } => SearchLimit::Clock {
                white: self.white_clock.remaining(),
                black: self.black_clock.remaining(),
            },
            TimeControl::MoveTime(d) => SearchLimit::MoveTime(d),
        };
        let (engine, clock) = match mover {
            Color::White => (&mut *self.white, &mut self.white_clock),
            Color::Black => (&mut *self.black, &mut self.black_clock),
        };

        clock.start()?;
        let played = engine.play(&self.board, limit).await;
        let remaining = clock.stop()?;
        let mv = played?;

        if matches!(self.settings.time_control, TimeControl::Clock { .. })
            && remaining < TimeDelta::zero()
        {
            tracing::debug!(
                side = ?mover,
                overrun_ms = -remaining.num_milliseconds(),
                "Flag fell"
            );
            let winner = !mover;
            self.decide(winner_scores(winner), EndingType::ClockExpired);
            return Ok(self.state());
        }

        self.board.push(mv)?;

        if let Some(termination) = self.board.termination() {
            self.decide_by_rules(termination);
        } else if self
            .settings
            .max_plies
            .is_some_and(|cap| self.board.ply_count() >= cap as usize)
        {
            self.decide((Score::Draw, Score::Draw), EndingType::Unknown);
        }

        Ok(self.state())
    }

    /// Plays until the game is decided.
    pub async fn run(mut self) -> Result<GameOutcome, GameError> {
        loop {
            self.step().await?;
            if let State::Decided(outcome) = self.state {
                return Ok(outcome);
            }
        }
    }

    fn decide_by_rules(&mut self, termination: Termination) {
        let scores = match termination {
            Termination::Checkmate { winner } => winner_scores(winner),
            _ => (Score::Draw, Score::Draw),
        };
        self.decide(scores, termination.into());
    }

    fn decide(&mut self, (white_score, black_score): (Score, Score), ending: EndingType) {
        let mut outcome = GameOutcome {
            white_score,
            black_score,
            ending,
            moves: self.board.moves().to_vec(),
            start_fen: self.board.start_fen().map(str::to_string),
            final_fen: self.board.fen(),
            pgn: String::new(),
        };
        outcome.pgn = pgn::render(&self.tags, self.settings.time_control, &outcome);
        self.state = State::Decided(outcome);
    }
}

fn winner_scores(winner: Color) -> (Score, Score) {
    match winner {
        Color::White => (Score::Win, Score::Loss),
        Color::Black => (Score::Loss, Score::Win),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scripted::{Script, ScriptedEngine};

    const SCHOLAR_WHITE: [&str; 4] = ["e2e4", "f1c4", "d1h5", "h5f7"];
    const SCHOLAR_BLACK: [&str; 3] = ["e7e5", "b8c6", "g8f6"];

    fn clock_settings(ms: u64) -> SessionSettings {
        SessionSettings {
            time_control: TimeControl::Clock {
                initial: Duration::from_millis(ms),
            },
            max_plies: None,
        }
    }

    fn engines(white: Script, black: Script) -> (ScriptedEngine, ScriptedEngine) {
        (
            ScriptedEngine::new("white", white),
            ScriptedEngine::new("black", black),
        )
    }

    #[tokio::test]
    async fn scholars_mate_is_a_white_win() {
        let (mut w, mut b) = engines(
            Script::new().as_white(&SCHOLAR_WHITE),
            Script::new().as_black(&SCHOLAR_BLACK),
        );

        let outcome = GameSession::new(&mut w, &mut b, clock_settings(60_000))
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.white_score, Score::Win);
        assert_eq!(outcome.black_score, Score::Loss);
        assert_eq!(outcome.ending, EndingType::Checkmate);
        assert_eq!(outcome.moves.len(), 7);
        assert!(outcome.pgn.contains("[Result \"1-0\"]"));
        assert!(outcome.pgn.contains("[White \"white\"]"));
    }

    #[tokio::test]
    async fn fools_mate_is_a_black_win() {
        let (mut w, mut b) = engines(
            Script::new().as_white(&["f2f3", "g2g4"]),
            Script::new().as_black(&["e7e5", "d8h4"]),
        );

        let outcome = GameSession::new(&mut w, &mut b, clock_settings(60_000))
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.white_score, Score::Loss);
        assert_eq!(outcome.black_score, Score::Win);
        assert_eq!(outcome.ending, EndingType::Checkmate);
        assert_eq!(outcome.result_token(), "0-1");
    }

    #[tokio::test]
    async fn flag_fall_loses_and_move_is_not_applied() {
        let (mut w, mut b) = engines(
            Script::new().as_white(&SCHOLAR_WHITE),
            Script::new()
                .as_black(&SCHOLAR_BLACK)
                .with_delay(Duration::from_millis(50)),
        );

        let outcome = GameSession::new(&mut w, &mut b, clock_settings(20))
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.ending, EndingType::ClockExpired);
        assert_eq!(outcome.white_score, Score::Win);
        assert_eq!(outcome.black_score, Score::Loss);
        assert_eq!(outcome.moves, vec!["e2e4".to_string()]);
    }

    #[tokio::test]
    async fn movetime_is_not_enforced() {
        let (mut w, mut b) = engines(
            Script::new().as_white(&SCHOLAR_WHITE),
            Script::new()
                .as_black(&SCHOLAR_BLACK)
                .with_delay(Duration::from_millis(20)),
        );
        let settings = SessionSettings {
            time_control: TimeControl::MoveTime(Duration::from_millis(1)),
            max_plies: None,
        };

        let outcome = GameSession::new(&mut w, &mut b, settings)
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.ending, EndingType::Checkmate);
        assert!(outcome.pgn.contains("[TimeControl \"-\"]"));
    }

    #[tokio::test]
    async fn engine_failure_aborts_the_game() {
        let (mut w, mut b) = engines(
            Script::new().as_white(&SCHOLAR_WHITE),
            Script::new().as_black(&SCHOLAR_BLACK).failing_after(1),
        );

        let mut session = GameSession::new(&mut w, &mut b, clock_settings(60_000));
        let mut result = Ok(SessionState::Idle);
        for _ in 0..10 {
            result = session.step().await;
            if result.is_err() {
                break;
            }
        }

        assert!(matches!(result, Err(GameError::Engine(_))));
        assert!(session.outcome().is_none());
        assert_eq!(session.state(), SessionState::InProgress);
    }

    #[tokio::test]
    async fn knight_shuffle_ends_in_fivefold_repetition() {
        let (mut w, mut b) = engines(
            Script::new().as_white(&["g1f3", "f3g1", "g1f3", "f3g1", "g1f3", "f3g1", "g1f3", "f3g1"]),
            Script::new().as_black(&["g8f6", "f6g8", "g8f6", "f6g8", "g8f6", "f6g8", "g8f6", "f6g8"]),
        );

        let outcome = GameSession::new(&mut w, &mut b, clock_settings(60_000))
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.ending, EndingType::FivefoldRepetition);
        assert_eq!(outcome.white_score, Score::Draw);
        assert_eq!(outcome.black_score, Score::Draw);
        assert_eq!(outcome.moves.len(), 16);
    }

    #[tokio::test]
    async fn terminal_start_position_is_decided_without_moves() {
        let (mut w, mut b) = engines(Script::new(), Script::new());
        let board = Board::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();

        let mut session = GameSession::from_board(&mut w, &mut b, clock_settings(1_000), board);
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.step().await.unwrap(), SessionState::Decided);

        let outcome = session.outcome().unwrap();
        assert_eq!(outcome.ending, EndingType::Stalemate);
        assert!(outcome.moves.is_empty());
    }

    #[tokio::test]
    async fn ply_cap_ends_game_as_unknown() {
        let (mut w, mut b) = engines(
            Script::new().as_white(&["e2e4", "d2d4"]),
            Script::new().as_black(&["e7e5", "d7d5"]),
        );
        let settings = SessionSettings {
            max_plies: Some(3),
            ..clock_settings(60_000)
        };

        let outcome = GameSession::new(&mut w, &mut b, settings)
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.ending, EndingType::Unknown);
        assert_eq!(outcome.moves.len(), 3);
        assert_eq!(outcome.white_score, Score::Draw);
    }

    #[tokio::test]
    async fn step_after_decision_is_a_no_op() {
        let (mut w, mut b) = engines(
            Script::new().as_white(&["f2f3", "g2g4"]),
            Script::new().as_black(&["e7e5", "d8h4"]),
        );
        let mut session = GameSession::new(&mut w, &mut b, clock_settings(60_000));
        while session.step().await.unwrap() != SessionState::Decided {}

        assert_eq!(session.step().await.unwrap(), SessionState::Decided);
        assert_eq!(session.board().ply_count(), 4);
    }

    #[test]
    fn scores_of_decided_games_sum_to_one() {
        for white in [Score::Loss, Score::Draw, Score::Win] {
            assert_eq!(white.as_f64() + white.opposite().as_f64(), 1.0);
        }
    }

    #[test]
    fn ending_names_round_trip() {
        for ending in EndingType::ALL {
            assert_eq!(EndingType::from_name(ending.name()), Some(ending));
        }
        assert_eq!(EndingType::from_name("Resignation"), None);
    }

    #[test]
    fn time_control_parses_both_modes() {
        assert_eq!(
            "clock:60000".parse::<TimeControl>().unwrap(),
            TimeControl::Clock {
                initial: Duration::from_secs(60)
            }
        );
        assert_eq!(
            "movetime:100".parse::<TimeControl>().unwrap(),
            TimeControl::MoveTime(Duration::from_millis(100))
        );
        assert_eq!(
            TimeControl::MoveTime(Duration::from_millis(100)).to_string(),
            "movetime:100"
        );
    }

    #[test]
    fn time_control_rejects_garbage() {
        for bad in ["", "clock", "clock:abc", "fischer:1000", "movetime:-5"] {
            assert!(matches!(
                bad.parse::<TimeControl>(),
                Err(ConfigError::InvalidTimeControl(_))
            ));
        }
    }
}
