//! Game state on top of `shakmaty`: position, move list and repetition
//! tracking, plus classification of terminal positions.

use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Position};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoardError {
    #[error("invalid FEN: {0}")]
    InvalidFen(String),
    #[error("unparsable move: {0}")]
    UnparsableMove(String),
    #[error("illegal move: {0}")]
    IllegalMove(String),
}

/// How a game position ended, as judged by the rules alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The side to move is mated.
    Checkmate { winner: Color },
    Stalemate,
    FivefoldRepetition,
    InsufficientMaterial,
    SeventyFiveMoveRule,
}

/// A game in progress.
#[derive(Debug, Clone)]
pub struct Board {
    start_fen: Option<String>,
    position: Chess,
    moves: Vec<String>,
    seen: HashMap<String, u32>,
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    /// Standard starting position.
    pub fn new() -> Self {
        Self::with_position(None, Chess::default())
    }

    /// Custom starting position.
    pub fn from_fen(fen: &str) -> Result<Self, BoardError> {
        let parsed: Fen = fen
            .parse()
            .map_err(|e| BoardError::InvalidFen(format!("{}: {}", fen, e)))?;
        let position: Chess = parsed
            .into_position(CastlingMode::Standard)
            .map_err(|e| BoardError::InvalidFen(format!("{}: {}", fen, e)))?;
        Ok(Self::with_position(Some(fen.to_string()), position))
    }

    fn with_position(start_fen: Option<String>, position: Chess) -> Self {
        let mut board = Self {
            start_fen,
            position,
            moves: Vec::new(),
            seen: HashMap::new(),
        };
        board.seen.insert(board.repetition_key(), 1);
        board
    }

    pub fn position(&self) -> &Chess {
        &self.position
    }

    /// FEN of the starting position, `None` for the standard one.
    pub fn start_fen(&self) -> Option<&str> {
        self.start_fen.as_deref()
    }

    pub fn turn(&self) -> Color {
        self.position.turn()
    }

    /// Moves played so far in UCI notation.
    pub fn moves(&self) -> &[String] {
        &self.moves
    }

    pub fn ply_count(&self) -> usize {
        self.moves.len()
    }

    pub fn fen(&self) -> String {
        Fen::from_position(&self.position, EnPassantMode::Legal).to_string()
    }

    /// Resolves a UCI move string against the current position.
    pub fn parse_uci(&self, text: &str) -> Result<Move, BoardError> {
        let uci: UciMove = text
            .parse()
            .map_err(|_| BoardError::UnparsableMove(text.to_string()))?;
        uci.to_move(&self.position)
            .map_err(|_| BoardError::IllegalMove(text.to_string()))
    }

    /// Standard algebraic notation of a legal move, with check and mate
    /// suffixes.
    pub fn san(&self, mv: &Move) -> String {
        SanPlus::from_move(self.position.clone(), mv.clone()).to_string()
    }

    /// Plays a move, recording it and the resulting position.
    pub fn push(&mut self, mv: Move) -> Result<(), BoardError> {
        let uci = mv.to_uci(CastlingMode::Standard).to_string();
        if !self.position.legal_moves().contains(&mv) {
            return Err(BoardError::IllegalMove(uci));
        }

        self.position.play_unchecked(mv);
        self.moves.push(uci);
        *self.seen.entry(self.repetition_key()).or_insert(0) += 1;
        Ok(())
    }

    /// How often the current position has occurred, including now.
    pub fn repetitions(&self) -> u32 {
        self.seen.get(&self.repetition_key()).copied().unwrap_or(0)
    }

    /// Classifies the current position. `None` means play continues.
    pub fn termination(&self) -> Option<Termination> {
        if self.position.is_checkmate() {
            Some(Termination::Checkmate {
                winner: !self.position.turn(),
            })
        } else if self.position.is_stalemate() {
            Some(Termination::Stalemate)
        } else if self.repetitions() >= 5 {
            Some(Termination::FivefoldRepetition)
        } else if self.position.is_insufficient_material() {
            Some(Termination::InsufficientMaterial)
        } else if self.position.halfmoves() >= 150 {
            Some(Termination::SeventyFiveMoveRule)
        } else {
            None
        }
    }

    /// Placement, side to move, castling and en passant: the parts of a FEN
    /// that decide whether two positions repeat.
    fn repetition_key(&self) -> String {
        self.fen()
            .split_whitespace()
            .take(4)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play_all(board: &mut Board, moves: &[&str]) {
        for text in moves {
            let mv = board.parse_uci(text).unwrap();
            board.push(mv).unwrap();
        }
    }

    #[test]
    fn new_board_is_not_terminal() {
        let board = Board::new();
        assert_eq!(board.ply_count(), 0);
        assert_eq!(board.turn(), Color::White);
        assert_eq!(board.repetitions(), 1);
        assert!(board.termination().is_none());
        assert!(board.start_fen().is_none());
    }

    #[test]
    fn fools_mate_is_checkmate_for_black() {
        let mut board = Board::new();
        play_all(&mut board, &["f2f3", "e7e5", "g2g4", "d8h4"]);

        assert_eq!(
            board.termination(),
            Some(Termination::Checkmate {
                winner: Color::Black
            })
        );
        assert_eq!(board.moves(), &["f2f3", "e7e5", "g2g4", "d8h4"]);
    }

    #[test]
    fn scholars_mate_is_checkmate_for_white() {
        let mut board = Board::new();
        play_all(
            &mut board,
            &["e2e4", "e7e5", "f1c4", "b8c6", "d1h5", "g8f6", "h5f7"],
        );

        assert_eq!(
            board.termination(),
            Some(Termination::Checkmate {
                winner: Color::White
            })
        );
    }

    #[test]
    fn stalemate_is_detected() {
        let board = Board::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
        assert_eq!(board.termination(), Some(Termination::Stalemate));
    }

    #[test]
    fn bare_kings_are_insufficient_material() {
        let board = Board::from_fen("8/8/8/8/8/8/8/4K2k w - - 0 1").unwrap();
        assert_eq!(board.termination(), Some(Termination::InsufficientMaterial));
    }

    #[test]
    fn seventy_five_move_rule_is_automatic() {
        let board = Board::from_fen("8/8/8/8/8/8/8/R3K2k w Q - 150 1").unwrap();
        assert_eq!(board.termination(), Some(Termination::SeventyFiveMoveRule));
    }

    #[test]
    fn fifty_moves_are_not_enough() {
        let board = Board::from_fen("8/8/8/8/8/8/8/R3K2k w Q - 100 1").unwrap();
        assert!(board.termination().is_none());
    }

    #[test]
    fn fivefold_repetition_after_four_knight_shuffles() {
        let mut board = Board::new();
        let shuffle = ["g1f3", "g8f6", "f3g1", "f6g8"];
        for _ in 0..3 {
            play_all(&mut board, &shuffle);
        }
        assert_eq!(board.repetitions(), 4);
        assert!(board.termination().is_none());

        play_all(&mut board, &shuffle);
        assert_eq!(board.repetitions(), 5);
        assert_eq!(board.termination(), Some(Termination::FivefoldRepetition));
    }

    #[test]
    fn illegal_move_is_rejected() {
        let board = Board::new();
        assert!(matches!(
            board.parse_uci("e2e5"),
            Err(BoardError::IllegalMove(_))
        ));
    }

    #[test]
    fn garbage_move_is_unparsable() {
        let board = Board::new();
        assert!(matches!(
            board.parse_uci("hello"),
            Err(BoardError::UnparsableMove(_))
        ));
    }

    #[test]
    fn invalid_fen_is_rejected() {
        assert!(matches!(
            Board::from_fen("not a fen"),
            Err(BoardError::InvalidFen(_))
        ));
    }

    #[test]
    fn custom_start_fen_is_kept() {
        let fen = "8/8/8/8/8/8/8/R3K2k w Q - 0 1";
        let board = Board::from_fen(fen).unwrap();
        assert_eq!(board.start_fen(), Some(fen));
    }

    #[test]
    fn castling_is_recorded_in_standard_notation() {
        let mut board = Board::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        play_all(&mut board, &["e1g1"]);
        assert_eq!(board.moves(), &["e1g1"]);
    }
}
