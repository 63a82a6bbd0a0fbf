//! PGN transcripts for decided games.
//!
//! Moves are replayed from the start position and written in standard
//! algebraic notation, numbered the usual way and wrapped at 80 columns.

use crate::board::Board;
use crate::session::{GameOutcome, TimeControl};
use chrono::{NaiveDate, Utc};

const LINE_WIDTH: usize = 80;

/// Header values that the game itself does not know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameTags {
    pub event: String,
    pub site: String,
    pub date: NaiveDate,
    pub round: Option<u32>,
    pub white: String,
    pub black: String,
}

impl GameTags {
    pub fn new(white: impl Into<String>, black: impl Into<String>) -> Self {
        Self {
            event: "Engine match".to_string(),
            site: "local".to_string(),
            date: Utc::now().date_naive(),
            round: None,
            white: white.into(),
            black: black.into(),
        }
    }

    pub fn with_round(mut self, round: u32) -> Self {
        self.round = Some(round);
        self
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = event.into();
        self
    }
}

/// Renders the full PGN text of a decided game.
pub fn render(tags: &GameTags, time_control: TimeControl, outcome: &GameOutcome) -> String {
    let result = outcome.result_token();
    let round = tags
        .round
        .map(|r| r.to_string())
        .unwrap_or_else(|| "-".to_string());

    let mut pgn = String::new();
    push_tag(&mut pgn, "Event", &tags.event);
    push_tag(&mut pgn, "Site", &tags.site);
    push_tag(&mut pgn, "Date", &tags.date.format("%Y.%m.%d").to_string());
    push_tag(&mut pgn, "Round", &round);
    push_tag(&mut pgn, "White", &tags.white);
    push_tag(&mut pgn, "Black", &tags.black);
    push_tag(&mut pgn, "Result", result);
    if let Some(fen) = &outcome.start_fen {
        push_tag(&mut pgn, "SetUp", "1");
        push_tag(&mut pgn, "FEN", fen);
    }
    push_tag(&mut pgn, "Termination", outcome.ending.name());
    push_tag(&mut pgn, "TimeControl", &time_control.pgn_tag());
    pgn.push('\n');

    let (first_number, black_first) = outcome
        .start_fen
        .as_deref()
        .map(move_numbering)
        .unwrap_or((1, false));

    let moves = san_moves(outcome.start_fen.as_deref(), &outcome.moves);
    let mut tokens = Vec::with_capacity(moves.len() * 3 / 2 + 1);
    for (i, mv) in moves.into_iter().enumerate() {
        let ply = i + usize::from(black_first);
        let number = first_number + (ply / 2) as u32;
        if ply % 2 == 0 {
            tokens.push(format!("{}.", number));
        } else if i == 0 {
            tokens.push(format!("{}...", number));
        }
        tokens.push(mv);
    }
    tokens.push(result.to_string());

    wrap(&mut pgn, &tokens);
    pgn
}

fn push_tag(pgn: &mut String, name: &str, value: &str) {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    pgn.push_str(&format!("[{} \"{}\"]\n", name, escaped));
}

/// SAN of each UCI move. Moves that cannot be replayed keep their UCI text.
fn san_moves(start_fen: Option<&str>, moves: &[String]) -> Vec<String> {
    let mut board = match start_fen.map(Board::from_fen).transpose() {
        Ok(board) => board.unwrap_or_default(),
        Err(_) => return moves.to_vec(),
    };

    let mut san = Vec::with_capacity(moves.len());
    for uci in moves {
        let Ok(mv) = board.parse_uci(uci) else {
            break;
        };
        let text = board.san(&mv);
        if board.push(mv).is_err() {
            break;
        }
        san.push(text);
    }
    san.extend(moves[san.len()..].iter().cloned());
    san
}

/// Fullmove number and side to move of a FEN.
fn move_numbering(fen: &str) -> (u32, bool) {
    let fields: Vec<&str> = fen.split_whitespace().collect();
    let black_first = fields.get(1) == Some(&"b");
    let number = fields
        .get(5)
        .and_then(|n| n.parse().ok())
        .filter(|&n| n > 0)
        .unwrap_or(1);
    (number, black_first)
}

fn wrap(pgn: &mut String, tokens: &[String]) {
    let mut line_len = 0;
    for token in tokens {
        if line_len > 0 && line_len + 1 + token.len() > LINE_WIDTH {
            pgn.push('\n');
            line_len = 0;
        }
        if line_len > 0 {
            pgn.push(' ');
            line_len += 1;
        }
        pgn.push_str(token);
        line_len += token.len();
    }
    pgn.push('\n');
}
