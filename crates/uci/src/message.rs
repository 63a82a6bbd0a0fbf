//! Parsing of lines written by an engine.

use crate::UciError;

/// Messages sent from engine to controller.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineMessage {
    /// Engine identification.
    Id {
        name: Option<String>,
        author: Option<String>,
    },
    /// UCI initialization complete.
    UciOk,
    /// Engine is ready.
    ReadyOk,
    /// Search information, kept as the raw text after `info`.
    Info(String),
    /// Option declaration, kept as the raw text after `option`.
    Option(String),
    /// Best move found.
    BestMove { mv: String, ponder: Option<String> },
    /// Anything else (for forward compatibility).
    Unknown(String),
}

impl EngineMessage {
    /// Parse one line of engine output.
    ///
    /// Blank lines are rejected with [`UciError::Empty`]; a `bestmove` line
    /// without a move is a [`UciError::ParseError`]. Unrecognised lines are
    /// returned as [`EngineMessage::Unknown`].
    pub fn parse(input: &str) -> Result<Self, UciError> {
        let input = input.trim();
        let (cmd, rest) = match input.split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (input, ""),
        };

        match cmd {
            "" => Err(UciError::Empty),
            "uciok" => Ok(EngineMessage::UciOk),
            "readyok" => Ok(EngineMessage::ReadyOk),
            "id" => Ok(Self::parse_id(rest)),
            "info" => Ok(EngineMessage::Info(rest.to_string())),
            "option" => Ok(EngineMessage::Option(rest.to_string())),
            "bestmove" => Self::parse_bestmove(rest),
            _ => Ok(EngineMessage::Unknown(input.to_string())),
        }
    }

    fn parse_id(rest: &str) -> Self {
        match rest.split_once(char::is_whitespace) {
            Some(("name", value)) => EngineMessage::Id {
                name: Some(value.trim().to_string()),
                author: None,
            },
            Some(("author", value)) => EngineMessage::Id {
                name: None,
                author: Some(value.trim().to_string()),
            },
            _ => EngineMessage::Unknown(format!("id {}", rest)),
        }
    }

    fn parse_bestmove(rest: &str) -> Result<Self, UciError> {
        let mut parts = rest.split_whitespace();
        let mv = parts
            .next()
            .ok_or_else(|| UciError::ParseError("bestmove without a move".to_string()))?
            .to_string();

        let ponder = match parts.next() {
            Some("ponder") => parts.next().map(|p| p.to_string()),
            _ => None,
        };

        Ok(EngineMessage::BestMove { mv, ponder })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_handshake_messages() {
        assert_eq!(EngineMessage::parse("uciok").unwrap(), EngineMessage::UciOk);
        assert_eq!(
            EngineMessage::parse("readyok\n").unwrap(),
            EngineMessage::ReadyOk
        );
    }

    #[test]
    fn parse_id_name_with_spaces() {
        let msg = EngineMessage::parse("id name Stockfish 16.1").unwrap();
        assert_eq!(
            msg,
            EngineMessage::Id {
                name: Some("Stockfish 16.1".to_string()),
                author: None
            }
        );
    }

    #[test]
    fn parse_id_author() {
        let msg = EngineMessage::parse("id author The Authors").unwrap();
        assert_eq!(
            msg,
            EngineMessage::Id {
                name: None,
                author: Some("The Authors".to_string())
            }
        );
    }

    #[test]
    fn parse_bestmove() {
        let msg = EngineMessage::parse("bestmove e2e4").unwrap();
        assert_eq!(
            msg,
            EngineMessage::BestMove {
                mv: "e2e4".to_string(),
                ponder: None
            }
        );
    }

    #[test]
    fn parse_bestmove_with_ponder() {
        let msg = EngineMessage::parse("bestmove e7e8q ponder a2a1").unwrap();
        assert_eq!(
            msg,
            EngineMessage::BestMove {
                mv: "e7e8q".to_string(),
                ponder: Some("a2a1".to_string())
            }
        );
    }

    #[test]
    fn parse_bestmove_without_move_fails() {
        assert!(matches!(
            EngineMessage::parse("bestmove"),
            Err(UciError::ParseError(_))
        ));
    }

    #[test]
    fn parse_info_kept_verbatim() {
        let msg = EngineMessage::parse("info depth 12 score cp 35 pv e2e4").unwrap();
        assert_eq!(
            msg,
            EngineMessage::Info("depth 12 score cp 35 pv e2e4".to_string())
        );
    }

    #[test]
    fn parse_blank_line_is_empty() {
        assert_eq!(EngineMessage::parse("   "), Err(UciError::Empty));
    }

    #[test]
    fn parse_unknown_line() {
        let msg = EngineMessage::parse("copyprotection ok").unwrap();
        assert_eq!(
            msg,
            EngineMessage::Unknown("copyprotection ok".to_string())
        );
    }
}
