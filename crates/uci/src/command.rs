//! UCI command formatting.

use std::fmt;

/// Commands sent from the controller to an engine.
#[derive(Debug, Clone, PartialEq)]
pub enum GuiCommand {
    /// Initialize UCI mode.
    Uci,
    /// Set an engine option. Button options carry no value.
    SetOption { name: String, value: Option<String> },
    /// Start of a new game.
    UciNewGame,
    /// Check if engine is ready.
    IsReady,
    /// Set up position.
    Position {
        fen: Option<String>,
        moves: Vec<String>,
    },
    /// Start calculating.
    Go(GoOptions),
    /// Quit the engine.
    Quit,
}

/// Options for the `go` command.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GoOptions {
    /// Search for exactly this time in milliseconds.
    pub movetime: Option<u64>,
    /// White time remaining in milliseconds.
    pub wtime: Option<u64>,
    /// Black time remaining in milliseconds.
    pub btime: Option<u64>,
}

impl GoOptions {
    /// Fixed time per move.
    pub fn movetime(ms: u64) -> Self {
        Self {
            movetime: Some(ms),
            ..Self::default()
        }
    }

    /// Remaining clock time for both sides.
    pub fn clock(wtime: u64, btime: u64) -> Self {
        Self {
            wtime: Some(wtime),
            btime: Some(btime),
            ..Self::default()
        }
    }
}

impl GuiCommand {
    /// Format the command as a single protocol line, without the newline.
    pub fn to_uci(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for GuiCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuiCommand::Uci => write!(f, "uci"),
            GuiCommand::SetOption { name, value } => match value {
                Some(v) => write!(f, "setoption name {} value {}", name, v),
                None => write!(f, "setoption name {}", name),
            },
            GuiCommand::UciNewGame => write!(f, "ucinewgame"),
            GuiCommand::IsReady => write!(f, "isready"),
            GuiCommand::Position { fen, moves } => {
                match fen {
                    Some(fen) => write!(f, "position fen {}", fen)?,
                    None => write!(f, "position startpos")?,
                }
                if !moves.is_empty() {
                    write!(f, " moves {}", moves.join(" "))?;
                }
                Ok(())
            }
            GuiCommand::Go(opts) => write!(f, "{}", opts),
            GuiCommand::Quit => write!(f, "quit"),
        }
    }
}

impl fmt::Display for GoOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "go")?;
        if let Some(ms) = self.wtime {
            write!(f, " wtime {}", ms)?;
        }
        if let Some(ms) = self.btime {
            write!(f, " btime {}", ms)?;
        }
        if let Some(ms) = self.movetime {
            write!(f, " movetime {}", ms)?;
        }
        Ok(())
    }
}
