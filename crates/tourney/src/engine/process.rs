//! UCI engine running as a subprocess.
//!
//! The engine is spawned with piped stdin/stdout, taken through the UCI
//! handshake, configured with the definition's options, and then asked for
//! one move at a time.
//!
//! # Lifecycle
//!
//! 1. Launch with [`UciEngine::start`] (handshake and options included)
//! 2. Request moves with [`Engine::play`]
//! 3. Shut down with [`Engine::stop`] (or rely on kill-on-drop)

use super::{resolve_move, Engine, EngineError, EngineLauncher, SearchLimit};
use crate::board::Board;
use crate::config::EngineDefinition;
use chrono::TimeDelta;
use shakmaty::{Color, Move};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use uci::{EngineMessage, GoOptions, GuiCommand, UciError};

/// How long a `quit` may take before the process is killed.
const QUIT_GRACE: Duration = Duration::from_millis(500);

/// Timeouts applied to subprocess engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UciSettings {
    /// Limit for `uci` ... `readyok`, options included.
    pub handshake_timeout: Duration,
    /// Added to the search limit to get the hard deadline for `bestmove`.
    pub move_timeout_margin: Duration,
}

impl Default for UciSettings {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            move_timeout_margin: Duration::from_secs(5),
        }
    }
}

/// Launches [`UciEngine`]s.
#[derive(Debug, Clone, Default)]
pub struct UciLauncher {
    settings: UciSettings,
}

impl UciLauncher {
    pub fn new(settings: UciSettings) -> Self {
        Self { settings }
    }
}

impl EngineLauncher for UciLauncher {
    type Engine = UciEngine;

    async fn start(&self, definition: &EngineDefinition) -> Result<UciEngine, EngineError> {
        UciEngine::start(definition, self.settings).await
    }
}

/// A UCI engine subprocess.
pub struct UciEngine {
    /// Name from the engine definition, used in logs and errors.
    label: String,
    /// Name reported via `id name`, or the label if none was sent.
    name: String,
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    settings: UciSettings,
    stopped: bool,
}

impl UciEngine {
    /// Spawns the engine, performs the handshake and applies the options.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Startup`] if the process cannot be spawned,
    /// exits, or does not finish the handshake in time. The process is
    /// terminated before the error is returned.
    pub async fn start(
        definition: &EngineDefinition,
        settings: UciSettings,
    ) -> Result<Self, EngineError> {
        let label = definition.name.clone();
        let startup = |reason: String| EngineError::Startup {
            engine: label.clone(),
            reason,
        };

        let mut child = Command::new(&definition.path)
            .envs(&definition.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| startup(format!("cannot launch {}: {}", definition.path.display(), e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| startup("stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| startup("stdout unavailable".to_string()))?;

        let mut engine = Self {
            label: label.clone(),
            name: label.clone(),
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
            settings,
            stopped: false,
        };

        match timeout(settings.handshake_timeout, engine.handshake(definition)).await {
            Ok(Ok(())) => {
                tracing::debug!(engine = %engine.label, reported = %engine.name, "Engine ready");
                Ok(engine)
            }
            Ok(Err(e)) => {
                engine.stop().await;
                Err(startup(e.to_string()))
            }
            Err(_) => {
                engine.stop().await;
                Err(startup(format!(
                    "no handshake within {:?}",
                    settings.handshake_timeout
                )))
            }
        }
    }

    async fn handshake(&mut self, definition: &EngineDefinition) -> Result<(), EngineError> {
        self.send(&GuiCommand::Uci).await?;
        loop {
            match self.next_message().await? {
                EngineMessage::Id {
                    name: Some(name), ..
                } => self.name = name,
                EngineMessage::UciOk => break,
                _ => {}
            }
        }

        for (name, value) in &definition.options {
            self.send(&GuiCommand::SetOption {
                name: name.clone(),
                value: value.to_uci_value(),
            })
            .await?;
        }

        self.send(&GuiCommand::UciNewGame).await?;
        self.send(&GuiCommand::IsReady).await?;
        loop {
            if self.next_message().await? == EngineMessage::ReadyOk {
                return Ok(());
            }
        }
    }

    async fn send(&mut self, cmd: &GuiCommand) -> Result<(), EngineError> {
        let line = cmd.to_uci();
        tracing::debug!(engine = %self.label, "> {}", line);
        self.stdin
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .map_err(|source| self.io_error(source))?;
        self.stdin
            .flush()
            .await
            .map_err(|source| self.io_error(source))
    }

    /// Next non-blank message from the engine.
    async fn next_message(&mut self) -> Result<EngineMessage, EngineError> {
        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|source| self.io_error(source))?
                .ok_or_else(|| EngineError::Protocol {
                    engine: self.label.clone(),
                    reason: "engine closed its output".to_string(),
                })?;
            tracing::debug!(engine = %self.label, "< {}", line);

            match EngineMessage::parse(&line) {
                Ok(message) => return Ok(message),
                Err(UciError::Empty) => continue,
                Err(e) => {
                    return Err(EngineError::Protocol {
                        engine: self.label.clone(),
                        reason: e.to_string(),
                    })
                }
            }
        }
    }

    async fn read_bestmove(&mut self) -> Result<String, EngineError> {
        loop {
            if let EngineMessage::BestMove { mv, .. } = self.next_message().await? {
                return Ok(mv);
            }
        }
    }

    fn io_error(&self, source: std::io::Error) -> EngineError {
        EngineError::Io {
            engine: self.label.clone(),
            source,
        }
    }
}

fn millis(delta: TimeDelta) -> u64 {
    delta.num_milliseconds().max(0) as u64
}

impl Engine for UciEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn play(&mut self, board: &Board, limit: SearchLimit) -> Result<Move, EngineError> {
        self.send(&GuiCommand::Position {
            fen: board.start_fen().map(str::to_string),
            moves: board.moves().to_vec(),
        })
        .await?;

        let go = match limit {
            SearchLimit::MoveTime(d) => GoOptions::movetime(d.as_millis() as u64),
            SearchLimit::Clock { white, black } => GoOptions::clock(millis(white), millis(black)),
        };
        self.send(&GuiCommand::Go(go)).await?;

        let deadline =
            limit.budget_for(board.turn() == Color::White) + self.settings.move_timeout_margin;
        let text = match timeout(deadline, self.read_bestmove()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(EngineError::Timeout {
                    engine: self.label.clone(),
                    waited: deadline,
                })
            }
        };

        resolve_move(&self.label, board, &text)
    }

    async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        let _ = self.send(&GuiCommand::Quit).await;
        match timeout(QUIT_GRACE, self.child.wait()).await {
            Ok(Ok(_)) => {}
            _ => {
                if let Err(e) = self.child.kill().await {
                    tracing::warn!(engine = %self.label, "Failed to kill engine: {}", e);
                }
            }
        }
    }
}
