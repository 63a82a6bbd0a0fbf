//! Engine definitions and runner configuration.
//!
//! Engine definitions are JSON files describing one engine configuration.
//! Runner defaults come from an optional `tourney.toml`.

use crate::engine::process::UciSettings;
use crate::session::{SessionSettings, TimeControl};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when loading definitions or configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read a file from disk.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// An engine definition is not valid JSON or misses required fields.
    #[error("Failed to parse engine definition {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// The configuration file is not valid TOML.
    #[error("Failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
    /// A time control string could not be understood.
    #[error("Invalid time control '{0}', expected clock:<ms> or movetime:<ms>")]
    InvalidTimeControl(String),
}

/// Value of a UCI option in an engine definition.
///
/// JSON `null` stands for a button option, which is sent without a value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Str(String),
    Button,
}

impl OptionValue {
    /// The value as sent after `value` in `setoption`, `None` for buttons.
    pub fn to_uci_value(&self) -> Option<String> {
        match self {
            OptionValue::Button => None,
            other => Some(other.to_string()),
        }
    }

    /// Stored form used for equivalence checks. Booleans are capitalized
    /// and buttons read `None`, matching rows written by earlier tourney
    /// databases.
    pub fn canonical(&self) -> String {
        match self {
            OptionValue::Bool(true) => "True".to_string(),
            OptionValue::Bool(false) => "False".to_string(),
            OptionValue::Button => "None".to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for OptionValue {
    /// Value as written on the wire.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{}", b),
            OptionValue::Int(i) => write!(f, "{}", i),
            OptionValue::Str(s) => write!(f, "{}", s),
            OptionValue::Button => Ok(()),
        }
    }
}

/// One engine configuration: binary, UCI options and environment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EngineDefinition {
    pub name: String,
    /// Path to the engine binary.
    ///
    /// A relative path in a definition file is interpreted relative to the
    /// directory containing that file.
    pub path: PathBuf,
    #[serde(default)]
    pub options: BTreeMap<String, OptionValue>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl EngineDefinition {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            options: BTreeMap::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_option(mut self, name: impl Into<String>, value: OptionValue) -> Self {
        self.options.insert(name.into(), value);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Reads a definition file and resolves its engine path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read and
    /// [`ConfigError::Json`] if it is not a valid definition.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content, path)
    }

    /// Parses a definition, resolving a relative engine path against the
    /// directory of `defined_in`.
    pub fn from_json(content: &str, defined_in: &Path) -> Result<Self, ConfigError> {
        let mut definition: Self =
            serde_json::from_str(content).map_err(|source| ConfigError::Json {
                path: defined_in.to_path_buf(),
                source,
            })?;

        if !definition.path.is_absolute() {
            let file =
                std::path::absolute(defined_in).unwrap_or_else(|_| defined_in.to_path_buf());
            let base = file.parent().map(Path::to_path_buf).unwrap_or_default();
            let joined = base.join(&definition.path);
            definition.path = joined.canonicalize().unwrap_or(joined);
        }

        Ok(definition)
    }

    /// Options rendered as canonical strings, ordered by name.
    pub fn canonical_options(&self) -> BTreeMap<String, String> {
        self.options
            .iter()
            .map(|(name, value)| (name.clone(), value.canonical()))
            .collect()
    }
}

/// Runner configuration.
///
/// Loaded from `tourney.toml` in the current directory when present;
/// command-line flags override individual values.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TourneyConfig {
    /// Time control, `clock:<ms>` or `movetime:<ms>`. Defaults to one
    /// minute per side.
    #[serde(default)]
    pub time_control: TimeControl,
    /// Number of games played at once. Defaults to the available parallelism.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    /// SQLite database holding engines and games.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// How long an engine may take to answer the handshake.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Grace period on top of the search limit before a move request
    /// counts as timed out.
    #[serde(default = "default_move_timeout_margin_ms")]
    pub move_timeout_margin_ms: u64,
    /// Optional ply cap; games reaching it end as `Unknown`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_plies: Option<u32>,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("tourney.db")
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

fn default_move_timeout_margin_ms() -> u64 {
    5_000
}

impl Default for TourneyConfig {
    fn default() -> Self {
        Self {
            time_control: TimeControl::default(),
            concurrency: None,
            db_path: default_db_path(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            move_timeout_margin_ms: default_move_timeout_margin_ms(),
            max_plies: None,
        }
    }
}

impl TourneyConfig {
    /// Loads the configuration file, or defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file exists but cannot be read,
    /// or [`ConfigError::Toml`] if it contains invalid TOML.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Returns the default configuration file path.
    pub fn config_path() -> PathBuf {
        PathBuf::from("tourney.toml")
    }

    /// Worker count, falling back to the machine's available parallelism.
    pub fn concurrency(&self) -> usize {
        self.concurrency
            .filter(|&n| n > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            time_control: self.time_control,
            max_plies: self.max_plies,
        }
    }

    pub fn uci_settings(&self) -> UciSettings {
        UciSettings {
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            move_timeout_margin: Duration::from_millis(self.move_timeout_margin_ms),
        }
    }
}
