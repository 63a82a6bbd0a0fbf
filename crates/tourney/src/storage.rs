//! SQLite storage for engines and game results.
//!
//! The schema holds four tables:
//! - `ending_types`: lookup of the ways a game can end
//! - `engines`: one row per distinct engine configuration
//! - `engine_options`: UCI options of each engine row
//! - `games`: one row per decided game
//!
//! The connection is shared behind a mutex. Registration and game writes
//! each run in their own transaction, so several threads or processes can
//! use the same database file.

use crate::config::EngineDefinition;
use crate::session::{EndingType, GameOutcome, Score};
use crate::summary::{result_for, Summary};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use sha2::{Digest, Sha256};
use shakmaty::Color;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

/// Thread-safe database connection pool.
pub type DbPool = Arc<Mutex<Connection>>;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("ending type '{0}' is missing from the database")]
    UnknownEndingType(String),
    #[error("database connection lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// Busy or locked database, worth one more attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Sqlite(e) => matches!(
                e.sqlite_error_code(),
                Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
            ),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EngineId(pub i64);

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GameId(pub i64);

/// A registered engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineRecord {
    pub id: EngineId,
    pub name: String,
    pub path: String,
    pub checksum: String,
    pub options: BTreeMap<String, String>,
}

/// A game ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGame {
    pub white: EngineId,
    pub black: EngineId,
    pub white_score: Score,
    pub black_score: Score,
    pub ending: EndingType,
    pub pgn: String,
}

impl NewGame {
    pub fn from_outcome(white: EngineId, black: EngineId, outcome: &GameOutcome) -> Self {
        Self {
            white,
            black,
            white_score: outcome.white_score,
            black_score: outcome.black_score,
            ending: outcome.ending,
            pgn: outcome.pgn.clone(),
        }
    }
}

/// A stored game.
#[derive(Debug, Clone, PartialEq)]
pub struct GameRecord {
    pub id: GameId,
    pub white: EngineId,
    pub black: EngineId,
    pub white_score: f64,
    pub black_score: f64,
    pub ending: String,
    pub pgn: String,
}

/// SHA-256 of a file as lowercase hex.
pub fn compute_checksum(path: &Path) -> Result<String, StoreError> {
    let io_error = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = std::fs::File::open(path).map_err(io_error)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(io_error)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Handle to the results database. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    db: DbPool,
}

impl Store {
    /// Opens or creates the database file and brings the schema up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema cannot
    /// be created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        tracing::debug!(journal_mode = %mode, "Opened result store");
        Self::init(conn)
    }

    /// A private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS ending_types (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS engines (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                path TEXT NOT NULL,
                checksum TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS engine_options (
                id INTEGER PRIMARY KEY,
                engine_id INTEGER NOT NULL REFERENCES engines(id),
                option_name TEXT NOT NULL,
                option_value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS games (
                id INTEGER PRIMARY KEY,
                white_engine_id INTEGER NOT NULL REFERENCES engines(id),
                black_engine_id INTEGER NOT NULL REFERENCES engines(id),
                white_score REAL NOT NULL,
                black_score REAL NOT NULL,
                ending_type_id INTEGER NOT NULL REFERENCES ending_types(id),
                pgn TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_engines_fingerprint ON engines(name, path, checksum);
            CREATE INDEX IF NOT EXISTS idx_engine_options_engine ON engine_options(engine_id);
            CREATE INDEX IF NOT EXISTS idx_games_pairing ON games(white_engine_id, black_engine_id);
            ",
        )?;

        {
            let mut stmt = conn.prepare("INSERT OR IGNORE INTO ending_types (name) VALUES (?1)")?;
            for ending in EndingType::ALL {
                stmt.execute([ending.name()])?;
            }
        }

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.db.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Returns the id of the engine row matching `definition`, inserting it
    /// if no equivalent configuration is stored yet.
    ///
    /// Two configurations are equivalent when name, path, binary checksum
    /// and the full option set match. Lookup and insert happen in one
    /// immediate transaction, so concurrent callers agree on a single row.
    /// A busy or locked database is retried once after a short pause.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the engine binary cannot be read, or a
    /// database error.
    pub fn register_engine(&self, definition: &EngineDefinition) -> Result<EngineId, StoreError> {
        let fingerprint = Fingerprint::of(definition)?;
        self.with_retry("Engine registration", || {
            self.insert_engine(definition, &fingerprint)
        })
    }

    /// Id of the engine row matching `definition`, without registering it.
    pub fn find_engine(&self, definition: &EngineDefinition) -> Result<Option<EngineId>, StoreError> {
        let fingerprint = Fingerprint::of(definition)?;
        let conn = self.lock()?;
        let ids = equivalent_engines(&conn, &definition.name, &fingerprint)?;
        Ok(ids.first().copied().map(EngineId))
    }

    fn insert_engine(
        &self,
        definition: &EngineDefinition,
        fingerprint: &Fingerprint,
    ) -> Result<EngineId, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let equivalent = equivalent_engines(&tx, &definition.name, fingerprint)?;
        let id = match equivalent.as_slice() {
            [] => {
                tx.execute(
                    "INSERT INTO engines (name, path, checksum) VALUES (?1, ?2, ?3)",
                    params![definition.name, fingerprint.path, fingerprint.checksum],
                )?;
                let id = tx.last_insert_rowid();
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO engine_options (engine_id, option_name, option_value)
                         VALUES (?1, ?2, ?3)",
                    )?;
                    for (name, value) in &fingerprint.options {
                        stmt.execute(params![id, name, value])?;
                    }
                }
                tracing::info!(engine = %definition.name, id, "Registered engine");
                id
            }
            [id] => *id,
            [id, ..] => {
                tracing::warn!(
                    engine = %definition.name,
                    ids = ?equivalent,
                    "Duplicate engine records found, using the lowest id"
                );
                *id
            }
        };

        tx.commit()?;
        Ok(EngineId(id))
    }

    /// Writes one decided game.
    ///
    /// A busy or locked database is retried once after a short pause.
    pub fn record_game(&self, game: &NewGame) -> Result<GameId, StoreError> {
        self.with_retry("Game write", || self.insert_game(game))
    }

    /// Runs a write, repeating it once if the database was busy or locked.
    fn with_retry<T>(
        &self,
        what: &str,
        write: impl Fn() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        match write() {
            Err(e) if e.is_transient() => {
                tracing::warn!("{} failed ({}), retrying once", what, e);
                std::thread::sleep(RETRY_BACKOFF);
                write()
            }
            other => other,
        }
    }

    fn insert_game(&self, game: &NewGame) -> Result<GameId, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let ending_type_id = lookup_ending_type(&tx, game.ending)?;
        tx.execute(
            "INSERT INTO games
                (white_engine_id, black_engine_id, white_score, black_score, ending_type_id, pgn)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                game.white.0,
                game.black.0,
                game.white_score.as_f64(),
                game.black_score.as_f64(),
                ending_type_id,
                game.pgn
            ],
        )?;
        let id = tx.last_insert_rowid();

        tx.commit()?;
        Ok(GameId(id))
    }

    /// Statistics of all games between `engine` and `opponent`, from
    /// `engine`'s side of the board.
    pub fn summarize(&self, engine: EngineId, opponent: EngineId) -> Result<Summary, StoreError> {
        let engine_name = self.engine(engine)?.map(|r| r.name).unwrap_or_default();
        let opponent_name = self.engine(opponent)?.map(|r| r.name).unwrap_or_default();

        let mut summary = Summary::new(engine_name, opponent_name);
        for game in self.games_between(engine, opponent)? {
            let (color, own, other) = if game.white == engine {
                (Color::White, game.white_score, game.black_score)
            } else {
                (Color::Black, game.black_score, game.white_score)
            };
            summary.record(color, result_for(own, other));
        }
        Ok(summary)
    }

    /// Statistics between two engine definitions, looked up without
    /// registering them. An engine that was never registered has played no
    /// games, so the summary is empty.
    pub fn summary_for(
        &self,
        engine: &EngineDefinition,
        opponent: &EngineDefinition,
    ) -> Result<Summary, StoreError> {
        match (self.find_engine(engine)?, self.find_engine(opponent)?) {
            (Some(a), Some(b)) => self.summarize(a, b),
            (a, _) => {
                let unknown = if a.is_none() { &engine.name } else { &opponent.name };
                tracing::info!(engine = %unknown, "Engine configuration has no stored games");
                Ok(Summary::new(engine.name.clone(), opponent.name.clone()))
            }
        }
    }

    /// Engine row with its options, if it exists.
    pub fn engine(&self, id: EngineId) -> Result<Option<EngineRecord>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT name, path, checksum FROM engines WHERE id = ?1",
                [id.0],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((name, path, checksum)) => Ok(Some(EngineRecord {
                id,
                name,
                path,
                checksum,
                options: load_options(&conn, id.0)?,
            })),
            None => Ok(None),
        }
    }

    /// Every game between the two engines, either colour, oldest first.
    pub fn games_between(&self, a: EngineId, b: EngineId) -> Result<Vec<GameRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT games.id, white_engine_id, black_engine_id, white_score, black_score,
                    ending_types.name, pgn
             FROM games
             JOIN ending_types ON games.ending_type_id = ending_types.id
             WHERE (white_engine_id = ?1 AND black_engine_id = ?2)
                OR (white_engine_id = ?2 AND black_engine_id = ?1)
             ORDER BY games.id",
        )?;
        let rows = stmt.query_map([a.0, b.0], |row| {
            Ok(GameRecord {
                id: GameId(row.get(0)?),
                white: EngineId(row.get(1)?),
                black: EngineId(row.get(2)?),
                white_score: row.get(3)?,
                black_score: row.get(4)?,
                ending: row.get(5)?,
                pgn: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Row id of an ending type.
    pub fn ending_type_id(&self, ending: EndingType) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        lookup_ending_type(&conn, ending)
    }
}

/// The parts of a definition that identify an engine row, besides its name.
struct Fingerprint {
    path: String,
    checksum: String,
    options: BTreeMap<String, String>,
}

impl Fingerprint {
    fn of(definition: &EngineDefinition) -> Result<Self, StoreError> {
        Ok(Self {
            path: definition.path.to_string_lossy().into_owned(),
            checksum: compute_checksum(&definition.path)?,
            options: definition.canonical_options(),
        })
    }
}

/// Ids of stored engines equivalent to `name` + `fingerprint`, lowest first.
fn equivalent_engines(
    conn: &Connection,
    name: &str,
    fingerprint: &Fingerprint,
) -> Result<Vec<i64>, StoreError> {
    let candidates: Vec<i64> = {
        let mut stmt = conn.prepare(
            "SELECT id FROM engines
             WHERE name = ?1 AND path = ?2 AND checksum = ?3
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![name, fingerprint.path, fingerprint.checksum], |row| {
            row.get(0)
        })?;
        rows.collect::<Result<_, _>>()?
    };

    let mut equivalent = Vec::new();
    for id in candidates {
        if load_options(conn, id)? == fingerprint.options {
            equivalent.push(id);
        }
    }
    Ok(equivalent)
}

fn load_options(conn: &Connection, engine_id: i64) -> Result<BTreeMap<String, String>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT option_name, option_value FROM engine_options WHERE engine_id = ?1",
    )?;
    let rows = stmt.query_map([engine_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.collect::<Result<_, _>>()?)
}

fn lookup_ending_type(conn: &Connection, ending: EndingType) -> Result<i64, StoreError> {
    conn.query_row(
        "SELECT id FROM ending_types WHERE name = ?1",
        [ending.name()],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| StoreError::UnknownEndingType(ending.name().to_string()))
}
