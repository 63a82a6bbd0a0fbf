//! Match scheduling: many games between two engines, played concurrently.
//!
//! A match is planned as pairs of games with colours swapped, queued on a
//! channel, and played by a fixed number of worker tasks. Each worker
//! starts two fresh engines per game, plays it out, stops both engines and
//! writes the result. Failed games are counted and logged but do not stop
//! the match.

use crate::config::EngineDefinition;
use crate::engine::{Engine, EngineError, EngineLauncher};
use crate::pgn::GameTags;
use crate::session::{GameError, GameSession, SessionSettings};
use crate::storage::{EngineId, GameId, NewGame, Store, StoreError};
use crate::summary::Summary;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinError, JoinSet};

/// Which of the two engines in a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seat {
    First,
    Second,
}

/// One game to play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameJob {
    /// 1-based game number within the match.
    pub round: u32,
    pub white: Seat,
    pub black: Seat,
}

/// Plans `num_games` rounded down to an even number, alternating colours so
/// each engine plays White in exactly half of the games.
pub fn plan_jobs(num_games: usize) -> Vec<GameJob> {
    let even = num_games - num_games % 2;
    (0..even)
        .map(|i| {
            let (white, black) = if i % 2 == 0 {
                (Seat::First, Seat::Second)
            } else {
                (Seat::Second, Seat::First)
            };
            GameJob {
                round: i as u32 + 1,
                white,
                black,
            }
        })
        .collect()
}

/// Failure of a whole match before or after the games.
#[derive(Error, Debug)]
pub enum MatchError {
    #[error("failed to register engine '{engine}': {source}")]
    Registration { engine: String, source: StoreError },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("background task failed: {0}")]
    Task(#[from] JoinError),
}

/// Failure of a single game.
#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Game(#[from] GameError),
    #[error("game aborted: {0}")]
    Aborted(JoinError),
    #[error("result not recorded: {0}")]
    Store(#[from] StoreError),
    #[error("result not recorded: {0}")]
    Task(#[from] JoinError),
}

impl From<EngineError> for JobError {
    fn from(e: EngineError) -> Self {
        JobError::Game(GameError::Engine(e))
    }
}

/// What a finished match produced.
#[derive(Debug, Clone)]
pub struct MatchReport {
    pub first: EngineId,
    pub second: EngineId,
    /// All recorded games between the two engines, earlier matches included.
    pub summary: Summary,
    pub planned: usize,
    pub recorded: usize,
    /// Games aborted by an engine or rules failure, or a panic.
    pub gameplay_failures: usize,
    /// Games decided but not written.
    pub storage_failures: usize,
    /// Games never started because the match was cancelled.
    pub cancelled: usize,
}

impl MatchReport {
    pub fn failures(&self) -> usize {
        self.gameplay_failures + self.storage_failures
    }
}

impl fmt::Display for MatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary)?;
        writeln!(f, "Recorded {} of {} planned games", self.recorded, self.planned)?;
        if self.failures() > 0 {
            writeln!(
                f,
                "Failed games: {} (gameplay: {}, storage: {})",
                self.failures(),
                self.gameplay_failures,
                self.storage_failures
            )?;
        }
        if self.cancelled > 0 {
            writeln!(f, "Cancelled games: {}", self.cancelled)?;
        }
        Ok(())
    }
}

struct JobReport {
    job: GameJob,
    result: Result<GameId, JobError>,
}

/// Everything a worker needs, shared between workers.
struct MatchContext<L> {
    launcher: Arc<L>,
    store: Store,
    settings: SessionSettings,
    cancel: Arc<AtomicBool>,
    definitions: [Arc<EngineDefinition>; 2],
    ids: [EngineId; 2],
    event: String,
}

impl<L> MatchContext<L> {
    fn seat(&self, seat: Seat) -> (&EngineDefinition, EngineId) {
        let i = match seat {
            Seat::First => 0,
            Seat::Second => 1,
        };
        (&self.definitions[i], self.ids[i])
    }
}

/// Plays matches between two engine definitions.
pub struct MatchRunner<L> {
    launcher: Arc<L>,
    store: Store,
    settings: SessionSettings,
    cancel: Arc<AtomicBool>,
}

impl<L: EngineLauncher> MatchRunner<L> {
    pub fn new(launcher: L, store: Store, settings: SessionSettings) -> Self {
        Self {
            launcher: Arc::new(launcher),
            store,
            settings,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops workers from starting further games once set.
    /// Games already in progress are finished and recorded.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Registers both engines, plays the match and summarizes all games
    /// between them.
    ///
    /// # Errors
    ///
    /// Only setup and summary failures are errors. Individual games that
    /// fail are counted in the report.
    pub async fn run(
        &self,
        first: &EngineDefinition,
        second: &EngineDefinition,
        num_games: usize,
        concurrency: usize,
    ) -> Result<MatchReport, MatchError> {
        let ids = self.register(first, second).await?;
        tracing::info!(
            first = %first.name,
            first_id = %ids[0],
            second = %second.name,
            second_id = %ids[1],
            "Engines registered"
        );

        if num_games % 2 == 1 {
            tracing::warn!(
                "Odd number of games requested ({}), playing {} so both engines get each colour equally",
                num_games,
                num_games - 1
            );
        }
        let jobs = plan_jobs(num_games);
        let planned = jobs.len();
        let workers = concurrency.max(1).min(planned.max(1));
        tracing::info!(games = planned, workers, "Starting match");

        let ctx = Arc::new(MatchContext {
            launcher: Arc::clone(&self.launcher),
            store: self.store.clone(),
            settings: self.settings,
            cancel: Arc::clone(&self.cancel),
            definitions: [Arc::new(first.clone()), Arc::new(second.clone())],
            ids,
            event: format!("{} vs {}", first.name, second.name),
        });

        let (job_tx, job_rx) = mpsc::channel(planned.max(1));
        for job in jobs {
            // Capacity covers every job, so this never waits.
            if job_tx.send(job).await.is_err() {
                break;
            }
        }
        drop(job_tx);
        let job_rx = Arc::new(Mutex::new(job_rx));

        let (result_tx, mut result_rx) = mpsc::unbounded_channel();
        let mut pool = JoinSet::new();
        for worker_id in 0..workers {
            pool.spawn(worker(
                worker_id,
                Arc::clone(&ctx),
                Arc::clone(&job_rx),
                result_tx.clone(),
            ));
        }
        drop(result_tx);

        let mut recorded = 0;
        let mut gameplay_failures = 0;
        let mut storage_failures = 0;
        while let Some(report) = result_rx.recv().await {
            let done = recorded + gameplay_failures + storage_failures + 1;
            match report.result {
                Ok(game_id) => {
                    recorded += 1;
                    tracing::info!(
                        round = report.job.round,
                        game_id = game_id.0,
                        "Game {}/{} finished",
                        done,
                        planned
                    );
                }
                Err(e @ (JobError::Game(_) | JobError::Aborted(_))) => {
                    gameplay_failures += 1;
                    tracing::error!(round = report.job.round, "Game {}/{} failed: {}", done, planned, e);
                }
                Err(e) => {
                    storage_failures += 1;
                    tracing::error!(
                        round = report.job.round,
                        "Game {}/{} was decided but not recorded: {}",
                        done,
                        planned,
                        e
                    );
                }
            }
        }

        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Worker task failed: {}", e);
            }
        }

        let cancelled = planned - recorded - gameplay_failures - storage_failures;
        if cancelled > 0 {
            tracing::warn!(cancelled, "Match cancelled before all games were played");
        }

        let store = self.store.clone();
        let summary =
            tokio::task::spawn_blocking(move || store.summarize(ids[0], ids[1])).await??;

        Ok(MatchReport {
            first: ids[0],
            second: ids[1],
            summary,
            planned,
            recorded,
            gameplay_failures,
            storage_failures,
            cancelled,
        })
    }

    async fn register(
        &self,
        first: &EngineDefinition,
        second: &EngineDefinition,
    ) -> Result<[EngineId; 2], MatchError> {
        let store = self.store.clone();
        let defs = [first.clone(), second.clone()];
        tokio::task::spawn_blocking(move || {
            let mut ids = [EngineId(0); 2];
            for (slot, def) in ids.iter_mut().zip(&defs) {
                *slot = store
                    .register_engine(def)
                    .map_err(|source| MatchError::Registration {
                        engine: def.name.clone(),
                        source,
                    })?;
            }
            Ok(ids)
        })
        .await?
    }
}

async fn worker<L: EngineLauncher>(
    worker_id: usize,
    ctx: Arc<MatchContext<L>>,
    jobs: Arc<Mutex<mpsc::Receiver<GameJob>>>,
    results: mpsc::UnboundedSender<JobReport>,
) {
    loop {
        if ctx.cancel.load(Ordering::SeqCst) {
            break;
        }
        let Some(job) = jobs.lock().await.recv().await else {
            break;
        };
        if ctx.cancel.load(Ordering::SeqCst) {
            break;
        }

        tracing::debug!(worker_id, round = job.round, "Starting game");
        let game = {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move { play_job(&ctx, job).await })
        };
        let result = game.await.unwrap_or_else(|e| Err(JobError::Aborted(e)));
        if results.send(JobReport { job, result }).is_err() {
            break;
        }
    }
}

async fn play_job<L: EngineLauncher>(
    ctx: &MatchContext<L>,
    job: GameJob,
) -> Result<GameId, JobError> {
    let (white_def, white_id) = ctx.seat(job.white);
    let (black_def, black_id) = ctx.seat(job.black);

    let mut white = ctx.launcher.start(white_def).await?;
    let mut black = match ctx.launcher.start(black_def).await {
        Ok(engine) => engine,
        Err(e) => {
            white.stop().await;
            return Err(e.into());
        }
    };

    let tags = GameTags::new(
        format!("{} (id: {})", white_def.name, white_id),
        format!("{} (id: {})", black_def.name, black_id),
    )
    .with_event(ctx.event.clone())
    .with_round(job.round);

    let played = GameSession::new(&mut white, &mut black, ctx.settings)
        .with_tags(tags)
        .run()
        .await;
    white.stop().await;
    black.stop().await;
    let outcome = played?;

    tracing::debug!(
        round = job.round,
        result = outcome.result_token(),
        ending = %outcome.ending,
        plies = outcome.moves.len(),
        "Game decided"
    );

    let game = NewGame::from_outcome(white_id, black_id, &outcome);
    let store = ctx.store.clone();
    let id = tokio::task::spawn_blocking(move || store.record_game(&game)).await??;
    Ok(id)
}
