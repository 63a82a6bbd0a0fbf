//! Tourney - runs matches between two UCI engines from the command line.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use tokio::signal;
use tourney::engine::process::UciLauncher;
use tourney::{EngineDefinition, MatchRunner, Store, TimeControl, TourneyConfig};

#[derive(Parser)]
#[command(name = "tourney")]
#[command(about = "Run chess engines against each other using UCI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a match between two engines and print the results
    Match {
        /// Definition file of the first engine under test
        #[arg(long)]
        engine1_def: PathBuf,
        /// Definition file of the second engine under test
        #[arg(long)]
        engine2_def: PathBuf,
        /// Number of games to play (rounded down to an even number)
        #[arg(long, default_value = "10")]
        num_games: usize,
        /// Games played at once [default: available parallelism]
        #[arg(long)]
        concurrency: Option<usize>,
        /// Results database [default: tourney.db]
        #[arg(long)]
        db_path: Option<PathBuf>,
        /// clock:<ms> per side or movetime:<ms> per move [default: clock:60000]
        #[arg(long)]
        time_control: Option<TimeControl>,
        /// Configuration file [default: tourney.toml]
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the stored results between two engines
    Summary {
        /// Definition file of the first engine
        #[arg(long)]
        engine1_def: PathBuf,
        /// Definition file of the second engine
        #[arg(long)]
        engine2_def: PathBuf,
        /// Results database [default: tourney.db]
        #[arg(long)]
        db_path: Option<PathBuf>,
        /// Configuration file [default: tourney.toml]
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<TourneyConfig> {
    let path = path.unwrap_or_else(TourneyConfig::config_path);
    TourneyConfig::load(&path).with_context(|| format!("loading {}", path.display()))
}

fn read_definition(path: &Path) -> anyhow::Result<EngineDefinition> {
    let definition = EngineDefinition::read(path)?;
    tracing::info!(
        "Engine '{}' from {} ({} options)",
        definition.name,
        definition.path.display(),
        definition.options.len()
    );
    Ok(definition)
}

fn open_store(path: &Path) -> anyhow::Result<Store> {
    Store::open(path).with_context(|| format!("opening database {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Match {
            engine1_def,
            engine2_def,
            num_games,
            concurrency,
            db_path,
            time_control,
            config,
        } => {
            let mut config = load_config(config)?;
            if let Some(tc) = time_control {
                config.time_control = tc;
            }
            if let Some(path) = db_path {
                config.db_path = path;
            }
            if concurrency.is_some() {
                config.concurrency = concurrency;
            }

            let first = read_definition(&engine1_def)?;
            let second = read_definition(&engine2_def)?;
            let store = open_store(&config.db_path)?;

            tracing::info!(
                "Database: {}, time control: {}, concurrency: {}",
                config.db_path.display(),
                config.time_control,
                config.concurrency()
            );

            let runner = MatchRunner::new(
                UciLauncher::new(config.uci_settings()),
                store,
                config.session_settings(),
            );

            let cancel = runner.cancel_flag();
            tokio::spawn(async move {
                if signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupted, finishing games in progress");
                    cancel.store(true, Ordering::SeqCst);
                }
            });

            let report = runner
                .run(&first, &second, num_games, config.concurrency())
                .await?;
            print!("{}", report);
        }
        Commands::Summary {
            engine1_def,
            engine2_def,
            db_path,
            config,
        } => {
            let config = load_config(config)?;
            let db_path = db_path.unwrap_or(config.db_path);

            let first = read_definition(&engine1_def)?;
            let second = read_definition(&engine2_def)?;
            let store = open_store(&db_path)?;

            print!("{}", store.summary_for(&first, &second)?);
        }
    }

    Ok(())
}
