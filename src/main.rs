use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::{bounded, select, tick};
use log::{error, info, warn};
use simplelog::*;

use mining_tracker::app_state::AppState;
use mining_tracker::commands;
use mining_tracker::domain::models::AppConfig;
use mining_tracker::infrastructure::clock::SystemClock;
use mining_tracker::infrastructure::persistence::{
    default_config_path, default_data_path, FileConfigRepository, FileMiningDataRepository,
    LOG_FILE_NAME,
};
use mining_tracker::interface::format;
use mining_tracker::usecase::controller::SessionController;
use mining_tracker::usecase::generator::{GeneratorConfig, MetricsGenerator};
use mining_tracker::usecase::session_store::SessionStore;
use mining_tracker::usecase::store_service::spawn_store_service;

#[derive(Parser)]
#[command(name = "mining-tracker", version, about = "Simulated mining sessions with a durable session log")]
struct Cli {
    /// Config file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data file (default: platform data dir)
    #[arg(long, global = true)]
    data_file: Option<PathBuf>,

    /// Log level override: error, warn, info, debug, trace
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a mining session until Ctrl+C (or for a fixed time)
    Mine {
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// List sessions, newest first
    Sessions,
    /// List the snapshots of one session, oldest first
    Snapshots { session_id: u64 },
    /// Aggregate statistics across all sessions
    Stats,
}

fn init_logging(level: &str, log_path: Option<PathBuf>) {
    let level = level.parse::<LevelFilter>().unwrap_or(LevelFilter::Info);

    let mut builder = ConfigBuilder::new();
    let _ = builder.set_time_offset_to_local();
    let log_config = builder.build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        log_config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];

    if let Some(path) = log_path {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => loggers.push(WriteLogger::new(level, log_config, file)),
            Err(e) => eprintln!("Failed to open log file {:?}: {}", path, e),
        }
    }

    let _ = CombinedLogger::init(loggers);
}

fn load_config(cli: &Cli) -> AppConfig {
    let path = match &cli.config {
        Some(p) => Some(p.clone()),
        None => default_config_path().ok(),
    };
    match path {
        Some(p) => FileConfigRepository::new(p).load_or_default(),
        None => AppConfig::default(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli);
    let data_path = match cli.data_file.clone().or_else(|| config.data_file.clone()) {
        Some(p) => p,
        None => default_data_path().context("Failed to determine data file path")?,
    };

    let level = cli.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    init_logging(&level, Some(data_path.with_file_name(LOG_FILE_NAME)));
    info!("Mining Tracker started. Data file: {:?}", data_path);

    // Store lifetime is bound to the process: opened here, closed on the way out.
    let store = SessionStore::open(FileMiningDataRepository::new(&data_path), Arc::new(SystemClock));
    let (store, store_thread) =
        spawn_store_service(store).context("Failed to start store service")?;

    let generator = MetricsGenerator::new(GeneratorConfig::from(&config));
    let controller = SessionController::new(store.clone(), generator);
    let state = AppState::new(store.clone(), controller);

    let result = run_command(&cli.command, &state);

    // Controller first so its final stop reaches the store before shutdown.
    drop(state);
    store.shutdown();
    if store_thread.join().is_err() {
        error!("Store thread panicked");
    }
    info!("Application exited gracefully.");

    result
}

fn run_command(command: &Command, state: &AppState) -> Result<()> {
    match command {
        Command::Mine { seconds } => mine(state, *seconds),
        Command::Sessions => {
            let sessions = commands::list_sessions(state).map_err(|e| anyhow!(e))?;
            if sessions.is_empty() {
                println!("No sessions recorded.");
            }
            for session in &sessions {
                println!("{}", format::session_line(session));
            }
            Ok(())
        }
        Command::Snapshots { session_id } => {
            let snapshots = commands::list_snapshots(state, *session_id).map_err(|e| anyhow!(e))?;
            if snapshots.is_empty() {
                println!("No snapshots for session {}.", session_id);
            }
            for snapshot in &snapshots {
                println!("{}", format::snapshot_line(snapshot));
            }
            Ok(())
        }
        Command::Stats => {
            let stats = commands::overall_stats(state).map_err(|e| anyhow!(e))?;
            for line in format::overall_lines(&stats) {
                println!("{}", line);
            }
            Ok(())
        }
    }
}

fn mine(state: &AppState, seconds: Option<u64>) -> Result<()> {
    match state.store.recover_interrupted_sessions() {
        Ok(ids) if !ids.is_empty() => warn!("Recovered {} interrupted session(s)", ids.len()),
        Ok(_) => {}
        Err(e) => error!("Failed to recover interrupted sessions: {}", e),
    }

    let (shutdown_tx, shutdown_rx) = bounded(1);
    ctrlc::set_handler(move || {
        info!("Ctrl+C received! Stopping session...");
        let _ = shutdown_tx.try_send(());
    })
    .context("Error setting Ctrl-C handler")?;

    let session_id = commands::start_mining(state).map_err(|e| anyhow!(e))?;
    println!("Mining session {} started. Press Ctrl+C to stop.", session_id);

    let started = Instant::now();
    let deadline = seconds.map(Duration::from_secs);
    let status = tick(Duration::from_secs(1));

    loop {
        select! {
            recv(shutdown_rx) -> _ => break,
            recv(status) -> _ => {
                let snapshot = commands::get_snapshot(state);
                if let Some(sample) = snapshot.last_sample {
                    println!(
                        "{:>9} H/s  total {:>9}  accepted {:>9}",
                        format::format_number(sample.hashes_per_second),
                        format::format_number(sample.total_hashes as f64),
                        format::format_number(sample.accepted_hashes as f64),
                    );
                }
                if let Some(err) = snapshot.last_error {
                    warn!("Last store error: {}", err);
                }
                if deadline.is_some_and(|d| started.elapsed() >= d) {
                    break;
                }
            }
        }
    }

    commands::stop_mining(state).map_err(|e| anyhow!(e))?;

    let sessions = commands::list_sessions(state).map_err(|e| anyhow!(e))?;
    if let Some(session) = sessions.iter().find(|s| s.id == session_id) {
        println!("{}", format::session_line(session));
    }
    Ok(())
}
