pub mod config;
pub mod db;
pub mod sessions;
pub mod settings;
pub mod snapshot_store;
pub mod sync;
pub mod timer;
mod utils;

use std::{io::Write, sync::Arc};

use anyhow::Context;
use log::{info, warn};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast,
    time::Duration,
};

use config::{debug_enabled, AppPaths};
use db::Database;
use sessions::spawn_session_writer;
use settings::SettingsStore;
use snapshot_store::FileSnapshotStore;
use sync::{ChangeNotifier, PollingNotifier};
use timer::{
    commands::{self, Command},
    TimerController, TimerEvent,
};

/// How often the snapshot file is checked for writes by other processes.
const SNAPSHOT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const EVENT_CHANNEL_CAPACITY: usize = 128;

pub(crate) struct AppState {
    pub(crate) db: Database,
    pub(crate) timer: TimerController,
    pub(crate) settings: Arc<SettingsStore>,
}

pub async fn run() -> anyhow::Result<()> {
    // Reads RUST_LOG; FOCUS_TIMER_DEBUG only moves the default.
    let default_level = if debug_enabled() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .init();

    info!("Focus timer starting up...");

    let paths = AppPaths::from_env()?;
    paths.ensure()?;
    info!("Data directory: {}", paths.data_dir().display());

    let settings = Arc::new(SettingsStore::new(paths.settings_file())?);
    let database = Database::new(paths.database_file())?;

    let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    let (queue, writer) = spawn_session_writer(database.clone(), events.clone());

    let snapshot_file = FileSnapshotStore::new(paths.snapshot_file());
    let notifier = Arc::new(PollingNotifier::spawn(
        snapshot_file.clone(),
        SNAPSHOT_POLL_INTERVAL,
    ));

    let controller = TimerController::for_surface(
        settings.clone(),
        Arc::new(snapshot_file),
        Arc::new(queue),
        notifier.clone() as Arc<dyn ChangeNotifier>,
        events,
    )
    .await;
    controller.mount().await;

    let state = AppState {
        db: database,
        timer: controller.clone(),
        settings,
    };

    let printer = tokio::spawn(print_events(controller.subscribe()));

    println!("{}", commands::describe(&controller.snapshot().await));
    println!("Type 'help' for commands.");
    repl(&state).await?;

    controller.shutdown().await;
    notifier.shutdown().await;
    printer.abort();

    // The controller holds the last queue handle; dropping the state lets the
    // writer drain and exit.
    drop(state);
    drop(controller);
    if let Err(err) = writer.await {
        warn!("Session writer ended abnormally: {err}");
    }

    info!("Focus timer shut down");
    Ok(())
}

async fn repl(state: &AppState) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        prompt();
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read from stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };

        let quit = command == Command::Quit;
        match commands::execute(state, command).await {
            Ok(reply) => println!("{reply}"),
            Err(err) => println!("Error: {err:#}"),
        }
        if quit {
            break;
        }
    }
    Ok(())
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

async fn print_events(mut rx: broadcast::Receiver<TimerEvent>) {
    loop {
        match rx.recv().await {
            Ok(TimerEvent::PhaseCompleted {
                finished,
                next,
                chime,
            }) => {
                let bell = if chime { "\x07" } else { "" };
                match next {
                    Some(next) => println!(
                        "\n{bell}{} finished, {} next",
                        finished.label(),
                        next.label()
                    ),
                    None => println!("\n{bell}{} finished", finished.label()),
                }
                prompt();
            }
            Ok(TimerEvent::SessionRecorded { session }) => {
                log::debug!(
                    "Recorded {}s for {}",
                    session.record.duration_sec,
                    session.record.project_id
                );
            }
            Ok(TimerEvent::StateChanged { .. }) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
