pub mod alarms;
pub mod audio;
pub mod console;
pub mod db;
pub mod dismissal;
pub mod memos;
pub mod motion;
pub mod poller;
pub mod settings;
mod utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::sync::mpsc;

use alarms::AlarmStore;
use audio::AudioEngineHandle;
use console::{spawn_stdin_lines, ChimeRinger, Console};
use db::Database;
use motion::{ImageSequenceCamera, MotionVerifier};
use poller::AlarmPoller;
use settings::SettingsStore;

pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    info!("smart alarm starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("smart-alarm")
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(serve())
}

async fn serve() -> Result<()> {
    let settings = SettingsStore::from_env()?;
    info!("settings loaded from {}", settings.path().display());

    let database = Database::new(settings.database_path())?;
    let store: Arc<dyn AlarmStore> = Arc::new(database);

    let detector = settings.detector();
    let camera = Arc::new(ImageSequenceCamera::new(
        detector.frames_dir.clone(),
        detector.frame_rate,
    ));
    let verifier = Arc::new(MotionVerifier::new(
        camera,
        detector.detector_config(),
        detector.max_wait(),
    ));
    let ringer = Arc::new(ChimeRinger::new(AudioEngineHandle::new(), settings.alarm()));

    let (poll_tx, poll_rx) = mpsc::channel(8);
    let mut poller = AlarmPoller::new();
    poller.start(Arc::clone(&store), settings.poll_interval(), poll_tx)?;

    let mut console = Console::new(
        store,
        verifier,
        ringer,
        spawn_stdin_lines(),
        std::io::stdout(),
    );

    let result = tokio::select! {
        served = console.serve(poll_rx) => served,
        signal = tokio::signal::ctrl_c() => {
            info!("interrupt received; shutting down");
            signal.context("failed to listen for ctrl-c")
        }
    };

    if let Err(err) = poller.stop().await {
        warn!("poller did not stop cleanly: {err:#}");
    }
    result
}
