use anyhow::Result;
use clap::Parser;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::{mpsc, watch};
use tracing::*;
use walk_guide::{
    backend::{GuideBackend, HttpBackend},
    camera::{open_frame_source, SharedFrameSource},
    capture_loop::start_capture_loop,
    clock::{Clock, SystemClock},
    configuration::get_configuration,
    console::{run_console, spawn_stdin_reader},
    error::GuideError,
    intent::Intent,
    location::{FixedLocationProvider, LocationCache},
    logging::setup_tracing,
    microphone::VoiceRecorder,
    narration::{create_speech_engine, Narrator},
    session::{Command, GuideSession, SessionEvent, SessionSettings},
};

const EVENT_QUEUE_SIZE: usize = 32;

/// Walk guide client for visually impaired pedestrians
#[derive(Parser)]
#[command(author, version)]
struct Args {
    /// application configuration
    #[arg(long)]
    config: Option<PathBuf>,
    /// Path for a JSON log file.
    /// If not given will only log to stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Start detection right away
    #[arg(long)]
    autostart: bool,
    /// Sets the level of verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Args = Args::parse();
    setup_tracing(args.verbose, args.log_file.as_deref())?;
    info!("Starting walk guide");

    let app_config = get_configuration(&args.config)?;

    let backend = Arc::new(HttpBackend::new(&app_config.backend)?);
    match backend.health().await {
        Ok(health) => info!(status = %health.status, "Backend reachable"),
        Err(e) => warn!("Backend health check failed: {}", e),
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let narrator = Narrator::new(create_speech_engine(&app_config.speech), clock.clone());
    let frames = SharedFrameSource::new(open_frame_source(&app_config.capture)?);
    let location = LocationCache::new(
        Box::new(FixedLocationProvider::from_config(&app_config.location)),
        app_config.location.cache_ms,
    );
    let recorder = Arc::new(VoiceRecorder::from_config(&app_config.voice_command));

    let (capture_sender, capture_receiver) = watch::channel(false);
    let (event_sender, event_receiver) = mpsc::channel(EVENT_QUEUE_SIZE);

    let capture_task = start_capture_loop(
        frames.clone(),
        Duration::from_millis(app_config.capture.interval_ms),
        capture_receiver,
        event_sender.clone(),
    );

    let session = GuideSession::new(
        SessionSettings::from_config(&app_config),
        backend,
        narrator,
        clock,
        frames,
        location,
        capture_sender,
    );
    let session_task = tokio::spawn(session.run(event_receiver));

    if args.autostart {
        event_sender
            .send(SessionEvent::Command(Command::Intent(Intent::SystemStart)))
            .await
            .map_err(|_| GuideError::SessionClosed)?;
    }

    let lines = spawn_stdin_reader()?;
    tokio::select! {
        res = run_console(lines, event_sender.clone(), recorder) => res?,
        _ = tokio::signal::ctrl_c() => info!("Received interrupt"),
    }

    event_sender
        .send(SessionEvent::Shutdown)
        .await
        .map_err(|_| GuideError::SessionClosed)?;
    session_task.await??;
    capture_task.abort();
    info!("Walk guide stopped");
    Ok(())
}
