use std::{fs::OpenOptions, path::Path, sync::Mutex};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global subscriber.
///
/// Verbosity picks the default level (`RUST_LOG` still wins when set).
/// When `log_file` is given, a JSON copy of every event is appended to it.
pub fn setup_tracing(verbosity_level: u8, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = match verbosity_level {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        2 => LevelFilter::TRACE,
        _ => LevelFilter::TRACE,
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(filter.into())
        .from_env_lossy();

    let stderr_writer = fmt::Layer::default()
        .with_thread_names(true)
        .with_writer(std::io::stderr);

    let file_writer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().append(true).create(true).open(path)?;
            Some(
                fmt::Layer::default()
                    .json()
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_writer)
        .with(file_writer)
        .try_init()?;

    tracing::info!("Logging level set to {}", filter);
    Ok(())
}
