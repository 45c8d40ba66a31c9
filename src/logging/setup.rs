use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use super::formatter::BracketedFormatter;

/// Filter used when `RUST_LOG` is unset; HTTP stack internals stay quiet
const DEFAULT_FILTER: &str = "info,reqwest=warn,hyper=warn,rustls=warn";

fn create_log_file(log_dir: &Path) -> io::Result<(File, PathBuf)> {
    fs::create_dir_all(log_dir)?;

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let log_path = log_dir.join(format!("dataset_builder_{}.log", timestamp));
    let file = File::create(&log_path)?;
    Ok((file, log_path))
}

/// Install the global subscriber, logging to stdout and to a timestamped
/// file under `log_dir`.
///
/// Returns the log file path, or `None` when the file could not be created
/// and only stdout is used.
pub fn setup_logging(log_dir: &Path) -> Option<PathBuf> {
    let log_file = create_log_file(log_dir);

    let (file_layer, log_path, file_error) = match log_file {
        Ok((file, path)) => {
            let layer = fmt::layer()
                .event_format(BracketedFormatter)
                .with_writer(Mutex::new(file))
                .with_ansi(false);
            (Some(layer), Some(path), None)
        }
        Err(e) => (None, None, Some(e)),
    };

    let stdout_layer = fmt::layer()
        .event_format(BracketedFormatter)
        .with_writer(io::stdout);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)))
        .with(file_layer)
        .with(stdout_layer)
        .init();

    match (&log_path, file_error) {
        (Some(path), _) => info!("Log file created at: {:?}", path),
        (None, Some(e)) => warn!(
            "Logging to stdout only, could not create log file in {:?}: {}",
            log_dir, e
        ),
        (None, None) => {}
    }

    log_path
}
