//! Logging setup - console plus optional file, text or JSON lines

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub debug: bool,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Install the global subscriber.
///
/// Returns a warning when the log file could not be opened; logging then
/// continues on the console only.
pub fn init(options: &LogOptions) -> Option<String> {
    let default_level = if options.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    // Console goes to stderr; stdout carries the outcome JSON
    let mut layers: Vec<BoxedLayer> = vec![layer_for(options.format, std::io::stderr, true)];

    let mut warning = None;
    if let Some(path) = &options.file {
        match open_log_file(path) {
            Ok(file) => layers.push(layer_for(options.format, Mutex::new(file), false)),
            Err(e) => {
                warning = Some(format!(
                    "cannot open log file {}: {}, logging to console only",
                    path.display(),
                    e
                ))
            }
        }
    }

    // A subscriber may already be installed (tests)
    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init();

    warning
}

fn layer_for<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Text => fmt::layer()
            .with_target(false)
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
    }
}

/// Open for append, creating parent directories
pub fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}
