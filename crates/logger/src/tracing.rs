use std::env::var;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{
    Layer, Registry, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
    util::TryInitError,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot open log file {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("tracing subscriber already installed: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

/// Where log lines go besides the console.
#[derive(Debug, Clone, Default)]
pub struct LogSettings {
    /// Receives only `WARN` and above, appended, without colours.
    pub file: Option<PathBuf>,
    /// Default console level when `RUST_LOG` is unset.
    pub console_level: Option<LevelFilter>,
}

impl LogSettings {
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }
}

/// Install the global subscriber.
///
/// Fails when the log file cannot be opened, so a misconfigured sink stops the
/// service before any probe runs.
pub fn init(settings: &LogSettings) -> Result<(), Error> {
    let layers = build_layers(settings)?;
    tracing_subscriber::registry().with(layers).try_init()?;
    Ok(())
}

fn build_layers(settings: &LogSettings) -> Result<Vec<BoxedLayer>, Error> {
    let level = settings.console_level.unwrap_or(LevelFilter::INFO);
    let mut layers = vec![console_layer(level)];

    if let Some(path) = &settings.file {
        layers.push(file_layer(path)?);
    }

    Ok(layers)
}

/// Console output goes to stderr so stdout stays free for pass results
fn console_layer(level: LevelFilter) -> BoxedLayer {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let log_format = var("RUST_LOG_FORMAT")
        .inspect_err(|error| {
            warn!("Failed to read RUST_LOG_FORMAT, falling back to default: {error}")
        })
        .unwrap_or_default();

    match log_format.as_str() {
        "json" => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_filter(env_filter)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(io::stderr)
            .without_time()
            .with_filter(env_filter)
            .boxed(),
    }
}

fn file_layer(path: &Path) -> Result<BoxedLayer, Error> {
    let file = open_log_file(path)?;

    Ok(tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(Arc::new(file))
        .with_filter(LevelFilter::WARN)
        .boxed())
}

fn open_log_file(path: &Path) -> Result<File, Error> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| Error::OpenFailed { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{error, info};

    #[test]
    fn test_open_log_file_in_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("pinger.log");

        let result = build_layers(&LogSettings::default().with_file(&path));
        assert!(matches!(result, Err(Error::OpenFailed { .. })));
    }

    #[test]
    fn test_file_sink_only_keeps_warnings_and_above() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pinger.log");

        let layers = build_layers(&LogSettings::default().with_file(&path)).unwrap();
        let subscriber = tracing_subscriber::registry().with(layers);

        tracing::subscriber::with_default(subscriber, || {
            info!("PING example.com: 56 data bytes");
            error!("Failure on example.com. Cause: timeout");
        });

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("Failure on example.com. Cause: timeout"));
        assert!(!written.contains("56 data bytes"));
    }

    #[test]
    fn test_file_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pinger.log");
        std::fs::write(&path, "previous run\n").unwrap();

        let layers = build_layers(&LogSettings::default().with_file(&path)).unwrap();
        tracing::subscriber::with_default(tracing_subscriber::registry().with(layers), || {
            warn!("Trace unsuccessful for host example.com");
        });

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("previous run\n"));
        assert!(written.contains("Trace unsuccessful for host example.com"));
    }
}
