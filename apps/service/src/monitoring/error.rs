use std::io;

use thiserror::Error;

use super::types::ProbeKind;

/// Unrecoverable conditions raised while probing.
///
/// Probe-level failures (timeouts, unreachable hosts, HTTP errors) are not
/// errors here: they are reported and folded into the host result.
#[derive(Debug, Error)]
pub enum PingError {
    #[error("{kind} probe command template is empty")]
    EmptyCommand { kind: ProbeKind },

    #[error("failed to launch {kind} probe for {host}: {source}")]
    Launch {
        kind: ProbeKind,
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read {kind} probe output for {host}: {source}")]
    Output {
        kind: ProbeKind,
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("host session worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
