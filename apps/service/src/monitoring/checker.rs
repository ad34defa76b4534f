use anyhow::Result;
use std::collections::HashMap;
use std::io;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info};

use super::error::PingError;
use super::reporter::FailureLog;
use super::types::{ProbeKind, TcpProbeResult};

/// What a single probe produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The probe was already launched for this host during the pass
    Suppressed,
    /// Output of a command probe, in stream order
    Lines(Vec<String>),
    /// HTTP probe result; `None` when skipped or failed
    Http(Option<TcpProbeResult>),
}

impl ProbeOutcome {
    pub fn into_lines(self) -> Vec<String> {
        match self {
            ProbeOutcome::Lines(lines) => lines,
            _ => Vec::new(),
        }
    }

    pub fn into_tcp_result(self) -> Option<TcpProbeResult> {
        match self {
            ProbeOutcome::Http(result) => result,
            _ => None,
        }
    }
}

/// A reachability check against one host.
///
/// Failures observed while probing are recorded on the session's
/// [`FailureLog`] as soon as they are seen; only local conditions that make
/// the probe impossible to run are returned as errors.
#[async_trait::async_trait]
pub trait Prober: Send + Sync {
    fn kind(&self) -> ProbeKind;

    async fn probe(&self, host: &str, failures: &FailureLog) -> Result<ProbeOutcome, PingError>;
}

/// Runs an external command with the host appended and classifies its
/// stdout line by line
pub struct CommandProber {
    kind: ProbeKind,
    program: String,
    args: Vec<String>,
    is_failure_line: fn(&str) -> bool,
}

impl CommandProber {
    /// ICMP echo via the configured ping command
    pub fn icmp(template: &[String]) -> Result<Self, PingError> {
        Self::new(ProbeKind::Icmp, template, is_icmp_failure)
    }

    /// Route trace via the configured traceroute command
    pub fn trace(template: &[String]) -> Result<Self, PingError> {
        Self::new(ProbeKind::Trace, template, is_trace_failure)
    }

    fn new(
        kind: ProbeKind,
        template: &[String],
        is_failure_line: fn(&str) -> bool,
    ) -> Result<Self, PingError> {
        let (program, args) = template.split_first().ok_or(PingError::EmptyCommand { kind })?;

        Ok(Self { kind, program: program.clone(), args: args.to_vec(), is_failure_line })
    }

    fn unknown_failure(&self, host: &str) -> String {
        match self.kind {
            ProbeKind::Trace => format!("Trace unsuccessful for host {host}"),
            _ => format!("ICMP ping failed for host {host} for unknown reasons"),
        }
    }

    fn log_line_failure(&self, host: &str, line: &str) {
        match self.kind {
            ProbeKind::Icmp => error!("Failure on {}. Cause: timeout", host),
            _ => error!("{} on host: {}", line, host),
        }
    }
}

#[async_trait::async_trait]
impl Prober for CommandProber {
    fn kind(&self) -> ProbeKind {
        self.kind
    }

    async fn probe(&self, host: &str, failures: &FailureLog) -> Result<ProbeOutcome, PingError> {
        let output_error =
            |source: io::Error| PingError::Output { kind: self.kind, host: host.to_string(), source };

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(host)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PingError::Launch {
                kind: self.kind,
                host: host.to_string(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| output_error(io::Error::other("stdout was not captured")))?;

        let mut stream = BufReader::new(stdout).split(b'\n');
        let mut lines = Vec::new();
        let mut line_failure = false;

        while let Some(raw) = stream.next_segment().await.map_err(output_error)? {
            let line = String::from_utf8_lossy(&raw).trim_end_matches('\r').to_string();
            info!("{line}");
            lines.push(line.clone());

            if (self.is_failure_line)(&line) {
                line_failure = true;
                self.log_line_failure(host, &line);
                failures.record(self.kind, line).await;
            }
        }

        let status = child.wait().await.map_err(output_error)?;
        if !status.success() && !line_failure {
            let message = self.unknown_failure(host);
            error!("{message}");
            failures.record(self.kind, message).await;
        }

        Ok(ProbeOutcome::Lines(lines))
    }
}

/// An ICMP output line that signals a lost echo
pub fn is_icmp_failure(line: &str) -> bool {
    line.to_lowercase().contains("timeout")
}

/// A trace output line that signals resolution or routing trouble
pub fn is_trace_failure(line: &str) -> bool {
    let line = line.to_lowercase();
    line.contains("unknown host") || line.contains("error")
}

/// Plain HTTP GET against hosts that have a connect timeout configured
pub struct HttpProber {
    clients: HashMap<String, reqwest::Client>,
}

impl HttpProber {
    /// Build one client per host from its connect timeout. Hosts without a
    /// timeout are skipped when probed.
    pub fn new(timeouts: &HashMap<String, Duration>) -> reqwest::Result<Self> {
        let clients = timeouts
            .iter()
            .map(|(host, timeout)| -> reqwest::Result<(String, reqwest::Client)> {
                let client =
                    reqwest::Client::builder().connect_timeout(*timeout).no_proxy().build()?;
                Ok((host.clone(), client))
            })
            .collect::<reqwest::Result<_>>()?;

        Ok(Self { clients })
    }

    async fn fetch(client: &reqwest::Client, host: &str) -> Result<TcpProbeResult> {
        let start = Instant::now();

        let response = client.get(format!("http://{host}")).send().await?;
        let http_status = response.status().as_u16();
        let response_body = response.text().await?;

        let elapsed_ms = start.elapsed().as_millis() as u64;

        Ok(TcpProbeResult { target_host: host.to_string(), elapsed_ms, http_status, response_body })
    }
}

#[async_trait::async_trait]
impl Prober for HttpProber {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Tcp
    }

    async fn probe(&self, host: &str, failures: &FailureLog) -> Result<ProbeOutcome, PingError> {
        let Some(client) = self.clients.get(host) else {
            debug!("No TCP timeout configured for {}, skipping HTTP probe", host);
            return Ok(ProbeOutcome::Http(None));
        };

        match Self::fetch(client, host).await {
            Ok(result) => {
                info!(
                    "HTTP probe of {} answered {} in {}ms",
                    host, result.http_status, result.elapsed_ms
                );
                Ok(ProbeOutcome::Http(Some(result)))
            }
            Err(e) => {
                let message =
                    format!("Failed to make TCP/IP ping to host {host} via HTTP. Possible cause {e:#}");
                error!("{message}");
                failures.record(ProbeKind::Tcp, message).await;
                Ok(ProbeOutcome::Http(None))
            }
        }
    }
}
