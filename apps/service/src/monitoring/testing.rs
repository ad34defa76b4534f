//! Fakes shared by the monitoring tests.

use std::io;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use super::checker::{ProbeOutcome, Prober};
use super::error::PingError;
use super::reporter::{ErrorReporter, FailureLog};
use super::types::{ErrorReport, ProbeKind};

/// Reporter that only remembers what it was given
#[derive(Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<ErrorReport>>,
}

impl RecordingReporter {
    pub fn reports(&self) -> Vec<ErrorReport> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ErrorReporter for RecordingReporter {
    async fn report(&self, report: &ErrorReport) {
        self.reports.lock().unwrap().push(report.clone());
    }
}

/// Prober that answers instantly without spawning anything
pub struct ScriptedProber {
    kind: ProbeKind,
    fail_launch: bool,
    calls: AtomicUsize,
}

impl ScriptedProber {
    pub fn new(kind: ProbeKind) -> Self {
        Self { kind, fail_launch: false, calls: AtomicUsize::new(0) }
    }

    /// Fails every call as if the probe program could not be started
    pub fn failing(kind: ProbeKind) -> Self {
        Self { fail_launch: true, ..Self::new(kind) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Prober for ScriptedProber {
    fn kind(&self) -> ProbeKind {
        self.kind
    }

    async fn probe(&self, host: &str, _failures: &FailureLog) -> Result<ProbeOutcome, PingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_launch {
            return Err(PingError::Launch {
                kind: self.kind,
                host: host.to_string(),
                source: io::Error::from(io::ErrorKind::NotFound),
            });
        }

        match self.kind {
            ProbeKind::Tcp => Ok(ProbeOutcome::Http(None)),
            kind => Ok(ProbeOutcome::Lines(vec![format!("{kind} {host}")])),
        }
    }
}

#[derive(Debug)]
pub struct CapturedRequest {
    pub head: String,
    pub body: String,
}

/// Serve one canned HTTP response to every connection on an ephemeral
/// localhost port, forwarding each request received
pub async fn serve_canned(
    status: &'static str,
    body: &'static str,
) -> (SocketAddr, mpsc::UnboundedReceiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let Some(request) = read_request(&mut stream).await else {
                    return;
                };
                let _ = tx.send(request);

                let response = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    (addr, rx)
}

async fn read_request(stream: &mut tokio::net::TcpStream) -> Option<CapturedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let head_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < head_end + content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let body = String::from_utf8_lossy(&buf[head_end..]).to_string();
    Some(CapturedRequest { head, body })
}
