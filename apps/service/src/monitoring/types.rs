use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Kind of reachability probe run against a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    Icmp,
    Tcp,
    Trace,
}

impl std::fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeKind::Icmp => write!(f, "icmp"),
            ProbeKind::Tcp => write!(f, "tcp"),
            ProbeKind::Trace => write!(f, "trace"),
        }
    }
}

/// Marker stored in the dedup guard once a probe has been launched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    Running,
}

/// Failure report sent to the reporting service.
///
/// One live instance exists per host session; every probe that fails writes
/// its own field, so a report may carry messages from several probes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub host: Option<String>,
    pub icmp_ping: Option<String>,
    pub tcp_ping: Option<String>,
    pub trace: Option<String>,
}

impl ErrorReport {
    /// Record `message` for `kind` on behalf of `host`
    pub fn attach(&mut self, host: &str, kind: ProbeKind, message: String) {
        self.host = Some(host.to_string());
        match kind {
            ProbeKind::Icmp => self.icmp_ping = Some(message),
            ProbeKind::Tcp => self.tcp_ping = Some(message),
            ProbeKind::Trace => self.trace = Some(message),
        }
    }

    #[cfg(test)]
    pub fn message(&self, kind: ProbeKind) -> Option<&str> {
        match kind {
            ProbeKind::Icmp => self.icmp_ping.as_deref(),
            ProbeKind::Tcp => self.tcp_ping.as_deref(),
            ProbeKind::Trace => self.trace.as_deref(),
        }
    }

    /// Compact JSON form used for logging and transport
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Outcome of a completed HTTP GET against a host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TcpProbeResult {
    /// Host the request was sent to
    pub target_host: String,

    /// Wall-clock time from sending the request to reading the whole body
    pub elapsed_ms: u64,

    /// HTTP status code of the response
    pub http_status: u16,

    /// Full, buffered response body
    pub response_body: String,
}

/// Merged outcome of all probes for one host in one pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostResult {
    /// When the last probe of the session finished
    pub completed_at: DateTime<Utc>,

    /// ICMP command output, in stream order
    pub icmp_lines: Vec<String>,

    /// Every report emitted during the session, in emission order
    pub reported_errors: Vec<ErrorReport>,

    /// HTTP outcome; `None` when the probe was skipped or failed
    pub tcp_result: Option<TcpProbeResult>,

    /// Trace command output, in stream order
    pub trace_lines: Vec<String>,
}

impl HostResult {
    pub fn new(
        icmp_lines: Vec<String>,
        reported_errors: Vec<ErrorReport>,
        tcp_result: Option<TcpProbeResult>,
        trace_lines: Vec<String>,
    ) -> Self {
        Self { completed_at: Utc::now(), icmp_lines, reported_errors, tcp_result, trace_lines }
    }

    pub fn has_errors(&self) -> bool {
        !self.reported_errors.is_empty()
    }
}

/// Results of one probing pass keyed by host
pub type PassResult = HashMap<String, HostResult>;

/// How a pass ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Every host was processed
    Completed(PassResult),
    /// A shutdown request stopped the pass; holds what finished before it
    Interrupted(PassResult),
}

impl PassOutcome {
    pub fn results(&self) -> &PassResult {
        match self {
            PassOutcome::Completed(results) | PassOutcome::Interrupted(results) => results,
        }
    }

    #[cfg(test)]
    pub fn into_results(self) -> PassResult {
        match self {
            PassOutcome::Completed(results) | PassOutcome::Interrupted(results) => results,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, PassOutcome::Interrupted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_report_json_shape() {
        let mut report = ErrorReport::default();
        report.attach("example.com", ProbeKind::Icmp, "Request timeout for icmp_seq 3".into());

        let json = report.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"host":"example.com","icmpPing":"Request timeout for icmp_seq 3","tcpPing":null,"trace":null}"#
        );
    }

    #[test]
    fn test_attach_keeps_other_probe_messages() {
        let mut report = ErrorReport::default();
        report.attach("example.com", ProbeKind::Trace, "traceroute: unknown host".into());
        report.attach("example.com", ProbeKind::Tcp, "connection refused".into());

        assert_eq!(report.message(ProbeKind::Trace), Some("traceroute: unknown host"));
        assert_eq!(report.message(ProbeKind::Tcp), Some("connection refused"));
        assert_eq!(report.message(ProbeKind::Icmp), None);
    }

    #[test]
    fn test_probe_kind_display() {
        assert_eq!(ProbeKind::Icmp.to_string(), "icmp");
        assert_eq!(ProbeKind::Tcp.to_string(), "tcp");
        assert_eq!(ProbeKind::Trace.to_string(), "trace");
    }
}
