use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use super::checker::{ProbeOutcome, Prober};
use super::error::PingError;
use super::guard::DedupGuard;
use super::reporter::{ErrorReporter, FailureLog};
use super::types::{ErrorReport, HostResult};

/// Results written by host sessions while a pass is running
pub type SharedResults = Arc<DashMap<String, HostResult>>;

/// The probes run against every host
#[derive(Clone)]
pub struct ProbeSet {
    pub icmp: Arc<dyn Prober>,
    pub tcp: Arc<dyn Prober>,
    pub trace: Arc<dyn Prober>,
}

/// Runs all probes for a single host and publishes the merged result
pub struct HostSession {
    host: String,
    probes: ProbeSet,
    guard: Arc<DedupGuard>,
    results: SharedResults,
    reporter: Arc<dyn ErrorReporter>,
}

impl HostSession {
    pub fn new(
        host: impl Into<String>,
        probes: ProbeSet,
        guard: Arc<DedupGuard>,
        results: SharedResults,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self { host: host.into(), probes, guard, results, reporter }
    }

    /// Run the three probes concurrently and wait for all of them.
    ///
    /// Returns `None` when another session already owns this host during the
    /// pass; the earlier result is then left in place.
    pub async fn run(self) -> Result<Option<HostResult>, PingError> {
        let [icmp_claimed, tcp_claimed, trace_claimed] = self.guard.claim(
            &self.host,
            [self.probes.icmp.kind(), self.probes.tcp.kind(), self.probes.trace.kind()],
        );
        if !(icmp_claimed || tcp_claimed || trace_claimed) {
            debug!("{} is already being probed during this pass", self.host);
            return Ok(None);
        }

        info!("Probing {}", self.host);
        let failures = FailureLog::new(self.host.clone(), self.reporter.clone());

        let (icmp, tcp, trace) = tokio::join!(
            self.launch(self.probes.icmp.as_ref(), icmp_claimed, &failures),
            self.launch(self.probes.tcp.as_ref(), tcp_claimed, &failures),
            self.launch(self.probes.trace.as_ref(), trace_claimed, &failures),
        );
        let (icmp, tcp, trace) = (icmp?, tcp?, trace?);

        let result = merge(icmp, failures.into_reported(), tcp, trace);
        self.publish(&result);

        Ok(Some(result))
    }

    async fn launch(
        &self,
        prober: &dyn Prober,
        claimed: bool,
        failures: &FailureLog,
    ) -> Result<ProbeOutcome, PingError> {
        if !claimed {
            debug!("{} probe for {} is already running, skipping", prober.kind(), self.host);
            return Ok(ProbeOutcome::Suppressed);
        }

        prober.probe(&self.host, failures).await
    }

    fn publish(&self, result: &HostResult) {
        self.results.insert(self.host.clone(), result.clone());
    }
}

/// Fold the probe outcomes of one session into its host result
pub fn merge(
    icmp: ProbeOutcome,
    reported_errors: Vec<ErrorReport>,
    tcp: ProbeOutcome,
    trace: ProbeOutcome,
) -> HostResult {
    HostResult::new(icmp.into_lines(), reported_errors, tcp.into_tcp_result(), trace.into_lines())
}
