use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::error::PingError;
use super::executor::{HostSession, ProbeSet, SharedResults};
use super::guard::DedupGuard;
use super::reporter::ErrorReporter;
use super::types::{PassOutcome, PassResult};

/// How host sessions are dispatched within a pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchMode {
    /// Submit every host to the worker pool, then wait for all of them
    #[default]
    Parallel,
    /// Wait for each host before dispatching the next one
    Sequential,
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "parallel" => Ok(DispatchMode::Parallel),
            "sequential" => Ok(DispatchMode::Sequential),
            other => Err(format!("unknown dispatch mode '{other}', expected parallel or sequential")),
        }
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Parallel => write!(f, "parallel"),
            DispatchMode::Sequential => write!(f, "sequential"),
        }
    }
}

/// Runs one probing pass over a host list.
///
/// Owns the dedup guard for its whole lifetime; the guard is empty whenever
/// no pass is running.
pub struct PassCoordinator {
    probes: ProbeSet,
    reporter: Arc<dyn ErrorReporter>,
    guard: Arc<DedupGuard>,
    dispatch: DispatchMode,
    workers: Option<usize>,
}

impl PassCoordinator {
    pub fn new(probes: ProbeSet, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            probes,
            reporter,
            guard: Arc::new(DedupGuard::new()),
            dispatch: DispatchMode::default(),
            workers: None,
        }
    }

    pub fn with_dispatch(mut self, dispatch: DispatchMode) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Bound the number of concurrent sessions. Defaults to one per host.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    #[cfg(test)]
    pub fn guard(&self) -> &DedupGuard {
        &self.guard
    }

    /// Probe every host and collect their results.
    ///
    /// A shutdown request stops dispatching and yields
    /// [`PassOutcome::Interrupted`]; only launch failures are errors. The
    /// dedup guard is cleared however the pass ends.
    pub async fn run_pass(
        &self,
        hosts: &[String],
        shutdown: &CancellationToken,
    ) -> Result<PassOutcome, PingError> {
        let results: SharedResults = Arc::new(DashMap::new());

        let dispatched = match self.dispatch {
            DispatchMode::Parallel => self.dispatch_parallel(hosts, &results, shutdown).await,
            DispatchMode::Sequential => self.dispatch_sequential(hosts, &results, shutdown).await,
        };
        self.guard.clear();

        let interrupted = dispatched?;
        let collected: PassResult =
            results.iter().map(|entry| (entry.key().clone(), entry.value().clone())).collect();

        if interrupted {
            Ok(PassOutcome::Interrupted(collected))
        } else {
            Ok(PassOutcome::Completed(collected))
        }
    }

    fn session(&self, host: &str, results: &SharedResults) -> HostSession {
        HostSession::new(
            host,
            self.probes.clone(),
            self.guard.clone(),
            results.clone(),
            self.reporter.clone(),
        )
    }

    fn pool_size(&self, host_count: usize) -> usize {
        self.workers.unwrap_or(host_count).max(1)
    }

    /// Returns whether the pass was interrupted
    async fn dispatch_parallel(
        &self,
        hosts: &[String],
        results: &SharedResults,
        shutdown: &CancellationToken,
    ) -> Result<bool, PingError> {
        let pool = Arc::new(Semaphore::new(self.pool_size(hosts.len())));
        let mut sessions = JoinSet::new();

        for host in hosts {
            let session = self.session(host, results);
            let pool = pool.clone();
            sessions.spawn(async move {
                // the pool is never closed, so acquiring only waits for a free worker
                let _permit = pool.acquire_owned().await;
                session.run().await
            });
        }

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    warn!("Shutdown requested, abandoning {} host sessions", sessions.len());
                    sessions.abort_all();
                    return Ok(true);
                }
                joined = sessions.join_next() => match joined {
                    Some(joined) => {
                        joined??;
                    }
                    None => return Ok(false),
                },
            }
        }
    }

    /// Returns whether the pass was interrupted
    async fn dispatch_sequential(
        &self,
        hosts: &[String],
        results: &SharedResults,
        shutdown: &CancellationToken,
    ) -> Result<bool, PingError> {
        for host in hosts {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    warn!("Shutdown requested while probing {}, skipping remaining hosts", host);
                    return Ok(true);
                }
                outcome = self.session(host, results).run() => {
                    outcome?;
                }
            }
        }

        Ok(false)
    }
}

/// Counts logged after every pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub hosts: usize,
    pub hosts_with_errors: usize,
    pub tcp_results: usize,
}

impl PassSummary {
    pub fn of(results: &PassResult) -> Self {
        Self {
            hosts: results.len(),
            hosts_with_errors: results.values().filter(|r| r.has_errors()).count(),
            tcp_results: results.values().filter(|r| r.tcp_result.is_some()).count(),
        }
    }
}

impl fmt::Display for PassSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} hosts probed, {} with errors, {} HTTP results",
            self.hosts, self.hosts_with_errors, self.tcp_results
        )
    }
}

/// Triggers a pass after an initial delay and then once per period
pub struct MonitoringScheduler {
    coordinator: PassCoordinator,
    hosts: Vec<String>,
    delay: Duration,
    period: Duration,
}

impl MonitoringScheduler {
    pub fn new(
        coordinator: PassCoordinator,
        hosts: Vec<String>,
        delay: Duration,
        period: Duration,
    ) -> Self {
        Self { coordinator, hosts, delay, period }
    }

    /// Run passes until shutdown is requested or a pass fails fatally
    pub async fn run(&self, shutdown: &CancellationToken) -> Result<(), PingError> {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            _ = sleep(self.delay) => {}
        }

        let mut timer = interval(self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, stopping scheduler");
                    return Ok(());
                }
                _ = timer.tick() => {}
            }

            let outcome = self.coordinator.run_pass(&self.hosts, shutdown).await?;
            info!("Pass finished: {}", PassSummary::of(outcome.results()));

            if outcome.is_interrupted() {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::testing::{RecordingReporter, ScriptedProber};
    use crate::monitoring::types::ProbeKind;

    fn scheduler(icmp: Arc<ScriptedProber>, delay: Duration, period: Duration) -> MonitoringScheduler {
        let probes = ProbeSet {
            icmp,
            tcp: Arc::new(ScriptedProber::new(ProbeKind::Tcp)),
            trace: Arc::new(ScriptedProber::new(ProbeKind::Trace)),
        };
        let coordinator = PassCoordinator::new(probes, Arc::new(RecordingReporter::default()));

        MonitoringScheduler::new(coordinator, vec!["example.com".to_string()], delay, period)
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_waits_for_delay_then_runs_once_per_period() {
        let icmp = Arc::new(ScriptedProber::new(ProbeKind::Icmp));
        let scheduler = scheduler(icmp.clone(), Duration::from_secs(10), Duration::from_secs(60));
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { scheduler.run(&shutdown).await }
        });

        sleep(Duration::from_secs(9)).await;
        assert_eq!(icmp.calls(), 0);

        sleep(Duration::from_secs(2)).await;
        assert_eq!(icmp.calls(), 1);

        sleep(Duration::from_secs(60)).await;
        assert_eq!(icmp.calls(), 2);

        sleep(Duration::from_secs(60)).await;
        assert_eq!(icmp.calls(), 3);

        shutdown.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(icmp.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_scheduler_stops_before_first_pass() {
        let icmp = Arc::new(ScriptedProber::new(ProbeKind::Icmp));
        let scheduler = scheduler(icmp.clone(), Duration::from_secs(10), Duration::from_secs(60));
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { scheduler.run(&shutdown).await }
        });

        sleep(Duration::from_secs(5)).await;
        shutdown.cancel();

        handle.await.unwrap().unwrap();
        assert_eq!(icmp.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_failure_stops_scheduler() {
        let icmp = Arc::new(ScriptedProber::failing(ProbeKind::Icmp));
        let scheduler = scheduler(icmp.clone(), Duration::ZERO, Duration::from_secs(60));

        let result = scheduler.run(&CancellationToken::new()).await;

        assert!(matches!(result, Err(PingError::Launch { kind: ProbeKind::Icmp, .. })));
        assert_eq!(icmp.calls(), 1);
    }

    #[test]
    fn test_dispatch_mode_parsing() {
        assert_eq!("parallel".parse::<DispatchMode>(), Ok(DispatchMode::Parallel));
        assert_eq!(" Sequential ".parse::<DispatchMode>(), Ok(DispatchMode::Sequential));
        assert!("round-robin".parse::<DispatchMode>().is_err());
    }

    #[test]
    fn test_summary_display() {
        let summary = PassSummary { hosts: 3, hosts_with_errors: 1, tcp_results: 2 };
        assert_eq!(summary.to_string(), "3 hosts probed, 1 with errors, 2 HTTP results");
    }
}
