use std::sync::Arc;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use url::Url;

use super::types::{ErrorReport, ProbeKind};

const REPORT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const REPORT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const REPORT_FAILED_MSG: &str = "Could not call the report service to submit the error";

/// Out-of-band sink for failure reports.
///
/// Implementations are best effort: they log transport problems and always
/// return normally.
#[async_trait::async_trait]
pub trait ErrorReporter: Send + Sync {
    async fn report(&self, report: &ErrorReport);
}

/// Logs every report and POSTs it as JSON to the reporting service, if one
/// is configured
pub struct HttpErrorReporter {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl HttpErrorReporter {
    pub fn new(endpoint: Option<String>) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(REPORT_CONNECT_TIMEOUT)
            .timeout(REPORT_REQUEST_TIMEOUT)
            .no_proxy()
            .build()?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait::async_trait]
impl ErrorReporter for HttpErrorReporter {
    async fn report(&self, report: &ErrorReport) {
        let payload = match report.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize error report for {:?}: {}", report.host, e);
                return;
            }
        };
        error!("{payload}");

        let Some(endpoint) = self.endpoint.as_deref() else {
            return;
        };

        let url = match Url::parse(endpoint) {
            Ok(url) => url,
            Err(e) => {
                warn!("Invalid report service endpoint {}: {}", endpoint, e);
                return;
            }
        };

        let response = match self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!("Reporting error {}. Possible cause {}", endpoint, e);
                return;
            }
        };

        match response.text().await {
            Ok(body) => info!("{}", body.lines().next().unwrap_or_default()),
            Err(_) => info!("{REPORT_FAILED_MSG}"),
        }
    }
}

/// Session-scoped failure bookkeeping for one host.
///
/// Holds the host's live [`ErrorReport`], which every probe of the session
/// writes into, and the ordered list of snapshots that were reported.
pub struct FailureLog {
    host: String,
    state: Mutex<FailureState>,
    reporter: Arc<dyn ErrorReporter>,
}

#[derive(Default)]
struct FailureState {
    current: ErrorReport,
    reported: Vec<ErrorReport>,
}

impl FailureLog {
    pub fn new(host: impl Into<String>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self { host: host.into(), state: Mutex::new(FailureState::default()), reporter }
    }

    /// Attach `message` for `kind` and hand a snapshot to the reporter.
    ///
    /// The lock is held until the reporter returns, so the transport sees
    /// snapshots in the same order as [`FailureLog::into_reported`]. The
    /// snapshot is kept whether or not transport succeeds.
    pub async fn record(&self, kind: ProbeKind, message: String) {
        let mut state = self.state.lock().await;
        state.current.attach(&self.host, kind, message);
        let snapshot = state.current.clone();
        state.reported.push(snapshot.clone());

        self.reporter.report(&snapshot).await;
    }

    pub fn into_reported(self) -> Vec<ErrorReport> {
        self.state.into_inner().reported
    }
}
