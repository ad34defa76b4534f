/// Probing engine - runs reachability checks against the configured hosts
///
/// This module is responsible for:
/// - Executing ICMP, HTTP and trace probes for a host concurrently
/// - Classifying failures from probe output and reporting them
/// - Merging probe outcomes into one result per host
/// - Dispatching host sessions for a whole pass and scheduling passes
pub mod checker;
pub mod error;
pub mod executor;
pub mod guard;
pub mod reporter;
pub mod scheduler;
pub mod types;

#[cfg(test)]
mod testing;

pub use checker::{CommandProber, HttpProber};
pub use executor::ProbeSet;
pub use reporter::HttpErrorReporter;
pub use scheduler::{DispatchMode, MonitoringScheduler, PassCoordinator, PassSummary};
pub use types::ProbeKind;
