//! Tracing setup shared by the pinger binaries.
//!
//! Console output is always installed; a warn-level file sink is added when a
//! log destination is configured.

mod tracing;

pub use self::tracing::{Error, LogSettings, init};
