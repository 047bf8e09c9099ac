//! Orchestration for the Virtrig CI harness.
//!
//! This crate ties the probes, the diff engine, and the reporter into the
//! run loop: take a backup of every tracked resource kind, run each test of
//! the selected plan, verify the host came back clean, recover what did
//! not, and persist results after every test. It also provides the
//! exclusive run lock and the signal handler that lets an interrupted run
//! save a best-effort report.

pub mod concurrency;
pub mod plan;
pub mod recovery;
pub mod registry;
pub mod runner;

pub use concurrency::{install_signal_handler, shutdown_requested, RunLock};
pub use plan::{PlanOptions, TestPlan};
pub use registry::{CheckReport, StateRegistry};
pub use runner::{Harness, TestOutcome};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("state error: {0}")]
    State(#[from] virtrig_state::StateError),
    #[error("config error: {0}")]
    Config(#[from] virtrig_state::ConfigError),
    #[error("probe error: {0}")]
    Probe(#[from] virtrig_probe::ProbeError),
    #[error("report error: {0}")]
    Report(#[from] virtrig_report::ReportError),
    #[error("another harness instance holds the lock at {0}")]
    LockHeld(std::path::PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
