//! State model and drift detection for the Virtrig harness.
//!
//! This crate defines the normalized records captured from host resources
//! (`InfoRecord`, `Snapshot`), the per-kind allowlists that separate benign
//! noise from real leaks (`PermitRules`), the diff engine that classifies
//! drift between two snapshots, and the harness configuration file.

pub mod config;
pub mod diff;
pub mod record;
pub mod rules;

pub use config::{parse_config_file, parse_config_str, ConfigError, HarnessConfig};
pub use diff::{diff_snapshots, Finding, FindingKind, SnapshotDiff};
pub use record::{AttrValue, InfoRecord, Snapshot};
pub use rules::PermitRules;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("invalid permit pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}
