//! Resource probes for the Virtrig harness.
//!
//! One probe per resource kind (domains, networks, pools, secrets, mounts,
//! services, directories, files), each implementing the `ResourceProbe`
//! capability set: enumerate live instances, capture a reconstructable
//! `InfoRecord` per instance, and remove or restore instances during
//! recovery. External management commands go through `HostRunner`, which
//! enforces a per-invocation timeout and a fixed working directory.

pub mod dir;
pub mod domain;
pub mod file;
pub mod host;
pub mod mock;
pub mod mount;
pub mod network;
pub mod parse;
pub mod pool;
pub mod probe;
pub mod secret;
pub mod service;
pub mod virsh;

#[cfg(test)]
pub(crate) mod testutil;

pub use host::{CommandOutput, HostRunner};
pub use mock::MockProbe;
pub use probe::ResourceProbe;
pub use virsh::Virsh;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("command '{command}' failed with exit status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },
    #[error("command '{command}' timed out after {secs}s")]
    Timeout { command: String, secs: u64 },
    #[error("unexpected output shape: {0}")]
    Parse(String),
    #[error("unsafe to remove {kind} '{name}'")]
    UnsafeRemove { kind: &'static str, name: String },
    #[error("operation '{operation}' is not supported for kind '{kind}'")]
    NotSupported {
        kind: &'static str,
        operation: &'static str,
    },
    #[error(transparent)]
    State(#[from] virtrig_state::StateError),
}

impl ProbeError {
    /// Permanent by-design failures, as opposed to transient external ones.
    /// The recovery driver logs both but callers can tell them apart.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::UnsafeRemove { .. } | Self::NotSupported { .. }
        )
    }
}
