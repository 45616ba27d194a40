//! Bootstrap Reconciler for distrobox containers.
//!
//! `distrobox-init` is the entrypoint of every distrobox. On each container
//! start it brings the container in line with the host user: missing
//! commands are installed through whichever package manager the image ships,
//! the user and its group are created, host integration mounts are bound,
//! passwordless elevation is configured, and finally readiness is signaled
//! before the process settles into a supervisory wait.
//!
//! Every step checks before it changes anything, so repeated starts of the
//! same container converge instead of accumulating duplicates. All paths go
//! through a filesystem root so the whole sequence runs against a temporary
//! directory in tests.

pub mod accounts;
pub mod bootstrap;
pub mod mock;
pub mod mounts;
pub mod packages;
pub mod phase;
pub mod sudoers;
pub mod system;

pub use bootstrap::{signal_ready, Bootstrap, Supervisor};
pub use packages::{PackageInstaller, PackageManager};
pub use phase::{validate_transition, Phase};
pub use system::{CommandOutput, HostSystem, System};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitError {
    #[error("init I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Schema(#[from] distrobox_schema::SchemaError),
    #[error("distrobox-init must run inside a container")]
    NotInContainer,
    #[error("no supported package manager found (tried {0})")]
    NoPackageManager(String),
    #[error("missing required commands after installation: {}", .0.join(", "))]
    MissingDependencies(Vec<String>),
    #[error("command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },
    #[error("cannot mount {target}: {message}")]
    MountFailed { target: String, message: String },
    #[error("invalid bootstrap transition: {from} -> {to}")]
    InvalidTransition { from: Phase, to: Phase },
    #[error("signal handling failed: {0}")]
    Signal(String),
}

impl InitError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::NotInContainer => 126,
            Self::NoPackageManager(_) | Self::MissingDependencies(_) => 127,
            _ => 1,
        }
    }
}
