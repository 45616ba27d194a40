//! Container engine layer for distrobox.
//!
//! This crate implements everything that runs on the host side of a
//! distrobox: the pluggable `ContainerEngine` trait with a podman/docker CLI
//! implementation and a scripted mock, the pure Engine Invocation Builder for
//! `create` and `exec`, host probing (runtime sockets, resolved config files,
//! sibling binaries), the Readiness Gate that blocks until the entrypoint has
//! finished, prerequisite checks, and signal handling.

pub mod command;
pub mod engine;
pub mod host;
pub mod mock;
pub mod prereq;
pub mod readiness;
pub mod signals;
pub mod terminal;

pub use command::{
    build_create_command, build_enter_command, default_shell_command, resolve_workdir,
    snapshot_env, CreateOptions, EngineCommand, EnterOptions,
};
pub use engine::{
    select_engine, CliEngine, ContainerEngine, ContainerState, ContainerSummary, EngineKind,
};
pub use host::{HostEnvironment, ResolvedFile};
pub use prereq::{check_engine_prereqs, command_exists, format_missing, MissingPrereq};
pub use readiness::{wait_until_ready, GateOptions, Readiness};
pub use signals::{install_signal_handler, shutdown_requested};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Schema(#[from] distrobox_schema::SchemaError),
    #[error("container engine not available: {0}")]
    EngineUnavailable(String),
    #[error("required binary not found: {0}")]
    MissingBinary(String),
    #[error("cannot find container '{0}'")]
    ContainerNotFound(String),
    #[error("container '{0}' already exists")]
    ContainerExists(String),
    #[error("image '{0}' is not available locally")]
    ImageNotFound(String),
    #[error("{action} failed: {message}")]
    EngineFailed { action: String, message: String },
    #[error("container '{name}' did not finish setup within {secs}s (bootstrap timed out)")]
    BootstrapTimedOut { name: String, secs: u64 },
    #[error("container '{name}' stopped before setup finished: {detail}")]
    BootstrapFailed { name: String, detail: String },
    #[error("interrupted while waiting for container setup")]
    Cancelled,
    #[error("{0} cannot be run inside a container")]
    InsideContainer(&'static str),
    #[error("{0}")]
    Aborted(String),
}

impl RuntimeError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::EngineUnavailable(_) | Self::MissingBinary(_) => 127,
            Self::InsideContainer(_) => 126,
            Self::Cancelled => 130,
            _ => 1,
        }
    }
}
