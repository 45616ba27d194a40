//! Export Generator for distrobox.
//!
//! Runs inside a distrobox and publishes something installed there to the
//! host so it can be used without entering the container first:
//!
//! - a **binary** becomes a small wrapper script that re-enters the
//!   container, or runs the binary directly when already inside it;
//! - an **application** gets its desktop entries and icons copied to the
//!   host user's data directories, with every launch line routed through
//!   `distrobox enter`;
//! - a **service** unit is copied to the host user's systemd directory with
//!   its execution directives routed the same way.
//!
//! Every export can be undone with its delete mode, which only ever removes
//! files this tool itself wrote. Concurrent export and delete of the same
//! artifact is not coordinated; the outcome is undefined.

pub mod application;
pub mod binary;
pub mod context;
pub mod entry;
pub mod service;

pub use context::{ExportContext, Quoting};
pub use entry::{Entry, EntryFile};

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Schema(#[from] distrobox_schema::SchemaError),
    #[error("distrobox-export must run inside a container")]
    NotInContainer,
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{name} is not exported: {detail}")]
    NotExported { name: String, detail: String },
    #[error("refusing to touch {path}: it was not created by distrobox-export")]
    Protected { path: PathBuf },
}

impl ExportError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) | Self::Protected { .. } => 2,
            Self::NotInContainer => 126,
            Self::NotFound(_) => 127,
            _ => 1,
        }
    }
}

/// What kind of artifact is exported, and its name inside the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportRequest {
    Binary { path: PathBuf, export_dir: PathBuf },
    Application { name: String },
    Service { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Exported { name: String, paths: Vec<PathBuf> },
    AlreadyExported { name: String, path: PathBuf },
    Deleted { name: String, paths: Vec<PathBuf> },
}

impl fmt::Display for ExportOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exported { name, paths } => {
                write!(f, "{name} exported successfully")?;
                for path in paths {
                    write!(f, "\n  {}", path.display())?;
                }
                Ok(())
            }
            Self::AlreadyExported { name, path } => {
                write!(f, "{name} already exported at {}", path.display())
            }
            Self::Deleted { name, paths } => {
                write!(f, "{name} removed")?;
                for path in paths {
                    write!(f, "\n  {}", path.display())?;
                }
                Ok(())
            }
        }
    }
}

/// Export (or with `delete` remove) one artifact.
pub fn run(
    ctx: &ExportContext,
    request: &ExportRequest,
    delete: bool,
) -> Result<ExportOutcome, ExportError> {
    ctx.require_container()?;
    match (request, delete) {
        (ExportRequest::Binary { path, export_dir }, false) => {
            binary::export(ctx, path, export_dir)
        }
        (ExportRequest::Binary { path, export_dir }, true) => {
            binary::delete(ctx, path, export_dir)
        }
        (ExportRequest::Application { name }, false) => application::export(ctx, name),
        (ExportRequest::Application { name }, true) => application::delete(ctx, name),
        (ExportRequest::Service { name }, false) => service::export(ctx, name),
        (ExportRequest::Service { name }, true) => service::delete(ctx, name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(ExportError::NotInContainer.exit_code(), 126);
        assert_eq!(ExportError::Usage("x".into()).exit_code(), 2);
        assert_eq!(
            ExportError::Protected {
                path: PathBuf::from("/x")
            }
            .exit_code(),
            2
        );
        assert_eq!(ExportError::NotFound("vim".into()).exit_code(), 127);
        assert_eq!(
            ExportError::NotExported {
                name: "vim".into(),
                detail: "no file".into()
            }
            .exit_code(),
            1
        );
    }

    #[test]
    fn run_refuses_outside_container() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ExportContext {
            root: dir.path().to_path_buf(),
            container: "box".into(),
            home: PathBuf::from("/home/a"),
            enter_path: "distrobox".into(),
            extra_flags: String::new(),
            sudo: false,
        };
        let request = ExportRequest::Service {
            name: "syncthing".into(),
        };
        assert!(matches!(
            run(&ctx, &request, false),
            Err(ExportError::NotInContainer)
        ));
    }

    #[test]
    fn outcome_messages() {
        let outcome = ExportOutcome::AlreadyExported {
            name: "syncthing".into(),
            path: PathBuf::from("/u/syncthing-box.service"),
        };
        assert_eq!(
            outcome.to_string(),
            "syncthing already exported at /u/syncthing-box.service"
        );
        let outcome = ExportOutcome::Exported {
            name: "vim".into(),
            paths: vec![PathBuf::from("/h/.local/bin/vim")],
        };
        assert_eq!(
            outcome.to_string(),
            "vim exported successfully\n  /h/.local/bin/vim"
        );
    }
}
