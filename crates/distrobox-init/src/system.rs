use crate::InitError;
use distrobox_schema::find_executable;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stderr: String,
}

/// The side-effecting commands the reconciler needs from the container.
pub trait System {
    fn command_exists(&self, name: &str) -> bool;

    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, InitError>;
}

/// Run `program` and turn a non-zero exit into [`InitError::CommandFailed`].
pub fn run_checked(system: &dyn System, program: &str, args: &[&str]) -> Result<(), InitError> {
    let output = system.run(program, args)?;
    if output.success {
        Ok(())
    } else {
        Err(InitError::CommandFailed {
            command: format!("{program} {}", args.join(" ")),
            message: output.stderr.trim().to_owned(),
        })
    }
}

/// Commands looked up below `root` on `PATH`, executed for real.
pub struct HostSystem {
    root: PathBuf,
    search_path: String,
}

impl HostSystem {
    pub fn new(root: &Path) -> Self {
        let search_path = std::env::var("PATH")
            .ok()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_PATH.to_owned());
        Self {
            root: root.to_path_buf(),
            search_path,
        }
    }
}

impl System for HostSystem {
    fn command_exists(&self, name: &str) -> bool {
        find_executable(&self.root, name, &self.search_path).is_some()
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, InitError> {
        debug!("{program} {}", args.join(" "));
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| InitError::CommandFailed {
                command: program.to_owned(),
                message: e.to_string(),
            })?;
        Ok(CommandOutput {
            success: output.status.success(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
