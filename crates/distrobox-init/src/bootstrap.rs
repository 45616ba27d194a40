use crate::accounts::{ensure_group, ensure_user};
use crate::mounts::apply_group;
use crate::packages::ensure_dependencies;
use crate::phase::{validate_transition, Phase};
use crate::sudoers::ensure_policy;
use crate::system::System;
use crate::InitError;
use distrobox_schema::{
    host_readonly_mounts, host_readwrite_mounts, is_inside_container, rooted, theme_mounts,
    UserIdentity, READINESS_FILE, READINESS_SENTINEL,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use tracing::{debug, info, warn};

/// One pass of the reconciler over a container filesystem.
pub struct Bootstrap<'a> {
    system: &'a dyn System,
    root: PathBuf,
    user: UserIdentity,
    phase: Phase,
}

impl<'a> Bootstrap<'a> {
    pub fn new(system: &'a dyn System, root: impl Into<PathBuf>, user: UserIdentity) -> Self {
        Self {
            system,
            root: root.into(),
            user,
            phase: Phase::NotStarted,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn advance(&mut self, to: Phase) -> Result<(), InitError> {
        validate_transition(self.phase, to)?;
        debug!("bootstrap phase {} -> {to}", self.phase);
        self.phase = to;
        Ok(())
    }

    /// Run every phase up to [`Phase::Ready`]. The first fatal error stops
    /// the sequence.
    pub fn run(&mut self) -> Result<(), InitError> {
        if !is_inside_container(&self.root) {
            return Err(InitError::NotInContainer);
        }
        self.advance(Phase::NotStarted)?;
        self.clear_readiness()?;

        self.check_dependencies()?;
        self.reconcile_user()?;
        self.apply_mounts()?;
        self.configure_sudo()?;
        self.finish()?;
        info!("container setup complete for {}", self.user.name);
        Ok(())
    }

    fn readiness_file(&self) -> PathBuf {
        rooted(&self.root, READINESS_FILE)
    }

    fn clear_readiness(&self) -> Result<(), InitError> {
        match std::fs::remove_file(self.readiness_file()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn check_dependencies(&mut self) -> Result<(), InitError> {
        if let Some(manager) = ensure_dependencies(self.system, self.user.shell_name())? {
            info!("installed missing dependencies with {}", manager.program());
        }
        self.advance(Phase::DependenciesChecked)
    }

    fn reconcile_user(&mut self) -> Result<(), InitError> {
        ensure_group(self.system, &self.root, &self.user)?;
        ensure_user(self.system, &self.root, &self.user)?;
        self.advance(Phase::UserReconciled)
    }

    fn apply_mounts(&mut self) -> Result<(), InitError> {
        apply_group(self.system, &self.root, &host_readonly_mounts())?;
        apply_group(self.system, &self.root, &host_readwrite_mounts())?;
        self.advance(Phase::MountsApplied)
    }

    fn configure_sudo(&mut self) -> Result<(), InitError> {
        ensure_policy(&self.root, &self.user.name)?;
        self.advance(Phase::SudoConfigured)
    }

    fn finish(&mut self) -> Result<(), InitError> {
        let share = rooted(&self.root, self.user.home.join(".local/share"));
        for dir in ["themes", "icons"] {
            let path = share.join(dir);
            if let Err(e) = create_owned_dir(&path, &self.user) {
                warn!("Warning: cannot prepare {}: {e}", path.display());
            }
        }
        apply_group(self.system, &self.root, &theme_mounts(&self.user))?;

        let marker = self.readiness_file();
        if let Some(parent) = marker.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&marker, format!("{}\n", self.user.name))?;
        self.advance(Phase::Ready)
    }
}

fn create_owned_dir(path: &Path, user: &UserIdentity) -> std::io::Result<()> {
    std::fs::create_dir_all(path)?;
    std::os::unix::fs::chown(path, Some(user.uid), Some(user.gid))
}

/// Print the readiness sentinel line.
pub fn signal_ready(out: &mut dyn Write) -> std::io::Result<()> {
    writeln!(out, "{READINESS_SENTINEL}")?;
    out.flush()
}

/// Keeps the entrypoint alive until SIGINT or SIGTERM.
///
/// Install it before signaling readiness so a stop request arriving right
/// after setup is not lost.
pub struct Supervisor {
    rx: Receiver<()>,
}

impl Supervisor {
    pub fn install() -> Result<Self, InitError> {
        let (tx, rx) = mpsc::channel();
        ctrlc::set_handler(move || {
            let _ = tx.send(());
        })
        .map_err(|e| InitError::Signal(e.to_string()))?;
        Ok(Self { rx })
    }

    pub fn wait(self) {
        let _ = self.rx.recv();
        info!("termination requested, exiting");
    }
}
