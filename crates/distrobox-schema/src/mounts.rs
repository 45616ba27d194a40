//! The fixed, versioned host integration surface.
//!
//! Engine mounts are handed to `create` as `--volume` flags. The host groups
//! are applied by the entrypoint from inside the container, reaching the host
//! through [`HOST_PREFIX`](crate::HOST_PREFIX).

use crate::identity::UserIdentity;
use crate::HOST_PREFIX;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Bumped whenever any of the tables below changes.
pub const MOUNT_TABLE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum MountMode {
    ReadOnly,
    ReadWrite,
}

/// Whether a failed bind aborts the bootstrap or only produces a warning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Optionality {
    Required,
    BestEffort,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MountSpec {
    pub source: PathBuf,
    pub target: PathBuf,
    pub mode: MountMode,
    pub optionality: Optionality,
}

impl MountSpec {
    pub fn new(
        source: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
        mode: MountMode,
        optionality: Optionality,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            mode,
            optionality,
        }
    }

    /// Mount `path` from the host view under `/run/host` onto itself.
    fn from_host(path: &str, mode: MountMode, optionality: Optionality) -> Self {
        Self::new(
            Path::new(HOST_PREFIX).join(path.trim_start_matches('/')),
            path,
            mode,
            optionality,
        )
    }

    /// `src:tgt:ro` or `src:tgt:rslave`, as accepted by `--volume`.
    pub fn volume_arg(&self) -> String {
        let flags = match self.mode {
            MountMode::ReadOnly => "ro",
            MountMode::ReadWrite => "rslave",
        };
        format!("{}:{}:{flags}", self.source.display(), self.target.display())
    }

    /// Option string for `mount --rbind -o`.
    pub fn mount_flags(&self) -> &'static str {
        match self.mode {
            MountMode::ReadOnly => "ro",
            MountMode::ReadWrite => "rw",
        }
    }

    pub fn is_required(&self) -> bool {
        self.optionality == Optionality::Required
    }
}

/// Volumes passed to the engine at creation time.
pub fn engine_mounts(user: &UserIdentity) -> Vec<MountSpec> {
    use MountMode::ReadWrite;
    use Optionality::{BestEffort, Required};

    let mut mounts = vec![
        MountSpec::new("/", HOST_PREFIX, ReadWrite, Required),
        MountSpec::new("/dev", "/dev", ReadWrite, Required),
        MountSpec::new("/sys", "/sys", ReadWrite, Required),
        MountSpec::new("/tmp", "/tmp", ReadWrite, Required),
        MountSpec::new(&user.home, &user.home, ReadWrite, Required),
        MountSpec::new("/dev/pts", "/dev/pts", ReadWrite, BestEffort),
        MountSpec::new("/var/home", "/var/home", ReadWrite, BestEffort),
    ];
    let runtime_dir = PathBuf::from(format!("/run/user/{}", user.uid));
    mounts.push(MountSpec::new(
        &runtime_dir,
        &runtime_dir,
        ReadWrite,
        BestEffort,
    ));
    mounts
}

/// Read-only group applied by the entrypoint. A failing bind is fatal; a
/// missing source is skipped.
pub fn host_readonly_mounts() -> Vec<MountSpec> {
    [
        "/etc/machine-id",
        "/var/lib/flatpak",
        "/var/lib/systemd/coredump",
        "/var/log/journal",
    ]
    .iter()
    .map(|p| MountSpec::from_host(p, MountMode::ReadOnly, Optionality::Required))
    .collect()
}

/// Read-write group applied by the entrypoint. Failures only warn.
pub fn host_readwrite_mounts() -> Vec<MountSpec> {
    [
        "/media",
        "/run/media",
        "/run/udev/data",
        "/mnt",
        "/var/mnt",
        "/run/systemd/journal",
        "/run/libvirt",
        "/var/lib/libvirt",
    ]
    .iter()
    .map(|p| MountSpec::from_host(p, MountMode::ReadWrite, Optionality::BestEffort))
    .collect()
}

/// Host themes and icons laid over the user's local share directories.
pub fn theme_mounts(user: &UserIdentity) -> Vec<MountSpec> {
    let share = user.home.join(".local/share");
    vec![
        MountSpec::new(
            Path::new(HOST_PREFIX).join("usr/share/themes"),
            share.join("themes"),
            MountMode::ReadWrite,
            Optionality::BestEffort,
        ),
        MountSpec::new(
            Path::new(HOST_PREFIX).join("usr/share/icons"),
            share.join("icons"),
            MountMode::ReadWrite,
            Optionality::BestEffort,
        ),
    ]
}
