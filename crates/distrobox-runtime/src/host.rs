use crate::RuntimeError;
use distrobox_schema::{engine_mounts, MountSpec, UserIdentity};
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Host files that are often symlinks managed by other services.
pub const DYNAMIC_HOST_FILES: &[&str] = &[
    "/etc/hosts",
    "/etc/resolv.conf",
    "/etc/localtime",
    "/etc/host.conf",
];

/// A host file bound at `target`, read from its fully resolved `source`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    pub target: PathBuf,
    pub source: PathBuf,
}

/// Snapshot of the host facts the Engine Invocation Builder depends on.
#[derive(Debug, Clone)]
pub struct HostEnvironment {
    /// Engine-level mounts, with absent best-effort sources already dropped.
    pub mounts: Vec<MountSpec>,
    pub sockets: Vec<PathBuf>,
    pub resolved_files: Vec<ResolvedFile>,
    pub init_binary: PathBuf,
    pub export_binary: Option<PathBuf>,
    /// Host path of the `distrobox` binary, used by exported artifacts.
    pub enter_path: PathBuf,
}

impl HostEnvironment {
    /// Probe the real host. The init and export binaries are expected next to
    /// the running executable.
    pub fn probe(user: &UserIdentity) -> Result<Self, RuntimeError> {
        let enter_path = std::env::current_exe()?;
        let bin_dir = enter_path
            .parent()
            .map_or_else(|| PathBuf::from("/usr/bin"), Path::to_path_buf);

        let init_binary = bin_dir.join("distrobox-init");
        if !init_binary.is_file() {
            return Err(RuntimeError::MissingBinary(
                init_binary.display().to_string(),
            ));
        }
        let export_binary = Some(bin_dir.join("distrobox-export")).filter(|p| p.is_file());

        let host = Self {
            mounts: available_mounts(engine_mounts(user), Path::exists),
            sockets: enumerate_sockets(Path::new("/run")),
            resolved_files: resolve_dynamic_files(Path::new("/")),
            init_binary,
            export_binary,
            enter_path,
        };
        debug!(
            "host probe: {} mounts, {} sockets, {} resolved files",
            host.mounts.len(),
            host.sockets.len(),
            host.resolved_files.len()
        );
        Ok(host)
    }
}

/// Keep required mounts unconditionally and best-effort ones whose source exists.
pub fn available_mounts(
    mounts: Vec<MountSpec>,
    exists: impl Fn(&Path) -> bool,
) -> Vec<MountSpec> {
    mounts
        .into_iter()
        .filter(|m| m.is_required() || exists(&m.source))
        .collect()
}

/// Every socket below `run_root`, skipping the per-user runtime directories
/// under `run_root/user`.
///
/// Entries count as sockets when their file type is a socket or their name
/// contains `socket` (for socket-activated units that leave placeholders).
pub fn enumerate_sockets(run_root: &Path) -> Vec<PathBuf> {
    let user_dirs = run_root.join("user");
    let mut sockets: Vec<PathBuf> = WalkDir::new(run_root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.path() != user_dirs)
        .filter_map(Result::ok)
        .filter(|e| {
            let ft = e.file_type();
            ft.is_socket()
                || (!ft.is_dir()
                    && e.file_name()
                        .to_string_lossy()
                        .to_ascii_lowercase()
                        .contains("socket"))
        })
        .map(walkdir::DirEntry::into_path)
        .collect();
    sockets.sort();
    sockets
}

/// Canonicalize [`DYNAMIC_HOST_FILES`] below `root`, skipping missing ones.
pub fn resolve_dynamic_files(root: &Path) -> Vec<ResolvedFile> {
    DYNAMIC_HOST_FILES
        .iter()
        .filter_map(|file| {
            let on_host = distrobox_schema::rooted(root, file);
            std::fs::canonicalize(&on_host)
                .ok()
                .filter(|p| p.is_file())
                .map(|source| ResolvedFile {
                    target: PathBuf::from(file),
                    source,
                })
        })
        .collect()
}
