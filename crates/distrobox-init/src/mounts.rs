use crate::system::System;
use crate::InitError;
use distrobox_schema::{rooted, MountSpec};
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountOutcome {
    Mounted,
    AlreadyMounted,
    SourceAbsent,
    Failed(String),
}

/// Mount points listed in `/proc/self/mountinfo` below `root`.
fn mounted_targets(root: &Path) -> Vec<String> {
    std::fs::read_to_string(rooted(root, "/proc/self/mountinfo"))
        .map(|content| {
            content
                .lines()
                .filter_map(|line| line.split_whitespace().nth(4))
                .map(unescape_mount_point)
                .collect()
        })
        .unwrap_or_default()
}

/// The kernel writes space, tab, newline and backslash in mount points as
/// three-digit octal escapes (`\040`).
fn unescape_mount_point(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let octal = bytes.get(i + 1..i + 4).filter(|digits| {
            bytes[i] == b'\\' && digits.iter().all(|d| (b'0'..=b'7').contains(d))
        });
        match octal {
            Some(digits) => {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                out.push(u8::try_from(value).unwrap_or(b'?'));
                i += 4;
            }
            None => {
                out.push(bytes[i]);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Create `target` as the same kind of node as `source`.
fn prepare_target(source: &Path, target: &Path) -> std::io::Result<()> {
    if source.is_dir() {
        std::fs::create_dir_all(target)
    } else {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if !target.exists() {
            std::fs::File::create(target)?;
        }
        Ok(())
    }
}

/// Recursively bind one mount. An absent source is skipped silently.
pub fn apply_mount(
    system: &dyn System,
    root: &Path,
    mount: &MountSpec,
    mounted: &[String],
) -> Result<MountOutcome, InitError> {
    let source = rooted(root, &mount.source);
    let target = rooted(root, &mount.target);
    if !source.exists() {
        debug!("skipping {}: source absent", mount.target.display());
        return Ok(MountOutcome::SourceAbsent);
    }
    let target_str = target.to_string_lossy().into_owned();
    if mounted.contains(&target_str) {
        debug!("{target_str} already mounted");
        return Ok(MountOutcome::AlreadyMounted);
    }
    if let Err(e) = prepare_target(&source, &target) {
        return Ok(MountOutcome::Failed(e.to_string()));
    }

    let source_str = source.to_string_lossy();
    let output = system.run(
        "mount",
        &["--rbind", "-o", mount.mount_flags(), &source_str, &target_str],
    )?;
    if output.success {
        info!("mounted {target_str} ({})", mount.mount_flags());
        Ok(MountOutcome::Mounted)
    } else {
        Ok(MountOutcome::Failed(output.stderr.trim().to_owned()))
    }
}

/// Apply a mount group. Failures of required mounts abort; best-effort
/// failures only warn.
pub fn apply_group(
    system: &dyn System,
    root: &Path,
    mounts: &[MountSpec],
) -> Result<Vec<MountOutcome>, InitError> {
    let mounted = mounted_targets(root);
    let mut outcomes = Vec::with_capacity(mounts.len());
    for mount in mounts {
        let outcome = apply_mount(system, root, mount, &mounted)?;
        if let MountOutcome::Failed(message) = &outcome {
            if mount.is_required() {
                return Err(InitError::MountFailed {
                    target: mount.target.display().to_string(),
                    message: message.clone(),
                });
            }
            warn!(
                "Warning: cannot mount {}: {message}",
                mount.target.display()
            );
        }
        outcomes.push(outcome);
    }
    Ok(outcomes)
}
