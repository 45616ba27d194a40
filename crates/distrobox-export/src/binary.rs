use crate::context::{ExportContext, Quoting};
use crate::{ExportError, ExportOutcome};
use distrobox_schema::{find_executable, shell_quote, CONTAINER_MARKERS, EXPORT_MARKER};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";
const CREATED_DIR_PREFIX: &str = "# created: ";

/// Wrapper that re-enters the container from the host and runs the binary
/// directly when already inside a container.
///
/// `created_dirs` are the export directories the first export had to create,
/// deepest first. They are recorded in the script so delete can remove them.
pub fn wrapper_script(ctx: &ExportContext, binary: &Path, created_dirs: &[PathBuf]) -> String {
    let mut command = shell_quote(&binary.to_string_lossy());
    if !ctx.extra_flags.is_empty() {
        command.push(' ');
        command.push_str(&ctx.extra_flags);
    }
    let inside_test = CONTAINER_MARKERS
        .iter()
        .map(|m| format!("[ -e {m} ]"))
        .collect::<Vec<_>>()
        .join(" || ");
    let direct = if ctx.sudo {
        format!("sudo {command}")
    } else {
        command.clone()
    };
    let created: String = created_dirs
        .iter()
        .map(|dir| format!("{CREATED_DIR_PREFIX}{}\n", dir.display()))
        .collect();

    format!(
        "#!/bin/sh\n\
         {EXPORT_MARKER}\n\
         # name: {container}\n\
         {created}\
         if {inside_test}; then\n\
         \texec {direct} \"$@\"\n\
         else\n\
         \texec {prefix} {command} \"$@\"\n\
         fi\n",
        container = ctx.container,
        prefix = ctx.routing_prefix(Quoting::Shell),
    )
}

/// Absolute in-container path of `binary`, searching `PATH` for bare names.
fn resolve_binary(
    ctx: &ExportContext,
    binary: &Path,
    search_path: &str,
) -> Result<PathBuf, ExportError> {
    let name = binary.to_string_lossy();
    let resolved = if binary.is_absolute() {
        Some(binary.to_path_buf()).filter(|p| ctx.in_container(p).is_file())
    } else {
        find_executable(&ctx.root, &name, search_path)
    };
    resolved.ok_or_else(|| ExportError::NotFound(format!("cannot find binary {name}")))
}

fn target_path(
    ctx: &ExportContext,
    binary: &Path,
    export_dir: &Path,
) -> Result<PathBuf, ExportError> {
    if !export_dir.is_absolute() {
        return Err(ExportError::Usage(format!(
            "export path must be absolute: {}",
            export_dir.display()
        )));
    }
    let file_name = binary.file_name().ok_or_else(|| {
        ExportError::Usage(format!("invalid binary path: {}", binary.display()))
    })?;
    Ok(ctx.in_container(export_dir).join(file_name))
}

/// `dir` and its ancestors that do not exist yet, deepest first.
fn missing_dirs(ctx: &ExportContext, dir: &Path) -> Vec<PathBuf> {
    dir.ancestors()
        .take_while(|d| !ctx.in_container(d).exists())
        .filter(|d| !d.to_string_lossy().contains('\n'))
        .map(Path::to_path_buf)
        .collect()
}

fn recorded_dirs(script: &str) -> Vec<PathBuf> {
    script
        .lines()
        .filter_map(|line| line.strip_prefix(CREATED_DIR_PREFIX))
        .map(PathBuf::from)
        .collect()
}

fn read_if_exists(path: &Path) -> Result<Option<String>, ExportError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn export(
    ctx: &ExportContext,
    binary: &Path,
    export_dir: &Path,
) -> Result<ExportOutcome, ExportError> {
    let search_path = std::env::var("PATH").unwrap_or_else(|_| DEFAULT_PATH.to_owned());
    let source = resolve_binary(ctx, binary, &search_path)?;
    let target = target_path(ctx, &source, export_dir)?;
    let name = source.display().to_string();

    let created_dirs = match read_if_exists(&target)? {
        Some(existing) if !existing.contains(EXPORT_MARKER) => {
            return Err(ExportError::Protected { path: target });
        }
        Some(existing) => {
            let recorded = recorded_dirs(&existing);
            if existing == wrapper_script(ctx, &source, &recorded) {
                debug!("{} is up to date", target.display());
                return Ok(ExportOutcome::AlreadyExported { name, path: target });
            }
            recorded
        }
        None => missing_dirs(ctx, export_dir),
    };
    let script = wrapper_script(ctx, &source, &created_dirs);

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&target, &script)?;
    std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o755))?;
    info!("wrote wrapper {}", target.display());
    Ok(ExportOutcome::Exported {
        name,
        paths: vec![target],
    })
}

pub fn delete(
    ctx: &ExportContext,
    binary: &Path,
    export_dir: &Path,
) -> Result<ExportOutcome, ExportError> {
    let target = target_path(ctx, binary, export_dir)?;
    let name = binary.display().to_string();
    match read_if_exists(&target)? {
        None => Err(ExportError::NotExported {
            name,
            detail: format!("{} does not exist", target.display()),
        }),
        Some(content) if !content.contains(EXPORT_MARKER) => {
            Err(ExportError::Protected { path: target })
        }
        Some(content) => {
            std::fs::remove_file(&target)?;
            info!("removed wrapper {}", target.display());
            for dir in recorded_dirs(&content) {
                // Left in place when something else was put there since.
                match std::fs::remove_dir(ctx.in_container(&dir)) {
                    Ok(()) => debug!("removed export directory {}", dir.display()),
                    Err(e) => debug!("keeping {}: {e}", dir.display()),
                }
            }
            Ok(ExportOutcome::Deleted {
                name,
                paths: vec![target],
            })
        }
    }
}
