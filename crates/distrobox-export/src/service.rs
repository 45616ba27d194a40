use crate::context::{ExportContext, Quoting};
use crate::entry::EntryFile;
use crate::{ExportError, ExportOutcome};
use std::path::PathBuf;
use tracing::{debug, info};

/// Searched in this order; a later match wins.
pub const UNIT_DIRS: &[&str] = &[
    "/etc/systemd/system",
    "/lib/systemd/system",
    "/usr/lib/systemd/system",
    "/usr/local/lib/systemd/system",
    "/etc/systemd/user",
    "/usr/lib/systemd/user",
    "/usr/local/lib/systemd/user",
];

pub const EXEC_DIRECTIVES: &[&str] = &[
    "ExecStart",
    "ExecStartPre",
    "ExecStartPost",
    "ExecReload",
    "ExecStop",
    "ExecStopPost",
];

/// Special executable prefixes systemd accepts in front of the command.
const EXEC_PREFIX_CHARS: &str = "-@+!:";

fn unit_name(name: &str) -> &str {
    name.strip_suffix(".service").unwrap_or(name)
}

pub fn find_unit(ctx: &ExportContext, name: &str) -> Option<PathBuf> {
    let file_name = format!("{}.service", unit_name(name));
    UNIT_DIRS
        .iter()
        .map(|dir| ctx.in_container(dir).join(&file_name))
        .filter(|p| p.is_file())
        .last()
}

pub fn target_path(ctx: &ExportContext, name: &str) -> PathBuf {
    ctx.host_home(".config/systemd/user")
        .join(format!("{}-{}.service", unit_name(name), ctx.container))
}

/// Route one directive value, keeping its special prefixes in front.
fn route(value: &str, prefix: &str) -> String {
    let split = value
        .find(|c| !EXEC_PREFIX_CHARS.contains(c))
        .unwrap_or(value.len());
    let (special, command) = value.split_at(split);
    format!("{special}{prefix} {}", command.trim_start())
}

/// Rewrite the execution directives of the `[Service]` section. Empty
/// values (which reset a list) and already routed values are left alone.
pub fn rewrite_unit(ctx: &ExportContext, file: &mut EntryFile) {
    let enter = ctx.enter_command(Quoting::Shell);
    let prefix = ctx.routing_prefix(Quoting::Shell);
    file.for_each_entry_mut(|section, entry| {
        if section != "Service" || !EXEC_DIRECTIVES.contains(&entry.key()) {
            return;
        }
        let value = entry.value();
        if value.trim().is_empty() || value.contains(&enter) {
            return;
        }
        let routed = route(value, &prefix);
        entry.set_value(routed);
    });
}

pub fn export(ctx: &ExportContext, name: &str) -> Result<ExportOutcome, ExportError> {
    let target = target_path(ctx, name);
    let existing = target.is_file();
    let source = if existing {
        target.clone()
    } else {
        find_unit(ctx, name).ok_or_else(|| {
            ExportError::NotFound(format!("service {} not found", unit_name(name)))
        })?
    };
    debug!("exporting unit from {}", source.display());

    let mut file = EntryFile::parse(&std::fs::read_to_string(&source)?);
    rewrite_unit(ctx, &mut file);
    if existing && !file.is_modified() {
        return Ok(ExportOutcome::AlreadyExported {
            name: unit_name(name).to_owned(),
            path: target,
        });
    }

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&target, file.to_string())?;
    info!("exported unit {}", target.display());
    Ok(ExportOutcome::Exported {
        name: unit_name(name).to_owned(),
        paths: vec![target],
    })
}

pub fn delete(ctx: &ExportContext, name: &str) -> Result<ExportOutcome, ExportError> {
    let target = target_path(ctx, name);
    if !target.is_file() {
        return Err(ExportError::NotExported {
            name: unit_name(name).to_owned(),
            detail: format!("{} does not exist", target.display()),
        });
    }
    std::fs::remove_file(&target)?;
    info!("removed unit {}", target.display());
    Ok(ExportOutcome::Deleted {
        name: unit_name(name).to_owned(),
        paths: vec![target],
    })
}
