use crate::context::{ExportContext, Quoting};
use crate::entry::EntryFile;
use crate::{ExportError, ExportOutcome};
use distrobox_schema::find_executable;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

const APPLICATIONS_DIR: &str = "/usr/share/applications";
const ICON_DIRS: &[&str] = &["/usr/share/icons", "/usr/share/pixmaps"];
const SHARE_DIR: &str = "/usr/share";
const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";
const ENTRY_SECTION: &str = "Desktop Entry";
/// Icons copied by the export, relative to `~/.local/share`, `;`-separated.
const ICON_RECORD_KEY: &str = "X-Distrobox-Icons";

/// Desktop entry field codes (`%f`, `%U`, ...).
const FIELD_CODES: &str = "fFuUdDnNickvm";

fn mentions(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn walk_files(dir: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .map(walkdir::DirEntry::into_path)
        .filter(|p| p.is_file())
}

/// Desktop files whose name or `Exec`/`TryExec` value mentions `name`.
pub fn find_desktop_files(ctx: &ExportContext, name: &str) -> Vec<PathBuf> {
    walk_files(&ctx.in_container(APPLICATIONS_DIR))
        .filter(|p| p.extension().is_some_and(|e| e == "desktop"))
        .filter(|p| {
            let file_name = p.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            if mentions(&file_name, name) {
                return true;
            }
            std::fs::read_to_string(p).is_ok_and(|content| {
                EntryFile::parse(&content)
                    .entries()
                    .iter()
                    .any(|(_, e)| {
                        matches!(e.key(), "Exec" | "TryExec") && mentions(e.value(), name)
                    })
            })
        })
        .collect()
}

/// Icon files whose name contains `name`.
pub fn find_icons(ctx: &ExportContext, name: &str) -> Vec<PathBuf> {
    ICON_DIRS
        .iter()
        .flat_map(|dir| walk_files(&ctx.in_container(dir)))
        .filter(|p| {
            p.file_name()
                .is_some_and(|n| mentions(&n.to_string_lossy(), name))
        })
        .collect()
}

/// Insert `flags` before the first field code of `exec`, or at the end.
pub fn insert_flags(exec: &str, flags: &str) -> String {
    if flags.is_empty() {
        return exec.to_owned();
    }
    let bytes = exec.as_bytes();
    let position = (0..bytes.len()).find(|&i| {
        bytes[i] == b'%'
            && bytes
                .get(i + 1)
                .is_some_and(|c| FIELD_CODES.as_bytes().contains(c))
            && (i == 0 || bytes[i - 1].is_ascii_whitespace())
    });
    match position {
        Some(i) => format!("{}{flags} {}", &exec[..i], &exec[i..]),
        None => format!("{exec} {flags}"),
    }
}

/// Route every `Exec` through the enter command and neutralize `TryExec`.
pub fn rewrite_desktop_entry(ctx: &ExportContext, file: &mut EntryFile) {
    let enter = ctx.enter_command(Quoting::Desktop);
    let prefix = ctx.routing_prefix(Quoting::Desktop);
    file.for_each_entry_mut(|_, entry| {
        if entry.key() == "Exec" && !entry.value().starts_with(&enter) {
            let routed = format!("{prefix} {}", insert_flags(entry.value(), &ctx.extra_flags));
            entry.set_value(routed);
        } else if entry.key() == "TryExec" {
            entry.set_value("true");
        }
    });
}

fn routes_through(file: &EntryFile, enter: &str) -> bool {
    file.entries()
        .iter()
        .any(|(_, e)| e.key() == "Exec" && e.value().starts_with(enter))
}

fn desktop_target(ctx: &ExportContext, source: &Path) -> Option<PathBuf> {
    let file_name = source.file_name()?;
    Some(ctx.host_home(".local/share/applications").join(file_name))
}

/// Location of an icon relative to `~/.local/share` on the host:
/// `/usr/share/X` maps to `X`.
fn icon_relative(ctx: &ExportContext, source: &Path) -> Option<String> {
    let relative = source.strip_prefix(ctx.in_container(SHARE_DIR)).ok()?;
    relative.to_str().filter(|r| !r.contains(';')).map(str::to_owned)
}

/// Icons recorded in an exported desktop entry as copied by this tool.
fn recorded_icons(file: &EntryFile) -> Vec<String> {
    file.get(ENTRY_SECTION, ICON_RECORD_KEY)
        .unwrap_or_default()
        .split(';')
        .filter(|r| {
            !r.is_empty()
                && Path::new(r)
                    .components()
                    .all(|c| matches!(c, Component::Normal(_)))
        })
        .map(str::to_owned)
        .collect()
}

fn read_desktop_file(path: &Path) -> Result<EntryFile, ExportError> {
    let content = String::from_utf8(std::fs::read(path)?).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{} is not valid UTF-8", path.display()),
        )
    })?;
    Ok(EntryFile::parse(&content))
}

/// Copy icons and desktop entries of `name` to the host.
///
/// Host icons that already exist are left alone; only icons this export
/// created are recorded in the desktop entries and later deleted. A desktop
/// entry on the host that does not launch through distrobox is never
/// replaced.
pub fn export(ctx: &ExportContext, name: &str) -> Result<ExportOutcome, ExportError> {
    let search_path = std::env::var("PATH").unwrap_or_else(|_| DEFAULT_PATH.to_owned());
    export_searching(ctx, name, &search_path)
}

fn export_searching(
    ctx: &ExportContext,
    name: &str,
    search_path: &str,
) -> Result<ExportOutcome, ExportError> {
    if find_executable(&ctx.root, name, search_path).is_none() {
        return Err(ExportError::NotFound(format!(
            "application {name} is not installed"
        )));
    }
    let desktop_files = find_desktop_files(ctx, name);
    if desktop_files.is_empty() {
        return Err(ExportError::NotFound(format!(
            "application {name} is not installed: no desktop file found"
        )));
    }

    // Everything is read and checked before the first write.
    let enter = ctx.enter_command(Quoting::Desktop);
    let mut planned = Vec::with_capacity(desktop_files.len());
    let mut icons = BTreeSet::new();
    for source in desktop_files {
        let Some(target) = desktop_target(ctx, &source) else {
            continue;
        };
        let file = read_desktop_file(&source)?;
        if target.exists() {
            let existing = read_desktop_file(&target)?;
            if !routes_through(&existing, &enter) {
                return Err(ExportError::Protected { path: target });
            }
            icons.extend(recorded_icons(&existing));
        }
        planned.push((target, file));
    }

    let share = ctx.host_home(".local/share");
    let mut written = Vec::new();
    for icon in find_icons(ctx, name) {
        let Some(relative) = icon_relative(ctx, &icon) else {
            continue;
        };
        let target = share.join(&relative);
        if target.exists() && !icons.contains(&relative) {
            debug!("keeping host icon {}", target.display());
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&icon, &target)?;
        debug!("copied icon {}", target.display());
        icons.insert(relative);
        written.push(target);
    }

    let record: String = icons.iter().map(|r| format!("{r};")).collect();
    for (target, mut file) in planned {
        rewrite_desktop_entry(ctx, &mut file);
        if !record.is_empty() {
            file.set(ENTRY_SECTION, ICON_RECORD_KEY, record.as_str());
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, file.to_string())?;
        info!("exported desktop entry {}", target.display());
        written.push(target);
    }

    Ok(ExportOutcome::Exported {
        name: name.to_owned(),
        paths: written,
    })
}

pub fn delete(ctx: &ExportContext, name: &str) -> Result<ExportOutcome, ExportError> {
    let enter = ctx.enter_command(Quoting::Desktop);
    let targets: Vec<PathBuf> = find_desktop_files(ctx, name)
        .iter()
        .filter_map(|source| desktop_target(ctx, source))
        .filter(|target| target.is_file())
        .collect();
    if targets.is_empty() {
        return Err(ExportError::NotExported {
            name: name.to_owned(),
            detail: "no exported desktop file found".to_owned(),
        });
    }
    let mut icons = BTreeSet::new();
    for target in &targets {
        let file = read_desktop_file(target)?;
        if !routes_through(&file, &enter) {
            return Err(ExportError::NotExported {
                name: name.to_owned(),
                detail: format!("{} does not launch through distrobox", target.display()),
            });
        }
        icons.extend(recorded_icons(&file));
    }

    let mut removed = Vec::new();
    for target in targets {
        std::fs::remove_file(&target)?;
        info!("removed desktop entry {}", target.display());
        removed.push(target);
    }
    let share = ctx.host_home(".local/share");
    for relative in icons {
        let target = share.join(relative);
        if target.is_file() {
            std::fs::remove_file(&target)?;
            removed.push(target);
        }
    }

    Ok(ExportOutcome::Deleted {
        name: name.to_owned(),
        paths: removed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MPV_DESKTOP: &str = "\
[Desktop Entry]
Type=Application
Name=mpv Media Player
Icon=mpv
TryExec=mpv
Exec=mpv --player-operation-mode=pseudo-gui -- %U
Terminal=false
";

    fn ctx(root: &Path) -> ExportContext {
        ExportContext {
            root: root.to_path_buf(),
            container: "media".into(),
            home: PathBuf::from("/home/alice"),
            enter_path: "/usr/bin/distrobox".into(),
            extra_flags: String::new(),
            sudo: false,
        }
    }

    #[test]
    fn flags_go_before_first_field_code() {
        assert_eq!(insert_flags("mpv -- %U", "--fs"), "mpv -- --fs %U");
        assert_eq!(insert_flags("mpv", "--fs"), "mpv --fs");
        assert_eq!(insert_flags("app 100%done %f", "-x"), "app 100%done -x %f");
        assert_eq!(insert_flags("mpv %U", ""), "mpv %U");
    }

    #[test]
    fn exec_and_tryexec_are_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = ctx(dir.path());
        ctx.extra_flags = "--fs".into();
        let mut file = EntryFile::parse(MPV_DESKTOP);
        rewrite_desktop_entry(&ctx, &mut file);
        assert_eq!(file.get("Desktop Entry", "TryExec"), Some("true"));
        assert_eq!(
            file.get("Desktop Entry", "Exec"),
            Some(
                "/usr/bin/distrobox enter media -- \
                 mpv --player-operation-mode=pseudo-gui -- --fs %U"
            )
        );
        assert_eq!(file.get("Desktop Entry", "Name"), Some("mpv Media Player"));

        let once = file.to_string();
        rewrite_desktop_entry(&ctx, &mut file);
        assert_eq!(file.to_string(), once);
    }

    #[test]
    fn desktop_files_matched_by_name_or_exec() {
        let dir = tempfile::tempdir().unwrap();
        let apps = dir.path().join("usr/share/applications");
        std::fs::create_dir_all(apps.join("kde")).unwrap();
        std::fs::write(apps.join("io.mpv.Mpv.desktop"), MPV_DESKTOP).unwrap();
        std::fs::write(
            apps.join("kde/player.desktop"),
            "[Desktop Entry]\nExec=MPV --profile=kde\n",
        )
        .unwrap();
        std::fs::write(apps.join("vim.desktop"), "[Desktop Entry]\nExec=vim %F\n").unwrap();

        let found = find_desktop_files(&ctx(dir.path()), "mpv");
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|p| !p.ends_with("vim.desktop")));
    }

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn installed_mpv(root: &Path) {
        write(root, "usr/bin/mpv", "#!/bin/sh\n");
        std::fs::set_permissions(
            root.join("usr/bin/mpv"),
            std::os::unix::fs::PermissionsExt::from_mode(0o755),
        )
        .unwrap();
        write(root, "usr/share/applications/mpv.desktop", MPV_DESKTOP);
        write(root, "usr/share/icons/hicolor/64x64/apps/mpv.png", "container png");
        write(root, "usr/share/icons/hicolor/128x128/apps/mpv.png", "container png");
    }

    fn host_share(root: &Path) -> PathBuf {
        root.join("run/host/home/alice/.local/share")
    }

    #[test]
    fn host_icons_survive_export_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        installed_mpv(dir.path());
        let share = host_share(dir.path());
        let host_icon = share.join("icons/hicolor/64x64/apps/mpv.png");
        write(&share, "icons/hicolor/64x64/apps/mpv.png", "host-owned png");
        let ctx = ctx(dir.path());

        export_searching(&ctx, "mpv", "/usr/bin").unwrap();
        let copied = share.join("icons/hicolor/128x128/apps/mpv.png");
        assert_eq!(std::fs::read_to_string(&copied).unwrap(), "container png");
        assert_eq!(std::fs::read_to_string(&host_icon).unwrap(), "host-owned png");
        let desktop = std::fs::read_to_string(share.join("applications/mpv.desktop")).unwrap();
        assert!(desktop.contains("X-Distrobox-Icons=icons/hicolor/128x128/apps/mpv.png;\n"));

        // A second export keeps the record of the copied icon.
        export_searching(&ctx, "mpv", "/usr/bin").unwrap();
        let again = std::fs::read_to_string(share.join("applications/mpv.desktop")).unwrap();
        assert_eq!(again, desktop);

        delete(&ctx, "mpv").unwrap();
        assert!(!share.join("applications/mpv.desktop").exists());
        assert!(!copied.exists());
        assert_eq!(std::fs::read_to_string(&host_icon).unwrap(), "host-owned png");
    }

    #[test]
    fn foreign_desktop_entry_is_not_replaced() {
        let dir = tempfile::tempdir().unwrap();
        installed_mpv(dir.path());
        let share = host_share(dir.path());
        let own = share.join("applications/mpv.desktop");
        write(&share, "applications/mpv.desktop", "[Desktop Entry]\nExec=/usr/bin/mpv %U\n");

        let err = export_searching(&ctx(dir.path()), "mpv", "/usr/bin").unwrap_err();
        assert!(matches!(err, ExportError::Protected { .. }));
        assert_eq!(
            std::fs::read_to_string(&own).unwrap(),
            "[Desktop Entry]\nExec=/usr/bin/mpv %U\n"
        );
        assert!(!share.join("icons").exists());
    }

    #[test]
    fn unreadable_desktop_file_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        installed_mpv(dir.path());
        std::fs::write(
            dir.path().join("usr/share/applications/mpv-extra.desktop"),
            b"[Desktop Entry]\nName=\xff\xfe\nExec=mpv\n",
        )
        .unwrap();

        let err = export_searching(&ctx(dir.path()), "mpv", "/usr/bin").unwrap_err();
        assert!(err.to_string().contains("not valid UTF-8"));
        assert!(!dir.path().join("run/host").exists());
    }

    #[test]
    fn recorded_icons_stay_below_share_dir() {
        let file = EntryFile::parse(
            "[Desktop Entry]\n\
             X-Distrobox-Icons=icons/a.png;../../.bashrc;/etc/passwd;;pixmaps/b.xpm;\n",
        );
        assert_eq!(recorded_icons(&file), vec!["icons/a.png", "pixmaps/b.xpm"]);
    }
}
