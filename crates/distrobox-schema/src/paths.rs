use crate::CONTAINER_MARKERS;
use std::path::{Path, PathBuf};

/// Re-anchor an absolute path below `root`. With a root of `/` this is the
/// identity; tests pass a temporary directory.
pub fn rooted(root: &Path, path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    root.join(path.strip_prefix("/").unwrap_or(path))
}

pub fn is_inside_container(root: &Path) -> bool {
    CONTAINER_MARKERS
        .iter()
        .any(|marker| rooted(root, marker).exists())
}

/// Look `name` up in a `PATH`-style search list, below `root`. Returns the
/// path as seen from inside `root`.
pub fn find_executable(root: &Path, name: &str, search_path: &str) -> Option<PathBuf> {
    if name.contains('/') {
        let candidate = PathBuf::from(name);
        return is_executable(&rooted(root, &candidate)).then_some(candidate);
    }
    std::env::split_paths(search_path)
        .filter(|dir| dir.is_absolute())
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(&rooted(root, candidate)))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn touch_exec(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn rooted_joins_absolute_paths() {
        assert_eq!(
            rooted(Path::new("/tmp/root"), "/etc/passwd"),
            PathBuf::from("/tmp/root/etc/passwd")
        );
        assert_eq!(rooted(Path::new("/"), "/etc"), PathBuf::from("/etc"));
    }

    #[test]
    fn container_marker_detection() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_inside_container(dir.path()));
        std::fs::create_dir_all(dir.path().join("run")).unwrap();
        std::fs::write(dir.path().join("run/.containerenv"), "").unwrap();
        assert!(is_inside_container(dir.path()));
    }

    #[test]
    fn dockerenv_counts_as_marker() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".dockerenv"), "").unwrap();
        assert!(is_inside_container(dir.path()));
    }

    #[test]
    fn find_executable_searches_path_in_order() {
        let dir = tempfile::tempdir().unwrap();
        touch_exec(&dir.path().join("usr/local/bin/vim"));
        touch_exec(&dir.path().join("usr/bin/vim"));
        let found = find_executable(dir.path(), "vim", "/usr/bin:/usr/local/bin");
        assert_eq!(found, Some(PathBuf::from("/usr/bin/vim")));
    }

    #[test]
    fn find_executable_ignores_non_executable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("usr/bin")).unwrap();
        std::fs::write(dir.path().join("usr/bin/notes"), "text").unwrap();
        assert!(find_executable(dir.path(), "notes", "/usr/bin").is_none());
    }

    #[test]
    fn find_executable_accepts_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        touch_exec(&dir.path().join("opt/tool/run"));
        assert_eq!(
            find_executable(dir.path(), "/opt/tool/run", ""),
            Some(PathBuf::from("/opt/tool/run"))
        );
    }
}
