use crate::system::{run_checked, System};
use crate::InitError;
use distrobox_schema::{rooted, UserIdentity};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

pub const GROUP_FILE: &str = "/etc/group";

/// Groups that grant elevation on common distributions.
pub const ELEVATION_GROUPS: &[&str] = &["sudo", "wheel"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub name: String,
    pub gid: u32,
    pub members: Vec<String>,
}

impl GroupEntry {
    /// Parse one `name:password:gid:members` line.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split(':');
        let name = fields.next()?.trim();
        let _password = fields.next()?;
        let gid = fields.next()?.trim().parse().ok()?;
        let members = fields
            .next()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_owned)
            .collect();
        if name.is_empty() || name.starts_with('#') {
            return None;
        }
        Some(Self {
            name: name.to_owned(),
            gid,
            members,
        })
    }
}

/// Entries of the group database below `root`; a missing file has none.
pub fn read_groups(root: &Path) -> Result<Vec<GroupEntry>, InitError> {
    match std::fs::read_to_string(rooted(root, GROUP_FILE)) {
        Ok(content) => Ok(content.lines().filter_map(GroupEntry::parse).collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

fn append_group(root: &Path, name: &str, gid: u32) -> Result<(), InitError> {
    let path = rooted(root, GROUP_FILE);
    let existing = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;
    if !existing.is_empty() && !existing.ends_with('\n') {
        file.write_all(b"\n")?;
    }
    writeln!(file, "{name}:x:{gid}:")?;
    Ok(())
}

/// Make sure a group for `user` exists, matched by name first, then by gid.
///
/// Returns `true` when the group had to be created.
pub fn ensure_group(
    system: &dyn System,
    root: &Path,
    user: &UserIdentity,
) -> Result<bool, InitError> {
    let groups = read_groups(root)?;
    if let Some(group) = groups
        .iter()
        .find(|g| g.name == user.name)
        .or_else(|| groups.iter().find(|g| g.gid == user.gid))
    {
        debug!("group {} ({}) already present", group.name, group.gid);
        return Ok(false);
    }

    let gid = user.gid.to_string();
    let failure = match system.run("groupadd", &["--force", "--gid", &gid, &user.name]) {
        Ok(output) if output.success => None,
        Ok(output) => Some(output.stderr.trim().to_owned()),
        Err(e) => Some(e.to_string()),
    };
    if let Some(reason) = failure {
        warn!("Warning: groupadd failed ({reason}), writing {GROUP_FILE} directly");
        append_group(root, &user.name, user.gid)?;
    }
    info!("created group {} ({})", user.name, user.gid);
    Ok(true)
}

/// Create the user with the host's uid, gid, home and shell. An existing
/// user is added to the elevation groups instead. Both the user and root are
/// left without a password.
pub fn ensure_user(
    system: &dyn System,
    root: &Path,
    user: &UserIdentity,
) -> Result<(), InitError> {
    let uid = user.uid.to_string();
    let gid = user.gid.to_string();
    let home = user.home.to_string_lossy();
    let shell = user.shell.to_string_lossy();
    let output = system.run(
        "useradd",
        &[
            "--home-dir",
            &home,
            "--no-create-home",
            "--shell",
            &shell,
            "--uid",
            &uid,
            "--gid",
            &gid,
            &user.name,
        ],
    )?;

    if output.success {
        info!("created user {} ({uid}:{gid})", user.name);
    } else {
        debug!("useradd failed, assuming {} exists", user.name);
        let present: Vec<String> = read_groups(root)?
            .into_iter()
            .map(|g| g.name)
            .filter(|name| ELEVATION_GROUPS.contains(&name.as_str()))
            .collect();
        if present.is_empty() {
            warn!("Warning: no elevation group found for {}", user.name);
        } else {
            run_checked(system, "usermod", &["-aG", &present.join(","), &user.name])?;
        }
    }

    run_checked(system, "passwd", &["-d", &user.name])?;
    run_checked(system, "passwd", &["-d", "root"])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingSystem;

    fn alice() -> UserIdentity {
        UserIdentity::new("alice", 1000, 1000, "/home/alice", "/bin/bash").unwrap()
    }

    fn write_groups(root: &Path, content: &str) {
        let path = rooted(root, GROUP_FILE);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn parse_group_line() {
        let entry = GroupEntry::parse("wheel:x:10:alice,bob").unwrap();
        assert_eq!(entry.name, "wheel");
        assert_eq!(entry.gid, 10);
        assert_eq!(entry.members, vec!["alice", "bob"]);
        assert!(GroupEntry::parse("broken").is_none());
        assert!(GroupEntry::parse("x:x:notanumber:").is_none());
    }

    #[test]
    fn existing_group_by_gid_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        write_groups(dir.path(), "root:x:0:\nusers:x:1000:\n");
        let system = RecordingSystem::new();
        assert!(!ensure_group(&system, dir.path(), &alice()).unwrap());
        assert!(system.calls().is_empty());
    }

    #[test]
    fn missing_group_uses_groupadd() {
        let dir = tempfile::tempdir().unwrap();
        write_groups(dir.path(), "root:x:0:\n");
        let system = RecordingSystem::new();
        assert!(ensure_group(&system, dir.path(), &alice()).unwrap());
        assert_eq!(
            system.calls_to("groupadd"),
            vec![vec!["groupadd", "--force", "--gid", "1000", "alice"]]
        );
    }

    #[test]
    fn groupadd_failure_appends_once() {
        let dir = tempfile::tempdir().unwrap();
        write_groups(dir.path(), "root:x:0:");
        let system = RecordingSystem::new().failing("groupadd");
        ensure_group(&system, dir.path(), &alice()).unwrap();
        ensure_group(&system, dir.path(), &alice()).unwrap();

        let content = std::fs::read_to_string(rooted(dir.path(), GROUP_FILE)).unwrap();
        assert_eq!(content, "root:x:0:\nalice:x:1000:\n");
        assert_eq!(system.calls_to("groupadd").len(), 1);
    }

    #[test]
    fn missing_groupadd_binary_falls_back_to_group_file() {
        let dir = tempfile::tempdir().unwrap();
        write_groups(dir.path(), "root:x:0:\nwheel:x:10:alice");
        let system = RecordingSystem::new().missing("groupadd");
        assert!(ensure_group(&system, dir.path(), &alice()).unwrap());

        let content = std::fs::read_to_string(rooted(dir.path(), GROUP_FILE)).unwrap();
        assert_eq!(content, "root:x:0:\nwheel:x:10:alice\nalice:x:1000:\n");
        assert!(!ensure_group(&system, dir.path(), &alice()).unwrap());
    }

    #[test]
    fn new_user_is_created_and_unlocked() {
        let dir = tempfile::tempdir().unwrap();
        let system = RecordingSystem::new();
        ensure_user(&system, dir.path(), &alice()).unwrap();
        let calls = system.calls();
        assert_eq!(calls[0][0], "useradd");
        assert!(calls[0].contains(&"--no-create-home".to_owned()));
        assert_eq!(calls[0].last().unwrap(), "alice");
        assert_eq!(calls[1], vec!["passwd", "-d", "alice"]);
        assert_eq!(calls[2], vec!["passwd", "-d", "root"]);
        assert!(system.calls_to("usermod").is_empty());
    }

    #[test]
    fn existing_user_joins_elevation_groups() {
        let dir = tempfile::tempdir().unwrap();
        write_groups(dir.path(), "root:x:0:\nwheel:x:10:\nsudo:x:27:\n");
        let system = RecordingSystem::new().failing("useradd");
        ensure_user(&system, dir.path(), &alice()).unwrap();
        assert_eq!(
            system.calls_to("usermod"),
            vec![vec!["usermod", "-aG", "wheel,sudo", "alice"]]
        );
    }

    #[test]
    fn passwd_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let system = RecordingSystem::new().failing("passwd");
        assert!(ensure_user(&system, dir.path(), &alice()).is_err());
    }
}
