use crate::InitError;
use distrobox_schema::rooted;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::{debug, info};

pub const SUDOERS_FILE: &str = "/etc/sudoers.d/sudoers";
const SUDOERS_MODE: u32 = 0o440;

pub fn policy_lines(user: &str) -> [String; 2] {
    [
        "Defaults !fqdn".to_owned(),
        format!("{user} ALL = (root) NOPASSWD:ALL"),
    ]
}

/// Append the policy lines for `user` that are not present yet.
///
/// Returns the number of lines added. The file is replaced through a
/// sibling with a dot in its name, which sudo never reads.
pub fn ensure_policy(root: &Path, user: &str) -> Result<usize, InitError> {
    let path = rooted(root, SUDOERS_FILE);
    let existing = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let missing: Vec<String> = policy_lines(user)
        .into_iter()
        .filter(|line| !existing.lines().any(|l| l.trim() == line))
        .collect();
    if missing.is_empty() {
        debug!("{SUDOERS_FILE} already configured for {user}");
        return Ok(0);
    }

    let mut content = existing;
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    for line in &missing {
        content.push_str(line);
        content.push('\n');
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let staging = path.with_file_name(".sudoers.distrobox");
    std::fs::write(&staging, content)?;
    std::fs::set_permissions(&staging, std::fs::Permissions::from_mode(SUDOERS_MODE))?;
    std::fs::rename(&staging, &path)?;
    info!("added {} line(s) to {SUDOERS_FILE}", missing.len());
    Ok(missing.len())
}
