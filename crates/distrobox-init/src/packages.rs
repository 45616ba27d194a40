use crate::system::{run_checked, System};
use crate::InitError;
use tracing::{debug, info};

/// Commands the reconciler itself depends on, plus the user's login shell.
pub fn required_commands(shell_name: &str) -> Vec<String> {
    let mut commands: Vec<String> = ["mount", "passwd", "sudo", "useradd", "usermod"]
        .iter()
        .map(|c| (*c).to_owned())
        .collect();
    if !commands.iter().any(|c| c == shell_name) {
        commands.push(shell_name.to_owned());
    }
    commands
}

/// Installs whatever provides a set of commands.
pub trait PackageInstaller {
    /// Make every command in `commands` available, installing the packages
    /// that provide the missing ones.
    fn ensure_installed(&self, system: &dyn System, commands: &[String]) -> Result<(), InitError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apk,
    Apt,
    Dnf,
    Pacman,
    Slackpkg,
    Xbps,
    Yum,
    Zypper,
}

impl PackageManager {
    /// Probe order: the first manager whose executable exists is used.
    pub const PRIORITY: [Self; 8] = [
        Self::Apk,
        Self::Apt,
        Self::Dnf,
        Self::Pacman,
        Self::Slackpkg,
        Self::Xbps,
        Self::Yum,
        Self::Zypper,
    ];

    pub fn program(self) -> &'static str {
        match self {
            Self::Apk => "apk",
            Self::Apt => "apt-get",
            Self::Dnf => "dnf",
            Self::Pacman => "pacman",
            Self::Slackpkg => "slackpkg",
            Self::Xbps => "xbps-install",
            Self::Yum => "yum",
            Self::Zypper => "zypper",
        }
    }

    pub fn detect(system: &dyn System) -> Option<Self> {
        Self::PRIORITY
            .into_iter()
            .find(|pm| system.command_exists(pm.program()))
    }

    /// Package providing `command` in this distribution family.
    pub fn package_for(self, command: &str) -> &str {
        match (self, command) {
            (Self::Apt, "mount") => "mount",
            (_, "mount") => "util-linux",
            (Self::Apt | Self::Dnf | Self::Yum, "passwd") => "passwd",
            (Self::Apt, "useradd" | "usermod") => "passwd",
            (Self::Dnf | Self::Yum, "useradd" | "usermod") => "shadow-utils",
            (_, "passwd" | "useradd" | "usermod") => "shadow",
            (_, other) => other,
        }
    }

    /// Non-interactive command lines installing `packages`, in order.
    pub fn install_commands(self, packages: &[String]) -> Vec<Vec<String>> {
        if packages.is_empty() {
            return Vec::new();
        }
        let prefix: &[&str] = match self {
            Self::Apk => &["apk", "add", "--no-cache"],
            Self::Apt => &["apt-get", "install", "-y", "--no-install-recommends"],
            Self::Dnf => &["dnf", "install", "-y"],
            Self::Pacman => &["pacman", "-Sy", "--noconfirm", "--needed"],
            Self::Slackpkg => &["slackpkg", "-batch=on", "-default_answer=y", "install"],
            Self::Xbps => &["xbps-install", "-Sy"],
            Self::Yum => &["yum", "install", "-y"],
            Self::Zypper => &["zypper", "--non-interactive", "install"],
        };
        let mut commands = Vec::new();
        if self == Self::Apt {
            commands.push(vec!["apt-get".to_owned(), "update".to_owned()]);
        }
        let mut install: Vec<String> = prefix.iter().map(|s| (*s).to_owned()).collect();
        install.extend(packages.iter().cloned());
        commands.push(install);
        commands
    }
}

fn missing(system: &dyn System, commands: &[String]) -> Vec<String> {
    commands
        .iter()
        .filter(|c| !system.command_exists(c))
        .cloned()
        .collect()
}

impl PackageInstaller for PackageManager {
    fn ensure_installed(&self, system: &dyn System, commands: &[String]) -> Result<(), InitError> {
        let absent = missing(system, commands);
        if absent.is_empty() {
            return Ok(());
        }

        let mut packages: Vec<String> = Vec::new();
        for command in &absent {
            let package = self.package_for(command).to_owned();
            if !packages.contains(&package) {
                packages.push(package);
            }
        }
        info!("installing {} with {}", packages.join(" "), self.program());
        for line in self.install_commands(&packages) {
            let args: Vec<&str> = line[1..].iter().map(String::as_str).collect();
            run_checked(system, &line[0], &args)?;
        }

        let still_absent = missing(system, commands);
        if still_absent.is_empty() {
            Ok(())
        } else {
            Err(InitError::MissingDependencies(still_absent))
        }
    }
}

/// Check the commands needed for `shell_name` and install any that are
/// missing. Returns the package manager used, if one was needed.
pub fn ensure_dependencies(
    system: &dyn System,
    shell_name: &str,
) -> Result<Option<PackageManager>, InitError> {
    let commands = required_commands(shell_name);
    if missing(system, &commands).is_empty() {
        debug!("all required commands present");
        return Ok(None);
    }
    let manager = PackageManager::detect(system).ok_or_else(|| {
        let tried: Vec<&str> = PackageManager::PRIORITY
            .iter()
            .map(|pm| pm.program())
            .collect();
        InitError::NoPackageManager(tried.join(", "))
    })?;
    manager.ensure_installed(system, &commands)?;
    Ok(Some(manager))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingSystem;

    const BASE: &[&str] = &["mount", "passwd", "sudo", "useradd", "usermod", "bash"];

    #[test]
    fn shell_is_required_once() {
        assert_eq!(required_commands("zsh").last().unwrap(), "zsh");
        assert_eq!(required_commands("bash").len(), 6);
    }

    #[test]
    fn detect_follows_priority_order() {
        let system = RecordingSystem::new().with_commands(&["zypper", "dnf", "yum"]);
        assert_eq!(PackageManager::detect(&system), Some(PackageManager::Dnf));
        assert_eq!(PackageManager::detect(&RecordingSystem::new()), None);
    }

    #[test]
    fn package_names_per_family() {
        assert_eq!(PackageManager::Apt.package_for("useradd"), "passwd");
        assert_eq!(PackageManager::Dnf.package_for("useradd"), "shadow-utils");
        assert_eq!(PackageManager::Apk.package_for("usermod"), "shadow");
        assert_eq!(PackageManager::Pacman.package_for("mount"), "util-linux");
        assert_eq!(PackageManager::Apt.package_for("fish"), "fish");
    }

    #[test]
    fn apt_updates_before_install() {
        let commands = PackageManager::Apt.install_commands(&["sudo".to_owned()]);
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0], vec!["apt-get", "update"]);
        assert_eq!(commands[1].last().unwrap(), "sudo");
        assert!(PackageManager::Apk.install_commands(&[]).is_empty());
    }

    #[test]
    fn nothing_installed_when_present() {
        let system = RecordingSystem::new().with_commands(BASE);
        assert_eq!(ensure_dependencies(&system, "bash").unwrap(), None);
        assert!(system.calls().is_empty());
    }

    #[test]
    fn missing_commands_are_installed_once_per_package() {
        let system = RecordingSystem::new()
            .with_commands(&["mount", "passwd", "bash", "apk"])
            .installing(&["sudo", "useradd", "usermod"]);
        let used = ensure_dependencies(&system, "bash").unwrap();
        assert_eq!(used, Some(PackageManager::Apk));
        assert_eq!(
            system.calls(),
            vec![vec!["apk", "add", "--no-cache", "sudo", "shadow"]]
        );
    }

    #[test]
    fn no_package_manager_is_fatal() {
        let system = RecordingSystem::new().with_commands(&["mount"]);
        let err = ensure_dependencies(&system, "bash").unwrap_err();
        assert!(matches!(err, InitError::NoPackageManager(_)));
        assert_eq!(err.exit_code(), 127);
    }

    #[test]
    fn still_missing_after_install_is_fatal() {
        let system = RecordingSystem::new().with_commands(&["dnf", "mount", "passwd", "bash"]);
        let err = ensure_dependencies(&system, "bash").unwrap_err();
        match err {
            InitError::MissingDependencies(names) => {
                assert_eq!(names, vec!["sudo", "useradd", "usermod"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
