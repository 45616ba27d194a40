use distrobox_schema::{find_executable, EngineChoice};
use std::fmt;
use std::path::Path;

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: &'static str,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

/// Whether `name` resolves to an executable through `PATH`.
pub fn command_exists(name: &str) -> bool {
    let path = std::env::var("PATH").unwrap_or_default();
    find_executable(Path::new("/"), name, &path).is_some()
}

/// Check that the configured container engine can be found.
/// Returns a list of missing items. Empty list means all prerequisites are met.
pub fn check_engine_prereqs(choice: EngineChoice) -> Vec<MissingPrereq> {
    let podman = MissingPrereq {
        name: "podman",
        purpose: "rootless container engine",
        install_hint: "dnf install podman | apt install podman | zypper install podman | \
                       pacman -S podman",
    };
    let docker = MissingPrereq {
        name: "docker",
        purpose: "container engine",
        install_hint: "dnf install moby-engine | apt install docker.io | pacman -S docker",
    };
    match choice {
        EngineChoice::Podman if !command_exists("podman") => vec![podman],
        EngineChoice::Docker if !command_exists("docker") => vec![docker],
        EngineChoice::Autodetect if !command_exists("podman") && !command_exists("docker") => {
            vec![MissingPrereq {
                name: "podman or docker",
                purpose: "container engine",
                install_hint: podman.install_hint,
            }]
        }
        _ => Vec::new(),
    }
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\ndistrobox needs a container engine to create and enter containers.");
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_prereq_display() {
        let m = MissingPrereq {
            name: "podman",
            purpose: "containers",
            install_hint: "apt install podman",
        };
        let s = format!("{m}");
        assert!(s.contains("podman"));
        assert!(s.contains("containers"));
        assert!(s.contains("apt install podman"));
    }

    #[test]
    fn format_missing_produces_readable_output() {
        let items = vec![MissingPrereq {
            name: "docker",
            purpose: "containers",
            install_hint: "apt install docker.io",
        }];
        let output = format_missing(&items);
        assert!(output.starts_with("missing prerequisites:"));
        assert!(output.contains("docker"));
    }

    #[test]
    fn nonexistent_command_is_missing() {
        assert!(!command_exists("distrobox-definitely-not-a-command"));
    }
}
