//! Engine Invocation Builder.
//!
//! Everything here is pure: the impure inputs (sockets, resolved files, which
//! mounts exist) are gathered by [`HostEnvironment::probe`] up front, so the
//! same inputs always produce the same argument list.

use crate::engine::EngineKind;
use crate::host::HostEnvironment;
use distrobox_schema::{
    shell_quote, ContainerIdentity, ContainerName, EXPORT_PATH, INIT_PATH, MANAGER_LABEL,
};
use std::fmt;
use std::path::{Path, PathBuf};

/// Never forwarded into the container: they describe the host itself.
const HOST_ONLY_ENV: &[&str] = &["HOST", "HOSTNAME", "PATH", "_"];

/// One engine invocation: program plus ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl EngineCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// `flag value` pair.
    fn opt(&mut self, flag: &str, value: impl Into<String>) -> &mut Self {
        self.args.push(flag.to_owned());
        self.args.push(value.into());
        self
    }

    pub fn to_command(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    /// Position of the first occurrence of `arg`.
    pub fn position(&self, arg: &str) -> Option<usize> {
        self.args.iter().position(|a| a == arg)
    }
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shell_quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

pub struct CreateOptions<'a> {
    pub kind: EngineKind,
    pub identity: &'a ContainerIdentity,
    pub host: &'a HostEnvironment,
    pub additional_flags: &'a [String],
}

pub fn build_create_command(opts: &CreateOptions<'_>) -> EngineCommand {
    let identity = opts.identity;
    let user = &identity.user;
    let host = opts.host;
    let name = identity.name.as_str();

    let mut cmd = EngineCommand::new(opts.kind.program());
    cmd.arg("create")
        .opt("--name", name)
        .opt("--hostname", name)
        .arg("--privileged")
        .opt("--security-opt", "label=disable")
        .opt("--user", "root:root")
        .opt("--ipc", "host")
        .opt("--network", "host")
        .opt("--pid", "host")
        .opt("--label", MANAGER_LABEL);

    if opts.kind == EngineKind::Podman {
        cmd.opt("--userns", "keep-id")
            .opt("--ulimit", "host")
            .opt("--annotation", "run.oci.keep_original_groups=1");
    }

    cmd.opt("--env", format!("SHELL={}", user.shell.display()))
        .opt("--env", format!("HOME={}", user.home.display()))
        .opt("--env", format!("CONTAINER_ID={name}"))
        .opt(
            "--env",
            format!("DISTROBOX_ENTER_PATH={}", host.enter_path.display()),
        );

    for mount in &host.mounts {
        cmd.opt("--volume", mount.volume_arg());
    }

    cmd.opt(
        "--volume",
        format!("{}:{INIT_PATH}:ro", host.init_binary.display()),
    );
    if let Some(export) = &host.export_binary {
        cmd.opt("--volume", format!("{}:{EXPORT_PATH}:ro", export.display()));
    }

    for socket in &host.sockets {
        let s = socket.display();
        cmd.opt("--volume", format!("{s}:{s}"));
    }

    for file in &host.resolved_files {
        cmd.opt(
            "--volume",
            format!("{}:{}:ro", file.source.display(), file.target.display()),
        );
    }

    cmd.args(opts.additional_flags.iter().cloned());

    cmd.opt("--entrypoint", INIT_PATH)
        .arg(identity.image.as_str())
        .opt("--name", user.name.as_str())
        .opt("--uid", user.uid.to_string())
        .opt("--gid", user.gid.to_string())
        .opt("--home", user.home.display().to_string())
        .opt("--shell", user.shell.display().to_string());

    cmd
}

pub struct EnterOptions<'a> {
    pub kind: EngineKind,
    pub container: &'a ContainerName,
    pub user: &'a str,
    pub workdir: &'a Path,
    pub env: &'a [(String, String)],
    pub tty: bool,
    pub command: &'a [String],
}

pub fn build_enter_command(opts: &EnterOptions<'_>) -> EngineCommand {
    let mut cmd = EngineCommand::new(opts.kind.program());
    cmd.arg("exec").arg("--interactive");
    if opts.tty {
        cmd.arg("--tty");
    }
    if opts.kind == EngineKind::Podman {
        cmd.arg("--detach-keys=");
    }
    cmd.opt("--user", opts.user)
        .opt("--workdir", opts.workdir.display().to_string());
    for (key, value) in opts.env {
        cmd.opt("--env", format!("{key}={value}"));
    }
    cmd.arg(opts.container.as_str());
    cmd.args(opts.command.iter().cloned());
    cmd
}

/// Interactive login shell, used when `enter` gets no command.
pub fn default_shell_command(shell: &Path) -> Vec<String> {
    vec![shell.display().to_string(), "-l".to_owned()]
}

/// Caller environment to forward, sorted by key.
///
/// Entries whose key or value contains whitespace or a double quote are
/// dropped, as are host-only keys and `exclusions`.
pub fn snapshot_env(
    vars: impl IntoIterator<Item = (String, String)>,
    exclusions: &[String],
) -> Vec<(String, String)> {
    let unsafe_text = |s: &str| s.chars().any(|c| c.is_whitespace() || c == '"');
    let mut env: Vec<(String, String)> = vars
        .into_iter()
        .filter(|(k, v)| !k.is_empty() && !unsafe_text(k) && !unsafe_text(v))
        .filter(|(k, _)| !HOST_ONLY_ENV.contains(&k.as_str()))
        .filter(|(k, _)| !exclusions.iter().any(|e| e == k))
        .collect();
    env.sort();
    env.dedup_by(|a, b| a.0 == b.0);
    env
}

/// Current directory when known, else home, else `/`.
pub fn resolve_workdir(current: Option<PathBuf>, home: Option<&Path>) -> PathBuf {
    current
        .filter(|p| p.is_absolute())
        .or_else(|| home.map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ResolvedFile;
    use distrobox_schema::{engine_mounts, ImageRef, UserIdentity};

    fn identity() -> ContainerIdentity {
        ContainerIdentity::new(
            ContainerName::new("devbox").unwrap(),
            ImageRef::new("quay.io/toolbx/arch-toolbox:latest").unwrap(),
            UserIdentity::new("alice", 1000, 1000, "/home/alice", "/bin/zsh").unwrap(),
        )
        .unwrap()
    }

    fn host(export: bool) -> HostEnvironment {
        HostEnvironment {
            mounts: engine_mounts(&identity().user),
            sockets: vec![PathBuf::from("/run/docker.sock")],
            resolved_files: vec![ResolvedFile {
                target: PathBuf::from("/etc/resolv.conf"),
                source: PathBuf::from("/run/systemd/resolve/stub-resolv.conf"),
            }],
            init_binary: PathBuf::from("/opt/distrobox/distrobox-init"),
            export_binary: export.then(|| PathBuf::from("/opt/distrobox/distrobox-export")),
            enter_path: PathBuf::from("/opt/distrobox/distrobox"),
        }
    }

    fn create(kind: EngineKind, export: bool) -> EngineCommand {
        let identity = identity();
        let host = host(export);
        build_create_command(&CreateOptions {
            kind,
            identity: &identity,
            host: &host,
            additional_flags: &["--cap-add=SYS_PTRACE".to_owned()],
        })
    }

    fn has_pair(cmd: &EngineCommand, flag: &str, value: &str) -> bool {
        cmd.args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn podman_create_requests_keep_id() {
        let cmd = create(EngineKind::Podman, true);
        assert_eq!(cmd.program, "podman");
        assert_eq!(cmd.args[0], "create");
        assert!(has_pair(&cmd, "--userns", "keep-id"));
        assert!(has_pair(&cmd, "--user", "root:root"));
    }

    #[test]
    fn docker_create_has_no_podman_only_flags() {
        let cmd = create(EngineKind::Docker, true);
        assert_eq!(cmd.program, "docker");
        assert!(cmd.position("--userns").is_none());
        assert!(cmd.position("--annotation").is_none());
    }

    #[test]
    fn init_binary_is_bound_read_only() {
        let cmd = create(EngineKind::Podman, false);
        assert!(has_pair(
            &cmd,
            "--volume",
            "/opt/distrobox/distrobox-init:/usr/bin/distrobox-init:ro"
        ));
        assert!(has_pair(&cmd, "--entrypoint", INIT_PATH));
    }

    #[test]
    fn export_binary_bound_only_when_present() {
        let without = create(EngineKind::Podman, false);
        assert!(!without.args.iter().any(|a| a.contains(EXPORT_PATH)));
        let with = create(EngineKind::Podman, true);
        assert!(has_pair(
            &with,
            "--volume",
            "/opt/distrobox/distrobox-export:/usr/bin/distrobox-export:ro"
        ));
    }

    #[test]
    fn sockets_and_resolved_files_are_bound() {
        let cmd = create(EngineKind::Podman, true);
        assert!(has_pair(&cmd, "--volume", "/run/docker.sock:/run/docker.sock"));
        assert!(has_pair(
            &cmd,
            "--volume",
            "/run/systemd/resolve/stub-resolv.conf:/etc/resolv.conf:ro"
        ));
    }

    #[test]
    fn image_follows_flags_and_init_args_follow_image() {
        let cmd = create(EngineKind::Podman, true);
        let image = cmd.position("quay.io/toolbx/arch-toolbox:latest").unwrap();
        let entrypoint = cmd.position("--entrypoint").unwrap();
        let extra = cmd.position("--cap-add=SYS_PTRACE").unwrap();
        assert!(extra < entrypoint && entrypoint < image);
        assert_eq!(
            &cmd.args[image + 1..],
            &[
                "--name", "alice", "--uid", "1000", "--gid", "1000", "--home", "/home/alice",
                "--shell", "/bin/zsh"
            ]
        );
    }

    #[test]
    fn create_passes_container_env() {
        let cmd = create(EngineKind::Podman, true);
        assert!(has_pair(&cmd, "--env", "CONTAINER_ID=devbox"));
        assert!(has_pair(
            &cmd,
            "--env",
            "DISTROBOX_ENTER_PATH=/opt/distrobox/distrobox"
        ));
    }

    #[test]
    fn enter_command_layout() {
        let name = ContainerName::new("devbox").unwrap();
        let env = vec![("TERM".to_owned(), "xterm".to_owned())];
        let command = default_shell_command(Path::new("/bin/zsh"));
        let cmd = build_enter_command(&EnterOptions {
            kind: EngineKind::Podman,
            container: &name,
            user: "alice",
            workdir: Path::new("/home/alice/src"),
            env: &env,
            tty: true,
            command: &command,
        });
        assert_eq!(
            cmd.args,
            vec![
                "exec",
                "--interactive",
                "--tty",
                "--detach-keys=",
                "--user",
                "alice",
                "--workdir",
                "/home/alice/src",
                "--env",
                "TERM=xterm",
                "devbox",
                "/bin/zsh",
                "-l"
            ]
        );
    }

    #[test]
    fn snapshot_env_drops_whitespace_and_host_keys() {
        let vars = vec![
            ("TERM".to_owned(), "xterm-256color".to_owned()),
            ("PS1".to_owned(), "$ > ".to_owned()),
            ("QUOTED".to_owned(), "a\"b".to_owned()),
            ("PATH".to_owned(), "/usr/bin".to_owned()),
            ("HOSTNAME".to_owned(), "laptop".to_owned()),
            ("SECRET".to_owned(), "x".to_owned()),
            ("LANG".to_owned(), "C.UTF-8".to_owned()),
        ];
        let env = snapshot_env(vars, &["SECRET".to_owned()]);
        assert_eq!(
            env,
            vec![
                ("LANG".to_owned(), "C.UTF-8".to_owned()),
                ("TERM".to_owned(), "xterm-256color".to_owned()),
            ]
        );
    }

    #[test]
    fn workdir_falls_back_to_home_then_root() {
        let home = Path::new("/home/alice");
        assert_eq!(
            resolve_workdir(Some(PathBuf::from("/srv")), Some(home)),
            PathBuf::from("/srv")
        );
        assert_eq!(resolve_workdir(None, Some(home)), home.to_path_buf());
        assert_eq!(resolve_workdir(None, None), PathBuf::from("/"));
    }

    #[test]
    fn display_quotes_only_when_needed() {
        let mut cmd = EngineCommand::new("podman");
        cmd.args(["exec", "it's here", "plain"]);
        assert_eq!(cmd.to_string(), "podman exec 'it'\\''s here' plain");
    }
}
