use super::{refuse_inside_container, spin_fail, spin_ok, spinner, CliError};
use distrobox_runtime::terminal::{emit_container_pop, emit_container_push, stdin_is_terminal};
use distrobox_runtime::{
    build_enter_command, default_shell_command, resolve_workdir, shutdown_requested, snapshot_env,
    wait_until_ready, ContainerEngine, EngineCommand, EnterOptions, GateOptions, Readiness,
};
use distrobox_schema::{Settings, UserIdentity};
use std::path::{Path, PathBuf};

/// What the session runs as and where.
pub struct Session {
    pub user: UserIdentity,
    pub env: Vec<(String, String)>,
    pub workdir: PathBuf,
    pub tty: bool,
}

pub fn run(
    engine: &dyn ContainerEngine,
    settings: &Settings,
    command: &[String],
) -> Result<u8, CliError> {
    refuse_inside_container(Path::new("/"), "distrobox enter")?;
    wait_for_container(engine, settings)?;

    let user = UserIdentity::from_host()?;
    let workdir = resolve_workdir(std::env::current_dir().ok(), Some(user.home()));
    let session = Session {
        env: snapshot_env(std::env::vars(), &settings.env_exclusions),
        workdir,
        tty: stdin_is_terminal(),
        user,
    };
    let cmd = session_command(engine, settings, &session, command);

    let name = settings.name.as_str();
    emit_container_push(name, engine.kind().program());
    let result = engine.run_interactive(&cmd);
    emit_container_pop();
    Ok(exit_status(result?))
}

/// Run the Readiness Gate behind a spinner, printing bootstrap diagnostics
/// above it.
pub fn wait_for_container(
    engine: &dyn ContainerEngine,
    settings: &Settings,
) -> Result<Readiness, CliError> {
    let name = settings.name.as_str();
    let options = GateOptions {
        poll_interval: settings.poll_interval,
        timeout: settings.readiness_timeout,
    };
    let pb = spinner(&format!("starting {name}"));
    let mut surface = |line: &str| pb.println(line);
    match wait_until_ready(engine, name, &options, &mut surface, &shutdown_requested) {
        Ok(Readiness::AlreadyRunning) => {
            pb.finish_and_clear();
            Ok(Readiness::AlreadyRunning)
        }
        Ok(Readiness::Started) => {
            spin_ok(&pb, &format!("{name} is ready"));
            Ok(Readiness::Started)
        }
        Err(e) => {
            spin_fail(&pb, &format!("{name} did not become ready"));
            Err(e.into())
        }
    }
}

pub fn session_command(
    engine: &dyn ContainerEngine,
    settings: &Settings,
    session: &Session,
    command: &[String],
) -> EngineCommand {
    let command = if command.is_empty() {
        default_shell_command(&session.user.shell)
    } else {
        command.to_vec()
    };
    build_enter_command(&EnterOptions {
        kind: engine.kind(),
        container: &settings.name,
        user: &session.user.name,
        workdir: &session.workdir,
        env: &session.env,
        tty: session.tty,
        command: &command,
    })
}

/// Exit code of the session as our own; out of range codes become 1.
fn exit_status(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use distrobox_runtime::mock::MockEngine;
    use distrobox_runtime::ContainerState;
    use distrobox_schema::{ConfigFile, Overrides};

    fn settings() -> Settings {
        Settings::resolve(
            ConfigFile::default(),
            |_| None,
            Overrides {
                name: Some("devbox".into()),
                ..Overrides::default()
            },
        )
        .unwrap()
    }

    fn session() -> Session {
        Session {
            user: UserIdentity::new("alice", 1000, 1000, "/home/alice", "/bin/zsh").unwrap(),
            env: vec![("LANG".into(), "C.UTF-8".into())],
            workdir: PathBuf::from("/home/alice/src"),
            tty: false,
        }
    }

    #[test]
    fn running_container_is_entered_directly() {
        let engine = MockEngine::new()
            .with_container("devbox", ContainerState::Running)
            .with_ready_file();
        assert_eq!(
            wait_for_container(&engine, &settings()).unwrap(),
            Readiness::AlreadyRunning
        );
        assert_eq!(engine.starts(), 0);
    }

    #[test]
    fn missing_container_fails_the_gate() {
        let engine = MockEngine::new();
        let err = wait_for_container(&engine, &settings()).unwrap_err();
        assert!(err.message.contains("devbox"));
        assert_eq!(err.code, 1);
    }

    #[test]
    fn empty_command_starts_a_login_shell() {
        let engine = MockEngine::new();
        let cmd = session_command(&engine, &settings(), &session(), &[]);
        let tail: Vec<&str> = cmd.args.iter().rev().take(3).rev().map(String::as_str).collect();
        assert_eq!(tail, ["devbox", "/bin/zsh", "-l"]);
        assert!(cmd.args.windows(2).any(|w| w[0] == "--workdir" && w[1] == "/home/alice/src"));
        assert!(cmd.args.windows(2).any(|w| w[0] == "--env" && w[1] == "LANG=C.UTF-8"));
        assert!(!cmd.args.contains(&"--tty".to_owned()));
    }

    #[test]
    fn explicit_command_is_passed_through() {
        let engine = MockEngine::new();
        let command = vec!["make".to_owned(), "-j4".to_owned()];
        let cmd = session_command(&engine, &settings(), &session(), &command);
        assert_eq!(cmd.args[cmd.args.len() - 2..], ["make", "-j4"]);
    }

    #[test]
    fn exit_codes_are_propagated() {
        assert_eq!(exit_status(0), 0);
        assert_eq!(exit_status(42), 42);
        assert_eq!(exit_status(-1), 1);
        assert_eq!(exit_status(300), 1);
    }
}
