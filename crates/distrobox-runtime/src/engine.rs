use crate::command::EngineCommand;
use crate::prereq::command_exists;
use crate::RuntimeError;
use chrono::{DateTime, SecondsFormat, Utc};
use distrobox_schema::{EngineChoice, MANAGER_LABEL};
use serde::Serialize;
use std::process::{Command, Output, Stdio};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Podman,
    Docker,
}

impl EngineKind {
    pub fn program(self) -> &'static str {
        match self {
            Self::Podman => "podman",
            Self::Docker => "docker",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    /// Any other engine status: `created`, `exited`, `paused`, ...
    Stopped(String),
    Missing,
}

impl ContainerState {
    pub fn parse(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "running" => Self::Running,
            other => Self::Stopped(other.to_owned()),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub status: String,
    pub image: String,
}

impl ContainerSummary {
    /// Parse one `ID|NAME|STATUS|IMAGE` line as produced by [`PS_FORMAT`].
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut fields = line.trim().splitn(4, '|');
        let id = fields.next()?.trim();
        let name = fields.next()?.trim();
        let status = fields.next()?.trim();
        let image = fields.next()?.trim();
        if id.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self {
            id: id.chars().take(12).collect(),
            name: name.to_owned(),
            status: status.to_owned(),
            image: image.to_owned(),
        })
    }

    pub fn is_running(&self) -> bool {
        let status = self.status.to_ascii_lowercase();
        status.starts_with("up") || status == "running"
    }
}

const PS_FORMAT: &str = "{{.ID}}|{{.Names}}|{{.Status}}|{{.Image}}";

/// Operations distrobox needs from a container engine.
pub trait ContainerEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    fn state(&self, name: &str) -> Result<ContainerState, RuntimeError>;

    fn start(&self, name: &str) -> Result<(), RuntimeError>;

    /// When the current run of the container started, as an RFC 3339 UTC
    /// timestamp usable with `logs_since`. `None` when the engine cannot say.
    fn started_at(&self, name: &str) -> Result<Option<String>, RuntimeError>;

    /// Combined log output, only entries newer than `since` when given.
    fn logs_since(&self, name: &str, since: Option<&str>) -> Result<String, RuntimeError>;

    /// Whether `path` exists inside the running container.
    fn file_exists(&self, name: &str, path: &str) -> Result<bool, RuntimeError>;

    fn image_exists(&self, image: &str) -> Result<bool, RuntimeError>;

    fn pull(&self, image: &str) -> Result<(), RuntimeError>;

    fn create(&self, command: &EngineCommand) -> Result<(), RuntimeError>;

    /// Run with inherited stdio and return the exit code.
    fn run_interactive(&self, command: &EngineCommand) -> Result<i32, RuntimeError>;

    fn list(&self) -> Result<Vec<ContainerSummary>, RuntimeError>;

    fn stop(&self, name: &str) -> Result<(), RuntimeError>;

    fn remove(&self, name: &str, force: bool) -> Result<(), RuntimeError>;
}

/// Engine driven through its command line.
pub struct CliEngine {
    kind: EngineKind,
}

impl CliEngine {
    pub fn new(kind: EngineKind) -> Self {
        Self { kind }
    }

    fn output(&self, args: &[&str]) -> Result<Output, RuntimeError> {
        debug!("{} {}", self.kind.program(), args.join(" "));
        Command::new(self.kind.program())
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| RuntimeError::EngineFailed {
                action: format!("{} {}", self.kind.program(), args.first().unwrap_or(&"")),
                message: e.to_string(),
            })
    }

    fn checked(&self, action: &str, args: &[&str]) -> Result<Output, RuntimeError> {
        let output = self.output(args)?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(RuntimeError::EngineFailed {
                action: action.to_owned(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            })
        }
    }
}

/// Docker reports `StartedAt` as RFC 3339, podman as
/// `2024-05-01 10:00:00.123456789 +0200 CEST`. A container that never
/// started carries the zero time, which is treated as unknown.
fn normalize_started_at(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let parsed = DateTime::parse_from_rfc3339(raw).ok().or_else(|| {
        let without_zone: Vec<&str> = raw.split_whitespace().take(3).collect();
        DateTime::parse_from_str(&without_zone.join(" "), "%Y-%m-%d %H:%M:%S%.f %z").ok()
    })?;
    let utc = parsed.with_timezone(&Utc);
    if utc.timestamp() <= 0 {
        return None;
    }
    Some(utc.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn is_missing_message(stderr: &str) -> bool {
    let msg = stderr.to_lowercase();
    msg.contains("no such") || msg.contains("not found") || msg.contains("does not exist")
}

impl ContainerEngine for CliEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn state(&self, name: &str) -> Result<ContainerState, RuntimeError> {
        let output = self.output(&[
            "inspect",
            "--type",
            "container",
            "--format",
            "{{.State.Status}}",
            name,
        ])?;
        if output.status.success() {
            return Ok(ContainerState::parse(&String::from_utf8_lossy(
                &output.stdout,
            )));
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_missing_message(&stderr) {
            Ok(ContainerState::Missing)
        } else {
            Err(RuntimeError::EngineFailed {
                action: format!("inspect {name}"),
                message: stderr.trim().to_owned(),
            })
        }
    }

    fn start(&self, name: &str) -> Result<(), RuntimeError> {
        self.checked(&format!("start {name}"), &["start", name])?;
        Ok(())
    }

    fn started_at(&self, name: &str) -> Result<Option<String>, RuntimeError> {
        let output = self.checked(
            &format!("inspect {name}"),
            &[
                "inspect",
                "--type",
                "container",
                "--format",
                "{{.State.StartedAt}}",
                name,
            ],
        )?;
        Ok(normalize_started_at(&String::from_utf8_lossy(
            &output.stdout,
        )))
    }

    fn logs_since(&self, name: &str, since: Option<&str>) -> Result<String, RuntimeError> {
        let mut args = vec!["logs"];
        if let Some(since) = since {
            args.push("--since");
            args.push(since);
        }
        args.push(name);
        let output = self.checked(&format!("logs {name}"), &args)?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }

    fn file_exists(&self, name: &str, path: &str) -> Result<bool, RuntimeError> {
        let output = self.output(&["exec", name, "test", "-e", path])?;
        Ok(output.status.success())
    }

    fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        let output = self.output(&["image", "inspect", image])?;
        Ok(output.status.success())
    }

    fn pull(&self, image: &str) -> Result<(), RuntimeError> {
        debug!("{} pull {image}", self.kind.program());
        let status = Command::new(self.kind.program())
            .args(["pull", image])
            .status()
            .map_err(|e| RuntimeError::EngineFailed {
                action: format!("pull {image}"),
                message: e.to_string(),
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(RuntimeError::ImageNotFound(image.to_owned()))
        }
    }

    fn create(&self, command: &EngineCommand) -> Result<(), RuntimeError> {
        debug!("{command}");
        let output = command
            .to_command()
            .stdin(Stdio::null())
            .output()
            .map_err(|e| RuntimeError::EngineFailed {
                action: "create".to_owned(),
                message: e.to_string(),
            })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(RuntimeError::EngineFailed {
                action: "create".to_owned(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            })
        }
    }

    fn run_interactive(&self, command: &EngineCommand) -> Result<i32, RuntimeError> {
        debug!("{command}");
        let status = command
            .to_command()
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| RuntimeError::EngineFailed {
                action: "exec".to_owned(),
                message: e.to_string(),
            })?;
        Ok(status.code().unwrap_or(1))
    }

    fn list(&self) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let filter = format!("label={MANAGER_LABEL}");
        let output = self.checked(
            "ps",
            &["ps", "--all", "--filter", &filter, "--format", PS_FORMAT],
        )?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(ContainerSummary::parse_line)
            .collect())
    }

    fn stop(&self, name: &str) -> Result<(), RuntimeError> {
        self.checked(&format!("stop {name}"), &["stop", name])?;
        Ok(())
    }

    fn remove(&self, name: &str, force: bool) -> Result<(), RuntimeError> {
        let mut args = vec!["rm"];
        if force {
            args.push("--force");
        }
        args.push(name);
        let output = self.output(&args)?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_missing_message(&stderr) {
            Err(RuntimeError::ContainerNotFound(name.to_owned()))
        } else {
            Err(RuntimeError::EngineFailed {
                action: format!("rm {name}"),
                message: stderr.trim().to_owned(),
            })
        }
    }
}

/// Resolve the configured engine, probing PATH for `autodetect`
/// (podman preferred over docker).
pub fn select_engine(choice: EngineChoice) -> Result<Box<dyn ContainerEngine>, RuntimeError> {
    let kind = match choice {
        EngineChoice::Podman => EngineKind::Podman,
        EngineChoice::Docker => EngineKind::Docker,
        EngineChoice::Autodetect => detect_kind(command_exists).ok_or_else(|| {
            RuntimeError::EngineUnavailable("neither podman nor docker found in PATH".to_owned())
        })?,
    };
    if !command_exists(kind.program()) {
        return Err(RuntimeError::EngineUnavailable(format!(
            "{} not found in PATH",
            kind.program()
        )));
    }
    Ok(Box::new(CliEngine::new(kind)))
}

fn detect_kind(exists: impl Fn(&str) -> bool) -> Option<EngineKind> {
    [EngineKind::Podman, EngineKind::Docker]
        .into_iter()
        .find(|kind| exists(kind.program()))
}
