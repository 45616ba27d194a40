pub mod completions;
pub mod create;
pub mod enter;
pub mod list;
pub mod man_pages;
pub mod rm;
pub mod stop;

use distrobox_runtime::{
    check_engine_prereqs, format_missing, select_engine, ContainerEngine, ContainerSummary,
    RuntimeError,
};
use distrobox_schema::{is_inside_container, ConfigFile, Overrides, SchemaError, Settings};
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::path::Path;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_USAGE: u8 = 2;
pub const EXIT_NOT_FOUND: u8 = 127;

/// Error reported by a subcommand, carrying the process exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliError {
    pub code: u8,
    pub message: String,
}

impl CliError {
    pub fn new(code: u8, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<RuntimeError> for CliError {
    fn from(e: RuntimeError) -> Self {
        Self::new(e.exit_code(), e.to_string())
    }
}

impl From<SchemaError> for CliError {
    fn from(e: SchemaError) -> Self {
        let code = match e {
            SchemaError::Io(_) => EXIT_FAILURE,
            _ => EXIT_USAGE,
        };
        Self::new(code, e.to_string())
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, CliError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CliError::new(EXIT_FAILURE, format!("JSON serialization failed: {e}")))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    pb.set_style(style);
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn finish_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(finish_style());
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(finish_style());
    pb.finish_with_message(format!("✗ {msg}"));
}

/// Engine status text colored by what it means for the user.
pub fn colorize_status(summary: &ContainerSummary) -> String {
    use console::Style;
    let status = summary.status.as_str();
    let lower = status.to_ascii_lowercase();
    if summary.is_running() {
        Style::new().cyan().bold().apply_to(status).to_string()
    } else if lower.starts_with("created") {
        Style::new().yellow().apply_to(status).to_string()
    } else if lower.starts_with("exited") {
        Style::new().dim().apply_to(status).to_string()
    } else {
        status.to_owned()
    }
}

/// Settings for this invocation: command line, then `DBX_*`, then the
/// config file.
pub fn resolve_settings(overrides: Overrides) -> Result<Settings, CliError> {
    let file = ConfigFile::load_default()?;
    Ok(Settings::resolve(
        file,
        |key| std::env::var(key).ok(),
        overrides,
    )?)
}

/// Engine for `settings`, with install hints when none is available.
pub fn open_engine(settings: &Settings) -> Result<Box<dyn ContainerEngine>, CliError> {
    if std::env::var("DISTROBOX_SKIP_PREREQS").as_deref() != Ok("1") {
        let missing = check_engine_prereqs(settings.engine);
        if !missing.is_empty() {
            return Err(CliError::new(EXIT_NOT_FOUND, format_missing(&missing)));
        }
    }
    Ok(select_engine(settings.engine)?)
}

/// Host-only commands refuse to run from inside a container.
pub fn refuse_inside_container(root: &Path, command: &'static str) -> Result<(), CliError> {
    if is_inside_container(root) {
        return Err(RuntimeError::InsideContainer(command).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(status: &str) -> ContainerSummary {
        ContainerSummary {
            id: "abc".into(),
            name: "devbox".into(),
            status: status.into(),
            image: "alpine".into(),
        }
    }

    #[test]
    fn json_pretty_serializes_summary() {
        let result = json_pretty(&vec![summary("running")]).unwrap();
        assert!(result.contains("\"name\": \"devbox\""));
    }

    #[test]
    fn colorize_keeps_status_text() {
        for status in ["Up 2 minutes", "Created", "Exited (0) 1 hour ago", "paused"] {
            assert!(colorize_status(&summary(status)).contains(status));
        }
        assert_eq!(colorize_status(&summary("paused")), "paused");
    }

    #[test]
    fn runtime_errors_keep_exit_codes() {
        let err: CliError = RuntimeError::InsideContainer("distrobox create").into();
        assert_eq!(err.code, 126);
        let err: CliError = RuntimeError::Cancelled.into();
        assert_eq!(err.code, 130);
    }

    #[test]
    fn schema_errors_are_usage_errors() {
        let err: CliError = SchemaError::UnknownEngine("lxc".into()).into();
        assert_eq!(err.code, EXIT_USAGE);
        assert!(err.message.contains("lxc"));
    }

    #[test]
    fn container_marker_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        assert!(refuse_inside_container(dir.path(), "distrobox enter").is_ok());
        std::fs::write(dir.path().join(".dockerenv"), "").unwrap();
        let err = refuse_inside_container(dir.path(), "distrobox enter").unwrap_err();
        assert_eq!(err.code, 126);
    }

    #[test]
    fn spinner_finishes() {
        let pb = spinner("testing...");
        spin_ok(&pb, "done");
        let pb = spinner("testing...");
        spin_fail(&pb, "failed");
    }
}
