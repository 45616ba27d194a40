//! Readiness Gate: block until the container entrypoint reports that setup
//! is complete.

use crate::engine::{ContainerEngine, ContainerState};
use crate::RuntimeError;
use chrono::{SecondsFormat, Utc};
use distrobox_schema::{READINESS_FILE, READINESS_SENTINEL};
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
pub struct GateOptions {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The container was running and had already finished setup.
    AlreadyRunning,
    /// The container was started (or was still bootstrapping) and is now ready.
    Started,
}

/// What one scan of new log lines found.
#[derive(Debug, Default)]
struct LogScan {
    ready: bool,
    last_error: Option<String>,
}

/// Scan the complete lines of `text` beyond the first `seen`, updating `seen`.
///
/// A trailing line without a newline is left for the next poll.
fn scan_new_lines(
    text: &str,
    seen: &mut usize,
    on_diagnostic: &mut dyn FnMut(&str),
) -> LogScan {
    let mut scan = LogScan::default();
    let lines: Vec<&str> = text.lines().collect();
    let complete = if text.ends_with('\n') {
        lines.len()
    } else {
        lines.len().saturating_sub(1)
    };
    if complete < *seen {
        // The engine rotated or truncated its log; start over.
        *seen = 0;
    }
    for line in &lines[*seen..complete] {
        let trimmed = line.trim();
        if trimmed == READINESS_SENTINEL {
            scan.ready = true;
            continue;
        }
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("error:") {
            on_diagnostic(trimmed);
            scan.last_error = Some(trimmed.to_owned());
        } else if lower.starts_with("warning:") {
            on_diagnostic(trimmed);
        }
    }
    *seen = complete;
    scan
}

/// Wait until container `name` has completed its bootstrap.
///
/// A stopped container is started first. Only log output from the current
/// run of the container is read, and each line is examined once;
/// `Error:`/`Warning:` lines are handed to `on_diagnostic` as they appear.
/// Readiness is either the sentinel line in the log or the readiness file
/// inside the container. When the start time of an already running
/// container is unknown, only the readiness file counts. `cancelled` is
/// consulted once per poll.
pub fn wait_until_ready(
    engine: &dyn ContainerEngine,
    name: &str,
    options: &GateOptions,
    on_diagnostic: &mut dyn FnMut(&str),
    cancelled: &dyn Fn() -> bool,
) -> Result<Readiness, RuntimeError> {
    let since = match engine.state(name)? {
        ContainerState::Missing => return Err(RuntimeError::ContainerNotFound(name.to_owned())),
        ContainerState::Running => {
            if engine.file_exists(name, READINESS_FILE)? {
                debug!("container {name} already set up");
                return Ok(Readiness::AlreadyRunning);
            }
            let since = engine.started_at(name)?;
            match &since {
                Some(at) => debug!("container {name} running since {at}, not set up yet"),
                None => debug!("container {name} start time unknown, waiting for readiness file"),
            }
            since
        }
        ContainerState::Stopped(status) => {
            let since = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
            info!("starting container {name} (was {status})");
            engine.start(name)?;
            Some(since)
        }
    };
    // Without a lower bound the log may hold a sentinel from an earlier run.
    let trust_sentinel = since.is_some();

    let started = Instant::now();
    let mut seen = 0usize;
    let mut last_error: Option<String> = None;

    loop {
        if cancelled() {
            return Err(RuntimeError::Cancelled);
        }

        let logs = engine.logs_since(name, since.as_deref())?;
        let scan = scan_new_lines(&logs, &mut seen, on_diagnostic);
        if scan.last_error.is_some() {
            last_error = scan.last_error;
        }
        if scan.ready && trust_sentinel {
            debug!("container {name} reported setup done");
            return Ok(Readiness::Started);
        }

        let state = engine.state(name)?;
        if state.is_running() && engine.file_exists(name, READINESS_FILE)? {
            debug!("container {name} readiness file present");
            return Ok(Readiness::Started);
        }
        if !state.is_running() {
            let detail = last_error.unwrap_or_else(|| match state {
                ContainerState::Stopped(status) => format!("container is {status}"),
                _ => "container disappeared".to_owned(),
            });
            return Err(RuntimeError::BootstrapFailed {
                name: name.to_owned(),
                detail,
            });
        }

        if started.elapsed() >= options.timeout {
            return Err(RuntimeError::BootstrapTimedOut {
                name: name.to_owned(),
                secs: options.timeout.as_secs(),
            });
        }
        std::thread::sleep(options.poll_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockEngine;
    use std::cell::Cell;

    fn fast() -> GateOptions {
        GateOptions {
            poll_interval: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        }
    }

    fn never() -> bool {
        false
    }

    #[test]
    fn ready_container_returns_immediately() {
        let engine = MockEngine::new()
            .with_container("box", ContainerState::Running)
            .with_ready_file();
        let result = wait_until_ready(&engine, "box", &fast(), &mut |_| {}, &never).unwrap();
        assert_eq!(result, Readiness::AlreadyRunning);
        assert_eq!(engine.starts(), 0);
        assert_eq!(engine.log_calls(), 0);
    }

    #[test]
    fn stopped_container_is_started_and_polled_until_sentinel() {
        let engine = MockEngine::new()
            .with_container("box", ContainerState::Stopped("exited".into()))
            .with_log_chunks(&[
                "+ installing dependencies\n",
                "Warning: slow mirror\n",
                "+ setting up user\n",
                "container_setup_done\n",
            ]);
        let mut diagnostics = Vec::new();
        let result = wait_until_ready(
            &engine,
            "box",
            &fast(),
            &mut |line| diagnostics.push(line.to_owned()),
            &never,
        )
        .unwrap();
        assert_eq!(result, Readiness::Started);
        assert_eq!(engine.starts(), 1);
        assert_eq!(engine.log_calls(), 4);
        assert_eq!(diagnostics, vec!["Warning: slow mirror"]);
    }

    #[test]
    fn each_log_line_is_reported_once() {
        let engine = MockEngine::new()
            .with_container("box", ContainerState::Running)
            .with_start_time("2026-01-01T00:00:00Z")
            .with_log_chunks(&["Error: first\n", "noise\n", "noise\n", "container_setup_done\n"]);
        let mut diagnostics = Vec::new();
        wait_until_ready(
            &engine,
            "box",
            &fast(),
            &mut |line| diagnostics.push(line.to_owned()),
            &never,
        )
        .unwrap();
        assert_eq!(diagnostics, vec!["Error: first"]);
    }

    fn short() -> GateOptions {
        GateOptions {
            poll_interval: Duration::from_millis(1),
            timeout: Duration::from_millis(30),
        }
    }

    #[test]
    fn running_container_sentinel_from_current_run() {
        let engine = MockEngine::new()
            .with_container("box", ContainerState::Running)
            .with_start_time("2026-01-01T00:00:00Z")
            .with_log_chunks(&["+ installing dependencies\n", "container_setup_done\n"]);
        let result = wait_until_ready(&engine, "box", &fast(), &mut |_| {}, &never).unwrap();
        assert_eq!(result, Readiness::Started);
        assert_eq!(engine.starts(), 0);
        assert_eq!(engine.log_calls(), 2);
    }

    #[test]
    fn stale_sentinel_from_earlier_run_is_ignored() {
        let engine = MockEngine::new()
            .with_container("box", ContainerState::Running)
            .with_start_time("2026-01-01T00:00:00Z")
            .with_previous_boot_logs("+ installing dependencies\ncontainer_setup_done\n")
            .with_log_chunks(&["+ installing dependencies\n"]);
        let err = wait_until_ready(&engine, "box", &short(), &mut |_| {}, &never).unwrap_err();
        assert!(matches!(err, RuntimeError::BootstrapTimedOut { .. }));
    }

    #[test]
    fn unknown_start_time_waits_for_readiness_file() {
        let engine = MockEngine::new()
            .with_container("box", ContainerState::Running)
            .with_log_chunks(&["container_setup_done\n", "+ installing dependencies\n"]);
        let err = wait_until_ready(&engine, "box", &short(), &mut |_| {}, &never).unwrap_err();
        assert!(matches!(err, RuntimeError::BootstrapTimedOut { .. }));

        let engine = MockEngine::new()
            .with_container("box", ContainerState::Running)
            .with_log_chunks(&["container_setup_done\n"])
            .with_ready_file();
        let result = wait_until_ready(&engine, "box", &fast(), &mut |_| {}, &never).unwrap();
        assert_eq!(result, Readiness::AlreadyRunning);
    }

    #[test]
    fn restart_waits_for_the_new_sentinel() {
        let engine = MockEngine::new()
            .with_container("box", ContainerState::Stopped("exited".into()))
            .with_previous_boot_logs("container_setup_done\n")
            .with_log_chunks(&["+ setting up user\n", "container_setup_done\n"]);
        let result = wait_until_ready(&engine, "box", &fast(), &mut |_| {}, &never).unwrap();
        assert_eq!(result, Readiness::Started);
        assert_eq!(engine.starts(), 1);
        assert_eq!(engine.log_calls(), 2);

        // Entering again while the readiness file is still missing reads
        // only the current run, which already reported done.
        let result = wait_until_ready(&engine, "box", &fast(), &mut |_| {}, &never).unwrap();
        assert_eq!(result, Readiness::Started);
        assert_eq!(engine.starts(), 1);
    }

    #[test]
    fn readiness_file_counts_without_sentinel() {
        let engine = MockEngine::new()
            .with_container("box", ContainerState::Stopped("created".into()))
            .with_ready_file();
        let result = wait_until_ready(&engine, "box", &fast(), &mut |_| {}, &never).unwrap();
        assert_eq!(result, Readiness::Started);
    }

    #[test]
    fn exited_container_reports_last_error() {
        let engine = MockEngine::new()
            .with_container("box", ContainerState::Stopped("exited".into()))
            .with_log_chunks(&["Error: no supported package manager\n"])
            .exit_when_logs_drained();
        let err = wait_until_ready(&engine, "box", &fast(), &mut |_| {}, &never).unwrap_err();
        match err {
            RuntimeError::BootstrapFailed { name, detail } => {
                assert_eq!(name, "box");
                assert!(detail.contains("no supported package manager"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn silent_container_times_out() {
        let engine = MockEngine::new().with_container("box", ContainerState::Running);
        let options = GateOptions {
            poll_interval: Duration::from_millis(1),
            timeout: Duration::from_millis(20),
        };
        let err = wait_until_ready(&engine, "box", &options, &mut |_| {}, &never).unwrap_err();
        assert!(matches!(err, RuntimeError::BootstrapTimedOut { .. }));
        assert!(err.to_string().contains("bootstrap timed out"));
    }

    #[test]
    fn cancellation_stops_the_wait() {
        let engine = MockEngine::new().with_container("box", ContainerState::Running);
        let polls = Cell::new(0);
        let cancelled = || {
            polls.set(polls.get() + 1);
            polls.get() > 2
        };
        let err = wait_until_ready(&engine, "box", &fast(), &mut |_| {}, &cancelled).unwrap_err();
        assert!(matches!(err, RuntimeError::Cancelled));
        assert_eq!(err.exit_code(), 130);
    }

    #[test]
    fn missing_container_is_an_error() {
        let engine = MockEngine::new();
        let err = wait_until_ready(&engine, "ghost", &fast(), &mut |_| {}, &never).unwrap_err();
        assert!(matches!(err, RuntimeError::ContainerNotFound(_)));
    }

    #[test]
    fn partial_trailing_line_waits_for_newline() {
        let mut seen = 0;
        let scan = scan_new_lines("a\ncontainer_setup", &mut seen, &mut |_| {});
        assert!(!scan.ready);
        assert_eq!(seen, 1);
        let scan = scan_new_lines("a\ncontainer_setup_done\n", &mut seen, &mut |_| {});
        assert!(scan.ready);
        assert_eq!(seen, 2);
    }
}
