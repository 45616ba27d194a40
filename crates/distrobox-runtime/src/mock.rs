use crate::command::EngineCommand;
use crate::engine::{ContainerEngine, ContainerState, ContainerSummary, EngineKind};
use crate::RuntimeError;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Scripted engine for tests.
///
/// Each call to `logs_since` releases the next queued log chunk, so a test
/// can describe a bootstrap that progresses poll by poll. Output from an
/// earlier run is only visible to callers that ask for the full history.
#[derive(Default)]
pub struct MockEngine {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    containers: BTreeMap<String, ContainerState>,
    images: Vec<String>,
    pending_logs: VecDeque<String>,
    previous_boot: String,
    logs: String,
    started_at: Option<String>,
    ready_file: bool,
    exit_when_drained: bool,
    starts: u32,
    log_calls: u32,
    created: Vec<EngineCommand>,
    executed: Vec<EngineCommand>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MockState>, RuntimeError> {
        self.state.lock().map_err(|e| RuntimeError::EngineFailed {
            action: "mock".to_owned(),
            message: format!("mutex poisoned: {e}"),
        })
    }

    #[must_use]
    pub fn with_container(self, name: &str, state: ContainerState) -> Self {
        if let Ok(mut s) = self.state.lock() {
            s.containers.insert(name.to_owned(), state);
        }
        self
    }

    #[must_use]
    pub fn with_image(self, image: &str) -> Self {
        if let Ok(mut s) = self.state.lock() {
            s.images.push(image.to_owned());
        }
        self
    }

    /// Queue log chunks released one per poll.
    #[must_use]
    pub fn with_log_chunks(self, chunks: &[&str]) -> Self {
        if let Ok(mut s) = self.state.lock() {
            s.pending_logs
                .extend(chunks.iter().map(|c| (*c).to_owned()));
        }
        self
    }

    /// Log output left behind by an earlier run of the container.
    #[must_use]
    pub fn with_previous_boot_logs(self, text: &str) -> Self {
        if let Ok(mut s) = self.state.lock() {
            s.previous_boot.push_str(text);
        }
        self
    }

    #[must_use]
    pub fn with_start_time(self, timestamp: &str) -> Self {
        if let Ok(mut s) = self.state.lock() {
            s.started_at = Some(timestamp.to_owned());
        }
        self
    }

    #[must_use]
    pub fn with_ready_file(self) -> Self {
        if let Ok(mut s) = self.state.lock() {
            s.ready_file = true;
        }
        self
    }

    /// Stop every container once all queued log chunks have been released.
    #[must_use]
    pub fn exit_when_logs_drained(self) -> Self {
        if let Ok(mut s) = self.state.lock() {
            s.exit_when_drained = true;
        }
        self
    }

    pub fn starts(&self) -> u32 {
        self.state.lock().map(|s| s.starts).unwrap_or(0)
    }

    pub fn log_calls(&self) -> u32 {
        self.state.lock().map(|s| s.log_calls).unwrap_or(0)
    }

    pub fn created(&self) -> Vec<EngineCommand> {
        self.state
            .lock()
            .map(|s| s.created.clone())
            .unwrap_or_default()
    }

    pub fn executed(&self) -> Vec<EngineCommand> {
        self.state
            .lock()
            .map(|s| s.executed.clone())
            .unwrap_or_default()
    }
}

impl ContainerEngine for MockEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Podman
    }

    fn state(&self, name: &str) -> Result<ContainerState, RuntimeError> {
        Ok(self
            .lock()?
            .containers
            .get(name)
            .cloned()
            .unwrap_or(ContainerState::Missing))
    }

    fn start(&self, name: &str) -> Result<(), RuntimeError> {
        let mut s = self.lock()?;
        match s.containers.get_mut(name) {
            Some(state) => {
                *state = ContainerState::Running;
                s.starts += 1;
                s.started_at = Some("2026-01-01T00:00:00Z".to_owned());
                Ok(())
            }
            None => Err(RuntimeError::ContainerNotFound(name.to_owned())),
        }
    }

    fn started_at(&self, name: &str) -> Result<Option<String>, RuntimeError> {
        let s = self.lock()?;
        let running = s
            .containers
            .get(name)
            .is_some_and(ContainerState::is_running);
        Ok(s.started_at.clone().filter(|_| running))
    }

    fn logs_since(&self, _name: &str, since: Option<&str>) -> Result<String, RuntimeError> {
        let mut s = self.lock()?;
        s.log_calls += 1;
        if let Some(chunk) = s.pending_logs.pop_front() {
            s.logs.push_str(&chunk);
        } else if s.exit_when_drained {
            for state in s.containers.values_mut() {
                *state = ContainerState::Stopped("exited".to_owned());
            }
        }
        if since.is_some() {
            Ok(s.logs.clone())
        } else {
            Ok(format!("{}{}", s.previous_boot, s.logs))
        }
    }

    fn file_exists(&self, name: &str, _path: &str) -> Result<bool, RuntimeError> {
        let s = self.lock()?;
        let running = s
            .containers
            .get(name)
            .is_some_and(ContainerState::is_running);
        Ok(running && s.ready_file)
    }

    fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        Ok(self.lock()?.images.iter().any(|i| i == image))
    }

    fn pull(&self, image: &str) -> Result<(), RuntimeError> {
        self.lock()?.images.push(image.to_owned());
        Ok(())
    }

    fn create(&self, command: &EngineCommand) -> Result<(), RuntimeError> {
        let mut s = self.lock()?;
        let name = command
            .position("--name")
            .and_then(|i| command.args.get(i + 1))
            .cloned()
            .ok_or_else(|| RuntimeError::EngineFailed {
                action: "create".to_owned(),
                message: "missing --name".to_owned(),
            })?;
        if s.containers.contains_key(&name) {
            return Err(RuntimeError::ContainerExists(name));
        }
        s.containers
            .insert(name, ContainerState::Stopped("created".to_owned()));
        s.created.push(command.clone());
        Ok(())
    }

    fn run_interactive(&self, command: &EngineCommand) -> Result<i32, RuntimeError> {
        self.lock()?.executed.push(command.clone());
        Ok(0)
    }

    fn list(&self) -> Result<Vec<ContainerSummary>, RuntimeError> {
        Ok(self
            .lock()?
            .containers
            .iter()
            .map(|(name, state)| ContainerSummary {
                id: format!("mock-{name}"),
                name: name.clone(),
                status: match state {
                    ContainerState::Running => "running".to_owned(),
                    ContainerState::Stopped(s) => s.clone(),
                    ContainerState::Missing => "missing".to_owned(),
                },
                image: "mock".to_owned(),
            })
            .collect())
    }

    fn stop(&self, name: &str) -> Result<(), RuntimeError> {
        let mut s = self.lock()?;
        match s.containers.get_mut(name) {
            Some(state) => {
                *state = ContainerState::Stopped("exited".to_owned());
                Ok(())
            }
            None => Err(RuntimeError::ContainerNotFound(name.to_owned())),
        }
    }

    fn remove(&self, name: &str, force: bool) -> Result<(), RuntimeError> {
        let mut s = self.lock()?;
        let running = match s.containers.get(name) {
            None => return Err(RuntimeError::ContainerNotFound(name.to_owned())),
            Some(state) => state.is_running(),
        };
        if running && !force {
            return Err(RuntimeError::EngineFailed {
                action: format!("rm {name}"),
                message: "container is running".to_owned(),
            });
        }
        s.containers.remove(name);
        Ok(())
    }
}
