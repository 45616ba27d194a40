use crate::packages::PackageManager;
use crate::system::{CommandOutput, System};
use crate::InitError;
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Records every command instead of running it.
///
/// Command presence is simulated from a fixed set. Commands listed with
/// [`installing`](Self::installing) appear once any package manager has run.
#[derive(Default)]
pub struct RecordingSystem {
    available: Mutex<BTreeSet<String>>,
    failing: BTreeSet<String>,
    missing: BTreeSet<String>,
    installs: Vec<String>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl RecordingSystem {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_commands(self, names: &[&str]) -> Self {
        lock(&self.available).extend(names.iter().map(|n| (*n).to_owned()));
        self
    }

    /// Every invocation of `program` exits non-zero.
    #[must_use]
    pub fn failing(mut self, program: &str) -> Self {
        self.failing.insert(program.to_owned());
        self
    }

    /// Every invocation of `program` fails to spawn.
    #[must_use]
    pub fn missing(mut self, program: &str) -> Self {
        self.missing.insert(program.to_owned());
        self
    }

    #[must_use]
    pub fn installing(mut self, names: &[&str]) -> Self {
        self.installs.extend(names.iter().map(|n| (*n).to_owned()));
        self
    }

    /// Every recorded invocation, program first.
    pub fn calls(&self) -> Vec<Vec<String>> {
        lock(&self.calls).clone()
    }

    /// Recorded invocations of `program`.
    pub fn calls_to(&self, program: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|call| call.first().is_some_and(|p| p == program))
            .collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl System for RecordingSystem {
    fn command_exists(&self, name: &str) -> bool {
        lock(&self.available).contains(name)
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, InitError> {
        let mut call = vec![program.to_owned()];
        call.extend(args.iter().map(|a| (*a).to_owned()));
        lock(&self.calls).push(call);

        if self.missing.contains(program) {
            return Err(InitError::CommandFailed {
                command: program.to_owned(),
                message: "No such file or directory (os error 2)".to_owned(),
            });
        }
        if self.failing.contains(program) {
            return Ok(CommandOutput {
                success: false,
                stderr: format!("{program}: simulated failure"),
            });
        }
        if PackageManager::PRIORITY
            .iter()
            .any(|pm| pm.program() == program)
        {
            lock(&self.available).extend(self.installs.iter().cloned());
        }
        Ok(CommandOutput {
            success: true,
            stderr: String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_calls_in_order() {
        let system = RecordingSystem::new();
        system.run("mount", &["--rbind", "/a", "/b"]).unwrap();
        system.run("passwd", &["-d", "root"]).unwrap();
        assert_eq!(system.calls().len(), 2);
        assert_eq!(system.calls_to("passwd"), vec![vec!["passwd", "-d", "root"]]);
    }

    #[test]
    fn package_manager_run_provides_commands() {
        let system = RecordingSystem::new()
            .with_commands(&["apk"])
            .installing(&["sudo"]);
        assert!(!system.command_exists("sudo"));
        system.run("apk", &["add", "sudo"]).unwrap();
        assert!(system.command_exists("sudo"));
    }
}
