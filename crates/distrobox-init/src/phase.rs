use crate::InitError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    DependenciesChecked,
    UserReconciled,
    MountsApplied,
    SudoConfigured,
    Ready,
}

impl Phase {
    pub fn next(self) -> Option<Self> {
        match self {
            Self::NotStarted => Some(Self::DependenciesChecked),
            Self::DependenciesChecked => Some(Self::UserReconciled),
            Self::UserReconciled => Some(Self::MountsApplied),
            Self::MountsApplied => Some(Self::SudoConfigured),
            Self::SudoConfigured => Some(Self::Ready),
            Self::Ready => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not-started",
            Self::DependenciesChecked => "dependencies-checked",
            Self::UserReconciled => "user-reconciled",
            Self::MountsApplied => "mounts-applied",
            Self::SudoConfigured => "sudo-configured",
            Self::Ready => "ready",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Only the immediate successor is reachable, plus a restart from any phase.
pub fn validate_transition(from: Phase, to: Phase) -> Result<(), InitError> {
    if to == Phase::NotStarted || from.next() == Some(to) {
        Ok(())
    } else {
        Err(InitError::InvalidTransition { from, to })
    }
}
