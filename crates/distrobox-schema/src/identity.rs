use crate::types::{ContainerName, ImageRef};
use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The host user that a distrobox is created for and reconciled to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserIdentity {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
    pub shell: PathBuf,
}

impl UserIdentity {
    pub fn new(
        name: impl Into<String>,
        uid: u32,
        gid: u32,
        home: impl Into<PathBuf>,
        shell: impl Into<PathBuf>,
    ) -> Result<Self, SchemaError> {
        let user = Self {
            name: name.into(),
            uid,
            gid,
            home: home.into(),
            shell: shell.into(),
        };
        user.validate()?;
        Ok(user)
    }

    /// Identity of the invoking user, from the process credentials and the
    /// `USER`, `HOME` and `SHELL` variables.
    pub fn from_host() -> Result<Self, SchemaError> {
        Self::from_env(current_uid(), current_gid(), |key| std::env::var(key).ok())
    }

    pub fn from_env(
        uid: u32,
        gid: u32,
        getenv: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SchemaError> {
        let name = getenv("USER")
            .or_else(|| getenv("LOGNAME"))
            .ok_or(SchemaError::MissingEnv("USER"))?;
        let home = getenv("HOME").ok_or(SchemaError::MissingEnv("HOME"))?;
        let shell = getenv("SHELL").unwrap_or_else(|| "/bin/bash".to_owned());
        Self::new(name, uid, gid, home, shell)
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.name.trim().is_empty() {
            return Err(SchemaError::EmptyField("user.name"));
        }
        if self.home.as_os_str().is_empty() {
            return Err(SchemaError::EmptyField("user.home"));
        }
        if self.shell.as_os_str().is_empty() {
            return Err(SchemaError::EmptyField("user.shell"));
        }
        Ok(())
    }

    /// Base name of the login shell, e.g. `bash` for `/usr/bin/bash`.
    pub fn shell_name(&self) -> &str {
        self.shell
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("sh")
    }

    pub fn home(&self) -> &Path {
        &self.home
    }
}

/// Everything the engine needs to know to create one distrobox.
///
/// Built once at creation time from the host identity and never changed
/// for the lifetime of the container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerIdentity {
    pub name: ContainerName,
    pub image: ImageRef,
    pub user: UserIdentity,
}

impl ContainerIdentity {
    pub fn new(
        name: ContainerName,
        image: ImageRef,
        user: UserIdentity,
    ) -> Result<Self, SchemaError> {
        user.validate()?;
        Ok(Self { name, image, user })
    }
}

/// Safe wrapper around libc::getuid().
#[allow(unsafe_code)]
pub fn current_uid() -> u32 {
    // SAFETY: getuid() takes no arguments and cannot fail.
    unsafe { libc::getuid() }
}

/// Safe wrapper around libc::getgid().
#[allow(unsafe_code)]
pub fn current_gid() -> u32 {
    // SAFETY: getgid() takes no arguments and cannot fail.
    unsafe { libc::getgid() }
}
