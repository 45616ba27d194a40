//! Configuration file and its resolution into immutable [`Settings`].
//!
//! Precedence, highest first: command line, `DBX_*` environment variables,
//! `distrobox.toml`, built-in defaults.

use crate::types::{ContainerName, ImageRef};
use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_IMAGE: &str = "registry.fedoraproject.org/fedora-toolbox:latest";
pub const DEFAULT_NAME: &str = "my-distrobox";
const DEFAULT_READINESS_TIMEOUT_SECS: u64 = 300;
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EngineChoice {
    #[default]
    Autodetect,
    Podman,
    Docker,
}

impl FromStr for EngineChoice {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "autodetect" | "" => Ok(Self::Autodetect),
            "podman" => Ok(Self::Podman),
            "docker" => Ok(Self::Docker),
            other => Err(SchemaError::UnknownEngine(other.to_owned())),
        }
    }
}

impl fmt::Display for EngineChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Autodetect => "autodetect",
            Self::Podman => "podman",
            Self::Docker => "docker",
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub engine: Option<EngineChoice>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub create: CreateSection,
    #[serde(default)]
    pub enter: EnterSection,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CreateSection {
    #[serde(default)]
    pub additional_flags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EnterSection {
    #[serde(default)]
    pub readiness_timeout_secs: Option<u64>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub extra_env_exclusions: Vec<String>,
}

impl ConfigFile {
    pub fn parse(input: &str) -> Result<Self, SchemaError> {
        Ok(toml::from_str(input)?)
    }

    /// Load `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn load_default() -> Result<Self, SchemaError> {
        match default_config_path(|key| std::env::var(key).ok()) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }
}

/// `$XDG_CONFIG_HOME/distrobox/distrobox.toml`, else `~/.config/...`.
pub fn default_config_path(getenv: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    let base = getenv("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| getenv("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(base.join("distrobox/distrobox.toml"))
}

/// Values given on the command line; `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub engine: Option<EngineChoice>,
    pub image: Option<String>,
    pub name: Option<String>,
    pub additional_flags: Vec<String>,
}

/// Fully resolved configuration for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub engine: EngineChoice,
    pub image: ImageRef,
    pub name: ContainerName,
    pub additional_flags: Vec<String>,
    pub readiness_timeout: Duration,
    pub poll_interval: Duration,
    pub env_exclusions: Vec<String>,
}

impl Settings {
    pub fn resolve(
        file: ConfigFile,
        getenv: impl Fn(&str) -> Option<String>,
        cli: Overrides,
    ) -> Result<Self, SchemaError> {
        let engine = match (cli.engine, getenv("DBX_CONTAINER_MANAGER")) {
            (Some(engine), _) => engine,
            (None, Some(env)) => env.parse()?,
            (None, None) => file.engine.unwrap_or_default(),
        };

        let image = cli
            .image
            .or_else(|| getenv("DBX_CONTAINER_IMAGE"))
            .or(file.image)
            .unwrap_or_else(|| DEFAULT_IMAGE.to_owned());

        let name = cli
            .name
            .or_else(|| getenv("DBX_CONTAINER_NAME"))
            .or(file.name)
            .unwrap_or_else(|| DEFAULT_NAME.to_owned());

        let readiness_secs = match getenv("DBX_READINESS_TIMEOUT") {
            Some(raw) => raw.parse().map_err(|_| SchemaError::InvalidValue {
                key: "DBX_READINESS_TIMEOUT",
                value: raw,
            })?,
            None => file
                .enter
                .readiness_timeout_secs
                .unwrap_or(DEFAULT_READINESS_TIMEOUT_SECS),
        };
        if readiness_secs == 0 {
            return Err(SchemaError::InvalidValue {
                key: "readiness_timeout_secs",
                value: "0".to_owned(),
            });
        }

        let mut additional_flags = file.create.additional_flags;
        additional_flags.extend(cli.additional_flags);

        Ok(Self {
            engine,
            image: ImageRef::new(image)?,
            name: ContainerName::new(name)?,
            additional_flags,
            readiness_timeout: Duration::from_secs(readiness_secs),
            poll_interval: Duration::from_millis(
                file.enter
                    .poll_interval_ms
                    .unwrap_or(DEFAULT_POLL_INTERVAL_MS)
                    .max(50),
            ),
            env_exclusions: file.enter.extra_env_exclusions,
        })
    }
}
