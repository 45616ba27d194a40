//! Data model shared by every distrobox component.
//!
//! This crate defines what a distrobox *is*: the container and user identity
//! (`ContainerIdentity`), the versioned mount tables that make up the host
//! integration surface (`MountSpec`), the well-known marker paths and strings
//! that the entrypoint, the entering side and the export generator agree on,
//! and the configuration file plus its resolution into immutable `Settings`.

pub mod config;
pub mod identity;
pub mod mounts;
pub mod paths;
pub mod quote;
pub mod types;

pub use config::{ConfigFile, CreateSection, EngineChoice, EnterSection, Overrides, Settings};
pub use identity::{ContainerIdentity, UserIdentity};
pub use mounts::{
    engine_mounts, host_readonly_mounts, host_readwrite_mounts, theme_mounts, MountMode,
    MountSpec, Optionality, MOUNT_TABLE_VERSION,
};
pub use paths::{find_executable, is_inside_container, rooted};
pub use quote::shell_quote;
pub use types::{ContainerName, ImageRef};

use thiserror::Error;

/// Files whose presence means "this process runs inside a container".
pub const CONTAINER_MARKERS: &[&str] = &["/run/.containerenv", "/.dockerenv"];

/// Line printed by the entrypoint once setup has finished.
pub const READINESS_SENTINEL: &str = "container_setup_done";

/// Written by the entrypoint right before the sentinel; removed when it starts.
pub const READINESS_FILE: &str = "/run/.distrobox-setup-done";

/// Comment embedded in every generated wrapper script.
pub const EXPORT_MARKER: &str = "# distrobox_binary";

/// Where the host root filesystem is visible inside the container.
pub const HOST_PREFIX: &str = "/run/host";

/// In-container location of the bootstrap entrypoint.
pub const INIT_PATH: &str = "/usr/bin/distrobox-init";

/// In-container location of the export generator.
pub const EXPORT_PATH: &str = "/usr/bin/distrobox-export";

/// Label attached to every container created by distrobox.
pub const MANAGER_LABEL: &str = "manager=distrobox";

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("invalid container name '{0}': expected [a-zA-Z0-9][a-zA-Z0-9_.-]*")]
    InvalidContainerName(String),
    #[error("unknown container engine '{0}', expected podman, docker or autodetect")]
    UnknownEngine(String),
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),
}
