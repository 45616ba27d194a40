//! Newtype wrappers for engine-level string identifiers.
//!
//! Both newtypes serialize/deserialize as plain strings.

use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

string_newtype!(
    /// Unique engine-level container name, also used as the container hostname.
    ContainerName
);

string_newtype!(
    /// Image reference as understood by the engine (`registry/repo:tag`).
    ImageRef
);

impl ContainerName {
    pub fn new(name: impl Into<String>) -> Result<Self, SchemaError> {
        let name = name.into();
        if is_valid_container_name(&name) {
            Ok(Self(name))
        } else {
            Err(SchemaError::InvalidContainerName(name))
        }
    }
}

impl ImageRef {
    pub fn new(image: impl Into<String>) -> Result<Self, SchemaError> {
        let image = image.into();
        if image.trim().is_empty() {
            return Err(SchemaError::EmptyField("image"));
        }
        Ok(Self(image))
    }
}

fn is_valid_container_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}
