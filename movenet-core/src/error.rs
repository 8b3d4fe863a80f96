//! Error types for movenet-core.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal configuration problems, discovered before any variant starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting was not provided.
    #[error("missing required setting {name}")]
    Missing { name: &'static str },

    /// A setting was provided but cannot be used.
    #[error("invalid value for {name} ({value:?}): {reason}")]
    Invalid {
        name: String,
        value: String,
        reason: String,
    },

    /// The variants file could not be parsed; includes path and line context.
    #[error("failed to parse variants file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The variants file could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub(crate) fn invalid(
    name: impl Into<String>,
    value: impl Into<String>,
    reason: impl Into<String>,
) -> ConfigError {
    ConfigError::Invalid {
        name: name.into(),
        value: value.into(),
        reason: reason.into(),
    }
}
