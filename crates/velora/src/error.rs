//! # Load Errors
//!
//! Failures reading or writing engine configuration and level definitions.
//! Errors raised by the core itself pass through as [`LoadError::Engine`].

use std::path::PathBuf;

use thiserror::Error;
use velora_core::EcsError;

/// Errors from configuration and definition files.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The file could not be read or written.
    #[error("failed to access {}: {source}", path.display())]
    Io {
        /// The file involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid TOML or does not match the expected shape.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The value could not be rendered as TOML.
    #[error("failed to write TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The document parsed but was rejected by the engine.
    #[error(transparent)]
    Engine(#[from] EcsError),
}

/// Result type for loading and saving.
pub type LoadResult<T> = Result<T, LoadError>;

impl LoadError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
