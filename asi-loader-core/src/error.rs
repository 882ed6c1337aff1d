//! Error types for the ASI loader

use std::path::PathBuf;
use thiserror::Error;

/// Result type for loader operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the ASI loader
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The host executable could not be identified, so there is nowhere to
    /// look for plugins.
    #[error("Cannot determine host executable: {message}")]
    HostIdentity {
        message: String,
        code: Option<i32>,
    },

    /// A single plugin failed to load
    #[error("Cannot load plugin {}: {message}", path.display())]
    PluginLoad {
        path: PathBuf,
        message: String,
        code: Option<i32>,
    },

    /// The host call site could not be redirected
    #[error("Patch error: {message}")]
    Patch {
        message: String,
        code: Option<i32>,
    },
}

impl Error {
    /// Platform error code attached to this error, if any
    pub fn code(&self) -> Option<i32> {
        match self {
            Error::Io(e) => e.raw_os_error(),
            Error::HostIdentity { code, .. } | Error::PluginLoad { code, .. } | Error::Patch { code, .. } => *code,
            Error::Config(_) => None,
        }
    }
}
