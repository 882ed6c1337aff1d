//! ASI Loader Core Library
//!
//! Shared building blocks for the loader crates: the error type, the
//! configuration model and the diagnostic sink every component reports to.

pub mod config;
pub mod diagnostics;
pub mod error;

pub use config::{ConfigLoader, LoaderConfig};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};
pub use error::{Error, Result};

/// ASI loader version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
