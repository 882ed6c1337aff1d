//! Loader configuration

mod loader;
mod types;

pub use loader::{ConfigLoader, CONFIG_ENV, CONFIG_FILE_NAME};
pub use types::*;
