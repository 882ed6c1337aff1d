//! ASI Loader Plugin System
//!
//! Finds plugin modules next to the host executable, loads them one at a
//! time in a fixed order and collects their optional initializers.

mod discovery;
mod loader;
mod native;
mod pass;
mod registry;
#[cfg(any(test, feature = "testing"))]
mod static_modules;
mod traits;

pub use discovery::{Candidate, ExtensionFilter, PluginDiscoverer};
pub use loader::{LoadSummary, PluginLoader};
pub use native::NativeModuleLoader;
pub use pass::run_pass;
pub use registry::{DiscoveryResult, PluginRecord};
#[cfg(any(test, feature = "testing"))]
pub use static_modules::StaticModuleLoader;
pub use traits::{Initializer, LoadedModule, ModuleLoader};
