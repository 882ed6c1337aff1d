//! Plugin traits

use asi_loader_core::Result;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// A plugin's zero-argument initializer
#[derive(Clone)]
pub struct Initializer {
    call: Arc<dyn Fn() + Send + Sync>,
}

impl Initializer {
    /// Wrap a callable as an initializer
    pub fn new<F>(call: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self { call: Arc::new(call) }
    }

    /// Run the initializer on the calling thread
    pub fn invoke(&self) {
        (self.call)()
    }
}

impl fmt::Debug for Initializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Initializer").finish_non_exhaustive()
    }
}

/// A module that has been mapped into the process
pub trait LoadedModule: Send + Sync {
    /// Look up the initializer exported under `symbol`
    fn initializer(&self, symbol: &str) -> Option<Initializer>;
}

/// Backend that maps module files into the process
pub trait ModuleLoader: Send + Sync {
    /// Load the module at `path`. Failures are reported as
    /// [`asi_loader_core::Error::PluginLoad`].
    fn load(&self, path: &Path) -> Result<Box<dyn LoadedModule>>;
}
