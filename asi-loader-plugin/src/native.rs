//! Native module backend built on `libloading`

use crate::traits::{Initializer, LoadedModule, ModuleLoader};
use asi_loader_core::{Error, Result};
use libloading::Library;
use std::path::Path;
use std::sync::Arc;

type InitAsiFn = unsafe extern "C" fn();

/// Maps plugin files with the platform's dynamic loader
/// (`LoadLibraryExW` on Windows, `dlopen` elsewhere)
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeModuleLoader;

impl ModuleLoader for NativeModuleLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn LoadedModule>> {
        // SAFETY: loading a plugin runs its static initializers. Plugins are
        // trusted code placed next to the host by the user.
        let library = unsafe { Library::new(path) }.map_err(|e| Error::PluginLoad {
            path: path.to_path_buf(),
            code: os_error_code(&e),
            message: e.to_string(),
        })?;
        Ok(Box::new(NativeModule {
            library: Arc::new(library),
        }))
    }
}

struct NativeModule {
    library: Arc<Library>,
}

impl LoadedModule for NativeModule {
    fn initializer(&self, symbol: &str) -> Option<Initializer> {
        // SAFETY: the exported initializer is agreed to be `void()` with the C ABI.
        let init: InitAsiFn = unsafe { *self.library.get::<InitAsiFn>(symbol.as_bytes()).ok()? };
        let library = self.library.clone();
        Some(Initializer::new(move || {
            // The closure owns a reference so the module stays mapped while callable
            let _mapped = &library;
            // SAFETY: see above; `library` keeps the code alive.
            unsafe { init() }
        }))
    }
}

/// Walk the error chain for the OS error the loader failed with
fn os_error_code(err: &libloading::Error) -> Option<i32> {
    let mut source: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(err);
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            return io.raw_os_error();
        }
        source = e.source();
    }
    None
}
