//! Process-wide loader state

use crate::barrier::{BarrierReport, DeferredInitBarrier};
use crate::host::HostEnvironment;
use asi_loader_core::{DiagnosticKind, DiagnosticSink, LoaderConfig, Result};
use asi_loader_patch::PatchDescriptor;
use asi_loader_plugin::{DiscoveryResult, LoadSummary, ModuleLoader, run_pass};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything the attach sequence, the worker and the barrier share.
///
/// Created once at attach and kept alive for the rest of the process.
pub struct LoaderContext {
    config: LoaderConfig,
    host: Arc<dyn HostEnvironment>,
    modules: Arc<dyn ModuleLoader>,
    sink: Arc<dyn DiagnosticSink>,
    published: Mutex<DiscoveryResult>,
    barrier: DeferredInitBarrier,
    patch: Mutex<Option<PatchDescriptor>>,
}

impl LoaderContext {
    pub fn new(
        config: LoaderConfig,
        host: Arc<dyn HostEnvironment>,
        modules: Arc<dyn ModuleLoader>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            config,
            host,
            modules,
            sink,
            published: Mutex::new(DiscoveryResult::new()),
            barrier: DeferredInitBarrier::new(),
            patch: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn host(&self) -> &dyn HostEnvironment {
        &*self.host
    }

    pub fn sink(&self) -> &dyn DiagnosticSink {
        &*self.sink
    }

    pub fn barrier(&self) -> &DeferredInitBarrier {
        &self.barrier
    }

    /// Directory plugins are discovered in
    pub fn plugin_dir(&self) -> Result<PathBuf> {
        Ok(self.host.host_dir()?.join(&self.config.plugins.directory))
    }

    /// Discover and load the plugins, publishing each one for the barrier.
    ///
    /// Terminates the process when the host directory cannot be determined.
    pub fn run_pass(&self) -> LoadSummary {
        let plugin_dir = match self.plugin_dir() {
            Ok(dir) => dir,
            Err(e) => {
                self.sink.report(DiagnosticKind::Fatal, &e.to_string(), e.code());
                self.host.terminate(1)
            }
        };
        run_pass(
            &plugin_dir,
            &self.config.plugins,
            &*self.modules,
            &*self.sink,
            |record| self.published.lock().push(record),
        )
    }

    /// Arrive at the deferred init barrier
    pub fn fire_barrier(&self) -> BarrierReport {
        self.barrier.fire(&self.published, &*self.sink)
    }

    /// File names of the plugins published so far
    pub fn loaded_plugins(&self) -> Vec<String> {
        self.published
            .lock()
            .filenames()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub(crate) fn set_patch(&self, descriptor: PatchDescriptor) {
        *self.patch.lock() = Some(descriptor);
    }

    /// The installed redirect, if patching was attempted
    pub fn patch(&self) -> Option<PatchDescriptor> {
        self.patch.lock().clone()
    }
}
