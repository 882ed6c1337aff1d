//! Assembling the loader inside the process it attaches to

use crate::barrier::BarrierReport;
use crate::context::LoaderContext;
use crate::host::HostEnvironment;
use crate::logging;
use asi_loader_core::{ConfigLoader, DiagnosticKind, DiagnosticSink, LoaderConfig};
use asi_loader_plugin::ModuleLoader;
use std::sync::{Arc, OnceLock};

/// Build the loader context for `host`.
///
/// The config is looked up next to the host executable. A config that cannot
/// be read or validated is reported as degraded and the defaults are used.
/// A log file that cannot be opened is reported the same way.
pub fn build_context(
    host: Arc<dyn HostEnvironment>,
    modules: Arc<dyn ModuleLoader>,
    sink: Arc<dyn DiagnosticSink>,
) -> LoaderContext {
    let host_dir = host.host_dir().ok();

    let (config, config_error) = match host_dir.as_deref().map(ConfigLoader::locate) {
        Some(Ok(config)) => (config, None),
        Some(Err(e)) => (LoaderConfig::default(), Some(e)),
        // Reported as fatal once the plugin pass needs the directory
        None => (LoaderConfig::default(), None),
    };

    if let Err(e) = logging::init_logging(&config.logging, host_dir.as_deref()) {
        sink.report(DiagnosticKind::Degraded, &format!("Cannot set up logging: {}", e), e.code());
    }
    if let Some(e) = config_error {
        sink.report(
            DiagnosticKind::Degraded,
            &format!("Invalid loader config, using defaults: {}", e),
            e.code(),
        );
    }

    LoaderContext::new(config, host, modules, sink)
}

/// Process-wide home of the attached loader
#[derive(Default)]
pub struct LoaderSlot {
    context: OnceLock<Arc<LoaderContext>>,
}

impl LoaderSlot {
    pub const fn new() -> Self {
        Self {
            context: OnceLock::new(),
        }
    }

    /// Install `ctx`. Returns false when a loader is already installed.
    pub fn install(&self, ctx: Arc<LoaderContext>) -> bool {
        self.context.set(ctx).is_ok()
    }

    pub fn get(&self) -> Option<&Arc<LoaderContext>> {
        self.context.get()
    }

    /// Arrive at the installed loader's barrier
    pub fn fire(&self) -> Option<BarrierReport> {
        match self.context.get() {
            Some(ctx) => Some(ctx.fire_barrier()),
            None => {
                tracing::warn!("Deferred init reached before the loader attached");
                None
            }
        }
    }
}
