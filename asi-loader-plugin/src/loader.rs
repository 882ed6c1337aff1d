//! Plugin loader

use crate::registry::{DiscoveryResult, PluginRecord};
use crate::traits::ModuleLoader;
use asi_loader_core::{DiagnosticKind, DiagnosticSink};
use std::path::Path;

/// Outcome counters of a load pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Files a load was attempted for
    pub attempted: usize,
    /// Files that loaded
    pub loaded: usize,
    /// Files that failed to load
    pub failed: usize,
    /// Loaded files exporting an initializer
    pub initializers: usize,
}

/// Loads discovered plugin files one at a time
pub struct PluginLoader<'a> {
    modules: &'a dyn ModuleLoader,
    sink: &'a dyn DiagnosticSink,
    init_symbol: &'a str,
}

impl<'a> PluginLoader<'a> {
    /// Create a loader resolving initializers exported as `init_symbol`
    pub fn new(modules: &'a dyn ModuleLoader, sink: &'a dyn DiagnosticSink, init_symbol: &'a str) -> Self {
        Self {
            modules,
            sink,
            init_symbol,
        }
    }

    /// Load `names` from `dir` strictly in order, handing each loaded plugin to
    /// `publish` as soon as it is ready.
    ///
    /// A file that fails to load is reported and skipped.
    pub fn load_each<F>(&self, dir: &Path, names: &[String], mut publish: F) -> LoadSummary
    where
        F: FnMut(PluginRecord),
    {
        let mut summary = LoadSummary::default();

        for name in names {
            let path = dir.join(name);
            summary.attempted += 1;

            let module = match self.modules.load(&path) {
                Ok(module) => module,
                Err(e) => {
                    summary.failed += 1;
                    self.sink.report(DiagnosticKind::PluginLoad, &e.to_string(), e.code());
                    continue;
                }
            };

            let init = module.initializer(self.init_symbol);
            summary.loaded += 1;
            if init.is_some() {
                summary.initializers += 1;
                tracing::info!(plugin = %name, "🔌 Loaded plugin");
            } else {
                tracing::debug!(plugin = %name, symbol = %self.init_symbol, "Loaded plugin without initializer");
            }

            publish(PluginRecord {
                filename: name.clone(),
                path,
                module,
                init,
            });
        }

        summary
    }

    /// Load `names` from `dir` into a fresh [`DiscoveryResult`]
    pub fn load_all(&self, dir: &Path, names: &[String]) -> (DiscoveryResult, LoadSummary) {
        let mut result = DiscoveryResult::new();
        let summary = self.load_each(dir, names, |record| result.push(record));
        (result, summary)
    }
}
