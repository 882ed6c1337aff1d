//! The discovery + load pass

use crate::discovery::{ExtensionFilter, PluginDiscoverer};
use crate::loader::{LoadSummary, PluginLoader};
use crate::registry::PluginRecord;
use crate::traits::ModuleLoader;
use asi_loader_core::DiagnosticSink;
use asi_loader_core::config::PluginsConfig;
use std::path::Path;

/// Discover the plugins in `plugin_dir` and load them in order.
///
/// Holds no state of its own, so the same pass can run on a worker thread or
/// inline on the caller's thread. Each loaded plugin is handed to `publish`.
pub fn run_pass<F>(
    plugin_dir: &Path,
    config: &PluginsConfig,
    modules: &dyn ModuleLoader,
    sink: &dyn DiagnosticSink,
    publish: F,
) -> LoadSummary
where
    F: FnMut(PluginRecord),
{
    let discoverer = PluginDiscoverer::new(ExtensionFilter::new(config.extension.as_str()));
    let names = discoverer.discover(plugin_dir);

    let loader = PluginLoader::new(modules, sink, &config.init_symbol);
    let summary = loader.load_each(plugin_dir, &names, publish);

    tracing::info!(
        dir = %plugin_dir.display(),
        attempted = summary.attempted,
        loaded = summary.loaded,
        failed = summary.failed,
        initializers = summary.initializers,
        "Plugin pass finished"
    );
    summary
}
