//! Loaded plugin records

use crate::traits::{Initializer, LoadedModule};
use std::fmt;
use std::path::PathBuf;

/// A successfully loaded plugin. Kept for the rest of the process lifetime.
pub struct PluginRecord {
    /// File name inside the plugin directory
    pub filename: String,
    /// Full path the module was loaded from
    pub path: PathBuf,
    /// Handle keeping the module mapped
    pub module: Box<dyn LoadedModule>,
    /// Exported initializer, if the plugin has one
    pub init: Option<Initializer>,
}

impl fmt::Debug for PluginRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRecord")
            .field("filename", &self.filename)
            .field("path", &self.path)
            .field("init", &self.init.is_some())
            .finish()
    }
}

/// Plugins in discovery order
#[derive(Debug, Default)]
pub struct DiscoveryResult {
    records: Vec<PluginRecord>,
}

impl DiscoveryResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record. Records must be pushed in discovery order.
    pub fn push(&mut self, record: PluginRecord) {
        self.records.push(record);
    }

    /// File names of the loaded plugins
    pub fn filenames(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.filename.as_str()).collect()
    }

    /// Initializers in discovery order, skipping plugins without one
    pub fn initializers(&self) -> Vec<Initializer> {
        self.records.iter().filter_map(|r| r.init.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
