//! In-process module table
//!
//! [`StaticModuleLoader`] resolves plugin files against a table registered in
//! process instead of mapping them from disk, so the loader can be exercised
//! without real dynamic libraries. Only built for tests and with the
//! `testing` feature.

use crate::traits::{Initializer, LoadedModule, ModuleLoader};
use asi_loader_core::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;

enum Entry {
    Module(HashMap<String, Initializer>),
    Failure { message: String, code: Option<i32> },
}

/// Table-driven [`ModuleLoader`] keyed by file name
#[derive(Default)]
pub struct StaticModuleLoader {
    entries: HashMap<String, Entry>,
    attempts: Mutex<Vec<String>>,
}

impl StaticModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module without exports
    pub fn with_module(mut self, filename: impl Into<String>) -> Self {
        self.entries.insert(filename.into(), Entry::Module(HashMap::new()));
        self
    }

    /// Register a module exporting `call` as `symbol`
    pub fn with_initializer<F>(mut self, filename: impl Into<String>, symbol: impl Into<String>, call: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let entry = self
            .entries
            .entry(filename.into())
            .or_insert_with(|| Entry::Module(HashMap::new()));
        if let Entry::Failure { .. } = entry {
            *entry = Entry::Module(HashMap::new());
        }
        if let Entry::Module(exports) = entry {
            exports.insert(symbol.into(), Initializer::new(call));
        }
        self
    }

    /// Register a file whose load fails with `message` and `code`
    pub fn with_failure(mut self, filename: impl Into<String>, message: impl Into<String>, code: Option<i32>) -> Self {
        self.entries.insert(
            filename.into(),
            Entry::Failure {
                message: message.into(),
                code,
            },
        );
        self
    }

    /// File names loads were attempted for, in attempt order
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().clone()
    }
}

struct StaticModule {
    exports: HashMap<String, Initializer>,
}

impl LoadedModule for StaticModule {
    fn initializer(&self, symbol: &str) -> Option<Initializer> {
        self.exports.get(symbol).cloned()
    }
}

impl ModuleLoader for StaticModuleLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn LoadedModule>> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.attempts.lock().push(filename.clone());

        match self.entries.get(&filename) {
            Some(Entry::Module(exports)) => Ok(Box::new(StaticModule {
                exports: exports.clone(),
            })),
            Some(Entry::Failure { message, code }) => Err(Error::PluginLoad {
                path: path.to_path_buf(),
                message: message.clone(),
                code: *code,
            }),
            None => Err(Error::PluginLoad {
                path: path.to_path_buf(),
                message: "no statically linked module with this name".to_string(),
                code: None,
            }),
        }
    }
}
