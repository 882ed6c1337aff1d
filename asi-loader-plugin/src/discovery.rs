//! Plugin discovery

use std::collections::BTreeSet;
use std::path::Path;

/// Exact `*.<ext>` match on file names, ASCII case-insensitive.
///
/// Directory enumeration APIs can over-match wildcard patterns (`*.asi` also
/// returning `x.asi2` through short-name aliases), so every candidate is
/// checked against this filter regardless of how it was enumerated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionFilter {
    extension: String,
}

impl ExtensionFilter {
    /// Create a filter for `extension` (without the leading dot)
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }

    /// The filter as a wildcard pattern
    pub fn pattern(&self) -> String {
        format!("*.{}", self.extension)
    }

    /// Whether `name` ends in `.<extension>`
    pub fn matches(&self, name: &str) -> bool {
        let name = name.as_bytes();
        let ext = self.extension.as_bytes();
        if name.len() <= ext.len() {
            return false;
        }
        let split = name.len() - ext.len();
        name[split - 1] == b'.' && name[split..].eq_ignore_ascii_case(ext)
    }
}

/// A directory entry as seen by enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    pub is_dir: bool,
}

impl Candidate {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
        }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
        }
    }
}

/// Case-insensitive ordering with an ordinal tie break, so names that only
/// differ in case are both kept in a stable order.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct OrderKey {
    folded: String,
    name: String,
}

impl OrderKey {
    fn new(name: String) -> Self {
        Self {
            folded: name.to_lowercase(),
            name,
        }
    }
}

/// Enumerates a plugin directory
#[derive(Debug, Clone)]
pub struct PluginDiscoverer {
    filter: ExtensionFilter,
}

impl PluginDiscoverer {
    /// Create a discoverer using `filter`
    pub fn new(filter: ExtensionFilter) -> Self {
        Self { filter }
    }

    pub fn filter(&self) -> &ExtensionFilter {
        &self.filter
    }

    /// List the plugin files directly inside `dir` in load order.
    ///
    /// A missing or unreadable directory yields no plugins.
    pub fn discover(&self, dir: &Path) -> Vec<String> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(dir = %dir.display(), "Plugin directory does not exist");
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!(dir = %dir.display(), "Cannot read plugin directory: {}", e);
                return Vec::new();
            }
        };

        let candidates = entries.filter_map(|entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("Skipping unreadable directory entry: {}", e);
                    return None;
                }
            };
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    tracing::debug!(name = ?raw, "Skipping non UTF-8 file name");
                    return None;
                }
            };
            // Follow symlinks so a link to a directory counts as a directory
            let is_dir = match entry.file_type() {
                Ok(ft) if ft.is_symlink() => entry.path().is_dir(),
                Ok(ft) => ft.is_dir(),
                Err(_) => false,
            };
            Some(Candidate { name, is_dir })
        });

        let plugins = self.select(candidates);
        tracing::debug!(
            dir = %dir.display(),
            filter = %self.filter.pattern(),
            count = plugins.len(),
            "Discovered plugins"
        );
        plugins
    }

    /// Filter, deduplicate and order enumerated entries.
    ///
    /// The result does not depend on the order of `candidates`.
    pub fn select<I>(&self, candidates: I) -> Vec<String>
    where
        I: IntoIterator<Item = Candidate>,
    {
        let ordered: BTreeSet<OrderKey> = candidates
            .into_iter()
            .filter(|c| !c.is_dir && self.filter.matches(&c.name))
            .map(|c| OrderKey::new(c.name))
            .collect();
        ordered.into_iter().map(|key| key.name).collect()
    }
}
