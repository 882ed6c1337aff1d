//! Diagnostic sink
//!
//! Every failure the loader can hit is routed through a [`DiagnosticSink`]
//! instead of being presented directly, so discovery, patching and the init
//! barrier can run headlessly.

use parking_lot::Mutex;
use std::fmt;

/// Severity classes of loader failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Nothing can be discovered; the process is terminated after reporting.
    Fatal,
    /// A single plugin failed to load; the remaining plugins are still attempted.
    PluginLoad,
    /// The loader continues on a fallback path.
    Degraded,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticKind::Fatal => "fatal",
            DiagnosticKind::PluginLoad => "plugin-load",
            DiagnosticKind::Degraded => "degraded",
        };
        f.write_str(name)
    }
}

/// A reported diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    /// Platform error code, when the failing primitive produced one
    pub code: Option<i32>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if let Some(code) = self.code {
            write!(f, " (error code {})", code)?;
        }
        Ok(())
    }
}

/// Receiver of loader diagnostics
pub trait DiagnosticSink: Send + Sync {
    /// Report a failure. Must not panic.
    fn report(&self, kind: DiagnosticKind, message: &str, code: Option<i32>);
}

/// Sink that emits diagnostics as `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, kind: DiagnosticKind, message: &str, code: Option<i32>) {
        match kind {
            DiagnosticKind::Fatal => {
                tracing::error!(kind = %kind, code = ?code, "❌ {}", message)
            }
            DiagnosticKind::PluginLoad | DiagnosticKind::Degraded => {
                tracing::warn!(kind = %kind, code = ?code, "⚠️ {}", message)
            }
        }
    }
}

/// Sink that keeps every diagnostic in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    diagnostics: Mutex<Vec<Diagnostic>>,
    forward: bool,
}

impl CollectingSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink that also forwards every diagnostic to [`TracingSink`]
    pub fn forwarding() -> Self {
        Self {
            diagnostics: Mutex::new(Vec::new()),
            forward: true,
        }
    }

    /// Snapshot of the diagnostics reported so far
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().clone()
    }

    /// Number of diagnostics of the given kind
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.diagnostics.lock().iter().filter(|d| d.kind == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.lock().is_empty()
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&self, kind: DiagnosticKind, message: &str, code: Option<i32>) {
        if self.forward {
            TracingSink.report(kind, message, code);
        }
        self.diagnostics.lock().push(Diagnostic {
            kind,
            message: message.to_string(),
            code,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingSink::new();
        assert!(sink.is_empty());

        sink.report(DiagnosticKind::PluginLoad, "Cannot load plugin a.asi", Some(126));
        sink.report(DiagnosticKind::Degraded, "worker not started", None);

        assert_eq!(sink.count(DiagnosticKind::PluginLoad), 1);
        assert_eq!(sink.count(DiagnosticKind::Fatal), 0);
        let diagnostics = sink.diagnostics();
        assert_eq!(diagnostics[0].code, Some(126));
        assert_eq!(diagnostics[1].message, "worker not started");
    }

    #[test]
    fn test_display() {
        let diagnostic = Diagnostic {
            kind: DiagnosticKind::PluginLoad,
            message: "Cannot load plugin b.asi".to_string(),
            code: Some(193),
        };
        assert_eq!(
            diagnostic.to_string(),
            "[plugin-load] Cannot load plugin b.asi (error code 193)"
        );
    }
}
