//! Deferred initialization barrier
//!
//! One-shot rendezvous between the plugin worker and the host thread that
//! executes the redirected anchor call. States: waiting, then fired.

use asi_loader_core::{DiagnosticKind, DiagnosticSink};
use asi_loader_plugin::DiscoveryResult;
use parking_lot::Mutex;
use std::any::Any;
use std::thread::JoinHandle;

/// How the plugin pass was handed to the barrier
#[derive(Debug, Default)]
enum Handoff {
    /// Attach has not run
    #[default]
    Unarmed,
    /// The pass runs on this worker
    Worker(JoinHandle<()>),
    /// The pass already ran on the attaching thread. `fallback` is set when a
    /// worker was wanted but could not be started.
    Inline { fallback: bool },
}

#[derive(Debug, Default)]
struct BarrierState {
    handoff: Handoff,
    has_fired: bool,
}

/// What a barrier arrival did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BarrierReport {
    /// A worker was joined successfully
    pub joined: bool,
    /// A degraded path was taken (no worker, or the worker died)
    pub degraded: bool,
    /// The barrier had already fired; nothing was invoked
    pub repeated: bool,
    /// Number of initializers invoked
    pub invoked: usize,
}

/// The deferred init barrier
#[derive(Debug, Default)]
pub struct DeferredInitBarrier {
    state: Mutex<BarrierState>,
}

impl DeferredInitBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand over the worker running the plugin pass
    pub fn arm_worker(&self, worker: JoinHandle<()>) {
        self.state.lock().handoff = Handoff::Worker(worker);
    }

    /// Record that the plugin pass already ran on the attaching thread
    pub fn arm_inline(&self, fallback: bool) {
        self.state.lock().handoff = Handoff::Inline { fallback };
    }

    pub fn has_fired(&self) -> bool {
        self.state.lock().has_fired
    }

    /// Wait for the plugin pass, then run every published initializer on the
    /// calling thread in discovery order.
    ///
    /// Blocks without timeout while the worker is running. If the worker
    /// panicked the initializers it had published so far are still run.
    pub fn fire(&self, published: &Mutex<DiscoveryResult>, sink: &dyn DiagnosticSink) -> BarrierReport {
        let handoff = {
            let mut state = self.state.lock();
            if state.has_fired {
                drop(state);
                sink.report(DiagnosticKind::Degraded, "deferred init barrier already fired", None);
                return BarrierReport {
                    repeated: true,
                    ..BarrierReport::default()
                };
            }
            state.has_fired = true;
            std::mem::take(&mut state.handoff)
        };

        let mut report = BarrierReport::default();
        match handoff {
            Handoff::Worker(worker) => {
                tracing::debug!("Waiting for plugin loader thread");
                match worker.join() {
                    Ok(()) => report.joined = true,
                    Err(panic) => {
                        report.degraded = true;
                        sink.report(
                            DiagnosticKind::Degraded,
                            &format!("Failed to wait for plugin loader thread: {}", panic_message(&*panic)),
                            None,
                        );
                    }
                }
            }
            Handoff::Inline { fallback: false } => {}
            Handoff::Inline { fallback: true } => {
                report.degraded = true;
                sink.report(
                    DiagnosticKind::Degraded,
                    "plugin loader thread failed to start, plugins were loaded inline",
                    None,
                );
            }
            Handoff::Unarmed => {
                report.degraded = true;
                sink.report(DiagnosticKind::Degraded, "plugin loader was never started", None);
            }
        }

        // Copy the handles out so initializers run without the lock held
        let initializers = published.lock().initializers();
        tracing::info!(count = initializers.len(), "Running plugin initializers");
        for init in &initializers {
            init.invoke();
        }
        report.invoked = initializers.len();
        report
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
