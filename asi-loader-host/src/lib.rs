//! ASI Loader Host Integration
//!
//! Wires discovery, loading and patching into the startup protocol:
//!
//! 1. [`LoaderEntryPoint::attach`] runs while the loader module is attached.
//!    It redirects the host's anchor call to the barrier and starts the
//!    plugin pass on a worker thread (or inline when that is impossible).
//! 2. The host continues its own startup and eventually executes the
//!    redirected call.
//! 3. [`DeferredInitBarrier::fire`] joins the worker and runs every plugin
//!    initializer on the host's thread, in discovery order.

pub mod barrier;
pub mod bootstrap;
pub mod context;
pub mod entry;
pub mod host;
pub mod logging;
pub mod spawner;

pub use barrier::{BarrierReport, DeferredInitBarrier};
pub use bootstrap::{LoaderSlot, build_context};
pub use context::LoaderContext;
pub use entry::{AttachReport, LoadMode, LoaderEntryPoint};
pub use host::{CurrentProcess, DirectoryHost, HostEnvironment, HostImage};
pub use spawner::{ThreadSpawner, WorkerJob, WorkerSpawner};
