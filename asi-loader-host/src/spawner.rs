//! Worker thread creation

use std::io;
use std::thread::JoinHandle;

/// A job run on the worker thread
pub type WorkerJob = Box<dyn FnOnce() + Send + 'static>;

/// Starts the plugin worker
pub trait WorkerSpawner: Send + Sync {
    /// Start `job` on a new thread named `name`
    fn spawn(&self, name: &str, job: WorkerJob) -> io::Result<JoinHandle<()>>;
}

/// Spawns OS threads through [`std::thread::Builder`]
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSpawner;

impl WorkerSpawner for ThreadSpawner {
    fn spawn(&self, name: &str, job: WorkerJob) -> io::Result<JoinHandle<()>> {
        std::thread::Builder::new().name(name.to_string()).spawn(job)
    }
}
