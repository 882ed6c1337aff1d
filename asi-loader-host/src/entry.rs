//! Attach-time entry point

use crate::context::LoaderContext;
use crate::spawner::WorkerSpawner;
use asi_loader_core::{DiagnosticKind, Error};
use asi_loader_patch::{CALL_LEN, CodePatcher, PatchDescriptor};
use std::sync::Arc;

/// Where the plugin pass ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// On a worker thread, joined later by the barrier
    Threaded,
    /// On the attaching thread before `attach` returned
    Inline,
}

/// Outcome of the attach sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachReport {
    /// The anchor call now leads to the barrier
    pub patched: bool,
    pub mode: LoadMode,
}

/// Runs the attach sequence: redirect the anchor, then start the plugin pass
pub struct LoaderEntryPoint<'a> {
    spawner: &'a dyn WorkerSpawner,
    patcher: Option<&'a dyn CodePatcher>,
}

impl<'a> LoaderEntryPoint<'a> {
    pub fn new(spawner: &'a dyn WorkerSpawner, patcher: &'a dyn CodePatcher) -> Self {
        Self {
            spawner,
            patcher: Some(patcher),
        }
    }

    /// An entry point that never touches host code
    pub fn unpatched(spawner: &'a dyn WorkerSpawner) -> Self {
        Self { spawner, patcher: None }
    }

    /// Install the redirect to `replacement` and start the plugin pass.
    ///
    /// Returns as soon as the worker is running. Nothing here is fatal: a
    /// failed patch only means the barrier never fires, and a worker that
    /// cannot be started is replaced by running the pass inline.
    pub fn attach(&self, ctx: &Arc<LoaderContext>, replacement: usize) -> AttachReport {
        let patched = self.install_patch(ctx, replacement);
        let mode = self.start_pass(ctx);
        tracing::info!(
            version = asi_loader_core::VERSION,
            patched,
            mode = ?mode,
            "ASI loader attached"
        );
        AttachReport { patched, mode }
    }

    fn install_patch(&self, ctx: &LoaderContext, replacement: usize) -> bool {
        let Some(patcher) = self.patcher else {
            return false;
        };
        let Some(anchor) = ctx.config().anchor() else {
            tracing::info!("Anchor patching disabled, plugin initializers will not run");
            return false;
        };
        let sink = ctx.sink();

        let Some(image) = ctx.host().image() else {
            sink.report(DiagnosticKind::Degraded, "Cannot locate the host image to patch", None);
            return false;
        };
        let Some(target) = image.address_of(anchor.offset, CALL_LEN) else {
            sink.report(
                DiagnosticKind::Degraded,
                &format!(
                    "Anchor offset {:#x} lies outside the host image ({:#x} bytes)",
                    anchor.offset, image.len
                ),
                None,
            );
            return false;
        };

        let mut descriptor = PatchDescriptor::new(target, replacement);
        let result = descriptor.apply(patcher).map_err(Error::from);
        match &result {
            Ok(()) => tracing::debug!(
                target = format_args!("{:#x}", descriptor.target()),
                replacement = format_args!("{:#x}", descriptor.replacement()),
                "Host anchor redirected"
            ),
            Err(e) => sink.report(
                DiagnosticKind::Degraded,
                &format!("Failed to redirect the host call at {:#x}: {}", descriptor.target(), e),
                e.code(),
            ),
        }
        ctx.set_patch(descriptor);
        result.is_ok()
    }

    fn start_pass(&self, ctx: &Arc<LoaderContext>) -> LoadMode {
        let worker = &ctx.config().worker;
        if !worker.enabled {
            ctx.run_pass();
            ctx.barrier().arm_inline(false);
            return LoadMode::Inline;
        }

        // The module must stay mapped while the worker runs its code
        if !ctx.host().pin_loader() {
            tracing::warn!("Cannot pin the loader module, loading plugins inline");
            ctx.run_pass();
            ctx.barrier().arm_inline(true);
            return LoadMode::Inline;
        }

        let job_ctx = ctx.clone();
        match self.spawner.spawn(
            &worker.thread_name,
            Box::new(move || {
                job_ctx.run_pass();
            }),
        ) {
            Ok(handle) => {
                ctx.barrier().arm_worker(handle);
                LoadMode::Threaded
            }
            Err(e) => {
                tracing::warn!("Cannot start plugin loader thread, loading plugins inline: {}", e);
                ctx.run_pass();
                ctx.barrier().arm_inline(true);
                LoadMode::Inline
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{DirectoryHost, HostEnvironment, HostImage};
    use crate::spawner::{ThreadSpawner, WorkerJob};
    use asi_loader_core::diagnostics::CollectingSink;
    use asi_loader_core::{LoaderConfig, Result};
    use asi_loader_patch::{BufferMemory, CallPatch};
    use asi_loader_plugin::StaticModuleLoader;
    use parking_lot::Mutex;
    use std::io;
    use std::path::{Path, PathBuf};
    use std::thread::JoinHandle;

    const BASE: usize = 0x40_0000;
    const OFFSET: u64 = 0x20;
    const REPLACEMENT: usize = BASE + 0x800;

    /// A host with an in-memory image and a plugin directory
    struct FakeHost {
        dir: PathBuf,
        image: Option<HostImage>,
        pinnable: bool,
    }

    impl HostEnvironment for FakeHost {
        fn host_dir(&self) -> Result<PathBuf> {
            Ok(self.dir.clone())
        }

        fn image(&self) -> Option<HostImage> {
            self.image
        }

        fn pin_loader(&self) -> bool {
            self.pinnable
        }

        fn terminate(&self, code: i32) -> ! {
            panic!("terminated with {code}")
        }
    }

    struct FailingSpawner;

    impl WorkerSpawner for FailingSpawner {
        fn spawn(&self, _name: &str, _job: WorkerJob) -> io::Result<JoinHandle<()>> {
            Err(io::Error::new(io::ErrorKind::OutOfMemory, "no threads left"))
        }
    }

    fn image_bytes() -> Vec<u8> {
        let mut bytes = vec![0x90; 0x100];
        bytes[OFFSET as usize..OFFSET as usize + 5].copy_from_slice(&[0xE8, 0x00, 0x01, 0x00, 0x00]);
        bytes
    }

    fn plugin_dir(names: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("plugins")).unwrap();
        for name in names {
            std::fs::write(dir.path().join("plugins").join(name), b"").unwrap();
        }
        dir
    }

    fn config() -> LoaderConfig {
        let mut config = LoaderConfig::default();
        config.anchor.offset = OFFSET;
        config
    }

    fn recording_modules(log: &Arc<Mutex<Vec<String>>>, names: &[&str]) -> StaticModuleLoader {
        names.iter().fold(StaticModuleLoader::new(), |modules, name| {
            let log = log.clone();
            let entry = name.to_string();
            modules.with_initializer(*name, "InitAsi", move || log.lock().push(entry.clone()))
        })
    }

    fn context(
        dir: &Path,
        config: LoaderConfig,
        modules: StaticModuleLoader,
        pinnable: bool,
    ) -> (Arc<LoaderContext>, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::new());
        let host = FakeHost {
            dir: dir.to_path_buf(),
            image: Some(HostImage {
                base: BASE,
                len: 0x100,
            }),
            pinnable,
        };
        let ctx = Arc::new(LoaderContext::new(config, Arc::new(host), Arc::new(modules), sink.clone()));
        (ctx, sink)
    }

    #[test]
    fn test_threaded_attach_then_barrier() {
        let dir = plugin_dir(&["b.asi", "A.asi", "c.txt"]);
        std::fs::create_dir(dir.path().join("plugins").join("d.asi")).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let modules = recording_modules(&log, &["A.asi", "b.asi", "c.txt", "d.asi"]);
        let (ctx, sink) = context(dir.path(), config(), modules, true);
        let patcher = CallPatch::new(BufferMemory::new(BASE, image_bytes()));

        let report = LoaderEntryPoint::new(&ThreadSpawner, &patcher).attach(&ctx, REPLACEMENT);
        assert_eq!(
            report,
            AttachReport {
                patched: true,
                mode: LoadMode::Threaded,
            }
        );
        assert_eq!(patcher.current_target(BASE + OFFSET as usize).unwrap(), REPLACEMENT);
        let descriptor = ctx.patch().unwrap();
        assert!(descriptor.is_applied());
        assert_eq!(descriptor.target(), BASE + OFFSET as usize);
        assert_eq!(descriptor.replacement(), REPLACEMENT);

        // Nothing runs before the host reaches the anchor
        assert!(log.lock().is_empty());

        let barrier = ctx.fire_barrier();
        assert!(barrier.joined);
        assert_eq!(barrier.invoked, 2);
        assert_eq!(*log.lock(), vec!["A.asi", "b.asi"]);
        assert_eq!(ctx.loaded_plugins(), vec!["A.asi", "b.asi"]);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_spawn_failure_falls_back_to_inline() {
        let dir = plugin_dir(&["b.asi", "A.asi"]);
        let log = Arc::new(Mutex::new(Vec::new()));
        let modules = recording_modules(&log, &["A.asi", "b.asi"]);
        let (ctx, sink) = context(dir.path(), config(), modules, true);
        let patcher = CallPatch::new(BufferMemory::new(BASE, image_bytes()));

        let report = LoaderEntryPoint::new(&FailingSpawner, &patcher).attach(&ctx, REPLACEMENT);
        assert_eq!(report.mode, LoadMode::Inline);
        // Loaded before attach returned, initializers still deferred
        assert_eq!(ctx.loaded_plugins(), vec!["A.asi", "b.asi"]);
        assert!(log.lock().is_empty());

        let barrier = ctx.fire_barrier();
        assert!(barrier.degraded);
        assert_eq!(*log.lock(), vec!["A.asi", "b.asi"]);
        assert_eq!(sink.count(DiagnosticKind::Degraded), 1);
    }

    #[test]
    fn test_unpinnable_module_loads_inline() {
        let dir = plugin_dir(&["a.asi"]);
        let log = Arc::new(Mutex::new(Vec::new()));
        let (ctx, _sink) = context(dir.path(), config(), recording_modules(&log, &["a.asi"]), false);
        let patcher = CallPatch::new(BufferMemory::new(BASE, image_bytes()));

        let report = LoaderEntryPoint::new(&ThreadSpawner, &patcher).attach(&ctx, REPLACEMENT);
        assert_eq!(report.mode, LoadMode::Inline);
        assert_eq!(ctx.loaded_plugins(), vec!["a.asi"]);
    }

    #[test]
    fn test_disabled_worker_is_not_degraded() {
        let dir = plugin_dir(&["a.asi"]);
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut config = config();
        config.worker.enabled = false;
        let (ctx, sink) = context(dir.path(), config, recording_modules(&log, &["a.asi"]), true);
        let patcher = CallPatch::new(BufferMemory::new(BASE, image_bytes()));

        let report = LoaderEntryPoint::new(&ThreadSpawner, &patcher).attach(&ctx, REPLACEMENT);
        assert_eq!(report.mode, LoadMode::Inline);
        let barrier = ctx.fire_barrier();
        assert!(!barrier.degraded);
        assert_eq!(*log.lock(), vec!["a.asi"]);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_patch_failure_is_not_fatal() {
        let dir = plugin_dir(&["a.asi"]);
        let log = Arc::new(Mutex::new(Vec::new()));
        let (ctx, sink) = context(dir.path(), config(), recording_modules(&log, &["a.asi"]), true);
        // No call instruction at the anchor
        let patcher = CallPatch::new(BufferMemory::new(BASE, vec![0x90; 0x100]));

        let report = LoaderEntryPoint::new(&ThreadSpawner, &patcher).attach(&ctx, REPLACEMENT);
        assert!(!report.patched);
        assert_eq!(report.mode, LoadMode::Threaded);
        assert!(!ctx.patch().unwrap().is_applied());
        assert_eq!(sink.count(DiagnosticKind::Degraded), 1);

        // Plugins are still loaded; only the initializers wait for an anchor that never comes
        let barrier = ctx.fire_barrier();
        assert_eq!(barrier.invoked, 1);
    }

    #[test]
    fn test_version_drift_refuses_patch() {
        let dir = plugin_dir(&[]);
        let mut config = config();
        config.anchor.expected = Some(vec![0xE8, 0xAA, 0xBB, 0xCC, 0xDD]);
        let (ctx, sink) = context(dir.path(), config.clone(), StaticModuleLoader::new(), true);
        let patcher = CallPatch::new(BufferMemory::new(BASE, image_bytes())).with_expected(config.anchor.expected);

        let report = LoaderEntryPoint::new(&ThreadSpawner, &patcher).attach(&ctx, REPLACEMENT);
        assert!(!report.patched);
        assert_eq!(patcher.memory().bytes(), image_bytes());
        let diagnostics = sink.diagnostics();
        assert!(diagnostics[0].message.contains("unexpected bytes"));
        ctx.fire_barrier();
    }

    #[test]
    fn test_anchor_outside_image() {
        let dir = plugin_dir(&[]);
        let mut config = config();
        config.anchor.offset = 0xFFFF;
        let (ctx, sink) = context(dir.path(), config, StaticModuleLoader::new(), true);
        let patcher = CallPatch::new(BufferMemory::new(BASE, image_bytes()));

        let report = LoaderEntryPoint::new(&ThreadSpawner, &patcher).attach(&ctx, REPLACEMENT);
        assert!(!report.patched);
        assert!(ctx.patch().is_none());
        assert_eq!(sink.count(DiagnosticKind::Degraded), 1);
        ctx.fire_barrier();
    }

    #[test]
    fn test_disabled_anchor_skips_patch() {
        let dir = plugin_dir(&[]);
        let mut config = config();
        config.anchor.enabled = false;
        let (ctx, sink) = context(dir.path(), config, StaticModuleLoader::new(), true);
        let patcher = CallPatch::new(BufferMemory::new(BASE, image_bytes()));

        let report = LoaderEntryPoint::new(&ThreadSpawner, &patcher).attach(&ctx, REPLACEMENT);
        assert!(!report.patched);
        assert_eq!(patcher.memory().bytes(), image_bytes());
        assert!(sink.is_empty());
        ctx.fire_barrier();
    }

    #[test]
    fn test_unpatched_entry_point() {
        let dir = plugin_dir(&["a.asi"]);
        let log = Arc::new(Mutex::new(Vec::new()));
        let (ctx, sink) = context(dir.path(), config(), recording_modules(&log, &["a.asi"]), true);

        let report = LoaderEntryPoint::unpatched(&ThreadSpawner).attach(&ctx, REPLACEMENT);
        assert!(!report.patched);
        assert!(ctx.patch().is_none());
        assert_eq!(ctx.fire_barrier().invoked, 1);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_directory_host_has_no_image() {
        let dir = plugin_dir(&[]);
        let sink = Arc::new(CollectingSink::new());
        let ctx = Arc::new(LoaderContext::new(
            config(),
            Arc::new(DirectoryHost::new(dir.path())),
            Arc::new(StaticModuleLoader::new()),
            sink.clone(),
        ));
        let patcher = CallPatch::new(BufferMemory::new(BASE, image_bytes()));

        let report = LoaderEntryPoint::new(&ThreadSpawner, &patcher).attach(&ctx, REPLACEMENT);
        assert!(!report.patched);
        assert_eq!(sink.count(DiagnosticKind::Degraded), 1);
        ctx.fire_barrier();
    }
}
