//! ASI Loader module
//!
//! Build this crate as a `cdylib` and get it mapped into the host (as a
//! proxy DLL on Windows, through `LD_PRELOAD` on Linux). On attach it
//! redirects the host's anchor call to [`deferred_init`] and starts loading
//! plugins in the background.

use asi_loader_core::diagnostics::TracingSink;
use asi_loader_host::{CurrentProcess, LoaderEntryPoint, LoaderSlot, ThreadSpawner, build_context};
use asi_loader_patch::{CallPatch, ProcessMemory};
use asi_loader_plugin::NativeModuleLoader;
use std::sync::Arc;

static LOADER: LoaderSlot = LoaderSlot::new();

/// Replacement target of the host's anchor call.
///
/// Waits for the plugin pass and runs every plugin initializer on the
/// calling host thread, then hands control back to the host.
pub extern "C" fn deferred_init() -> u8 {
    LOADER.fire();
    1
}

/// Run the attach sequence for the current process. Later calls do nothing.
pub fn attach() {
    if LOADER.get().is_some() {
        tracing::debug!("ASI loader already attached");
        return;
    }
    let ctx = Arc::new(build_context(
        Arc::new(CurrentProcess),
        Arc::new(NativeModuleLoader),
        Arc::new(TracingSink),
    ));
    if !LOADER.install(ctx.clone()) {
        tracing::debug!("ASI loader already attached");
        return;
    }

    // SAFETY: the entry point only patches inside the bounds of the host's
    // main image, while the host thread that runs the anchor is still inside
    // the module attach sequence.
    let memory = unsafe { ProcessMemory::new() };
    let patcher = CallPatch::new(memory).with_expected(ctx.config().anchor.expected.clone());
    LoaderEntryPoint::new(&ThreadSpawner, &patcher).attach(&ctx, deferred_init as usize);
}

#[cfg_attr(not(feature = "attach"), allow(dead_code))]
fn attach_guarded() {
    if std::panic::catch_unwind(attach).is_err() {
        tracing::error!("ASI loader attach panicked");
    }
}

#[cfg(all(windows, feature = "attach"))]
mod hook {
    use windows_sys::Win32::Foundation::{BOOL, HINSTANCE, TRUE};
    use windows_sys::Win32::System::SystemServices::DLL_PROCESS_ATTACH;

    #[unsafe(no_mangle)]
    #[allow(non_snake_case)]
    pub extern "system" fn DllMain(_module: HINSTANCE, reason: u32, _reserved: *mut core::ffi::c_void) -> BOOL {
        if reason == DLL_PROCESS_ATTACH {
            super::attach_guarded();
        }
        TRUE
    }
}

#[cfg(all(target_os = "linux", feature = "attach"))]
mod hook {
    extern "C" fn on_load() {
        super::attach_guarded();
    }

    #[used]
    #[unsafe(link_section = ".init_array")]
    static ON_LOAD: extern "C" fn() = on_load;
}
