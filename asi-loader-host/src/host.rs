//! The host process the loader is attached to

use asi_loader_core::{Error, Result};
use std::path::{Path, PathBuf};

/// Mapped main image of the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostImage {
    /// Address offsets are measured from
    pub base: usize,
    /// Size of the mapped image in bytes
    pub len: usize,
}

impl HostImage {
    /// Absolute address of `offset`, if `len` bytes starting there lie inside
    /// the image
    pub fn address_of(&self, offset: u64, len: usize) -> Option<usize> {
        let offset = usize::try_from(offset).ok()?;
        let end = offset.checked_add(len)?;
        if end > self.len {
            return None;
        }
        self.base.checked_add(offset)
    }
}

/// Facilities of the host process the loader depends on
pub trait HostEnvironment: Send + Sync {
    /// Directory containing the host executable
    fn host_dir(&self) -> Result<PathBuf>;

    /// The host's main image, if it can be located
    fn image(&self) -> Option<HostImage>;

    /// Keep the loader module mapped for the rest of the process lifetime.
    /// Returns false when the module cannot be pinned.
    fn pin_loader(&self) -> bool;

    /// End the process after a fatal diagnostic
    fn terminate(&self, code: i32) -> !;
}

/// The process this code runs in
#[derive(Debug, Default, Clone, Copy)]
pub struct CurrentProcess;

impl HostEnvironment for CurrentProcess {
    fn host_dir(&self) -> Result<PathBuf> {
        let exe = std::env::current_exe().map_err(|e| Error::HostIdentity {
            message: format!("cannot get file name of the host executable: {}", e),
            code: e.raw_os_error(),
        })?;
        exe.parent().map(Path::to_path_buf).ok_or_else(|| Error::HostIdentity {
            message: format!("host executable {} has no parent directory", exe.display()),
            code: None,
        })
    }

    fn image(&self) -> Option<HostImage> {
        platform::main_image()
    }

    fn pin_loader(&self) -> bool {
        platform::pin_loader()
    }

    fn terminate(&self, code: i32) -> ! {
        std::process::exit(code)
    }
}

/// A host rooted at a fixed directory, with no image to patch.
///
/// Used when plugins are loaded outside an injected process, e.g. by the
/// operator CLI.
#[derive(Debug, Clone)]
pub struct DirectoryHost {
    dir: PathBuf,
}

impl DirectoryHost {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl HostEnvironment for DirectoryHost {
    fn host_dir(&self) -> Result<PathBuf> {
        Ok(self.dir.clone())
    }

    fn image(&self) -> Option<HostImage> {
        None
    }

    fn pin_loader(&self) -> bool {
        true
    }

    fn terminate(&self, code: i32) -> ! {
        std::process::exit(code)
    }
}

/// Lives in the loader module; its address identifies the module to pin.
#[cfg(any(windows, target_os = "linux"))]
static PIN_MARKER: u8 = 0;

#[cfg(windows)]
mod platform {
    use super::{HostImage, PIN_MARKER};
    use windows_sys::Win32::Foundation::HMODULE;
    use windows_sys::Win32::System::LibraryLoader::{
        GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS, GetModuleHandleExW, GetModuleHandleW,
    };

    /// Offset of `e_lfanew` in the DOS header
    const E_LFANEW: usize = 0x3C;
    /// `SizeOfImage` relative to the NT headers (signature + file header + 56)
    const SIZE_OF_IMAGE: usize = 4 + 20 + 56;

    pub(super) fn main_image() -> Option<HostImage> {
        // SAFETY: a null name asks for the executable, which is always mapped
        // together with its headers.
        unsafe {
            let base = GetModuleHandleW(std::ptr::null());
            if base.is_null() {
                return None;
            }
            let base = base as usize;
            let nt = base + std::ptr::read_unaligned((base + E_LFANEW) as *const u32) as usize;
            let len = std::ptr::read_unaligned((nt + SIZE_OF_IMAGE) as *const u32) as usize;
            Some(HostImage { base, len })
        }
    }

    pub(super) fn pin_loader() -> bool {
        let mut module: HMODULE = std::ptr::null_mut();
        // SAFETY: the marker address lies inside this module. Without the
        // UNCHANGED_REFCOUNT flag this adds a reference that is never released.
        unsafe {
            GetModuleHandleExW(
                GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS,
                (&PIN_MARKER as *const u8).cast(),
                &mut module,
            ) != 0
        }
    }
}

#[cfg(target_os = "linux")]
mod platform {
    use super::{HostImage, PIN_MARKER};

    unsafe extern "C" fn first_object(
        info: *mut libc::dl_phdr_info,
        _size: libc::size_t,
        data: *mut libc::c_void,
    ) -> libc::c_int {
        // SAFETY: called by dl_iterate_phdr with a valid info record and the
        // pointer passed below.
        let (info, out) = unsafe { (&*info, &mut *(data as *mut Option<HostImage>)) };
        let headers = if info.dlpi_phdr.is_null() {
            &[][..]
        } else {
            // SAFETY: dlpi_phdr points at dlpi_phnum program headers.
            unsafe { std::slice::from_raw_parts(info.dlpi_phdr, info.dlpi_phnum as usize) }
        };
        let len = headers
            .iter()
            .filter(|h| h.p_type == libc::PT_LOAD)
            .map(|h| (h.p_vaddr + h.p_memsz) as usize)
            .max()
            .unwrap_or(0);
        *out = Some(HostImage {
            base: info.dlpi_addr as usize,
            len,
        });
        // The main program is reported first; stop there
        1
    }

    pub(super) fn main_image() -> Option<HostImage> {
        let mut image: Option<HostImage> = None;
        // SAFETY: the callback only writes through the pointer to `image`.
        unsafe {
            libc::dl_iterate_phdr(Some(first_object), (&mut image as *mut Option<HostImage>).cast());
        }
        image
    }

    pub(super) fn pin_loader() -> bool {
        // SAFETY: dladdr fills `info` for an address inside a loaded object;
        // dlopen with RTLD_NOLOAD only bumps the reference count of that
        // object and RTLD_NODELETE keeps it mapped. The handle is never closed.
        unsafe {
            let mut info: libc::Dl_info = std::mem::zeroed();
            if libc::dladdr((&PIN_MARKER as *const u8).cast(), &mut info) == 0 || info.dli_fname.is_null() {
                return false;
            }
            let flags = libc::RTLD_NOW | libc::RTLD_NOLOAD | libc::RTLD_NODELETE;
            !libc::dlopen(info.dli_fname, flags).is_null()
        }
    }
}

#[cfg(not(any(windows, target_os = "linux")))]
mod platform {
    use super::HostImage;

    pub(super) fn main_image() -> Option<HostImage> {
        None
    }

    pub(super) fn pin_loader() -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_of_checks_bounds() {
        let image = HostImage {
            base: 0x40_0000,
            len: 0x1000,
        };
        assert_eq!(image.address_of(0x10, 5), Some(0x40_0010));
        assert_eq!(image.address_of(0xFFB, 5), Some(0x40_0FFB));
        assert_eq!(image.address_of(0xFFC, 5), None);
        assert_eq!(image.address_of(u64::MAX, 5), None);
    }

    #[test]
    fn test_current_process_host_dir() {
        let dir = CurrentProcess.host_dir().unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    #[cfg(any(windows, target_os = "linux"))]
    fn test_current_process_image() {
        let image = CurrentProcess.image().unwrap();
        assert!(image.len > 0);
    }

    #[test]
    fn test_directory_host() {
        let host = DirectoryHost::new("/opt/game");
        assert_eq!(host.host_dir().unwrap(), PathBuf::from("/opt/game"));
        assert!(host.image().is_none());
        assert!(host.pin_loader());
    }
}
