//! Access to code memory

use crate::error::PatchError;
use parking_lot::Mutex;

/// Readable and writable view of executable memory
pub trait CodeMemory: Send + Sync {
    /// Copy `len` bytes starting at `address`
    fn read(&self, address: usize, len: usize) -> Result<Vec<u8>, PatchError>;

    /// Overwrite memory at `address` with `bytes`, lifting write protection
    /// for the duration of the write
    fn write(&self, address: usize, bytes: &[u8]) -> Result<(), PatchError>;
}

/// An in-memory code image mapped at a fixed base address
#[derive(Debug)]
pub struct BufferMemory {
    base: usize,
    bytes: Mutex<Vec<u8>>,
}

impl BufferMemory {
    pub fn new(base: usize, bytes: Vec<u8>) -> Self {
        Self {
            base,
            bytes: Mutex::new(bytes),
        }
    }

    /// Current contents of the image
    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }

    fn range(&self, address: usize, len: usize, size: usize) -> Result<std::ops::Range<usize>, PatchError> {
        let start = address
            .checked_sub(self.base)
            .ok_or(PatchError::OutOfBounds { address, len })?;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= size)
            .ok_or(PatchError::OutOfBounds { address, len })?;
        Ok(start..end)
    }
}

impl CodeMemory for BufferMemory {
    fn read(&self, address: usize, len: usize) -> Result<Vec<u8>, PatchError> {
        let bytes = self.bytes.lock();
        let range = self.range(address, len, bytes.len())?;
        Ok(bytes[range].to_vec())
    }

    fn write(&self, address: usize, data: &[u8]) -> Result<(), PatchError> {
        let mut bytes = self.bytes.lock();
        let range = self.range(address, data.len(), bytes.len())?;
        bytes[range].copy_from_slice(data);
        Ok(())
    }
}

/// The running process's own code
#[derive(Debug)]
pub struct ProcessMemory {
    _private: (),
}

impl ProcessMemory {
    /// # Safety
    ///
    /// Every address later passed to [`CodeMemory::read`] or
    /// [`CodeMemory::write`] must lie in mapped code of this process, and no
    /// other thread may execute the bytes being written.
    pub unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl CodeMemory for ProcessMemory {
    fn read(&self, address: usize, len: usize) -> Result<Vec<u8>, PatchError> {
        // SAFETY: guaranteed readable by the contract of `ProcessMemory::new`.
        let bytes = unsafe { std::slice::from_raw_parts(address as *const u8, len) };
        Ok(bytes.to_vec())
    }

    fn write(&self, address: usize, bytes: &[u8]) -> Result<(), PatchError> {
        platform::write_code(address, bytes)
    }
}

#[cfg(windows)]
mod platform {
    use crate::error::PatchError;
    use std::ffi::c_void;
    use windows_sys::Win32::System::Diagnostics::Debug::FlushInstructionCache;
    use windows_sys::Win32::System::Memory::{PAGE_EXECUTE_READWRITE, PAGE_PROTECTION_FLAGS, VirtualProtect};
    use windows_sys::Win32::System::Threading::GetCurrentProcess;

    pub(super) fn write_code(address: usize, bytes: &[u8]) -> Result<(), PatchError> {
        let target = address as *mut u8;
        let code = address as *const c_void;
        let mut old: PAGE_PROTECTION_FLAGS = 0;
        // SAFETY: the caller of `ProcessMemory::new` vouched for the range.
        unsafe {
            if VirtualProtect(code, bytes.len(), PAGE_EXECUTE_READWRITE, &mut old) == 0 {
                return Err(PatchError::ProtectionRefused {
                    address,
                    code: std::io::Error::last_os_error().raw_os_error(),
                });
            }
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), target, bytes.len());
            let mut restored: PAGE_PROTECTION_FLAGS = 0;
            if VirtualProtect(code, bytes.len(), old, &mut restored) == 0 {
                tracing::warn!(
                    address = format_args!("{:#x}", address),
                    "Cannot restore page protection after patching: {}",
                    std::io::Error::last_os_error()
                );
            }
            if FlushInstructionCache(GetCurrentProcess(), code, bytes.len()) == 0 {
                tracing::warn!(
                    address = format_args!("{:#x}", address),
                    "Cannot flush the instruction cache: {}",
                    std::io::Error::last_os_error()
                );
            }
        }
        Ok(())
    }
}

#[cfg(target_os = "linux")]
mod platform {
    use crate::error::PatchError;

    pub(super) fn write_code(address: usize, bytes: &[u8]) -> Result<(), PatchError> {
        // SAFETY: sysconf has no preconditions.
        let page = match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
            size if size > 0 => size as usize,
            _ => 4096,
        };
        let start = address & !(page - 1);
        let len = address + bytes.len() - start;

        // SAFETY: the caller of `ProcessMemory::new` vouched for the range;
        // `start` is page aligned as mprotect requires.
        unsafe {
            let rwx = libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC;
            if libc::mprotect(start as *mut libc::c_void, len, rwx) != 0 {
                return Err(PatchError::ProtectionRefused {
                    address,
                    code: std::io::Error::last_os_error().raw_os_error(),
                });
            }
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), address as *mut u8, bytes.len());
            // Code pages are mapped read + execute
            if libc::mprotect(start as *mut libc::c_void, len, libc::PROT_READ | libc::PROT_EXEC) != 0 {
                tracing::warn!(
                    address = format_args!("{:#x}", address),
                    "Cannot restore page protection after patching: {}",
                    std::io::Error::last_os_error()
                );
            }
        }
        Ok(())
    }
}

#[cfg(not(any(windows, target_os = "linux")))]
mod platform {
    use crate::error::PatchError;

    pub(super) fn write_code(_address: usize, _bytes: &[u8]) -> Result<(), PatchError> {
        Err(PatchError::Unsupported)
    }
}
