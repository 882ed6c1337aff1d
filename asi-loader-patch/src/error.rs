//! Patch errors

use thiserror::Error;

/// Reasons a patch was refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// The page protection could not be lifted
    #[error("cannot change memory protection at {address:#x}")]
    ProtectionRefused { address: usize, code: Option<i32> },

    /// No call instruction at the anchor
    #[error("no call instruction at {address:#x} (found opcode {found:02X})")]
    NotACall { address: usize, found: u8 },

    /// The anchor does not hold the bytes this host build is expected to have
    #[error("unexpected bytes at {address:#x}: expected {expected:02X?}, found {found:02X?}")]
    UnexpectedBytes {
        address: usize,
        expected: Vec<u8>,
        found: Vec<u8>,
    },

    /// The replacement is too far away for a 32-bit relative call
    #[error("replacement {replacement:#x} is out of rel32 range of {address:#x}")]
    OutOfRange { address: usize, replacement: usize },

    /// The address range is outside the accessible memory
    #[error("address range {address:#x}+{len} is not accessible")]
    OutOfBounds { address: usize, len: usize },

    /// The one-shot patch was already applied
    #[error("patch already applied")]
    AlreadyApplied,

    /// Patching is not implemented on this platform
    #[error("code patching is not supported on this platform")]
    Unsupported,
}

impl PatchError {
    /// Platform error code, if any
    pub fn code(&self) -> Option<i32> {
        match self {
            PatchError::ProtectionRefused { code, .. } => *code,
            _ => None,
        }
    }
}

impl From<PatchError> for asi_loader_core::Error {
    fn from(e: PatchError) -> Self {
        asi_loader_core::Error::Patch {
            message: e.to_string(),
            code: e.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_core_error_keeps_code() {
        let err = asi_loader_core::Error::from(PatchError::ProtectionRefused {
            address: 0x1000,
            code: Some(487),
        });
        assert_eq!(err.code(), Some(487));
        assert_eq!(err.to_string(), "Patch error: cannot change memory protection at 0x1000");

        let err = asi_loader_core::Error::from(PatchError::AlreadyApplied);
        assert_eq!(err.code(), None);
    }
}
