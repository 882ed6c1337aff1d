//! `call rel32` redirection

use crate::CodePatcher;
use crate::error::PatchError;
use crate::memory::CodeMemory;
use asi_loader_core::config::CALL_OPCODE;

/// Length of `E8 xx xx xx xx`
pub const CALL_LEN: usize = 5;

/// Rewrites the operand of a near relative call
#[derive(Debug)]
pub struct CallPatch<M> {
    memory: M,
    expected: Option<Vec<u8>>,
}

impl<M: CodeMemory> CallPatch<M> {
    /// Create a patcher writing through `memory`
    pub fn new(memory: M) -> Self {
        Self {
            memory,
            expected: None,
        }
    }

    /// Refuse to patch unless the call site holds exactly `bytes`
    pub fn with_expected(mut self, bytes: Option<Vec<u8>>) -> Self {
        self.expected = bytes;
        self
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Encode `call replacement` placed at `address`
    pub fn encode(address: usize, replacement: usize) -> Result<[u8; CALL_LEN], PatchError> {
        let next = address as i128 + CALL_LEN as i128;
        let rel = i32::try_from(replacement as i128 - next)
            .map_err(|_| PatchError::OutOfRange { address, replacement })?;

        let mut bytes = [0u8; CALL_LEN];
        bytes[0] = CALL_OPCODE;
        bytes[1..].copy_from_slice(&rel.to_le_bytes());
        Ok(bytes)
    }

    /// Absolute target of the call currently at `address`
    pub fn current_target(&self, address: usize) -> Result<usize, PatchError> {
        let bytes = self.read_call(address)?;
        let rel = i32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        let target = address as i128 + CALL_LEN as i128 + rel as i128;
        Ok(target as usize)
    }

    fn read_call(&self, address: usize) -> Result<Vec<u8>, PatchError> {
        let bytes = self.memory.read(address, CALL_LEN)?;
        if bytes.len() != CALL_LEN || bytes[0] != CALL_OPCODE {
            return Err(PatchError::NotACall {
                address,
                found: bytes.first().copied().unwrap_or_default(),
            });
        }
        Ok(bytes)
    }
}

impl<M: CodeMemory> CodePatcher for CallPatch<M> {
    fn apply(&self, address: usize, replacement: usize) -> Result<(), PatchError> {
        let current = self.read_call(address)?;
        if let Some(expected) = &self.expected {
            if *expected != current {
                return Err(PatchError::UnexpectedBytes {
                    address,
                    expected: expected.clone(),
                    found: current,
                });
            }
        }

        let encoded = Self::encode(address, replacement)?;
        // The opcode is already in place, only the operand changes
        self.memory.write(address + 1, &encoded[1..])?;

        tracing::debug!(
            address = format_args!("{:#x}", address),
            replacement = format_args!("{:#x}", replacement),
            "Redirected call"
        );
        Ok(())
    }
}
