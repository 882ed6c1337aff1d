//! One-shot patch bookkeeping

use crate::CodePatcher;
use crate::error::PatchError;

/// A redirect of the call at `target` to `replacement`.
///
/// `applied` goes from false to true at most once; there is no revert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchDescriptor {
    target: usize,
    replacement: usize,
    applied: bool,
}

impl PatchDescriptor {
    pub fn new(target: usize, replacement: usize) -> Self {
        Self {
            target,
            replacement,
            applied: false,
        }
    }

    /// Apply the redirect through `patcher`
    pub fn apply(&mut self, patcher: &dyn CodePatcher) -> Result<(), PatchError> {
        if self.applied {
            return Err(PatchError::AlreadyApplied);
        }
        patcher.apply(self.target, self.replacement)?;
        self.applied = true;
        Ok(())
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn replacement(&self) -> usize {
        self.replacement
    }

    pub fn is_applied(&self) -> bool {
        self.applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BufferMemory, CallPatch};

    #[test]
    fn test_apply_once() {
        let patch = CallPatch::new(BufferMemory::new(0x1000, vec![0xE8, 0, 0, 0, 0]));
        let mut descriptor = PatchDescriptor::new(0x1000, 0x1100);
        assert!(!descriptor.is_applied());

        descriptor.apply(&patch).unwrap();
        assert!(descriptor.is_applied());
        assert_eq!(descriptor.apply(&patch), Err(PatchError::AlreadyApplied));
        assert_eq!(patch.current_target(0x1000).unwrap(), 0x1100);
    }

    #[test]
    fn test_failed_apply_stays_unapplied() {
        let patch = CallPatch::new(BufferMemory::new(0x1000, vec![0x90; 5]));
        let mut descriptor = PatchDescriptor::new(0x1000, 0x1100);
        assert!(descriptor.apply(&patch).is_err());
        assert!(!descriptor.is_applied());
    }
}
