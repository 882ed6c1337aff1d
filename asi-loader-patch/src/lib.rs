//! ASI Loader Code Patching
//!
//! Redirects a single host `call` instruction to a replacement function.
//! The patch is applied once and never reverted.

mod call;
mod descriptor;
mod error;
mod memory;

pub use call::{CallPatch, CALL_LEN};
pub use descriptor::PatchDescriptor;
pub use error::PatchError;
pub use memory::{BufferMemory, CodeMemory, ProcessMemory};

/// Redirects the call instruction at an address to a replacement function
pub trait CodePatcher: Send + Sync {
    /// Make the call at `address` invoke `replacement` instead of its
    /// original target. `replacement` itself is not invoked.
    fn apply(&self, address: usize, replacement: usize) -> Result<(), PatchError>;
}
