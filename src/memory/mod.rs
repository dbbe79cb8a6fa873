/*!
 * Memory Module
 * Per-process address spaces for mmap and munmap
 */

pub mod space;
pub mod types;

// Re-export for convenience
pub use space::{AddressSpace, MapRequest, SharedAddressSpace};
pub use types::*;
