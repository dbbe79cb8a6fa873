/*!
 * Core Types
 * Common types used across the kernel
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Process ID type (also used for thread ids, process groups and sessions)
pub type Pid = u32;

/// File descriptor type
pub type Fd = u32;

/// Pid of the process that adopts orphans
pub const INIT_PID: Pid = 1;

/// Stable node identifier (inode-equivalent)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Identifier of the namespace root
    pub const ROOT: NodeId = NodeId(1);

    /// Deterministic identifier for a node synthesized from `key` under `parent`
    ///
    /// Looking the same key up twice yields the same identifier, so synthesized
    /// nodes keep a stable inode number across lookups.
    #[inline]
    #[must_use]
    pub const fn derived(parent: NodeId, key: u64) -> NodeId {
        // splitmix64 finalizer over the combined value
        let mut z = parent.0.rotate_left(32) ^ key.wrapping_add(0x9E37_79B9_7F4A_7C15);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        // Keep synthesized ids out of the allocator's range
        NodeId(z | (1 << 63))
    }

    /// Check whether this id was derived rather than allocated
    #[inline]
    #[must_use]
    pub const fn is_derived(&self) -> bool {
        self.0 & (1 << 63) != 0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_ids_are_stable() {
        let a = NodeId::derived(NodeId(7), 42);
        let b = NodeId::derived(NodeId(7), 42);
        assert_eq!(a, b);
        assert!(a.is_derived());
        assert_ne!(a, NodeId::derived(NodeId(7), 43));
        assert_ne!(a, NodeId::derived(NodeId(8), 42));
        assert!(!NodeId::ROOT.is_derived());
    }
}
