//! Node ID for source tree nodes.
//!
//! Each node has a unique NodeId that can be used to look up additional
//! information (spans, classification flags) in separate tables.

use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_NODE_ID: AtomicU32 = AtomicU32::new(1);

/// Unique identifier for a source node.
///
/// Ids are allocated from a process-wide counter, so trees built
/// independently never collide when their side tables are merged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Allocate a fresh id.
    pub fn fresh() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Create a NodeId from a raw value handed over by the front end.
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw value of this NodeId.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
