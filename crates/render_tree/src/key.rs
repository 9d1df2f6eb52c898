//! Stable node keys shared between the document provider and the relayout core.

use serde::Serialize;

/// A 64-bit stable key for render-tree nodes used to correlate asynchronous work.
///
/// Keys are never reused within one [`NodeKeyAllocator`], so a key held across a
/// suspension point either still names the same node or names nothing at all.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, PartialOrd, Ord, Serialize)]
pub struct NodeKey(pub u64);

impl NodeKey {
    /// The document root key (always present).
    pub const ROOT: Self = Self(0);

    /// Raw numeric value, used in diagnostics.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Mints monotonically increasing keys; key `0` is reserved for the root.
#[derive(Debug, Clone)]
pub struct NodeKeyAllocator {
    counter: u64,
}

impl NodeKeyAllocator {
    /// Create an allocator whose first minted key is `1`.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { counter: 1 }
    }

    /// Mint the next key.
    #[inline]
    pub const fn mint(&mut self) -> NodeKey {
        let key = NodeKey(self.counter);
        self.counter = self.counter.wrapping_add(1);
        key
    }
}

impl Default for NodeKeyAllocator {
    fn default() -> Self {
        Self::new()
    }
}
