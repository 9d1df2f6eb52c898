//! Cooperative cancellation for asynchronous validation.
//!
//! Each root carries a monotonically increasing generation. Starting a new
//! pass supersedes the previous token; a superseded or cancelled token's
//! completion is dropped instead of racing the newer pass.

use log::trace;
use render_tree::NodeKey;
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

/// Handle owned by one in-flight pass.
#[derive(Clone, Debug)]
pub struct CancellationToken {
    cancelled: Rc<Cell<bool>>,
    generation: u64,
}

impl CancellationToken {
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    #[inline]
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug)]
struct Slot {
    generation: u64,
    flag: Rc<Cell<bool>>,
}

/// Issues tokens per popup root.
#[derive(Debug, Default)]
pub struct CancellationSource {
    slots: HashMap<NodeKey, Slot>,
    superseded: u64,
}

impl CancellationSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new pass for `root`, cancelling the previous one.
    pub fn begin(&mut self, root: NodeKey) -> CancellationToken {
        let flag = Rc::new(Cell::new(false));
        let generation = match self.slots.get(&root) {
            Some(previous) => {
                if !previous.flag.get() {
                    previous.flag.set(true);
                    self.superseded = self.superseded.saturating_add(1);
                    trace!("{root:?}: generation {} superseded", previous.generation);
                }
                previous.generation.saturating_add(1)
            }
            None => 1,
        };
        self.slots.insert(
            root,
            Slot {
                generation,
                flag: Rc::clone(&flag),
            },
        );
        CancellationToken {
            cancelled: flag,
            generation,
        }
    }

    /// Cancel the current pass for `root`, if any.
    pub fn cancel(&mut self, root: NodeKey) {
        if let Some(slot) = self.slots.get(&root) {
            slot.flag.set(true);
        }
    }

    pub fn cancel_all(&mut self) {
        for slot in self.slots.values() {
            slot.flag.set(true);
        }
    }

    /// Whether `generation` is still the live, uncancelled pass for `root`.
    #[must_use]
    pub fn is_current(&self, root: NodeKey, generation: u64) -> bool {
        self.slots
            .get(&root)
            .is_some_and(|slot| slot.generation == generation && !slot.flag.get())
    }

    /// Mark the pass finished so a later `begin` is not counted as superseding it.
    pub fn finish(&mut self, root: NodeKey, generation: u64) {
        if let Some(slot) = self.slots.get(&root).filter(|slot| slot.generation == generation) {
            slot.flag.set(true);
        }
    }

    #[must_use]
    pub const fn superseded(&self) -> u64 {
        self.superseded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A newer pass makes the older token stale.
    ///
    /// # Panics
    /// Panics if the stale token still looks current.
    #[test]
    fn begin_supersedes_previous() {
        let mut source = CancellationSource::new();
        let root = NodeKey(3);
        let first = source.begin(root);
        let second = source.begin(root);
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert!(second.generation() > first.generation());
        assert!(!source.is_current(root, first.generation()));
        assert!(source.is_current(root, second.generation()));
        assert_eq!(source.superseded(), 1);
        source.cancel_all();
        assert!(!source.is_current(root, second.generation()));
    }
}
