//! Per-popup pipeline state machine.
//!
//! Transitions outside the adjacency table are rejected, which is how a
//! reset or resize cleanly interrupts an in-flight validation: its later
//! `Validating` transition simply fails.

use core::mem;
use log::{debug, trace};
use render_tree::NodeKey;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum LayoutState {
    #[default]
    Idle,
    WaitingAnimation,
    Layouting,
    WaitingValidation,
    Validating,
    Completed,
    Restored,
    Failed,
}

impl LayoutState {
    /// A pipeline is in flight.
    #[inline]
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            Self::WaitingAnimation | Self::Layouting | Self::WaitingValidation | Self::Validating
        )
    }

    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Restored | Self::Failed)
    }

    /// Entering this state re-arms the change feed.
    #[inline]
    #[must_use]
    pub const fn rearms_feed(self) -> bool {
        !self.is_terminal()
    }
}

/// Legal transition table.
#[must_use]
pub const fn is_legal(from: LayoutState, to: LayoutState) -> bool {
    use LayoutState::{
        Completed, Failed, Idle, Layouting, Restored, Validating, WaitingAnimation,
        WaitingValidation,
    };
    matches!(
        (from, to),
        (Idle, WaitingAnimation | Layouting | Failed)
            | (WaitingAnimation, Layouting | Idle | Failed)
            | (Layouting, WaitingValidation | Idle | Completed | Failed)
            | (WaitingValidation, Validating | Idle | Failed)
            | (Validating, Completed | Restored | Idle | Failed)
            | (Completed | Restored | Failed, Idle)
    )
}

/// One state per popup root.
#[derive(Debug, Default)]
pub struct StateManager {
    states: HashMap<NodeKey, LayoutState>,
    rearm_pending: bool,
    rejected: u64,
}

impl StateManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of `root`; unknown roots are idle.
    #[must_use]
    pub fn state_of(&self, root: NodeKey) -> LayoutState {
        self.states.get(&root).copied().unwrap_or_default()
    }

    /// Move `root` to `next` if the table allows it.
    pub fn transition(&mut self, root: NodeKey, next: LayoutState) -> bool {
        let current = self.state_of(root);
        if !is_legal(current, next) {
            debug!("rejected transition {current:?} -> {next:?} for {root:?}");
            self.rejected = self.rejected.saturating_add(1);
            return false;
        }
        trace!("{root:?}: {current:?} -> {next:?}");
        self.enter(root, next);
        true
    }

    /// Only idle or animation-held popups may start a pipeline.
    #[must_use]
    pub fn can_start(&self, root: NodeKey) -> bool {
        matches!(
            self.state_of(root),
            LayoutState::Idle | LayoutState::WaitingAnimation
        )
    }

    #[must_use]
    pub fn is_active(&self, root: NodeKey) -> bool {
        self.state_of(root).is_active()
    }

    /// Force every tracked root back to idle and forget them.
    pub fn reset_all(&mut self) {
        self.states.clear();
        self.rearm_pending = true;
    }

    /// Drop bookkeeping for a root that left the tree; it reads as idle afterwards.
    pub fn forget(&mut self, root: NodeKey) {
        if let Some(previous) = self.states.remove(&root) {
            trace!("{root:?}: forgotten while {previous:?}");
        }
    }

    /// Whether a state change asked for the change feed to be re-armed; clears the request.
    pub fn take_rearm(&mut self) -> bool {
        mem::replace(&mut self.rearm_pending, false)
    }

    /// Every tracked root with its state, ordered by key.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(NodeKey, LayoutState)> {
        let mut entries: Vec<(NodeKey, LayoutState)> =
            self.states.iter().map(|(root, state)| (*root, *state)).collect();
        entries.sort_by_key(|(root, _)| *root);
        entries
    }

    /// Number of active pipelines across all roots.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.states.values().filter(|state| state.is_active()).count()
    }

    #[must_use]
    pub const fn rejected_transitions(&self) -> u64 {
        self.rejected
    }

    fn enter(&mut self, root: NodeKey, next: LayoutState) {
        self.states.insert(root, next);
        if next.rearms_feed() {
            self.rearm_pending = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: NodeKey = NodeKey(7);

    /// The happy path walks the table and every step re-arms the feed.
    ///
    /// # Panics
    /// Panics if a legal step is refused.
    #[test]
    fn happy_path_is_legal() {
        let mut states = StateManager::new();
        assert!(states.can_start(ROOT));
        for next in [
            LayoutState::Layouting,
            LayoutState::WaitingValidation,
            LayoutState::Validating,
        ] {
            assert!(states.transition(ROOT, next));
            assert!(states.take_rearm());
        }
        assert!(states.transition(ROOT, LayoutState::Completed));
        assert!(!states.take_rearm());
        assert!(!states.can_start(ROOT));
        assert!(states.transition(ROOT, LayoutState::Idle));
    }

    /// Forgetting a root during the settle wait makes the late validation step illegal.
    ///
    /// # Panics
    /// Panics if the stale transition is accepted.
    #[test]
    fn forget_interrupts_validation() {
        let mut states = StateManager::new();
        assert!(states.transition(ROOT, LayoutState::Layouting));
        assert!(states.transition(ROOT, LayoutState::WaitingValidation));
        assert_eq!(states.active_count(), 1);
        states.forget(ROOT);
        assert!(states.snapshot().is_empty());
        assert_eq!(states.active_count(), 0);
        assert!(!states.transition(ROOT, LayoutState::Validating));
        assert_eq!(states.state_of(ROOT), LayoutState::Idle);
        assert_eq!(states.rejected_transitions(), 1);
    }

    /// Terminal states only lead back to idle.
    ///
    /// # Panics
    /// Panics if a terminal state escapes the table.
    #[test]
    fn terminal_states_only_return_to_idle() {
        for terminal in [
            LayoutState::Completed,
            LayoutState::Restored,
            LayoutState::Failed,
        ] {
            assert!(is_legal(terminal, LayoutState::Idle));
            assert!(!is_legal(terminal, LayoutState::Layouting));
            assert!(!is_legal(terminal, LayoutState::WaitingAnimation));
        }
        assert!(!is_legal(LayoutState::Idle, LayoutState::Validating));
    }
}
