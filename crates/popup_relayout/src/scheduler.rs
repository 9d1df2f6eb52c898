use core::time::Duration;
use render_tree::NodeKey;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Deferred work understood by the orchestrator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Task {
    /// Drain the batched mutation records.
    FlushChanges,
    /// Re-run detection and, if allowed, a repair pass.
    ReEvaluate,
    /// Validate the repair of `root` started under `generation`.
    Validate { root: NodeKey, generation: u64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TimerId(pub u64);

/// Deterministic single-threaded scheduler with a virtual clock.
///
/// Microtasks run before any timer; timers fire in due order, ties broken by
/// registration order. Frame waits are timers of `frames x frame interval`.
#[derive(Debug)]
pub struct CooperativeScheduler {
    now: Duration,
    frame_interval: Duration,
    microtasks: VecDeque<Task>,
    /// Ordered by `(due, sequence)`.
    timers: BTreeMap<(Duration, u64), (TimerId, Task)>,
    /// Live timer id -> queue key.
    live: HashMap<TimerId, (Duration, u64)>,
    next_sequence: u64,
}

impl CooperativeScheduler {
    #[must_use]
    pub fn new(frame_interval: Duration) -> Self {
        Self {
            now: Duration::ZERO,
            frame_interval,
            microtasks: VecDeque::new(),
            timers: BTreeMap::new(),
            live: HashMap::new(),
            next_sequence: 0,
        }
    }

    /// Current virtual time.
    #[inline]
    #[must_use]
    pub const fn now(&self) -> Duration {
        self.now
    }

    pub fn queue_microtask(&mut self, task: Task) {
        self.microtasks.push_back(task);
    }

    pub fn pop_microtask(&mut self) -> Option<Task> {
        self.microtasks.pop_front()
    }

    /// Run `task` after `delay`.
    pub fn set_timeout(&mut self, delay: Duration, task: Task) -> TimerId {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.saturating_add(1);
        let id = TimerId(sequence);
        let key = (self.now.saturating_add(delay), sequence);
        self.timers.insert(key, (id, task));
        self.live.insert(id, key);
        id
    }

    /// Run `task` after `frames` animation frames.
    pub fn after_frames(&mut self, frames: u32, task: Task) -> TimerId {
        self.set_timeout(self.frame_interval.saturating_mul(frames), task)
    }

    /// Cancel a pending timer. Returns `false` if it already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.live
            .remove(&id)
            .and_then(|key| self.timers.remove(&key))
            .is_some()
    }

    /// Pop the earliest timer due at or before `limit`, moving the clock to its due time.
    pub fn pop_due(&mut self, limit: Duration) -> Option<(TimerId, Task)> {
        let (&(due, sequence), _) = self.timers.first_key_value()?;
        if due > limit {
            return None;
        }
        let (id, task) = self.timers.remove(&(due, sequence))?;
        self.live.remove(&id);
        self.now = self.now.max(due);
        Some((id, task))
    }

    /// Move the clock forward without running anything.
    pub fn set_now(&mut self, now: Duration) {
        self.now = self.now.max(now);
    }

    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    #[must_use]
    pub fn pending_microtasks(&self) -> usize {
        self.microtasks.len()
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.microtasks.is_empty() && self.timers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Timers fire in due order and cancelled ones never fire.
    ///
    /// # Panics
    /// Panics if ordering or cancellation is wrong.
    #[test]
    fn timers_fire_in_due_order() {
        let mut scheduler = CooperativeScheduler::new(Duration::from_millis(16));
        let late = scheduler.set_timeout(Duration::from_millis(100), Task::ReEvaluate);
        let validate = Task::Validate {
            root: NodeKey(1),
            generation: 1,
        };
        scheduler.after_frames(2, validate);
        let dropped = scheduler.set_timeout(Duration::from_millis(50), Task::FlushChanges);
        assert!(scheduler.cancel(dropped));
        assert!(!scheduler.cancel(dropped));

        let limit = Duration::from_millis(200);
        assert_eq!(scheduler.pop_due(limit).map(|(_, task)| task), Some(validate));
        assert_eq!(scheduler.now(), Duration::from_millis(32));
        assert_eq!(
            scheduler.pop_due(limit),
            Some((late, Task::ReEvaluate))
        );
        assert!(scheduler.pop_due(limit).is_none());
        assert!(scheduler.is_idle());
    }
}
