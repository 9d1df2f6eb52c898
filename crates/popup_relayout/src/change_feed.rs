//! Collapses bursts of tree notifications into single re-evaluate signals.
//!
//! Records arriving in one turn are flushed together from one microtask and
//! sorted into removal, insertion and attribute buckets. At most one signal is
//! emitted per arm cycle; the state machine re-arms the feed when a pipeline
//! moves on.

use crate::scheduler::{CooperativeScheduler, Task, TimerId};
use core::time::Duration;
use core::{iter, mem};
use log::{debug, trace};
use render_tree::parsers::longest_duration_ms;
use render_tree::walk::contains;
use render_tree::{Display, DocumentProvider, MutationKind, MutationRecord, NodeKey};
use std::collections::HashSet;
use tracing::info_span;

/// Attributes whose change can alter popup detection.
const RESCAN_ATTRIBUTES: [&str; 2] = ["style", "class"];

/// What one flushed batch means for the active popup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSummary {
    /// The cached popup root is no longer attached.
    pub root_removed: bool,
    /// Rendered nodes were inserted under the cached popup root.
    pub dirty: bool,
    /// Something changed that could create or alter a popup.
    pub rescan: bool,
    /// Whether this batch produced the arm cycle's re-evaluate signal.
    pub signal: bool,
    pub removed: Vec<NodeKey>,
    pub added: Vec<NodeKey>,
    pub attributes: Vec<(NodeKey, String)>,
}

#[derive(Debug)]
pub struct ChangeFeed {
    armed: bool,
    pending: Vec<MutationRecord>,
    flush_queued: bool,
    /// Nodes touched by the most recent batch.
    touched: Vec<NodeKey>,
    timers: HashSet<TimerId>,
    signals_emitted: u64,
    timers_purged: u64,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    #[must_use]
    pub fn new() -> Self {
        Self {
            armed: true,
            pending: Vec::new(),
            flush_queued: false,
            touched: Vec::new(),
            timers: HashSet::new(),
            signals_emitted: 0,
            timers_purged: 0,
        }
    }

    /// Buffer raw records; the first record of a turn queues the flush microtask.
    pub fn enqueue(&mut self, records: Vec<MutationRecord>, scheduler: &mut CooperativeScheduler) {
        if records.is_empty() {
            return;
        }
        self.pending.extend(records);
        if !self.flush_queued {
            self.flush_queued = true;
            scheduler.queue_microtask(Task::FlushChanges);
        }
    }

    /// Classify every buffered record against the cached popup root.
    pub fn flush<D: DocumentProvider + ?Sized>(
        &mut self,
        doc: &D,
        active_root: Option<NodeKey>,
    ) -> ChangeSummary {
        let _span = info_span!("popup.change_feed.flush").entered();
        self.flush_queued = false;
        let records = mem::take(&mut self.pending);
        let mut summary = ChangeSummary::default();
        let mut touched: Vec<NodeKey> = Vec::new();
        for record in records {
            touched.push(record.target);
            match record.kind {
                MutationKind::ChildList { added, removed } => {
                    summary.removed.extend(removed);
                    for node in added {
                        touched.push(node);
                        summary.added.push(node);
                    }
                }
                MutationKind::Attribute { name } => {
                    summary.attributes.push((record.target, name));
                }
            }
        }

        summary.root_removed = active_root.is_some_and(|root| !doc.is_attached(root));
        for node in &summary.added {
            let rendered = doc.is_attached(*node)
                && doc
                    .computed_style(*node)
                    .is_ok_and(|style| style.display != Display::None);
            if !rendered {
                continue;
            }
            summary.rescan = true;
            if active_root.is_some_and(|root| contains(doc, root, *node)) {
                summary.dirty = true;
            }
        }
        if summary
            .attributes
            .iter()
            .any(|(_, name)| RESCAN_ATTRIBUTES.contains(&name.as_str()))
        {
            summary.rescan = true;
        }

        touched.sort_unstable();
        touched.dedup();
        self.touched = touched;

        let relevant = summary.root_removed || summary.dirty || summary.rescan;
        if relevant && self.armed {
            self.armed = false;
            summary.signal = true;
            self.signals_emitted = self.signals_emitted.saturating_add(1);
        } else if relevant {
            trace!("change batch coalesced into the pending signal");
        }
        summary
    }

    /// Longest animation or transition on `target` or anything touched by the last batch.
    pub fn animation_delay<D: DocumentProvider + ?Sized>(&self, doc: &D, target: NodeKey) -> Duration {
        let longest = iter::once(target)
            .chain(self.touched.iter().copied())
            .filter_map(|node| doc.computed_style(node).ok())
            .map(|style| {
                longest_duration_ms(&style.animation_duration)
                    .max(longest_duration_ms(&style.transition_duration))
            })
            .fold(0.0_f32, f32::max);
        Duration::from_millis(longest.max(0.0).round() as u64)
    }

    /// Schedule the delayed re-evaluation that follows an animation start.
    pub fn enqueue_animation<D: DocumentProvider + ?Sized>(
        &mut self,
        doc: &D,
        target: NodeKey,
        scheduler: &mut CooperativeScheduler,
    ) -> TimerId {
        let delay = self.animation_delay(doc, target);
        let id = scheduler.set_timeout(delay, Task::ReEvaluate);
        debug!("animation on {target:?}: re-evaluating in {}ms", delay.as_millis());
        self.timers.insert(id);
        id
    }

    /// Forget a timer that fired. Returns whether it was still tracked.
    pub fn timer_fired(&mut self, id: TimerId) -> bool {
        self.timers.remove(&id)
    }

    /// Cancel every tracked hold-off timer.
    pub fn purge_timers(&mut self, scheduler: &mut CooperativeScheduler) -> usize {
        let mut purged = 0_usize;
        for id in self.timers.drain() {
            if scheduler.cancel(id) {
                purged += 1;
            }
        }
        self.timers_purged = self.timers_purged.saturating_add(purged as u64);
        purged
    }

    /// Allow the next relevant batch to signal again.
    pub const fn rearm(&mut self) {
        self.armed = true;
    }

    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.armed
    }

    #[must_use]
    pub fn live_timers(&self) -> usize {
        self.timers.len()
    }

    #[must_use]
    pub const fn signals_emitted(&self) -> u64 {
        self.signals_emitted
    }

    #[must_use]
    pub const fn timers_purged(&self) -> u64 {
        self.timers_purged
    }
}
