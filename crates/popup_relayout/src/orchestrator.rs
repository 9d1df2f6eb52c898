//! Wires detection, repair, validation and change batching around a single
//! active-popup cache.
//!
//! The host constructs one [`PopupRelayoutContext`] over its document,
//! delivers change notifications through [`ChangeSubscriber`], and drives the
//! deferred work with [`PopupRelayoutContext::run_microtasks`] and
//! [`PopupRelayoutContext::advance`]. Nothing here surfaces errors to the
//! host: every pass ends in a [`PassOutcome`] recorded for diagnostics.

use crate::cancellation::CancellationSource;
use crate::change_feed::ChangeFeed;
use crate::config::{RelayoutConfig, frames_to_duration};
use crate::diagnostics::{Counters, DiagnosticReport, StateEntry};
use crate::ledger::PatchLedger;
use crate::locator::locate;
use crate::popup::PopupInfo;
use crate::relayout::{RelayoutOutcome, RelayoutReport, Repair, Repairable as _};
use crate::scheduler::{CooperativeScheduler, Task};
use crate::state::{LayoutState, StateManager};
use crate::validator::{CloseButtonOverlap, ConstraintReport, validate};
use anyhow::Result;
use core::time::Duration;
use log::{debug, info, trace, warn};
use render_tree::walk::contains;
use render_tree::{
    AnimationStart, ChangeSubscriber, DocumentProvider, MutationRecord, NodeKey, StylePort,
};
use serde::Serialize;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::info_span;

/// How one pass (or one deferred step of it) ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PassOutcome {
    /// No popup was found.
    Discarded,
    /// Repairs are disabled or the viewport is outside the breakpoints.
    Gated,
    /// A pipeline for the popup is in flight or held by an animation.
    Busy,
    /// The popup already settled and nothing about it changed.
    Unchanged,
    NoTruncation,
    AlreadyFits,
    PickerSkipped,
    /// Validation runs after the settle wait.
    AwaitingValidation,
    Completed,
    /// Validation failed and the patches were rolled back.
    Restored,
    Failed,
    /// A superseded or cancelled validation was dropped.
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ResetReason {
    /// The viewport changed size; patched styles are rolled back.
    Resize,
    /// The cached popup root left the tree.
    RootRemoved,
    /// The host re-initialised the page; everything is rolled back and forgotten.
    Reinit,
    Manual,
}

/// Data a scheduled validation needs once the settle wait is over.
#[derive(Debug)]
struct PendingValidation {
    popup: Rc<PopupInfo>,
    generation: u64,
    transformed: Vec<NodeKey>,
    sync_check: CloseButtonOverlap,
}

/// Explicit context object owning the host document and every piece of core state.
pub struct PopupRelayoutContext<H: DocumentProvider + StylePort> {
    host: H,
    config: RelayoutConfig,
    repair: Repair,
    active: Option<Rc<PopupInfo>>,
    /// Detection must run again before the cache can be trusted.
    needs_scan: bool,
    /// The active popup's content changed since its last pass.
    dirty: bool,
    states: StateManager,
    tokens: CancellationSource,
    scheduler: CooperativeScheduler,
    feed: ChangeFeed,
    ledgers: HashMap<NodeKey, PatchLedger>,
    pending: HashMap<NodeKey, PendingValidation>,
    last_relayout: Option<RelayoutReport>,
    last_report: Option<ConstraintReport>,
    last_outcome: Option<PassOutcome>,
    counters: Counters,
}

impl<H: DocumentProvider + StylePort> PopupRelayoutContext<H> {
    pub fn new(host: H, config: RelayoutConfig) -> Self {
        let config = config.normalized();
        let frame = frames_to_duration(1, config.frame_interval_ms);
        Self {
            host,
            config,
            repair: Repair::PopupWindowRelayout,
            active: None,
            needs_scan: true,
            dirty: false,
            states: StateManager::new(),
            tokens: CancellationSource::new(),
            scheduler: CooperativeScheduler::new(frame),
            feed: ChangeFeed::new(),
            ledgers: HashMap::new(),
            pending: HashMap::new(),
            last_relayout: None,
            last_report: None,
            last_outcome: None,
            counters: Counters::default(),
        }
    }

    #[inline]
    pub const fn host(&self) -> &H {
        &self.host
    }

    /// Mutable access for the host's own edits; report them through [`ChangeSubscriber`].
    #[inline]
    pub const fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    #[inline]
    pub const fn config(&self) -> &RelayoutConfig {
        &self.config
    }

    /// The cached popup, if any.
    pub fn get_active_popup(&self) -> Option<Rc<PopupInfo>> {
        self.active.as_ref().map(Rc::clone)
    }

    pub fn state_of(&self, root: NodeKey) -> LayoutState {
        self.states.state_of(root)
    }

    /// Roots with a pipeline in flight.
    pub fn active_pipelines(&self) -> usize {
        self.states.active_count()
    }

    pub const fn last_outcome(&self) -> Option<PassOutcome> {
        self.last_outcome
    }

    /// Current virtual time of the scheduler.
    pub const fn now(&self) -> Duration {
        self.scheduler.now()
    }

    /// Detect the top-most popup under `subtree_root`.
    ///
    /// An unchanged tree yields the same cached `Rc`.
    ///
    /// # Errors
    /// Returns an error if a node the walk just visited can no longer be measured.
    pub fn scan(&mut self, subtree_root: NodeKey) -> Result<Option<Rc<PopupInfo>>> {
        let _span = info_span!("popup.scan", root = subtree_root.raw()).entered();
        self.counters.scans += 1;
        let fresh = self
            .active
            .as_ref()
            .filter(|cached| !self.needs_scan && self.host.is_attached(cached.root))
            .map(Rc::clone);
        if let Some(cached) = fresh {
            self.counters.cache_hits += 1;
            return Ok(Some(cached));
        }

        let found = locate(&self.host, subtree_root, &self.config)?;
        self.needs_scan = false;
        let Some(info) = found else {
            // An in-flight pipeline keeps its popup until it settles.
            let keep = self.active.as_ref().is_some_and(|cached| {
                self.states.is_active(cached.root) && self.host.is_attached(cached.root)
            });
            if keep {
                return Ok(self.get_active_popup());
            }
            if let Some(previous) = self.active.take() {
                debug!("popup {:?} no longer detected", previous.root);
            }
            return Ok(None);
        };

        let unchanged = self
            .active
            .as_ref()
            .filter(|cached| PopupInfo::eq(cached, &info))
            .map(Rc::clone);
        if let Some(cached) = unchanged {
            self.counters.cache_hits += 1;
            return Ok(Some(cached));
        }
        if let Some(previous) = self.active.as_ref().filter(|cached| !cached.same_identity(&info)) {
            debug!("active popup moved from {:?} to {:?}", previous.root, info.root);
        }
        let info = Rc::new(info);
        self.active = Some(Rc::clone(&info));
        Ok(Some(info))
    }

    /// Flag `node` as changed. Returns whether it belongs to the active popup.
    pub fn mark_dirty(&mut self, node: NodeKey) -> bool {
        self.needs_scan = true;
        let owned = self
            .active
            .as_ref()
            .is_some_and(|popup| contains(&self.host, popup.root, node));
        if owned {
            self.dirty = true;
        }
        owned
    }

    /// Force every pipeline back to idle.
    ///
    /// Resize and reinit roll patched styles back first; root removal only
    /// forgets the cached popup. In-flight validations are not aborted, their
    /// tokens are cancelled so they drop themselves when they fire.
    pub fn reset(&mut self, reason: ResetReason) {
        info!("popup relayout reset: {reason:?}");
        self.counters.resets += 1;
        let purged = self.feed.purge_timers(&mut self.scheduler);
        if purged > 0 {
            trace!("purged {purged} hold-off timers");
        }
        match reason {
            ResetReason::RootRemoved => {
                if let Some(popup) = self.active.take() {
                    self.tokens.cancel(popup.root);
                    self.ledgers.remove(&popup.root);
                    self.pending.remove(&popup.root);
                    self.states.forget(popup.root);
                }
                self.dirty = false;
            }
            ResetReason::Resize | ResetReason::Reinit => {
                self.tokens.cancel_all();
                let roots: Vec<NodeKey> = self.ledgers.keys().copied().collect();
                for root in roots {
                    self.restore_root(root);
                }
                self.states.reset_all();
                if reason == ResetReason::Reinit {
                    self.active = None;
                    self.ledgers.clear();
                    self.dirty = false;
                } else {
                    self.dirty = true;
                }
            }
            ResetReason::Manual => {
                self.tokens.cancel_all();
                self.states.reset_all();
            }
        }
        self.needs_scan = true;
        self.feed.rearm();
    }

    /// Run queued microtasks until the queue is empty. Returns how many ran.
    pub fn run_microtasks(&mut self) -> usize {
        let mut ran = 0_usize;
        while let Some(task) = self.scheduler.pop_microtask() {
            self.run_task(task, false);
            ran += 1;
        }
        ran
    }

    /// Move virtual time forward by `elapsed`, firing due timers in order.
    pub fn advance(&mut self, elapsed: Duration) {
        let limit = self.scheduler.now().saturating_add(elapsed);
        self.run_microtasks();
        while let Some((id, task)) = self.scheduler.pop_due(limit) {
            if task == Task::ReEvaluate {
                self.feed.timer_fired(id);
            }
            self.run_task(task, true);
            self.run_microtasks();
        }
        self.scheduler.set_now(limit);
    }

    /// Snapshot for tooling.
    pub fn diagnostics(&self) -> DiagnosticReport {
        let mut counters = self.counters;
        counters.signals_emitted = self.feed.signals_emitted();
        counters.timers_purged = self.feed.timers_purged();
        counters.rejected_transitions = self.states.rejected_transitions();
        counters.superseded_tokens = self.tokens.superseded();
        DiagnosticReport {
            active_popup: self.active.as_deref().cloned(),
            states: self
                .states
                .snapshot()
                .into_iter()
                .map(|(root, state)| StateEntry { root, state })
                .collect(),
            last_relayout: self.last_relayout.clone(),
            last_report: self.last_report.clone(),
            last_outcome: self.last_outcome,
            counters,
            now_ms: self.scheduler.now().as_secs_f64() * 1000.0,
            pending_timers: self.scheduler.pending_timers(),
        }
    }

    fn run_task(&mut self, task: Task, from_timer: bool) {
        let outcome = match task {
            Task::FlushChanges => {
                self.flush_changes();
                None
            }
            Task::ReEvaluate => Some(self.re_evaluate(from_timer)),
            Task::Validate { root, generation } => Some(self.run_validation(root, generation)),
        };
        if let Some(outcome) = outcome {
            debug!("pass outcome: {outcome:?}");
            self.last_outcome = Some(outcome);
        }
        let requested = self.states.take_rearm();
        if requested || task == Task::ReEvaluate {
            self.feed.rearm();
        }
    }

    fn flush_changes(&mut self) {
        let active_root = self.active.as_ref().map(|popup| popup.root);
        let summary = self.feed.flush(&self.host, active_root);
        if summary.root_removed {
            self.reset(ResetReason::RootRemoved);
        }
        if summary.dirty {
            self.dirty = true;
        }
        if summary.dirty || summary.rescan || summary.root_removed {
            self.needs_scan = true;
        }
        if summary.signal {
            self.scheduler.queue_microtask(Task::ReEvaluate);
        }
    }

    fn re_evaluate(&mut self, from_timer: bool) -> PassOutcome {
        let previous = self.get_active_popup();
        let subtree = self.host.root();
        let popup = match self.scan(subtree) {
            Ok(Some(popup)) => popup,
            Ok(None) => return PassOutcome::Discarded,
            Err(err) => {
                warn!("popup scan failed: {err:#}");
                return PassOutcome::Discarded;
            }
        };
        let root = popup.root;
        let state = self.states.state_of(root);
        if state == LayoutState::WaitingAnimation && (!from_timer || self.feed.live_timers() > 0) {
            trace!("popup {root:?} held until its animations end");
            return PassOutcome::Busy;
        }
        let changed = self.dirty || previous.is_none_or(|prev| !Rc::ptr_eq(&prev, &popup));
        if state.is_terminal() {
            if !changed {
                return PassOutcome::Unchanged;
            }
            self.states.transition(root, LayoutState::Idle);
        }
        self.run_pipeline(&popup)
    }

    fn run_pipeline(&mut self, popup: &Rc<PopupInfo>) -> PassOutcome {
        let root = popup.root;
        if !self.config.enabled || !self.config.breakpoints.contains(self.host.viewport()) {
            debug!("popup {root:?}: repairs gated for this viewport");
            if self.states.state_of(root) == LayoutState::WaitingAnimation {
                self.states.transition(root, LayoutState::Idle);
            }
            return PassOutcome::Gated;
        }
        if !self.states.can_start(root) {
            trace!("popup {root:?} busy in {:?}", self.states.state_of(root));
            return PassOutcome::Busy;
        }
        self.dirty = false;
        self.counters.passes_started += 1;
        let token = self.tokens.begin(root);
        let generation = token.generation();

        // Measure the unpatched page.
        self.restore_root(root);
        if !self.states.transition(root, LayoutState::Layouting) {
            self.tokens.finish(root, generation);
            return PassOutcome::Busy;
        }
        let result = {
            let ledger = self.ledgers.entry(root).or_default();
            self.repair
                .repair(&mut self.host, popup, &self.config, ledger)
        };
        let report = match result {
            Ok(report) => report,
            Err(err) => {
                warn!("relayout of {root:?} failed: {err:#}");
                self.states.transition(root, LayoutState::Failed);
                self.restore_root(root);
                self.tokens.finish(root, generation);
                self.counters.passes_failed += 1;
                return PassOutcome::Failed;
            }
        };

        let applied = report.outcome == RelayoutOutcome::Applied && !report.transformed.is_empty();
        if applied || report.close_button_check.flagged {
            self.states.transition(root, LayoutState::WaitingValidation);
            self.scheduler
                .after_frames(self.config.settle_frames, Task::Validate { root, generation });
            debug!(
                "popup {root:?}: validating generation {generation} in {}ms",
                self.config.settle_delay().as_millis()
            );
            self.pending.insert(
                root,
                PendingValidation {
                    popup: Rc::clone(popup),
                    generation,
                    transformed: report.transformed.clone(),
                    sync_check: report.close_button_check,
                },
            );
            self.last_relayout = Some(report);
            return PassOutcome::AwaitingValidation;
        }

        self.states.transition(root, LayoutState::Completed);
        self.tokens.finish(root, generation);
        self.counters.passes_completed += 1;
        let outcome = match report.outcome {
            RelayoutOutcome::NoTruncation => PassOutcome::NoTruncation,
            RelayoutOutcome::AlreadyFits => PassOutcome::AlreadyFits,
            RelayoutOutcome::PickerSkipped => PassOutcome::PickerSkipped,
            RelayoutOutcome::Applied => PassOutcome::Completed,
        };
        self.last_relayout = Some(report);
        outcome
    }

    fn run_validation(&mut self, root: NodeKey, generation: u64) -> PassOutcome {
        let owned = self
            .pending
            .get(&root)
            .is_some_and(|pending| pending.generation == generation);
        let pending = if owned { self.pending.remove(&root) } else { None };
        let Some(pending) = pending.filter(|_| self.tokens.is_current(root, generation)) else {
            trace!("validation of {root:?} generation {generation} is stale; dropped");
            self.counters.stale_dropped += 1;
            return PassOutcome::Stale;
        };
        if !self.host.is_attached(root) || !self.states.transition(root, LayoutState::Validating) {
            trace!("validation of {root:?} interrupted");
            self.counters.stale_dropped += 1;
            self.tokens.finish(root, generation);
            return PassOutcome::Stale;
        }

        let result = validate(
            &self.host,
            &pending.popup,
            &pending.transformed,
            &pending.sync_check,
            &self.config,
        );
        let outcome = match result {
            Ok(report) if report.passed() => {
                self.states.transition(root, LayoutState::Completed);
                self.counters.passes_completed += 1;
                self.last_report = Some(report);
                PassOutcome::Completed
            }
            Ok(report) => {
                info!(
                    "popup {root:?} failed validation ({}): {}",
                    report.result_code, report.message
                );
                self.restore_root(root);
                self.states.transition(root, LayoutState::Restored);
                self.counters.passes_restored += 1;
                self.last_report = Some(report);
                PassOutcome::Restored
            }
            Err(err) => {
                warn!("validation of {root:?} failed: {err:#}");
                self.restore_root(root);
                self.states.transition(root, LayoutState::Failed);
                self.counters.passes_failed += 1;
                PassOutcome::Failed
            }
        };
        self.tokens.finish(root, generation);
        outcome
    }

    /// Best-effort rollback of every patch recorded for `root`.
    fn restore_root(&mut self, root: NodeKey) {
        let Some(ledger) = self.ledgers.get_mut(&root) else {
            return;
        };
        match self.repair.restore_styles(&mut self.host, ledger) {
            Ok(0) => {}
            Ok(count) => debug!("restored {count} patched properties on {root:?}"),
            Err(err) => warn!("style restore for {root:?} failed: {err:#}"),
        }
    }
}

impl<H: DocumentProvider + StylePort> ChangeSubscriber for PopupRelayoutContext<H> {
    fn on_mutation_batch(&mut self, records: Vec<MutationRecord>) {
        self.feed.enqueue(records, &mut self.scheduler);
    }

    /// Hold the owning popup until the longest running animation ends.
    ///
    /// With no popup cached the delayed re-evaluation still runs, since an
    /// entering popup usually animates in.
    fn on_animation_start(&mut self, event: AnimationStart) {
        if let Some(popup) = self.active.as_ref() {
            let root = popup.root;
            if !contains(&self.host, root, event.target) {
                trace!("animation on {:?} outside the active popup", event.target);
                return;
            }
            match self.states.state_of(root) {
                LayoutState::Idle => {
                    self.states.transition(root, LayoutState::WaitingAnimation);
                }
                LayoutState::WaitingAnimation => {}
                other => {
                    trace!("animation on {root:?} ignored while {other:?}");
                    return;
                }
            }
        }
        self.feed
            .enqueue_animation(&self.host, event.target, &mut self.scheduler);
        if self.states.take_rearm() {
            self.feed.rearm();
        }
    }
}
