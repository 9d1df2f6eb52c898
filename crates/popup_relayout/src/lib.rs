//! Popup overlay detection and repair for rendered pages.
//!
//! This crate finds the top-most mask/content overlay in a live render tree,
//! classifies how it presents, scales and offsets it when it is clipped by the
//! viewport, re-validates the result after layout settles and rolls the patch
//! styles back when validation fails. A per-popup state machine serializes the
//! pipeline while a change feed turns bursts of tree notifications into single
//! re-evaluation signals.

pub mod cancellation;
pub mod change_feed;
/// Statistical fallback scorer for ambiguous candidates
pub mod classifier;
pub mod config;
pub mod decision_tree;
pub mod diagnostics;
pub mod ledger;
pub mod locator;
pub mod orchestrator;
/// Close-button, interactive-element and carousel matching
pub mod patterns;
pub mod popup;
pub mod relayout;
pub mod scheduler;
pub mod state;
pub mod validator;

pub use config::RelayoutConfig;
pub use diagnostics::{Counters, DiagnosticReport};
pub use orchestrator::{PassOutcome, PopupRelayoutContext, ResetReason};
pub use popup::{DecisionTreeType, PopupInfo, StructuralType};
pub use relayout::{RelayoutOutcome, RelayoutReport, Repair, Repairable};
pub use state::LayoutState;
pub use validator::{
    ConstraintReport, ERR_CODE_CLOSE_BTN_OVERLAP, ERR_CODE_EDGE_GAP, ERR_CODE_OK,
    ERR_CODE_OVERFLOW,
};
