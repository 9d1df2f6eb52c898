//! Independent re-measurement of a repaired popup against hard constraints.
//!
//! Two checks run after the settle wait: the gap between the repaired box and
//! the safe viewport edges, and whether any interactive element overflows the
//! safe viewport. A third check runs synchronously during relayout and is
//! folded in first.

use crate::config::RelayoutConfig;
use crate::patterns::{find_close_buttons, is_carousel, is_interactive};
use crate::popup::PopupInfo;
use anyhow::Result;
use log::debug;
use render_tree::walk::{Visit, ancestors, collect};
use render_tree::{Display, DocumentProvider, Geometry, NodeKey, Position};
use serde::Serialize;
use serde_json::json;
use std::time::Instant;
use tracing::info_span;

pub const ERR_CODE_OK: i32 = 0;
pub const ERR_CODE_EDGE_GAP: i32 = 1001;
pub const ERR_CODE_OVERFLOW: i32 = 1002;
pub const ERR_CODE_CLOSE_BTN_OVERLAP: i32 = 1003;

/// Outcome of one validation pass.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintReport {
    pub result_code: i32,
    pub message: String,
    pub duration_ms: f64,
    pub report: serde_json::Value,
}

impl ConstraintReport {
    #[inline]
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.result_code == ERR_CODE_OK
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct EdgeGaps {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EdgeGapResult {
    pub passed: bool,
    pub gaps: EdgeGaps,
    pub minimum: f32,
}

/// One interactive element outside the safe viewport.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OverflowItem {
    pub node: NodeKey,
    pub directions: Vec<&'static str>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverflowResult {
    pub total: usize,
    pub overflow_count: usize,
    pub overflow_rate: f32,
    pub items: Vec<OverflowItem>,
}

impl OverflowResult {
    #[inline]
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.overflow_count == 0
    }
}

/// Synchronous check for a close button that drifted out of its parent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CloseButtonOverlap {
    pub flagged: bool,
    pub button: Option<NodeKey>,
}

fn safe_bounds<D: DocumentProvider + ?Sized>(doc: &D) -> Geometry {
    doc.viewport().bounds().inset(&doc.safe_area())
}

/// Gaps between the repaired box and the safe viewport.
///
/// The box is the union of the transformed nodes, or the popup root when none.
///
/// # Errors
/// Returns an error if the measured nodes are gone.
pub fn check_edge_gap<D: DocumentProvider + ?Sized>(
    doc: &D,
    popup: &PopupInfo,
    transformed: &[NodeKey],
    config: &RelayoutConfig,
) -> Result<EdgeGapResult> {
    let mut repaired: Option<Geometry> = None;
    for node in transformed {
        if !doc.is_attached(*node) {
            continue;
        }
        let rect = doc.geometry(*node)?;
        repaired = Some(repaired.map_or(rect, |acc| acc.union(&rect)));
    }
    let rect = match repaired {
        Some(rect) => rect,
        None => doc.geometry(popup.root)?,
    };
    let safe = safe_bounds(doc);
    let gaps = EdgeGaps {
        top: rect.top - safe.top,
        right: safe.right() - rect.right(),
        bottom: safe.bottom() - rect.bottom(),
        left: rect.left - safe.left,
    };
    let minimum = config.edge_gap_min_px;
    let passed = [gaps.top, gaps.right, gaps.bottom, gaps.left]
        .iter()
        .all(|gap| *gap >= minimum);
    Ok(EdgeGapResult {
        passed,
        gaps,
        minimum,
    })
}

/// Inside a scroller or a carousel, where off-screen positions are expected.
///
/// Only ancestors up to and including the popup root count; a scrolling page
/// behind the popup does not hide its controls.
fn is_excluded<D: DocumentProvider + ?Sized>(
    doc: &D,
    popup: &PopupInfo,
    node: NodeKey,
    config: &RelayoutConfig,
) -> bool {
    let chain = ancestors(doc, node);
    let within = chain
        .iter()
        .position(|ancestor| *ancestor == popup.root)
        .map_or(chain.len(), |index| index + 1);
    chain.iter().take(within).any(|ancestor| {
        doc.computed_style(*ancestor)
            .is_ok_and(|style| style.is_scroll_container())
            || is_carousel(doc, *ancestor, config)
    })
}

/// Interactive elements under the popup root that leave the safe viewport.
///
/// # Errors
/// Returns an error if a collected element cannot be measured.
pub fn check_interactive_overflow<D: DocumentProvider + ?Sized>(
    doc: &D,
    popup: &PopupInfo,
    config: &RelayoutConfig,
) -> Result<OverflowResult> {
    let interactive = collect(doc, popup.root, true, |node| match doc.computed_style(node) {
        Ok(style) if style.display == Display::None => Visit::SkipSubtree,
        Ok(style) if style.is_visible() && is_interactive(doc, node, config) => Visit::Accept,
        Ok(_) => Visit::Reject,
        Err(_) => Visit::SkipSubtree,
    });
    let safe = safe_bounds(doc);
    let mut result = OverflowResult::default();
    for node in interactive {
        if is_excluded(doc, popup, node, config) {
            continue;
        }
        let rect = doc.geometry(node)?;
        if rect.is_empty() {
            continue;
        }
        result.total += 1;
        let mut directions = Vec::new();
        if rect.top.round() < safe.top.round() {
            directions.push("top");
        }
        if rect.right().round() > safe.right().round() {
            directions.push("right");
        }
        if rect.bottom().round() > safe.bottom().round() {
            directions.push("bottom");
        }
        if rect.left.round() < safe.left.round() {
            directions.push("left");
        }
        if !directions.is_empty() {
            result.items.push(OverflowItem { node, directions });
        }
    }
    result.overflow_count = result.items.len();
    if result.total > 0 {
        result.overflow_rate = result.overflow_count as f32 / result.total as f32 * 100.0;
    }
    Ok(result)
}

/// A sole absolute close button with a negative bottom offset hanging below
/// its parent's vertical midpoint.
///
/// # Errors
/// Returns an error if the button or its parent cannot be measured.
pub fn check_close_button_overlap<D: DocumentProvider + ?Sized>(
    doc: &D,
    popup: &PopupInfo,
    config: &RelayoutConfig,
) -> Result<CloseButtonOverlap> {
    let buttons = find_close_buttons(doc, popup.root, config);
    let [button] = buttons.as_slice() else {
        return Ok(CloseButtonOverlap::default());
    };
    let style = doc.computed_style(*button)?;
    let negative_bottom = style.inset.bottom.is_some_and(|offset| offset < 0.0);
    if style.position != Position::Absolute || !negative_bottom {
        return Ok(CloseButtonOverlap::default());
    }
    let Some(parent) = doc.parent(*button) else {
        return Ok(CloseButtonOverlap::default());
    };
    let rect = doc.geometry(*button)?;
    let parent_rect = doc.geometry(parent)?;
    let flagged = rect.top > parent_rect.center_y();
    Ok(CloseButtonOverlap {
        flagged,
        button: flagged.then_some(*button),
    })
}

/// Run the deferred checks and fold in the synchronous one.
///
/// # Errors
/// Returns an error if the popup can no longer be measured.
pub fn validate<D: DocumentProvider + ?Sized>(
    doc: &D,
    popup: &PopupInfo,
    transformed: &[NodeKey],
    sync_report: &CloseButtonOverlap,
    config: &RelayoutConfig,
) -> Result<ConstraintReport> {
    let _span = info_span!("popup.validate", root = popup.root.raw()).entered();
    let started = Instant::now();
    let edge_gap = check_edge_gap(doc, popup, transformed, config)?;
    let overflow = check_interactive_overflow(doc, popup, config)?;
    let (result_code, message) = if sync_report.flagged {
        (ERR_CODE_CLOSE_BTN_OVERLAP, "close button overlaps its container")
    } else if !edge_gap.passed {
        (ERR_CODE_EDGE_GAP, "popup too close to the viewport edge")
    } else if !overflow.passed() {
        (ERR_CODE_OVERFLOW, "interactive element outside the viewport")
    } else {
        (ERR_CODE_OK, "ok")
    };
    let report = json!({
        "root": popup.root,
        "transformed": transformed,
        "closeButton": sync_report,
        "edgeGap": edge_gap,
        "overflow": overflow,
    });
    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
    debug!("validated popup {:?}: code {result_code}", popup.root);
    Ok(ConstraintReport {
        result_code,
        message: message.to_owned(),
        duration_ms,
        report,
    })
}
