//! Geometry-driven repair of clipped popups.
//!
//! A pass finds the content nodes cut off by the visible band, computes one
//! uniform scale for the whole popup, and writes `translate(..) scale(..)`
//! patches on the popup's top-most sibling group so the scaled content lands
//! centred (or pinned to the bottom for bottom sheets). Every write goes
//! through the [`PatchLedger`] and the batch is flushed once.

use crate::config::RelayoutConfig;
use crate::decision_tree::classify;
use crate::ledger::PatchLedger;
use crate::patterns::{contains_close_pattern, find_close_buttons};
use crate::popup::{DecisionTreeType, PopupInfo, StructuralType};
use crate::validator::{CloseButtonOverlap, check_close_button_overlap};
use anyhow::Result;
use log::{debug, trace};
use render_tree::stacking::resolved_z_index;
use render_tree::walk::{ancestors, child_towards, contains, precedes};
use render_tree::{
    ComputedStyle, Display, DocumentProvider, EdgeInsets, Geometry, NodeKey, StylePort,
};
use serde::Serialize;
use tracing::info_span;

/// Slack below the effective bottom before a node counts as truncated.
const BOTTOM_TOLERANCE_PX: f32 = 2.0;

/// Capability shared by every repair strategy.
pub trait Repairable {
    /// Run one repair pass over `popup`, recording every write in `ledger`.
    ///
    /// # Errors
    /// Returns an error if a node of the popup disappears mid-pass or the
    /// style batch cannot be flushed.
    fn repair<H>(
        &self,
        host: &mut H,
        popup: &PopupInfo,
        config: &RelayoutConfig,
        ledger: &mut PatchLedger,
    ) -> Result<RelayoutReport>
    where
        H: DocumentProvider + StylePort + ?Sized;

    /// Put every tracked property back to its pre-patch value.
    ///
    /// # Errors
    /// Returns an error if the restore batch cannot be flushed.
    fn restore_styles<H>(&self, host: &mut H, ledger: &mut PatchLedger) -> Result<usize>
    where
        H: DocumentProvider + StylePort + ?Sized,
    {
        ledger.restore_styles(host)
    }
}

/// Closed set of repair strategies, dispatched by tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Repair {
    PopupWindowRelayout,
}

impl Repairable for Repair {
    fn repair<H>(
        &self,
        host: &mut H,
        popup: &PopupInfo,
        config: &RelayoutConfig,
        ledger: &mut PatchLedger,
    ) -> Result<RelayoutReport>
    where
        H: DocumentProvider + StylePort + ?Sized,
    {
        match self {
            Self::PopupWindowRelayout => popup_window_relayout(host, popup, config, ledger),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RelayoutOutcome {
    /// Nothing is cut off.
    NoTruncation,
    /// The computed scale exceeds 1; the content fits once unclipped.
    AlreadyFits,
    /// Pickers are never scaled.
    PickerSkipped,
    /// Transforms were written and flushed.
    Applied,
}

/// Result of one relayout pass.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RelayoutReport {
    pub outcome: RelayoutOutcome,
    pub archetype: Option<DecisionTreeType>,
    pub truncated: Vec<NodeKey>,
    pub scale: Option<f32>,
    /// Nodes that received a transform patch.
    pub transformed: Vec<NodeKey>,
    pub close_button_truncated_by_scroll: bool,
    /// Synchronous close-button check on the unpatched page, taken on every pass.
    pub close_button_check: CloseButtonOverlap,
}

impl RelayoutReport {
    fn early(
        outcome: RelayoutOutcome,
        truncated: Vec<NodeKey>,
        forced: bool,
        close_button_check: CloseButtonOverlap,
    ) -> Self {
        Self {
            outcome,
            archetype: None,
            truncated,
            scale: None,
            transformed: Vec::new(),
            close_button_truncated_by_scroll: forced,
            close_button_check,
        }
    }
}

/// Visible vertical band, net of sticky bars.
#[derive(Clone, Copy, Debug)]
struct Band {
    top: f32,
    bottom: f32,
}

impl Band {
    fn for_popup(popup: &PopupInfo, viewport_height: f32) -> Self {
        Self {
            top: popup.sticky_top_height,
            bottom: viewport_height - popup.sticky_bottom_height,
        }
    }

    fn height(self) -> f32 {
        (self.bottom - self.top).max(0.0)
    }

    fn cuts(self, content: &Geometry) -> bool {
        !content.is_empty()
            && (content.top < self.top || content.bottom() > self.bottom + BOTTOM_TOLERANCE_PX)
    }
}

#[derive(Debug, Default)]
struct Truncation {
    nodes: Vec<NodeKey>,
    /// Scroll containers whose overflow must become visible.
    unclipped: Vec<NodeKey>,
}

/// Border box minus padding and border.
fn content_box(rect: &Geometry, style: &ComputedStyle) -> Geometry {
    let scale = style.transform.scale.abs();
    rect.inset(&EdgeInsets {
        top: (style.padding.top + style.border_width.top) * scale,
        right: (style.padding.right + style.border_width.right) * scale,
        bottom: (style.padding.bottom + style.border_width.bottom) * scale,
        left: (style.padding.left + style.border_width.left) * scale,
    })
}

fn is_cut<D: DocumentProvider + ?Sized>(doc: &D, node: NodeKey, band: Band) -> Result<bool> {
    let style = doc.computed_style(node)?;
    if !style.is_visible() {
        return Ok(false);
    }
    Ok(band.cuts(&content_box(&doc.geometry(node)?, &style)))
}

/// Truncated descendants of a scroll container (exclusive).
fn cut_inside<D: DocumentProvider + ?Sized>(
    doc: &D,
    container: NodeKey,
    band: Band,
) -> Result<Vec<NodeKey>> {
    let mut found = Vec::new();
    let mut stack: Vec<NodeKey> = doc.children(container).into_iter().rev().collect();
    while let Some(node) = stack.pop() {
        let Ok(style) = doc.computed_style(node) else {
            continue;
        };
        if style.display == Display::None {
            continue;
        }
        if is_cut(doc, node, band)? {
            found.push(node);
        }
        stack.extend(doc.children(node).into_iter().rev());
    }
    Ok(found)
}

/// Walk the group subtrees for nodes cut by `band`.
fn find_truncated<D: DocumentProvider + ?Sized>(
    doc: &D,
    group: &[NodeKey],
    band: Band,
    config: &RelayoutConfig,
) -> Result<Truncation> {
    let mut truncation = Truncation::default();
    let mut stack: Vec<NodeKey> = group.iter().rev().copied().collect();
    while let Some(node) = stack.pop() {
        let Ok(style) = doc.computed_style(node) else {
            continue;
        };
        if style.display == Display::None {
            continue;
        }
        if is_cut(doc, node, band)? && !truncation.nodes.contains(&node) {
            truncation.nodes.push(node);
        }
        if style.is_scroll_container() {
            let inner = cut_inside(doc, node, band)?;
            if !inner.is_empty() && contains_close_pattern(doc, node, config) {
                trace!("close button clipped by scroller {node:?}; unclipping");
                truncation.unclipped.push(node);
                truncation.nodes.extend(inner);
            }
            continue;
        }
        stack.extend(doc.children(node).into_iter().rev());
    }
    Ok(truncation)
}

/// Top-most sibling group that receives the transforms.
fn select_group<D: DocumentProvider + ?Sized>(doc: &D, popup: &PopupInfo) -> Vec<NodeKey> {
    let (pool, baseline, expand_wrappers) = match popup.structural_type {
        StructuralType::A => (doc.children(popup.mask), -1, false),
        StructuralType::B => {
            let anchor = child_towards(doc, popup.root, popup.mask).unwrap_or(popup.mask);
            let siblings = doc
                .children(popup.root)
                .into_iter()
                .filter(|node| *node != anchor)
                .collect();
            (siblings, popup.mask_z_index, true)
        }
        StructuralType::C => (doc.children(popup.root), -1, false),
    };
    let mut worklist: Vec<NodeKey> = pool.into_iter().rev().collect();
    let mut group = Vec::new();
    while let Some(node) = worklist.pop() {
        let Ok(style) = doc.computed_style(node) else {
            continue;
        };
        if style.display == Display::None {
            continue;
        }
        let Ok(rect) = doc.geometry(node) else {
            continue;
        };
        if rect.is_empty() {
            if expand_wrappers && style.position.is_out_of_flow() {
                worklist.extend(doc.children(node).into_iter().rev());
            }
            continue;
        }
        let z_index = resolved_z_index(&style);
        let above = z_index > baseline
            || (z_index == baseline && !precedes(doc, node, popup.mask));
        if above {
            group.push(node);
        }
    }
    if group.is_empty() {
        vec![popup.content]
    } else {
        group
    }
}

/// Vertical extent of `node` and its descendants, not entering nested scrollers.
fn vertical_span<D: DocumentProvider + ?Sized>(doc: &D, node: NodeKey) -> Result<(f32, f32)> {
    let own = doc.geometry(node)?;
    let mut top = own.top;
    let mut bottom = own.bottom();
    let mut stack = doc.children(node);
    while let Some(step) = stack.pop() {
        let Ok(style) = doc.computed_style(step) else {
            continue;
        };
        if style.display == Display::None {
            continue;
        }
        let rect = doc.geometry(step)?;
        if style.is_visible() && !rect.is_empty() {
            top = top.min(rect.top);
            bottom = bottom.max(rect.bottom());
        }
        if !style.is_scroll_container() {
            stack.extend(doc.children(step));
        }
    }
    Ok((top, bottom))
}

/// Product of the transform scales of every ancestor of `node`.
fn inherited_scale<D: DocumentProvider + ?Sized>(doc: &D, node: NodeKey) -> f32 {
    ancestors(doc, node)
        .into_iter()
        .filter_map(|ancestor| doc.computed_style(ancestor).ok())
        .map(|style| style.transform.scale)
        .filter(|scale| scale.abs() > f32::EPSILON)
        .product()
}

fn compose_transform(prefix: &str, existing: &str) -> String {
    let existing = existing.trim();
    if existing.is_empty() || existing.eq_ignore_ascii_case("none") {
        prefix.to_owned()
    } else {
        format!("{prefix} {existing}")
    }
}

/// Where a point at `coordinate` lands after scaling about `pivot` and shifting by `shift`.
fn land(coordinate: f32, pivot: f32, shift: f32, scale: f32) -> f32 {
    pivot + shift + (coordinate - pivot) * scale
}

/// Scale and offset shared by every group member.
#[derive(Clone, Copy, Debug)]
struct Placement {
    scale: f32,
    pivot_x: f32,
    pivot_y: f32,
    shift_x: f32,
    shift_y: f32,
}

fn popup_window_relayout<H>(
    host: &mut H,
    popup: &PopupInfo,
    config: &RelayoutConfig,
    ledger: &mut PatchLedger,
) -> Result<RelayoutReport>
where
    H: DocumentProvider + StylePort + ?Sized,
{
    let _span = info_span!("popup.relayout", root = popup.root.raw()).entered();
    let viewport = host.viewport();
    let band = Band::for_popup(popup, viewport.height);
    let close_button_check = check_close_button_overlap(host, popup, config)?;
    let group = select_group(host, popup);
    let truncation = find_truncated(host, &group, band, config)?;
    let forced = !truncation.unclipped.is_empty();
    for scroller in &truncation.unclipped {
        ledger.write(host, *scroller, "overflow", "visible");
    }
    if truncation.nodes.is_empty() {
        debug!("popup {:?}: nothing truncated", popup.root);
        if forced {
            host.flush()?;
        }
        return Ok(RelayoutReport::early(
            RelayoutOutcome::NoTruncation,
            Vec::new(),
            forced,
            close_button_check,
        ));
    }

    let archetype = classify(host, popup, config)?;
    fix_cover_backgrounds(host, &group, ledger);
    if archetype == DecisionTreeType::Picker {
        host.flush()?;
        let mut report = RelayoutReport::early(
            RelayoutOutcome::PickerSkipped,
            truncation.nodes,
            forced,
            close_button_check,
        );
        report.archetype = Some(archetype);
        return Ok(report);
    }

    let mut min_top = f32::INFINITY;
    let mut max_bottom = f32::NEG_INFINITY;
    for node in &truncation.nodes {
        let (top, bottom) = vertical_span(host, *node)?;
        min_top = min_top.min(top);
        max_bottom = max_bottom.max(bottom);
    }
    let span = max_bottom - min_top;
    let scale = if span > 0.0 {
        (band.height() * config.target_fill_ratio / span).max(config.effective_min_scale())
    } else {
        f32::INFINITY
    };
    if scale > 1.0 {
        debug!("popup {:?}: fits without scaling ({scale:.3})", popup.root);
        host.flush()?;
        let mut report = RelayoutReport::early(
            RelayoutOutcome::AlreadyFits,
            truncation.nodes,
            forced,
            close_button_check,
        );
        report.archetype = Some(archetype);
        return Ok(report);
    }

    let mut group_box: Option<Geometry> = None;
    for member in &group {
        let rect = host.geometry(*member)?;
        group_box = Some(group_box.map_or(rect, |acc| acc.union(&rect)));
    }
    let group_box = group_box.unwrap_or_else(|| Geometry::new(0.0, min_top, viewport.width, span));
    let span_box = Geometry::new(group_box.left, min_top, group_box.width, span);
    let pivot_box = group_box.union(&span_box);
    let pivot_x = pivot_box.center_x();
    let pivot_y = pivot_box.center_y();
    let (shift_x, shift_y) = if archetype == DecisionTreeType::Bottom {
        (0.0, band.bottom - land(max_bottom, pivot_y, 0.0, scale))
    } else {
        (
            viewport.width / 2.0 - pivot_x,
            viewport.height / 2.0 + (popup.sticky_top_height - popup.sticky_bottom_height) / 2.0
                - pivot_y,
        )
    };
    let placement = Placement {
        scale,
        pivot_x,
        pivot_y,
        shift_x,
        shift_y,
    };
    let transformed = place_group(host, &group, placement, band, config, ledger)?;

    if archetype == DecisionTreeType::CenterButtonOverlap {
        shift_close_button(host, popup, &truncation.nodes, &transformed, placement, config, ledger)?;
    }
    host.flush()?;
    debug!(
        "popup {:?}: {archetype:?} scaled by {scale:.3}, {} nodes transformed",
        popup.root,
        transformed.len()
    );
    Ok(RelayoutReport {
        outcome: RelayoutOutcome::Applied,
        archetype: Some(archetype),
        truncated: truncation.nodes,
        scale: Some(scale),
        transformed,
        close_button_truncated_by_scroll: forced,
        close_button_check,
    })
}

/// Swap cropping `cover` backgrounds for `contain`.
fn fix_cover_backgrounds<H>(host: &mut H, group: &[NodeKey], ledger: &mut PatchLedger)
where
    H: DocumentProvider + StylePort + ?Sized,
{
    let mut covered = Vec::new();
    let mut stack: Vec<NodeKey> = group.to_vec();
    while let Some(node) = stack.pop() {
        let Ok(style) = host.computed_style(node) else {
            continue;
        };
        if style.display == Display::None {
            continue;
        }
        let has_image = !style.background_image.trim().eq_ignore_ascii_case("none");
        if has_image && style.background_size.to_ascii_lowercase().contains("cover") {
            covered.push(node);
        }
        stack.extend(host.children(node));
    }
    for node in covered {
        ledger.write(host, node, "background-size", "contain");
    }
}

/// Write the scale/offset transform on every group member.
fn place_group<H>(
    host: &mut H,
    group: &[NodeKey],
    placement: Placement,
    band: Band,
    config: &RelayoutConfig,
    ledger: &mut PatchLedger,
) -> Result<Vec<NodeKey>>
where
    H: DocumentProvider + StylePort + ?Sized,
{
    let viewport = host.viewport();
    let transition = format!("transform {}ms", config.scale_animation().as_millis());
    let scale = placement.scale;
    let mut transformed = Vec::with_capacity(group.len());
    for member in group {
        let style = host.computed_style(*member)?;
        let rect = host.geometry(*member)?;
        let on_screen = rect.intersection(&viewport.bounds()).is_some();
        if style.transform.translate_y.abs() > viewport.height
            && (!style.is_visible() || !on_screen)
        {
            trace!("member {member:?} parked off-screen; skipped");
            continue;
        }
        if style.is_scroll_container() {
            if rect.top >= viewport.height || rect.bottom() <= 0.0 {
                trace!("scroller {member:?} entirely off-screen; skipped");
                continue;
            }
            let landed_top = land(rect.top, placement.pivot_y, placement.shift_y, scale);
            let room = ((band.bottom - landed_top) / scale).max(0.0);
            if rect.height > room {
                ledger.write(host, *member, "max-height", &format!("{room:.2}px"));
            }
        }
        let origin_x = rect.center_x() - style.transform.translate_x;
        let origin_y = rect.center_y() - style.transform.translate_y;
        let inherited = inherited_scale(host, *member);
        let translate_x =
            (placement.shift_x + (origin_x - placement.pivot_x) * (scale - 1.0)) / inherited;
        let translate_y =
            (placement.shift_y + (origin_y - placement.pivot_y) * (scale - 1.0)) / inherited;
        let value = compose_transform(
            &format!("translate({translate_x:.2}px, {translate_y:.2}px) scale({scale:.4})"),
            &style.transform_text,
        );
        ledger.write(host, *member, "transform", &value);
        ledger.write(host, *member, "transition", &transition);
        transformed.push(*member);
    }
    Ok(transformed)
}

/// Push the single close button below the bottom-most truncated node.
fn shift_close_button<H>(
    host: &mut H,
    popup: &PopupInfo,
    truncated: &[NodeKey],
    transformed: &[NodeKey],
    placement: Placement,
    config: &RelayoutConfig,
    ledger: &mut PatchLedger,
) -> Result<()>
where
    H: DocumentProvider + StylePort + ?Sized,
{
    let buttons = find_close_buttons(host, popup.root, config);
    let [button] = buttons.as_slice() else {
        return Ok(());
    };
    if transformed.contains(button) {
        return Ok(());
    }
    let mut lowest: Option<f32> = None;
    for node in truncated {
        if contains(host, *button, *node) || contains(host, *node, *button) {
            continue;
        }
        let bottom = host.geometry(*node)?.bottom();
        lowest = Some(lowest.map_or(bottom, |acc| acc.max(bottom)));
    }
    let Some(lowest) = lowest else {
        return Ok(());
    };
    let button_rect = host.geometry(*button)?;
    let scale = placement.scale;
    let landed_bottom = land(lowest, placement.pivot_y, placement.shift_y, scale);
    let landed_top = land(button_rect.top, placement.pivot_y, placement.shift_y, scale);
    let displacement = landed_bottom - landed_top;
    if displacement <= 0.0 {
        return Ok(());
    }
    let existing = host.computed_style(*button)?.transform_text;
    let value = compose_transform(
        &format!("translateY({:.2}px)", displacement / scale),
        &existing,
    );
    trace!("moving close button {button:?} down by {displacement:.1}px");
    ledger.write(host, *button, "transform", &value);
    Ok(())
}
