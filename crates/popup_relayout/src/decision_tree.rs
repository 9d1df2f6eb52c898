//! Presentation archetype of a confirmed popup.
//!
//! The checks run in order: picker, bottom sheet, centred with an overlapping
//! close button, plain centred.

use crate::config::RelayoutConfig;
use crate::locator::effective_z_index;
use crate::patterns::class_name;
pub use crate::patterns::find_close_buttons;
use crate::popup::{DecisionTreeType, PopupInfo, StructuralType};
use anyhow::Result;
use log::trace;
use render_tree::parsers::{gradient_color_stops, parse_px};
use render_tree::walk::{Visit, child_towards, collect};
use render_tree::{
    Alignment, BoxSizing, ComputedStyle, Display, DocumentProvider, Geometry, NodeKey, Position,
    RuleLookup,
};
use std::collections::HashMap;

const WIDTH_TOLERANCE_PX: f32 = 2.0;
const BOTTOM_TOLERANCE_PX: f32 = 2.0;
/// Close buttons whose top sits below this share of the viewport are in the lower band.
const LOWER_BAND_RATIO: f32 = 0.6;
/// Close buttons shorter than this share of the viewport count as small.
const SMALL_BUTTON_RATIO: f32 = 0.15;
/// Absolute ancestors smaller than this share of the viewport still count as the button.
const SMALL_WRAPPER_RATIO: f32 = 0.05;
const BUTTON_ANCESTOR_LEVELS: usize = 2;
const MIN_OVERLAP: f32 = 0.2;
const MAX_OVERLAP: f32 = 1.0;

/// Classify `popup` into its archetype.
///
/// # Errors
/// Returns an error if a node of the popup can no longer be measured.
pub fn classify<D: DocumentProvider + ?Sized>(
    doc: &D,
    popup: &PopupInfo,
    config: &RelayoutConfig,
) -> Result<DecisionTreeType> {
    let archetype = if is_picker(doc, popup) {
        DecisionTreeType::Picker
    } else if is_bottom_modal(doc, popup, config)? {
        DecisionTreeType::Bottom
    } else if is_button_overlap(doc, popup, config)? {
        DecisionTreeType::CenterButtonOverlap
    } else {
        DecisionTreeType::Center
    };
    trace!("popup {:?} classified as {archetype:?}", popup.root);
    Ok(archetype)
}

/// Picker wheels: a `picker` class, evenly sized rows, and a fading gradient mask.
pub fn is_picker<D: DocumentProvider + ?Sized>(doc: &D, popup: &PopupInfo) -> bool {
    let mut class_hit = false;
    let mut rows_hit = false;
    let mut gradient_hit = false;
    let nodes = collect(doc, popup.root, true, |node| match doc.computed_style(node) {
        Ok(style) if style.display == Display::None => Visit::SkipSubtree,
        Ok(_) => Visit::Accept,
        Err(_) => Visit::SkipSubtree,
    });
    for node in nodes {
        if !class_hit && class_name(doc, node).contains("picker") {
            class_hit = true;
        }
        if !rows_hit {
            let mut heights: HashMap<String, usize> = HashMap::new();
            for child in doc.children(node) {
                if let Some(height) = doc.inline_style(child, "height") {
                    *heights.entry(height.trim().to_owned()).or_default() += 1;
                }
            }
            rows_hit = heights.values().any(|count| *count >= 2);
        }
        if !gradient_hit {
            gradient_hit = doc.computed_style(node).is_ok_and(|style| {
                gradient_color_stops(&style.background_image)
                    .iter()
                    .any(|stop| stop.is_semi_transparent())
            });
        }
        if class_hit && rows_hit && gradient_hit {
            return true;
        }
    }
    false
}

/// Nodes competing for "the content" of a bottom sheet.
fn content_candidates<D: DocumentProvider + ?Sized>(doc: &D, popup: &PopupInfo) -> Vec<NodeKey> {
    let pool = match popup.structural_type {
        StructuralType::A => doc.children(popup.mask),
        StructuralType::B => {
            let mask_branch = child_towards(doc, popup.root, popup.mask).unwrap_or(popup.mask);
            doc.children(popup.root)
                .into_iter()
                .filter(|node| *node != mask_branch)
                .collect()
        }
        StructuralType::C => doc.children(popup.root),
    };
    let visible: Vec<NodeKey> = pool
        .into_iter()
        .filter(|node| {
            doc.computed_style(*node).is_ok_and(|style| style.is_visible())
                && doc.geometry(*node).is_ok_and(|rect| !rect.is_empty())
        })
        .collect();
    if visible.is_empty() {
        vec![popup.content]
    } else {
        visible
    }
}

/// The unique maximal-z candidate; `None` on a tie.
fn top_candidate<D: DocumentProvider + ?Sized>(
    doc: &D,
    popup: &PopupInfo,
    candidates: &[NodeKey],
) -> Option<NodeKey> {
    let scored: Vec<(NodeKey, i32)> = candidates
        .iter()
        .map(|node| (*node, effective_z_index(doc, *node, *node)))
        .collect();
    let best = scored.iter().map(|(_, z_index)| *z_index).max()?;
    let mut winners = scored.iter().filter(|(_, z_index)| *z_index == best);
    let first = winners.next()?;
    if winners.next().is_some() {
        trace!("popup {:?}: content z-index tie, not modal", popup.root);
        return None;
    }
    Some(first.0)
}

/// A single small close button parked in the lower band, fully on screen.
fn has_centered_close_button<D: DocumentProvider + ?Sized>(
    doc: &D,
    content: NodeKey,
    config: &RelayoutConfig,
) -> Result<bool> {
    let buttons = find_close_buttons(doc, content, config);
    let [button] = buttons.as_slice() else {
        return Ok(false);
    };
    let viewport = doc.viewport();
    let rect = doc.geometry(*button)?;
    Ok(rect.top > viewport.height * LOWER_BAND_RATIO
        && rect.height < viewport.height * SMALL_BUTTON_RATIO
        && rect.bottom() <= viewport.height)
}

/// Flex alignment that forces (`Some(true)`) or forbids (`Some(false)`) a bottom sheet.
fn flex_override(style: &ComputedStyle) -> Option<bool> {
    if !matches!(style.display, Display::Flex | Display::InlineFlex) {
        return None;
    }
    let column = style.flex_direction.is_column();
    if (column && style.justify_content.is_end()) || (!column && style.align_items.is_end()) {
        return Some(true);
    }
    if (column && style.justify_content == Alignment::Center)
        || (!column && style.align_items == Alignment::Center)
    {
        return Some(false);
    }
    None
}

/// Full viewport width, accepting either the border box or the CSS `width`.
fn is_full_width(rect: &Geometry, style: &ComputedStyle, viewport_width: f32) -> bool {
    let border_box = rect.width;
    let css_width = match style.box_sizing {
        BoxSizing::BorderBox => border_box,
        BoxSizing::ContentBox => {
            border_box
                - style.padding.left
                - style.padding.right
                - style.border_width.left
                - style.border_width.right
        }
    };
    (border_box - viewport_width).abs() <= WIDTH_TOLERANCE_PX
        || (css_width - viewport_width).abs() <= WIDTH_TOLERANCE_PX
}

fn is_zero_offset(value: &str) -> bool {
    parse_px(value).is_some_and(|offset| offset.abs() <= f32::EPSILON)
}

/// Bottom edge flush with the viewport, confirmed by a declared `bottom: 0`
/// or, when stylesheets cannot be read, by measurement alone.
fn is_bottom_flush<D: DocumentProvider + ?Sized>(
    doc: &D,
    node: NodeKey,
    rect: &Geometry,
    viewport_height: f32,
) -> bool {
    let measured = (rect.bottom() - viewport_height).abs() <= BOTTOM_TOLERANCE_PX;
    if !measured {
        return false;
    }
    if doc.inline_style(node, "bottom").is_some_and(|value| is_zero_offset(&value)) {
        return true;
    }
    match doc.matched_rule_value(node, "bottom") {
        RuleLookup::Found(value) => is_zero_offset(&value),
        RuleLookup::NotDeclared => false,
        RuleLookup::Inaccessible => true,
    }
}

/// Bottom-sheet test for one content node.
fn is_modal_node<D: DocumentProvider + ?Sized>(
    doc: &D,
    popup: &PopupInfo,
    node: NodeKey,
) -> Result<bool> {
    let viewport = doc.viewport();
    for owner in [popup.root, node] {
        if let Some(forced) = flex_override(&doc.computed_style(owner)?) {
            return Ok(forced);
        }
    }
    let style = doc.computed_style(node)?;
    let rect = doc.geometry(node)?;
    if !is_full_width(&rect, &style, viewport.width) {
        return Ok(false);
    }
    if style.position == Position::Static && style.inset.bottom.is_none() {
        let bottom_flush = (rect.bottom() - viewport.height).abs() <= BOTTOM_TOLERANCE_PX;
        let top_flush = rect.top.abs() <= BOTTOM_TOLERANCE_PX;
        return Ok(bottom_flush && !top_flush);
    }
    Ok(is_bottom_flush(doc, node, &rect, viewport.height))
}

/// Whether the popup presents as a bottom sheet.
///
/// # Errors
/// Returns an error if a candidate can no longer be measured.
pub fn is_bottom_modal<D: DocumentProvider + ?Sized>(
    doc: &D,
    popup: &PopupInfo,
    config: &RelayoutConfig,
) -> Result<bool> {
    let candidates = content_candidates(doc, popup);
    let Some(content) = top_candidate(doc, popup, &candidates) else {
        return Ok(false);
    };
    if has_centered_close_button(doc, content, config)? {
        trace!("popup {:?}: lower-band close button, not modal", popup.root);
        return Ok(false);
    }
    if is_modal_node(doc, popup, content)? {
        return Ok(true);
    }
    if popup.structural_type != StructuralType::B {
        return Ok(false);
    }
    for child in doc.children(content) {
        let visible = doc.computed_style(child).is_ok_and(|style| style.is_visible());
        if visible && is_modal_node(doc, popup, child)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// The absolutely positioned box carrying the close button: the button itself
/// or a small absolute ancestor within two levels.
fn absolute_anchor<D: DocumentProvider + ?Sized>(doc: &D, button: NodeKey) -> Option<NodeKey> {
    if doc
        .computed_style(button)
        .is_ok_and(|style| style.position == Position::Absolute)
    {
        return Some(button);
    }
    let viewport = doc.viewport();
    let mut current = button;
    for _level in 0..BUTTON_ANCESTOR_LEVELS {
        current = doc.parent(current)?;
        let absolute = doc
            .computed_style(current)
            .is_ok_and(|style| style.position == Position::Absolute);
        let small = doc
            .geometry(current)
            .is_ok_and(|rect| viewport.area_ratio(&rect) < SMALL_WRAPPER_RATIO);
        if absolute && small {
            return Some(current);
        }
    }
    None
}

/// Nearest visible sibling, preferring earlier siblings at equal distance.
fn nearest_visible_sibling<D: DocumentProvider + ?Sized>(
    doc: &D,
    node: NodeKey,
) -> Option<NodeKey> {
    let parent = doc.parent(node)?;
    let siblings = doc.children(parent);
    let index = siblings.iter().position(|sibling| *sibling == node)?;
    let visible = |candidate: NodeKey| {
        doc.computed_style(candidate).is_ok_and(|style| style.is_visible())
            && doc.geometry(candidate).is_ok_and(|rect| !rect.is_empty())
    };
    for distance in 1..siblings.len() {
        let before = index.checked_sub(distance).and_then(|at| siblings.get(at));
        let after = siblings.get(index.saturating_add(distance));
        for candidate in [before, after].into_iter().flatten() {
            if visible(*candidate) {
                return Some(*candidate);
            }
        }
    }
    None
}

/// First visible leaf under `node`, following first children.
fn first_leaf<D: DocumentProvider + ?Sized>(doc: &D, node: NodeKey) -> NodeKey {
    let mut current = node;
    loop {
        let next = doc.children(current).into_iter().find(|child| {
            doc.computed_style(*child).is_ok_and(|style| style.is_visible())
                && doc.geometry(*child).is_ok_and(|rect| !rect.is_empty())
        });
        match next {
            Some(child) => current = child,
            None => return current,
        }
    }
}

/// Whether the single close button overlaps the box it decorates.
///
/// # Errors
/// Returns an error if the button or its neighbour can no longer be measured.
pub fn is_button_overlap<D: DocumentProvider + ?Sized>(
    doc: &D,
    popup: &PopupInfo,
    config: &RelayoutConfig,
) -> Result<bool> {
    let buttons = find_close_buttons(doc, popup.root, config);
    let [button] = buttons.as_slice() else {
        return Ok(false);
    };
    let Some(anchor) = absolute_anchor(doc, *button) else {
        return Ok(false);
    };
    let Some(sibling) = nearest_visible_sibling(doc, anchor) else {
        return Ok(false);
    };
    let target = if doc.computed_style(sibling)?.position == Position::Absolute {
        sibling
    } else {
        first_leaf(doc, sibling)
    };
    let anchor_rect = doc.geometry(anchor)?;
    let target_rect = doc.geometry(target)?;
    let own_area = anchor_rect.area();
    if own_area <= 0.0 {
        return Ok(false);
    }
    let overlap = anchor_rect
        .intersection(&target_rect)
        .map_or(0.0, |shared| shared.area() / own_area);
    let hit = (MIN_OVERLAP..=MAX_OVERLAP).contains(&overlap);
    trace!("close button {button:?} overlaps {target:?} by {overlap:.2}");
    Ok(hit)
}
