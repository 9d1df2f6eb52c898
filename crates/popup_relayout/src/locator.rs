//! Mask/content detection over a live render tree.
//!
//! One walk collects qualifying full-width nodes. Each node that passes one of
//! the mask rules is paired with a content node (sibling subtrees first, then
//! its own descendants), nested candidates are pruned in favour of the inner
//! popup, and the top-most accepted candidate wins.

use crate::classifier::predict;
use crate::config::RelayoutConfig;
use crate::patterns::contains_close_pattern;
use crate::popup::{PopupInfo, StructuralType};
use anyhow::Result;
use core::cmp::Ordering;
use log::{debug, trace};
use render_tree::parsers::parse_box_shadows;
use render_tree::stacking::{compare_stacking, creates_stacking_context, resolved_z_index};
use render_tree::walk::{Visit, collect, contains, depth, nearest_ancestor, precedes};
use render_tree::{ComputedStyle, Display, DocumentProvider, Geometry, NodeKey, Position, Viewport};

/// Width tolerance for "spans the viewport".
const FULL_WIDTH_TOLERANCE_PX: f32 = 2.0;
/// Ancestor levels searched for a sibling content subtree.
const SIBLING_SEARCH_LEVELS: usize = 3;
/// Offset/blur tolerance for a spread-only backdrop shadow.
const SHADOW_TOLERANCE_PX: f32 = 1.0;
/// Sticky bars taller than this share of the viewport are not bars.
const STICKY_MAX_HEIGHT_RATIO: f32 = 0.3;
const EDGE_TOLERANCE_PX: f32 = 1.0;

/// A node that survived the qualification filter.
#[derive(Clone, Debug)]
struct Qualified {
    node: NodeKey,
    rect: Geometry,
    style: ComputedStyle,
    depth: usize,
}

/// Visible, or the transparent-but-painted backdrop exception.
fn is_rendered_candidate(style: &ComputedStyle) -> bool {
    if style.is_visible() {
        return true;
    }
    style.display != Display::None
        && style.opacity <= 0.0
        && style.background_color.is_semi_transparent()
}

fn spans_viewport(rect: &Geometry, viewport: Viewport) -> bool {
    (rect.width - viewport.width).abs() <= FULL_WIDTH_TOLERANCE_PX
}

/// Spread-only shadow at least as large as the viewport.
fn has_backdrop_shadow(style: &ComputedStyle, viewport: Viewport) -> bool {
    let needed = viewport.width.max(viewport.height);
    parse_box_shadows(&style.box_shadow).iter().any(|shadow| {
        !shadow.inset
            && shadow.offset_x.abs() <= SHADOW_TOLERANCE_PX
            && shadow.offset_y.abs() <= SHADOW_TOLERANCE_PX
            && shadow.blur.abs() <= SHADOW_TOLERANCE_PX
            && shadow.spread >= needed
    })
}

/// Z-index of the nearest stacking context at or above `node`, bounded by `stop`.
pub fn effective_z_index<D: DocumentProvider + ?Sized>(
    doc: &D,
    node: NodeKey,
    stop: NodeKey,
) -> i32 {
    let mut current = Some(node);
    while let Some(step) = current {
        let context = doc
            .computed_style(step)
            .ok()
            .filter(creates_stacking_context);
        if let Some(style) = context {
            return resolved_z_index(&style);
        }
        if step == stop {
            break;
        }
        current = doc.parent(step);
    }
    0
}

/// Exactly one absolutely positioned child that is large and holds a close pattern.
fn has_single_closable_panel<D: DocumentProvider + ?Sized>(
    doc: &D,
    node: NodeKey,
    viewport: Viewport,
    config: &RelayoutConfig,
) -> bool {
    let absolute_children: Vec<NodeKey> = doc
        .children(node)
        .into_iter()
        .filter(|child| {
            doc.computed_style(*child)
                .is_ok_and(|style| style.position == Position::Absolute && style.is_visible())
        })
        .collect();
    let [panel] = absolute_children.as_slice() else {
        return false;
    };
    doc.geometry(*panel)
        .is_ok_and(|rect| viewport.area_ratio(&rect) > config.content_area_ratio)
        && contains_close_pattern(doc, *panel, config)
}

/// Which mask rule (if any) `candidate` satisfies, plus whether it paints a backdrop.
fn mask_rule<D: DocumentProvider + ?Sized>(
    doc: &D,
    candidate: &Qualified,
    viewport: Viewport,
    config: &RelayoutConfig,
) -> Option<bool> {
    let translucent = candidate.style.background_color.is_semi_transparent();
    let area_ratio = viewport.area_ratio(&candidate.rect);
    if area_ratio > config.mask_area_ratio && translucent {
        return Some(true);
    }
    if candidate.style.position != Position::Fixed {
        return None;
    }
    if has_backdrop_shadow(&candidate.style, viewport) {
        return Some(true);
    }
    has_single_closable_panel(doc, candidate.node, viewport, config).then_some(translucent)
}

/// Largest visible node under `scope` whose area clears the content threshold.
fn best_content<D, F>(
    doc: &D,
    scope: NodeKey,
    include_scope: bool,
    viewport: Viewport,
    config: &RelayoutConfig,
    mut admit: F,
) -> Option<(NodeKey, f32)>
where
    D: DocumentProvider + ?Sized,
    F: FnMut(NodeKey) -> bool,
{
    let mut best: Option<(NodeKey, f32)> = None;
    let visible = collect(doc, scope, include_scope, |node| match doc.computed_style(node) {
        Ok(style) if style.display == Display::None => Visit::SkipSubtree,
        Ok(style) if style.is_visible() => Visit::Accept,
        Ok(_) => Visit::Reject,
        Err(_) => Visit::SkipSubtree,
    });
    for node in visible {
        let Ok(rect) = doc.geometry(node) else {
            continue;
        };
        let ratio = viewport.area_ratio(&rect);
        if ratio <= config.content_area_ratio || !admit(node) {
            continue;
        }
        if best.is_none_or(|(_, best_ratio)| ratio > best_ratio) {
            best = Some((node, ratio));
        }
    }
    best
}

/// Sibling-subtree search: returns `(root, content)` for a type B popup.
fn find_sibling_content<D: DocumentProvider + ?Sized>(
    doc: &D,
    mask: NodeKey,
    mask_z: i32,
    viewport: Viewport,
    config: &RelayoutConfig,
) -> Option<(NodeKey, NodeKey)> {
    let mut anchor = mask;
    for _level in 0..=SIBLING_SEARCH_LEVELS {
        let parent = doc.parent(anchor)?;
        let mut best: Option<(NodeKey, f32)> = None;
        for sibling in doc.children(parent) {
            if sibling == anchor {
                continue;
            }
            let required = mask_z.saturating_add(i32::from(precedes(doc, sibling, mask)));
            let found = best_content(doc, sibling, true, viewport, config, |node| {
                effective_z_index(doc, node, sibling) >= required
            });
            let better = found.filter(|(_, ratio)| {
                best.is_none_or(|(_, best_ratio)| *ratio > best_ratio)
            });
            if better.is_some() {
                best = better;
            }
        }
        if let Some((content, _)) = best {
            return Some((parent, content));
        }
        anchor = parent;
    }
    None
}

fn out_of_flow<D: DocumentProvider + ?Sized>(doc: &D, node: NodeKey) -> bool {
    doc.computed_style(node)
        .is_ok_and(|style| style.position.is_out_of_flow())
}

/// Pair a mask with its content and root.
fn pair_mask<D: DocumentProvider + ?Sized>(
    doc: &D,
    mask: &Qualified,
    has_mask: bool,
    viewport: Viewport,
    config: &RelayoutConfig,
) -> Result<Option<PopupInfo>> {
    let mask_z = resolved_z_index(&mask.style);
    let pairing = find_sibling_content(doc, mask.node, mask_z, viewport, config)
        .map(|(root, content)| (root, content, StructuralType::B))
        .or_else(|| {
            let (content, _) = best_content(doc, mask.node, false, viewport, config, |_| true)?;
            if mask.style.position.is_out_of_flow() {
                return Some((mask.node, content, StructuralType::C));
            }
            let root = nearest_ancestor(doc, mask.node, |node| out_of_flow(doc, node))
                .or_else(|| doc.parent(mask.node))?;
            Some((root, content, StructuralType::A))
        });
    let Some((root, content, structural_type)) = pairing else {
        trace!("mask {:?} has no content; discarded", mask.node);
        return Ok(None);
    };
    let root_style = doc.computed_style(root)?;
    let root_rect = doc.geometry(root)?;
    Ok(Some(PopupInfo {
        root,
        mask: mask.node,
        content,
        structural_type,
        root_position: root_style.position,
        root_z_index: resolved_z_index(&root_style),
        mask_position: mask.style.position,
        mask_z_index: mask_z,
        has_mask,
        root_area_ratio: viewport.area_ratio(&root_rect),
        mask_area_ratio: viewport.area_ratio(&mask.rect),
        root_visible: root_style.is_visible(),
        mask_visible: mask.style.is_visible(),
        has_close_button: contains_close_pattern(doc, root, config),
        sticky_top_height: 0.0,
        sticky_bottom_height: 0.0,
    }))
}

/// Drop every candidate that encloses another candidate.
fn prune_nested<D: DocumentProvider + ?Sized>(doc: &D, candidates: Vec<PopupInfo>) -> Vec<PopupInfo> {
    let mut kept: Vec<PopupInfo> = Vec::with_capacity(candidates.len());
    for (index, outer) in candidates.iter().enumerate() {
        let encloses_other = candidates
            .iter()
            .enumerate()
            .any(|(other_index, inner)| {
                if other_index == index {
                    return false;
                }
                if outer.root == inner.root {
                    outer.mask != inner.mask && contains(doc, outer.mask, inner.mask)
                } else {
                    contains(doc, outer.root, inner.root)
                }
            });
        let duplicate = kept.iter().any(|seen| seen.same_identity(outer));
        if !encloses_other && !duplicate {
            kept.push(outer.clone());
        }
    }
    kept
}

/// Fast path for obvious full-screen masks; the classifier decides the rest.
fn accept(info: &PopupInfo, config: &RelayoutConfig) -> bool {
    if info.has_mask
        && info.mask_area_ratio > config.fast_path_mask_ratio
        && info.mask_position.is_out_of_flow()
    {
        return true;
    }
    let prediction = predict(info);
    trace!(
        "classifier scored {:?}: label {} p={:.3}",
        info.root, prediction.label, prediction.probability
    );
    prediction.is_popup()
}

/// Heights of fixed/sticky bars stacked at or above the mask.
fn sticky_heights<D: DocumentProvider + ?Sized>(
    doc: &D,
    qualified: &[Qualified],
    info: &PopupInfo,
    viewport: Viewport,
) -> Result<(f32, f32)> {
    let mut top = 0.0_f32;
    let mut bottom = 0.0_f32;
    for bar in qualified {
        if !matches!(bar.style.position, Position::Fixed | Position::Sticky)
            || contains(doc, info.root, bar.node)
            || contains(doc, bar.node, info.root)
            || bar.rect.height >= viewport.height * STICKY_MAX_HEIGHT_RATIO
            || bar.rect.is_empty()
        {
            continue;
        }
        let touches_top = bar.rect.top.abs() <= EDGE_TOLERANCE_PX;
        let touches_bottom = (bar.rect.bottom() - viewport.height).abs() <= EDGE_TOLERANCE_PX;
        if !touches_top && !touches_bottom {
            continue;
        }
        if compare_stacking(doc, bar.node, info.mask)? == Ordering::Less {
            continue;
        }
        if touches_top {
            top = top.max(bar.rect.height);
        } else {
            bottom = bottom.max(bar.rect.height);
        }
    }
    Ok((top, bottom))
}

/// Scan `subtree_root` and return the top-most confirmed popup, if any.
///
/// # Errors
/// Returns an error if a node that was just walked can no longer be measured.
pub fn locate<D: DocumentProvider + ?Sized>(
    doc: &D,
    subtree_root: NodeKey,
    config: &RelayoutConfig,
) -> Result<Option<PopupInfo>> {
    let viewport = doc.viewport();
    let mut qualified = Vec::new();
    let walked = collect(doc, subtree_root, false, |node| match doc.computed_style(node) {
        Ok(style) if style.display == Display::None => Visit::SkipSubtree,
        Ok(_) => Visit::Accept,
        Err(_) => Visit::SkipSubtree,
    });
    for node in walked {
        let style = doc.computed_style(node)?;
        if !is_rendered_candidate(&style) {
            continue;
        }
        let rect = doc.geometry(node)?;
        if !spans_viewport(&rect, viewport) {
            continue;
        }
        qualified.push(Qualified {
            node,
            rect,
            style,
            depth: depth(doc, node),
        });
    }

    let mut masks: Vec<(&Qualified, bool)> = qualified
        .iter()
        .filter_map(|candidate| {
            mask_rule(doc, candidate, viewport, config).map(|has_mask| (candidate, has_mask))
        })
        .collect();
    masks.sort_by(|left, right| right.0.depth.cmp(&left.0.depth));

    let mut candidates = Vec::new();
    for (mask, has_mask) in masks {
        if let Some(info) = pair_mask(doc, mask, has_mask, viewport, config)? {
            candidates.push(info);
        }
    }
    let accepted: Vec<PopupInfo> = prune_nested(doc, candidates)
        .into_iter()
        .filter(|info| accept(info, config))
        .collect();

    let mut top_most: Option<PopupInfo> = None;
    for info in accepted {
        let replace = match &top_most {
            None => true,
            Some(current) => compare_stacking(doc, info.content, current.content)? == Ordering::Greater,
        };
        if replace {
            top_most = Some(info);
        }
    }
    let Some(mut info) = top_most else {
        debug!("no popup under {subtree_root:?}");
        return Ok(None);
    };
    let (top, bottom) = sticky_heights(doc, &qualified, &info, viewport)?;
    info.sticky_top_height = top;
    info.sticky_bottom_height = bottom;
    debug!(
        "popup located: root {:?} mask {:?} content {:?} type {:?}",
        info.root, info.mask, info.content, info.structural_type
    );
    Ok(Some(info))
}

#[cfg(test)]
mod tests {
    use super::*;
    use render_tree::{Document, Rgba};

    fn translucent() -> Rgba {
        Rgba::new(0, 0, 0, 128)
    }

    /// A spread-only box shadow covering the viewport is a backdrop.
    ///
    /// # Panics
    /// Panics if the shadow rule misfires.
    #[test]
    fn backdrop_shadow_rule() {
        let viewport = Viewport::new(375.0, 667.0);
        let style = ComputedStyle {
            position: Position::Fixed,
            box_shadow: "rgba(0, 0, 0, 0.6) 0px 0px 0px 2000px".to_owned(),
            ..Default::default()
        };
        assert!(has_backdrop_shadow(&style, viewport));
        let blurred = ComputedStyle {
            box_shadow: "rgba(0, 0, 0, 0.6) 0px 4px 12px 2000px".to_owned(),
            ..style
        };
        assert!(!has_backdrop_shadow(&blurred, viewport));
    }

    /// A fixed mask with a centred panel child is a type C popup.
    ///
    /// # Errors
    /// Returns an error if the fixture cannot be built.
    #[test]
    fn fixed_mask_with_child_is_type_c() -> Result<()> {
        let config = RelayoutConfig::default();
        let mut doc = Document::new(Viewport::new(375.0, 667.0));
        let mask = doc.append_element(NodeKey::ROOT, "div")?;
        doc.set_layout(mask, Geometry::new(0.0, 0.0, 375.0, 667.0))?;
        doc.update_style(mask, |style| {
            style.position = Position::Fixed;
            style.z_index = Some(100);
            style.background_color = translucent();
        })?;
        let panel = doc.append_element(mask, "div")?;
        doc.set_layout(panel, Geometry::new(30.0, 150.0, 315.0, 360.0))?;
        let Some(info) = locate(&doc, NodeKey::ROOT, &config)? else {
            return Err(anyhow::anyhow!("popup not found"));
        };
        assert_eq!(info.structural_type, StructuralType::C);
        assert_eq!(info.root, mask);
        assert_eq!(info.content, panel);
        assert!(info.has_mask);
        Ok(())
    }

    /// A narrow element is never a mask even when translucent.
    ///
    /// # Errors
    /// Returns an error if the fixture cannot be built.
    #[test]
    fn narrow_translucent_block_is_ignored() -> Result<()> {
        let config = RelayoutConfig::default();
        let mut doc = Document::new(Viewport::new(375.0, 667.0));
        let block = doc.append_element(NodeKey::ROOT, "div")?;
        doc.set_layout(block, Geometry::new(0.0, 0.0, 300.0, 667.0))?;
        doc.update_style(block, |style| {
            style.position = Position::Fixed;
            style.background_color = translucent();
        })?;
        assert!(locate(&doc, NodeKey::ROOT, &config)?.is_none());
        Ok(())
    }
}
