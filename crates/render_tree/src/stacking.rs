//! Stacking context chains and z-order comparison.
//!
//! Two elements are ordered by walking their stacking-context chains from the
//! document root: the first pair of diverging contexts decides by z-index, and
//! document order breaks ties (later paints on top).

use crate::key::NodeKey;
use crate::provider::DocumentProvider;
use crate::style::{ComputedStyle, Position};
use crate::walk::{ancestors, compare_document_order};
use anyhow::Result;
use core::cmp::Ordering;

/// One stacking context on the path from the root to an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackingEntry {
    pub node: NodeKey,
    /// Resolved z-index; `auto` counts as `0`.
    pub z_index: i32,
}

/// Whether an element establishes its own stacking context.
pub fn creates_stacking_context(style: &ComputedStyle) -> bool {
    let positioned_with_z = matches!(style.position, Position::Relative | Position::Absolute)
        && style.z_index.is_some();
    positioned_with_z
        || matches!(style.position, Position::Fixed | Position::Sticky)
        || style.opacity < 1.0
        || style.has_transform()
}

/// Z-index an element contributes to its parent stacking context.
pub fn resolved_z_index(style: &ComputedStyle) -> i32 {
    if style.position.is_positioned() {
        style.z_index.unwrap_or(0)
    } else {
        0
    }
}

/// Stacking contexts from the root down to `node` (inclusive when `node` creates one).
///
/// # Errors
/// Returns an error if a node on the path has no readable style.
pub fn stacking_chain<D: DocumentProvider + ?Sized>(
    doc: &D,
    node: NodeKey,
) -> Result<Vec<StackingEntry>> {
    let mut path = ancestors(doc, node);
    path.reverse();
    path.push(node);
    let mut chain = Vec::new();
    for step in path {
        let style = doc.computed_style(step)?;
        if creates_stacking_context(&style) {
            chain.push(StackingEntry {
                node: step,
                z_index: resolved_z_index(&style),
            });
        }
    }
    Ok(chain)
}

/// Compare paint order: `Greater` means `first` renders above `second`.
///
/// # Errors
/// Returns an error if either chain cannot be resolved.
pub fn compare_stacking<D: DocumentProvider + ?Sized>(
    doc: &D,
    first: NodeKey,
    second: NodeKey,
) -> Result<Ordering> {
    if first == second {
        return Ok(Ordering::Equal);
    }
    let first_chain = stacking_chain(doc, first)?;
    let second_chain = stacking_chain(doc, second)?;
    for (left, right) in first_chain.iter().zip(second_chain.iter()) {
        if left.node == right.node {
            continue;
        }
        return Ok(match left.z_index.cmp(&right.z_index) {
            Ordering::Equal => compare_document_order(doc, left.node, right.node),
            ordering => ordering,
        });
    }
    let shared = first_chain.len().min(second_chain.len());
    let ordering = match (first_chain.get(shared), second_chain.get(shared)) {
        // `first` sits in a nested context inside `second`'s context chain.
        (Some(deeper), None) => {
            if deeper.z_index < 0 {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (None, Some(deeper)) => {
            if deeper.z_index < 0 {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        _ => compare_document_order(doc, first, second),
    };
    Ok(ordering)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Static elements never create a context; fixed ones always do.
    ///
    /// # Panics
    /// Panics if the context rules are wrong.
    #[test]
    fn fixed_creates_context_static_does_not() {
        let fixed = ComputedStyle {
            position: Position::Fixed,
            ..Default::default()
        };
        let static_style = ComputedStyle::default();
        assert!(creates_stacking_context(&fixed));
        assert!(!creates_stacking_context(&static_style));
    }

    /// Z-index on a static element has no effect.
    ///
    /// # Panics
    /// Panics if the static z-index leaks through.
    #[test]
    fn static_z_index_is_ignored() {
        let style = ComputedStyle {
            z_index: Some(99),
            ..Default::default()
        };
        assert_eq!(resolved_z_index(&style), 0);
    }
}
