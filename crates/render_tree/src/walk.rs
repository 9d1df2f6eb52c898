//! Iterative tree traversal and document-order helpers.
//!
//! Walks use an explicit stack so arbitrarily deep pages cannot overflow the call
//! stack. Filters decide per node whether it is collected and whether its subtree
//! is entered.

use crate::key::NodeKey;
use crate::provider::DocumentProvider;
use core::cmp::Ordering;

/// Filter verdict for one visited node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Collect the node and descend into its children.
    Accept,
    /// Do not collect the node but still descend.
    Reject,
    /// Neither collect the node nor visit its subtree.
    SkipSubtree,
}

/// Pre-order (document order) walk from `start`, collecting accepted nodes.
pub fn collect<D, F>(doc: &D, start: NodeKey, include_start: bool, mut filter: F) -> Vec<NodeKey>
where
    D: DocumentProvider + ?Sized,
    F: FnMut(NodeKey) -> Visit,
{
    let mut collected = Vec::new();
    let mut stack = if include_start {
        vec![start]
    } else {
        doc.children(start).into_iter().rev().collect()
    };
    while let Some(node) = stack.pop() {
        match filter(node) {
            Visit::SkipSubtree => continue,
            Visit::Accept => collected.push(node),
            Visit::Reject => {}
        }
        stack.extend(doc.children(node).into_iter().rev());
    }
    collected
}

/// Every descendant of `start` (exclusive) in document order.
pub fn descendants<D: DocumentProvider + ?Sized>(doc: &D, start: NodeKey) -> Vec<NodeKey> {
    collect(doc, start, false, |_| Visit::Accept)
}

/// Ancestors of `node`, nearest first, excluding `node` itself.
pub fn ancestors<D: DocumentProvider + ?Sized>(doc: &D, node: NodeKey) -> Vec<NodeKey> {
    let mut chain = Vec::new();
    let mut current = doc.parent(node);
    while let Some(parent) = current {
        chain.push(parent);
        current = doc.parent(parent);
    }
    chain
}

/// Inclusive containment: `ancestor == node` or `ancestor` is above `node`.
pub fn contains<D: DocumentProvider + ?Sized>(doc: &D, ancestor: NodeKey, node: NodeKey) -> bool {
    if ancestor == node {
        return true;
    }
    let mut current = doc.parent(node);
    while let Some(parent) = current {
        if parent == ancestor {
            return true;
        }
        current = doc.parent(parent);
    }
    false
}

/// Number of ancestors above `node`.
pub fn depth<D: DocumentProvider + ?Sized>(doc: &D, node: NodeKey) -> usize {
    ancestors(doc, node).len()
}

/// Nearest ancestor (exclusive) satisfying `predicate`.
pub fn nearest_ancestor<D, F>(doc: &D, node: NodeKey, mut predicate: F) -> Option<NodeKey>
where
    D: DocumentProvider + ?Sized,
    F: FnMut(NodeKey) -> bool,
{
    let mut current = doc.parent(node);
    while let Some(parent) = current {
        if predicate(parent) {
            return Some(parent);
        }
        current = doc.parent(parent);
    }
    None
}

/// The child of `ancestor` on the path down to `node`; `None` when `node` is
/// not a proper descendant.
pub fn child_towards<D: DocumentProvider + ?Sized>(
    doc: &D,
    ancestor: NodeKey,
    node: NodeKey,
) -> Option<NodeKey> {
    let mut current = node;
    loop {
        let parent = doc.parent(current)?;
        if parent == ancestor {
            return Some(current);
        }
        current = parent;
    }
}

/// Child-index path from the root down to `node`.
fn index_path<D: DocumentProvider + ?Sized>(doc: &D, node: NodeKey) -> Vec<usize> {
    let mut path = Vec::new();
    let mut current = node;
    while let Some(parent) = doc.parent(current) {
        let index = doc
            .children(parent)
            .iter()
            .position(|child| *child == current)
            .unwrap_or(usize::MAX);
        path.push(index);
        current = parent;
    }
    path.reverse();
    path
}

/// Document (pre-order) position of `first` relative to `second`.
///
/// An ancestor precedes its descendants.
pub fn compare_document_order<D: DocumentProvider + ?Sized>(
    doc: &D,
    first: NodeKey,
    second: NodeKey,
) -> Ordering {
    if first == second {
        return Ordering::Equal;
    }
    index_path(doc, first).cmp(&index_path(doc, second))
}

/// `true` when `first` comes before `second` in document order.
pub fn precedes<D: DocumentProvider + ?Sized>(doc: &D, first: NodeKey, second: NodeKey) -> bool {
    compare_document_order(doc, first, second) == Ordering::Less
}
