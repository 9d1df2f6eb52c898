//! Ports between a rendered page and the relayout core.
//!
//! The core never computes layout. It reads resolved geometry and style through
//! [`DocumentProvider`], writes patch styles through [`StylePort`], and learns about
//! page changes as batches of [`MutationRecord`]s and [`AnimationStart`] events
//! delivered to a [`ChangeSubscriber`].

use crate::geometry::{EdgeInsets, Geometry, Viewport};
use crate::key::NodeKey;
use crate::style::ComputedStyle;
use anyhow::Result;

/// Outcome of looking a property up in the author stylesheets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleLookup {
    /// A matching rule declares the property.
    Found(String),
    /// Stylesheets are readable but no matching rule declares the property.
    NotDeclared,
    /// Stylesheets cannot be read (cross-origin); callers fall back to measurement.
    Inaccessible,
}

/// Read access to the live render tree.
pub trait DocumentProvider {
    /// Current layout viewport.
    fn viewport(&self) -> Viewport;

    /// Platform safe-area insets.
    fn safe_area(&self) -> EdgeInsets;

    /// The document root.
    fn root(&self) -> NodeKey;

    /// Parent element, `None` for the root and for detached nodes.
    fn parent(&self, node: NodeKey) -> Option<NodeKey>;

    /// Element children in document order.
    fn children(&self, node: NodeKey) -> Vec<NodeKey>;

    /// Lowercase tag name.
    fn tag_name(&self, node: NodeKey) -> Option<String>;

    /// Raw attribute value.
    fn attribute(&self, node: NodeKey, name: &str) -> Option<String>;

    /// Value of `property` in the element's inline style (author value or live patch).
    fn inline_style(&self, node: NodeKey, property: &str) -> Option<String>;

    /// Value of `property` from matching author stylesheet rules.
    fn matched_rule_value(&self, node: NodeKey, property: &str) -> RuleLookup;

    /// Whether the node is still connected to the document.
    fn is_attached(&self, node: NodeKey) -> bool;

    /// Resolved border box in viewport coordinates, including transforms.
    ///
    /// # Errors
    /// Returns an error if the node is unknown or detached.
    fn geometry(&self, node: NodeKey) -> Result<Geometry>;

    /// Resolved style snapshot.
    ///
    /// # Errors
    /// Returns an error if the node is unknown or detached.
    fn computed_style(&self, node: NodeKey) -> Result<ComputedStyle>;
}

/// Write access for inline patch styles. Writes are buffered until [`StylePort::flush`].
pub trait StylePort {
    /// Queue an inline style write.
    fn set_style(&mut self, node: NodeKey, property: &str, value: &str);

    /// Queue removal of an inline style property.
    fn remove_style(&mut self, node: NodeKey, property: &str);

    /// Apply every queued write as one batch.
    ///
    /// # Errors
    /// Returns an error if the batch could not be applied.
    fn flush(&mut self) -> Result<()>;

    /// Drop every patch previously written to `node`, queued or applied.
    fn clear(&mut self, node: NodeKey);
}

/// What changed in one mutation record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    ChildList {
        added: Vec<NodeKey>,
        removed: Vec<NodeKey>,
    },
    Attribute {
        name: String,
    },
}

/// One raw tree mutation notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeKey,
    pub kind: MutationKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationKind {
    Animation,
    Transition,
}

/// An animation or transition started somewhere in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationStart {
    pub target: NodeKey,
    pub kind: AnimationKind,
}

/// Receives change notifications from a document provider.
pub trait ChangeSubscriber {
    /// A batch of raw mutation records.
    fn on_mutation_batch(&mut self, records: Vec<MutationRecord>);

    /// An animation or transition began.
    fn on_animation_start(&mut self, event: AnimationStart);
}
