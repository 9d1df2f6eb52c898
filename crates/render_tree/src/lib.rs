//! Render-tree access for the popup relayout core.
//!
//! This crate owns everything the core reads from or writes to a rendered page:
//! stable node keys, resolved geometry and style snapshots, the provider and style
//! ports, change records, iterative tree walks, stacking order, and an in-memory
//! [`Document`] that implements both ports for hosts and tests.

pub mod document;
pub mod geometry;
pub mod key;
pub mod parsers;
pub mod provider;
pub mod stacking;
pub mod style;
pub mod walk;

pub use document::Document;
pub use geometry::{EdgeInsets, Geometry, Viewport};
pub use key::{NodeKey, NodeKeyAllocator};
pub use provider::{
    AnimationKind, AnimationStart, ChangeSubscriber, DocumentProvider, MutationKind,
    MutationRecord, RuleLookup, StylePort,
};
pub use style::{
    Alignment, BoxSizing, ComputedStyle, Display, Edges, FlexDirection, Insets, Overflow,
    Position, Rgba, Transform2d, Visibility,
};
pub use walk::Visit;
