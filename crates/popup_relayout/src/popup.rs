//! Data model shared by the detection and repair stages.

use render_tree::{NodeKey, Position};
use serde::Serialize;

/// DOM relationship between mask and content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum StructuralType {
    /// Content lives inside the mask.
    A,
    /// Content is a sibling (or a sibling's descendant) of the mask.
    B,
    /// The mask is itself the popup root.
    C,
}

/// Presentation archetype driving the scaling strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum DecisionTreeType {
    Center,
    #[serde(rename = "Center_Button_Overlap")]
    CenterButtonOverlap,
    Bottom,
    Picker,
}

/// A confirmed popup: mask/content pair plus the measurements it was accepted on.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PopupInfo {
    pub root: NodeKey,
    pub mask: NodeKey,
    pub content: NodeKey,
    pub structural_type: StructuralType,
    pub root_position: Position,
    pub root_z_index: i32,
    pub mask_position: Position,
    pub mask_z_index: i32,
    pub has_mask: bool,
    /// Fraction of the viewport covered by the root box.
    pub root_area_ratio: f32,
    /// Fraction of the viewport covered by the mask box.
    pub mask_area_ratio: f32,
    pub root_visible: bool,
    pub mask_visible: bool,
    pub has_close_button: bool,
    pub sticky_top_height: f32,
    pub sticky_bottom_height: f32,
}

impl PopupInfo {
    /// Identity used by the single-slot cache: same root and same mask.
    #[inline]
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        self.root == other.root && self.mask == other.mask
    }
}
