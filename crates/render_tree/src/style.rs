//! Resolved style snapshot read by the relayout core.
//!
//! Only the properties the detector and the relayout engine consume are modelled;
//! a few values that need further decoding (`box-shadow`, durations, gradients)
//! are kept as their serialized text and decoded by [`crate::parsers`].

use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Rgba {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: u8,
}

impl Rgba {
    #[inline]
    #[must_use]
    pub const fn new(red: u8, green: u8, blue: u8, alpha: u8) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    /// Partially transparent: neither fully clear nor fully opaque.
    #[inline]
    #[must_use]
    pub const fn is_semi_transparent(&self) -> bool {
        self.alpha > 0 && self.alpha < u8::MAX
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum Display {
    #[default]
    Block,
    Inline,
    InlineBlock,
    Flex,
    InlineFlex,
    Grid,
    Contents,
    None,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
    Collapse,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum Position {
    #[default]
    Static,
    Relative,
    Absolute,
    Fixed,
    Sticky,
}

impl Position {
    /// `fixed` or `absolute`, the two positions that take a box out of flow.
    #[inline]
    #[must_use]
    pub const fn is_out_of_flow(self) -> bool {
        matches!(self, Self::Fixed | Self::Absolute)
    }

    #[inline]
    #[must_use]
    pub const fn is_positioned(self) -> bool {
        !matches!(self, Self::Static)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum Overflow {
    #[default]
    Visible,
    Hidden,
    Clip,
    Auto,
    Scroll,
}

impl Overflow {
    /// Whether the box can scroll its content on this axis.
    #[inline]
    #[must_use]
    pub const fn is_scrollable(self) -> bool {
        matches!(self, Self::Auto | Self::Scroll)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum BoxSizing {
    #[default]
    ContentBox,
    BorderBox,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum FlexDirection {
    #[default]
    Row,
    RowReverse,
    Column,
    ColumnReverse,
}

impl FlexDirection {
    #[inline]
    #[must_use]
    pub const fn is_column(self) -> bool {
        matches!(self, Self::Column | Self::ColumnReverse)
    }
}

/// Shared keyword set for `justify-content` and `align-items`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum Alignment {
    #[default]
    Normal,
    Start,
    End,
    FlexStart,
    FlexEnd,
    Center,
    Stretch,
    Baseline,
    SpaceBetween,
    SpaceAround,
    SpaceEvenly,
}

impl Alignment {
    /// `flex-end` or `end`.
    #[inline]
    #[must_use]
    pub const fn is_end(self) -> bool {
        matches!(self, Self::End | Self::FlexEnd)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Edges {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

/// `top`/`right`/`bottom`/`left` offsets; `None` is `auto`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Insets {
    pub top: Option<f32>,
    pub right: Option<f32>,
    pub bottom: Option<f32>,
    pub left: Option<f32>,
}

/// A resolved 2D transform restricted to uniform scale plus translation,
/// applied about the box centre.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Transform2d {
    pub scale: f32,
    pub translate_x: f32,
    pub translate_y: f32,
}

impl Transform2d {
    pub const IDENTITY: Self = Self {
        scale: 1.0,
        translate_x: 0.0,
        translate_y: 0.0,
    };

    #[inline]
    #[must_use]
    pub fn is_identity(&self) -> bool {
        (self.scale - 1.0).abs() < f32::EPSILON
            && self.translate_x.abs() < f32::EPSILON
            && self.translate_y.abs() < f32::EPSILON
    }

    /// `self` applied after `inner`.
    #[must_use]
    pub fn then_inner(&self, inner: &Self) -> Self {
        Self {
            scale: self.scale * inner.scale,
            translate_x: self.scale * inner.translate_x + self.translate_x,
            translate_y: self.scale * inner.translate_y + self.translate_y,
        }
    }
}

impl Default for Transform2d {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ComputedStyle {
    pub display: Display,
    pub visibility: Visibility,
    pub position: Position,
    /// `None` represents `z-index: auto`.
    pub z_index: Option<i32>,
    pub opacity: f32,
    pub overflow_x: Overflow,
    pub overflow_y: Overflow,
    pub box_sizing: BoxSizing,
    pub padding: Edges,
    pub border_width: Edges,
    pub inset: Insets,
    pub flex_direction: FlexDirection,
    pub justify_content: Alignment,
    pub align_items: Alignment,
    pub background_color: Rgba,
    /// Serialized `background-image`, `none` when absent.
    pub background_image: String,
    /// Serialized `background-size`.
    pub background_size: String,
    pub transform: Transform2d,
    /// Serialized `transform`, `none` when absent.
    pub transform_text: String,
    pub transition_duration: String,
    pub animation_duration: String,
    /// Serialized `box-shadow`, `none` when absent.
    pub box_shadow: String,
    pub max_height: Option<f32>,
}

impl ComputedStyle {
    /// Rendered at all: displayed, not hidden and not fully transparent.
    #[inline]
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.display != Display::None
            && self.visibility == Visibility::Visible
            && self.opacity > 0.0
    }

    /// Vertical or horizontal scrolling is possible.
    #[inline]
    #[must_use]
    pub const fn is_scroll_container(&self) -> bool {
        self.overflow_x.is_scrollable() || self.overflow_y.is_scrollable()
    }

    #[inline]
    #[must_use]
    pub fn has_transform(&self) -> bool {
        !self.transform.is_identity()
    }
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: Display::Block,
            visibility: Visibility::Visible,
            position: Position::Static,
            z_index: None,
            opacity: 1.0,
            overflow_x: Overflow::Visible,
            overflow_y: Overflow::Visible,
            box_sizing: BoxSizing::ContentBox,
            padding: Edges::default(),
            border_width: Edges::default(),
            inset: Insets::default(),
            flex_direction: FlexDirection::Row,
            justify_content: Alignment::Normal,
            align_items: Alignment::Normal,
            background_color: Rgba::default(),
            background_image: "none".to_owned(),
            background_size: "auto".to_owned(),
            transform: Transform2d::IDENTITY,
            transform_text: "none".to_owned(),
            transition_duration: "0s".to_owned(),
            animation_duration: "0s".to_owned(),
            box_shadow: "none".to_owned(),
            max_height: None,
        }
    }
}
