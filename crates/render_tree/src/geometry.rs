//! Resolved boxes, viewport dimensions and safe-area insets.

use serde::Serialize;

/// A border box in viewport coordinates, as reported by the document provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Geometry {
    pub top: f32,
    pub left: f32,
    pub width: f32,
    pub height: f32,
}

impl Geometry {
    #[inline]
    #[must_use]
    pub const fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    #[inline]
    #[must_use]
    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    #[inline]
    #[must_use]
    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    #[inline]
    #[must_use]
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    #[inline]
    #[must_use]
    pub fn center_x(&self) -> f32 {
        self.left + self.width / 2.0
    }

    #[inline]
    #[must_use]
    pub fn center_y(&self) -> f32 {
        self.top + self.height / 2.0
    }

    /// True when the box has no paintable area.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Intersection of two boxes, `None` when they do not overlap.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            return None;
        }
        Some(Self::new(left, top, right - left, bottom - top))
    }

    /// Smallest box containing both boxes.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let left = self.left.min(other.left);
        let top = self.top.min(other.top);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Self::new(left, top, right - left, bottom - top)
    }

    /// Shrink every side by the given insets.
    #[must_use]
    pub fn inset(&self, insets: &EdgeInsets) -> Self {
        Self::new(
            self.left + insets.left,
            self.top + insets.top,
            (self.width - insets.left - insets.right).max(0.0),
            (self.height - insets.top - insets.bottom).max(0.0),
        )
    }
}

/// Layout viewport dimensions in CSS pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    #[inline]
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    #[inline]
    #[must_use]
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// The viewport as a box anchored at the origin.
    #[inline]
    #[must_use]
    pub const fn bounds(&self) -> Geometry {
        Geometry::new(0.0, 0.0, self.width, self.height)
    }

    /// Fraction of the viewport covered by the visible part of `rect`.
    #[must_use]
    pub fn area_ratio(&self, rect: &Geometry) -> f32 {
        let total = self.area();
        if total <= 0.0 {
            return 0.0;
        }
        self.bounds()
            .intersection(rect)
            .map_or(0.0, |visible| visible.area() / total)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(375.0, 667.0)
    }
}

/// Platform safe-area insets (notches, home indicators).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct EdgeInsets {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}
