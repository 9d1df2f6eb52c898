//! Runtime thresholds for popup detection and repair.
//!
//! Configuration can be built programmatically, parsed from JSON, or loaded from
//! environment variables on top of the defaults.

use anyhow::{Context as _, Result};
use core::time::Duration;
use render_tree::Viewport;
use serde::Deserialize;
use std::env;

/// Minimum gap between the repaired popup and the safe viewport edges.
///
/// Negative infinity keeps the edge-gap check permanently passing until a real
/// product threshold is chosen.
pub const EDGE_GAP_MIN_PLACEHOLDER_PX: f32 = f32::NEG_INFINITY;

/// Viewport box inside which repairs are allowed.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Breakpoints {
    pub max_width: f32,
    pub max_height: f32,
}

impl Breakpoints {
    /// Whether `viewport` falls inside the responsive gate.
    #[inline]
    #[must_use]
    pub fn contains(&self, viewport: Viewport) -> bool {
        viewport.width <= self.max_width && viewport.height <= self.max_height
    }
}

impl Default for Breakpoints {
    fn default() -> Self {
        Self {
            max_width: 768.0,
            max_height: 1024.0,
        }
    }
}

/// Runtime configuration for the popup relayout core.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct RelayoutConfig {
    /// Viewport share above which a semi-transparent node counts as a mask.
    pub mask_area_ratio: f32,
    /// Viewport share a content node must exceed.
    pub content_area_ratio: f32,
    /// Mask share above which the classifier is bypassed.
    pub fast_path_mask_ratio: f32,
    pub close_keywords: Vec<String>,
    pub carousel_keywords: Vec<String>,
    /// Lower clamp for the computed scale factor.
    pub min_scale: f32,
    /// Fraction of the effective viewport height the scaled content should fill.
    pub target_fill_ratio: f32,
    pub scale_animation_ms: u64,
    /// Frames to wait before validating a repair.
    pub settle_frames: u32,
    pub frame_interval_ms: f64,
    #[serde(skip)]
    pub edge_gap_min_px: f32,
    pub breakpoints: Breakpoints,
    pub enabled: bool,
}

impl Default for RelayoutConfig {
    fn default() -> Self {
        Self {
            mask_area_ratio: 0.8,
            content_area_ratio: 0.1,
            fast_path_mask_ratio: 0.95,
            close_keywords: ["close", "dismiss", "cancel", "guanbi", "icon-x", "btn-x"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            carousel_keywords: ["swiper", "carousel", "slider", "slick"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            min_scale: 0.5,
            target_fill_ratio: 0.7,
            scale_animation_ms: 200,
            settle_frames: 26,
            frame_interval_ms: 1000.0 / 60.0,
            edge_gap_min_px: EDGE_GAP_MIN_PLACEHOLDER_PX,
            breakpoints: Breakpoints::default(),
            enabled: true,
        }
    }
}

impl RelayoutConfig {
    /// Parse a JSON document; missing fields keep their defaults.
    ///
    /// # Errors
    /// Returns an error if `json` is not a valid configuration object.
    pub fn from_json(json: &str) -> Result<Self> {
        let parsed: Self =
            serde_json::from_str(json).context("parsing popup relayout configuration")?;
        Ok(parsed.normalized())
    }

    /// Load overrides from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `POPUP_RELAYOUT_MASK_AREA_RATIO`
    /// - `POPUP_RELAYOUT_CONTENT_AREA_RATIO`
    /// - `POPUP_RELAYOUT_MIN_SCALE`
    /// - `POPUP_RELAYOUT_ANIMATION_MS`
    /// - `POPUP_RELAYOUT_MAX_WIDTH`
    /// - `POPUP_RELAYOUT_DISABLED`: set to "1" to disable repairs
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ratio) = env_f32("POPUP_RELAYOUT_MASK_AREA_RATIO") {
            config.mask_area_ratio = ratio;
        }
        if let Some(ratio) = env_f32("POPUP_RELAYOUT_CONTENT_AREA_RATIO") {
            config.content_area_ratio = ratio;
        }
        if let Some(scale) = env_f32("POPUP_RELAYOUT_MIN_SCALE") {
            config.min_scale = scale;
        }
        if let Some(millis) = env::var("POPUP_RELAYOUT_ANIMATION_MS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
        {
            config.scale_animation_ms = millis;
        }
        if let Some(width) = env_f32("POPUP_RELAYOUT_MAX_WIDTH") {
            config.breakpoints.max_width = width;
        }
        config.enabled = env::var("POPUP_RELAYOUT_DISABLED").ok().as_deref() != Some("1");
        config.normalized()
    }

    /// Clamp values that would break the scale computation.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.min_scale = self.effective_min_scale();
        self
    }

    /// `min_scale` clamped to `(0, 1]`; unusable values fall back to the default.
    #[must_use]
    pub fn effective_min_scale(&self) -> f32 {
        if self.min_scale.is_finite() && self.min_scale > 0.0 {
            self.min_scale.min(1.0)
        } else {
            Self::default().min_scale
        }
    }

    /// Settle wait before validation.
    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        frames_to_duration(self.settle_frames, self.frame_interval_ms)
    }

    /// Length of the scale transition.
    #[inline]
    #[must_use]
    pub const fn scale_animation(&self) -> Duration {
        Duration::from_millis(self.scale_animation_ms)
    }
}

/// `frames` animation frames at `interval_ms` each.
#[must_use]
pub fn frames_to_duration(frames: u32, interval_ms: f64) -> Duration {
    let total = f64::from(frames) * interval_ms.max(0.0) / 1000.0;
    Duration::try_from_secs_f64(total).unwrap_or(Duration::ZERO)
}

fn env_f32(name: &str) -> Option<f32> {
    env::var(name)
        .ok()
        .and_then(|val| val.trim().parse::<f32>().ok())
        .filter(|val| val.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Defaults carry the documented thresholds.
    ///
    /// # Panics
    /// Panics if a default drifts.
    #[test]
    fn defaults_match_documented_values() {
        let config = RelayoutConfig::default();
        assert!((config.mask_area_ratio - 0.8).abs() < f32::EPSILON);
        assert_eq!(config.settle_frames, 26);
        assert!(config.edge_gap_min_px.is_infinite());
        let settle = config.settle_delay().as_millis();
        assert!((430..=435).contains(&settle));
    }

    /// JSON keeps unspecified fields and clamps the minimum scale.
    ///
    /// # Errors
    /// Returns an error if the override document fails to parse.
    #[test]
    fn json_partial_override() -> Result<()> {
        let config = RelayoutConfig::from_json(r#"{"min_scale": 3.0, "settle_frames": 10}"#)?;
        assert!((config.min_scale - 1.0).abs() < f32::EPSILON);
        assert_eq!(config.settle_frames, 10);
        assert!((config.content_area_ratio - 0.1).abs() < f32::EPSILON);
        assert!(RelayoutConfig::from_json("[1, 2]").ok().is_none());
        Ok(())
    }

    /// Environment overrides never produce an unusable minimum scale.
    ///
    /// # Panics
    /// Panics if the loaded scale leaves `(0, 1]`.
    #[test]
    fn env_config_is_normalized() {
        let config = RelayoutConfig::from_env();
        assert!(config.min_scale > 0.0);
        assert!(config.min_scale <= 1.0);
        assert_eq!(config.scale_animation().as_millis(), u128::from(config.scale_animation_ms));
    }
}
