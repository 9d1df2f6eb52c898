//! Fixed logistic-regression fallback for ambiguous popup candidates.
//!
//! Features are standardised with fixed means and scales, dotted with fixed
//! coefficients and squashed through a sigmoid. Any feature that cannot be
//! encoded fails closed to a negative prediction.

use crate::popup::PopupInfo;
use render_tree::Position;
use serde::Serialize;

/// Number of model inputs.
pub const FEATURE_COUNT: usize = 7;

const MEANS: [f64; FEATURE_COUNT] = [2.1, 0.8, 0.6, 0.9, 0.5, 0.7, 2.3];
const SCALES: [f64; FEATURE_COUNT] = [1.0, 0.4, 0.35, 0.3, 0.5, 0.38, 0.9];
const COEFFICIENTS: [f64; FEATURE_COUNT] = [0.6, 1.2, 0.8, 1.5, 0.9, 1.4, 0.7];
const INTERCEPT: f64 = -0.3;
const THRESHOLD: f64 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Prediction {
    /// `1` accepts the candidate as a popup.
    pub label: u8,
    pub probability: f64,
}

impl Prediction {
    const REJECTED: Self = Self {
        label: 0,
        probability: 0.0,
    };

    #[inline]
    #[must_use]
    pub const fn is_popup(&self) -> bool {
        self.label == 1
    }
}

/// Ordinal code of a position keyword; `sticky` has no code.
const fn position_code(position: Position) -> Option<f64> {
    match position {
        Position::Static => Some(0.0),
        Position::Relative => Some(1.0),
        Position::Absolute => Some(2.0),
        Position::Fixed => Some(3.0),
        Position::Sticky => None,
    }
}

const fn flag(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

/// Raw feature vector in model order:
/// root position, has mask, root area ratio, root visible, has close button,
/// mask area ratio, mask position.
pub fn features(info: &PopupInfo) -> Option<[f64; FEATURE_COUNT]> {
    let raw = [
        position_code(info.root_position)?,
        flag(info.has_mask),
        f64::from(info.root_area_ratio),
        flag(info.root_visible),
        flag(info.has_close_button),
        f64::from(info.mask_area_ratio),
        position_code(info.mask_position)?,
    ];
    raw.iter().all(|value| value.is_finite()).then_some(raw)
}

fn sigmoid(value: f64) -> f64 {
    1.0 / (1.0 + (-value).exp())
}

/// Score a candidate; unmapped or non-finite features yield label 0, probability 0.
pub fn predict(info: &PopupInfo) -> Prediction {
    let Some(raw) = features(info) else {
        return Prediction::REJECTED;
    };
    let logit = raw
        .iter()
        .zip(MEANS.iter().zip(SCALES.iter()))
        .zip(COEFFICIENTS.iter())
        .fold(INTERCEPT, |acc, ((value, (mean, scale)), coefficient)| {
            acc + coefficient * (value - mean) / scale
        });
    let probability = sigmoid(logit);
    Prediction {
        label: u8::from(probability >= THRESHOLD),
        probability,
    }
}
