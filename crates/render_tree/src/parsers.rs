//! Small decoders for serialized CSS values the relayout core inspects.

use crate::style::{Rgba, Transform2d};
use csscolorparser::Color;

/// Parse a pixel value (e.g. "20px" -> 20.0). Unitless numbers are treated as pixels.
pub fn parse_px(value: &str) -> Option<f32> {
    let trimmed = value.trim();
    trimmed.strip_suffix("px").map_or_else(
        || trimmed.parse::<f32>().ok(),
        |px_str| px_str.trim().parse::<f32>().ok(),
    )
}

/// Parse a length that may be a percentage of `reference`.
pub fn parse_length(value: &str, reference: f32) -> Option<f32> {
    let trimmed = value.trim();
    if let Some(percent) = trimmed.strip_suffix('%') {
        return percent
            .trim()
            .parse::<f32>()
            .ok()
            .map(|pct| pct / 100.0 * reference);
    }
    parse_px(trimmed)
}

/// Parse a CSS `<color>` into 8-bit channels.
pub fn parse_color(input: &str) -> Option<Rgba> {
    let parsed: Color = input.trim().parse().ok()?;
    let channels = parsed.to_rgba8();
    Some(Rgba::new(channels[0], channels[1], channels[2], channels[3]))
}

/// Parse a single `<time>` into milliseconds.
pub fn parse_time_ms(value: &str) -> Option<f32> {
    let trimmed = value.trim();
    if let Some(millis) = trimmed.strip_suffix("ms") {
        return millis.trim().parse::<f32>().ok();
    }
    trimmed
        .strip_suffix('s')
        .and_then(|secs| secs.trim().parse::<f32>().ok())
        .map(|secs| secs * 1000.0)
}

/// Longest duration in a comma-separated `<time>` list, in milliseconds.
///
/// Unparseable entries are ignored; an empty or fully invalid list yields `0`.
pub fn longest_duration_ms(list: &str) -> f32 {
    split_top_level(list, ',')
        .into_iter()
        .filter_map(parse_time_ms)
        .fold(0.0_f32, f32::max)
}

/// Duration list (`transition-duration` form) extracted from a `transition`
/// or `animation` shorthand: the first `<time>` of every layer.
pub fn shorthand_durations(shorthand: &str) -> String {
    split_top_level(shorthand, ',')
        .into_iter()
        .map(|layer| {
            tokens_top_level(layer)
                .into_iter()
                .find(|token| parse_time_ms(token).is_some())
                .unwrap_or("0s")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Split on `separator` while ignoring separators nested in parentheses.
pub fn split_top_level(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0_usize;
    let mut start = 0_usize;
    for (index, character) in input.char_indices() {
        match character {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if character == separator && depth == 0 => {
                parts.push(input[start..index].trim());
                start = index + character.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(input[start..].trim());
    parts.retain(|part| !part.is_empty());
    parts
}

/// Whitespace tokenization that keeps functional notation like `rgba(0, 0, 0, .5)` intact.
pub fn tokens_top_level(input: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut depth = 0_usize;
    let mut start: Option<usize> = None;
    for (index, character) in input.char_indices() {
        match character {
            '(' => {
                depth += 1;
                start.get_or_insert(index);
            }
            ')' => depth = depth.saturating_sub(1),
            _ if character.is_whitespace() && depth == 0 => {
                if let Some(begin) = start.take() {
                    tokens.push(&input[begin..index]);
                }
            }
            _ => {
                start.get_or_insert(index);
            }
        }
    }
    if let Some(begin) = start {
        tokens.push(&input[begin..]);
    }
    tokens
}

/// Functional notation calls (`name(args)`) in order of appearance.
pub fn function_calls(input: &str) -> Vec<(&str, &str)> {
    let mut calls = Vec::new();
    let mut rest = input;
    while let Some(open) = rest.find('(') {
        let name_start = rest[..open]
            .rfind(|character: char| character.is_whitespace() || character == ',')
            .map_or(0, |pos| pos + 1);
        let name = rest[name_start..open].trim();
        let mut depth = 0_usize;
        let mut close = None;
        for (index, character) in rest[open..].char_indices() {
            match character {
                '(' => depth += 1,
                ')' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        close = Some(open + index);
                        break;
                    }
                }
                _ => {}
            }
        }
        let Some(close_at) = close else {
            break;
        };
        calls.push((name, &rest[open + 1..close_at]));
        rest = &rest[close_at + 1..];
    }
    calls
}

/// One decoded `box-shadow` layer.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoxShadow {
    pub offset_x: f32,
    pub offset_y: f32,
    pub blur: f32,
    pub spread: f32,
    pub inset: bool,
    pub color: Rgba,
}

/// Decode every layer of a serialized `box-shadow`.
pub fn parse_box_shadows(value: &str) -> Vec<BoxShadow> {
    if value.trim().eq_ignore_ascii_case("none") {
        return Vec::new();
    }
    split_top_level(value, ',')
        .into_iter()
        .filter_map(|layer| {
            let mut shadow = BoxShadow::default();
            let mut lengths = Vec::with_capacity(4);
            for token in tokens_top_level(layer) {
                if token.eq_ignore_ascii_case("inset") {
                    shadow.inset = true;
                } else if let Some(length) = parse_px(token) {
                    lengths.push(length);
                } else if let Some(color) = parse_color(token) {
                    shadow.color = color;
                }
            }
            if lengths.len() < 2 {
                return None;
            }
            shadow.offset_x = lengths[0];
            shadow.offset_y = lengths[1];
            shadow.blur = lengths.get(2).copied().unwrap_or(0.0);
            shadow.spread = lengths.get(3).copied().unwrap_or(0.0);
            Some(shadow)
        })
        .collect()
}

/// Colour stops of every gradient in a serialized `background-image`.
pub fn gradient_color_stops(background_image: &str) -> Vec<Rgba> {
    let mut stops = Vec::new();
    for (name, args) in function_calls(background_image) {
        if !name.to_ascii_lowercase().contains("gradient") {
            continue;
        }
        for stop in split_top_level(args, ',') {
            for token in tokens_top_level(stop) {
                if let Some(color) = parse_color(token) {
                    stops.push(color);
                    break;
                }
            }
        }
    }
    stops
}

/// Parse a transform list into a uniform-scale transform.
///
/// Supports `translate`, `translateX`, `translateY`, `translate3d`, `scale`,
/// `scaleX`/`scaleY` (treated as uniform) and `matrix` without skew.
/// Percentages resolve against the element's own `width`/`height`.
/// Returns `None` for a list containing anything else.
pub fn parse_transform(value: &str, width: f32, height: f32) -> Option<Transform2d> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Some(Transform2d::IDENTITY);
    }
    let mut composed = Transform2d::IDENTITY;
    for (name, args) in function_calls(trimmed) {
        let params = split_top_level(args, ',');
        let step = match name.to_ascii_lowercase().as_str() {
            "translate" | "translate3d" => Transform2d {
                scale: 1.0,
                translate_x: parse_length(params.first()?, width)?,
                translate_y: params
                    .get(1)
                    .map_or(Some(0.0), |param| parse_length(param, height))?,
            },
            "translatex" => Transform2d {
                scale: 1.0,
                translate_x: parse_length(params.first()?, width)?,
                translate_y: 0.0,
            },
            "translatey" => Transform2d {
                scale: 1.0,
                translate_x: 0.0,
                translate_y: parse_length(params.first()?, height)?,
            },
            "scale" | "scalex" | "scaley" => Transform2d {
                scale: params.first()?.trim().parse::<f32>().ok()?,
                translate_x: 0.0,
                translate_y: 0.0,
            },
            "matrix" => {
                let numbers: Vec<f32> = params
                    .iter()
                    .filter_map(|param| param.trim().parse::<f32>().ok())
                    .collect();
                if numbers.len() != 6 {
                    return None;
                }
                Transform2d {
                    scale: numbers[0],
                    translate_x: numbers[4],
                    translate_y: numbers[5],
                }
            }
            _ => return None,
        };
        composed = composed.then_inner(&step);
    }
    Some(composed)
}

/// Parse a `style` attribute into lowercase property/value pairs.
pub fn parse_declarations(style: &str) -> Vec<(String, String)> {
    split_top_level(style, ';')
        .into_iter()
        .filter_map(|declaration| {
            let (name, value) = declaration.split_once(':')?;
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim();
            if name.is_empty() || value.is_empty() {
                return None;
            }
            Some((name, value.to_owned()))
        })
        .collect()
}
