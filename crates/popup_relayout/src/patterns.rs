//! Keyword and role matching for close buttons, interactive elements and carousels.

use crate::config::RelayoutConfig;
use render_tree::walk::{Visit, collect, contains};
use render_tree::{Display, DocumentProvider, NodeKey};

const INTERACTIVE_TAGS: [&str; 4] = ["input", "select", "textarea", "button"];

const INTERACTIVE_ROLES: [&str; 11] = [
    "button", "link", "checkbox", "radio", "tab", "menuitem", "switch", "textbox", "combobox",
    "option", "slider",
];

/// Lowercased `class` attribute, empty when absent.
pub fn class_name<D: DocumentProvider + ?Sized>(doc: &D, node: NodeKey) -> String {
    doc.attribute(node, "class")
        .map(|class| class.to_ascii_lowercase())
        .unwrap_or_default()
}

fn contains_any(haystack: &str, keywords: &[String]) -> bool {
    !haystack.is_empty()
        && keywords
            .iter()
            .any(|keyword| haystack.contains(keyword.as_str()))
}

/// Whether `node` itself looks like a close button.
///
/// Matches on class, id, `aria-label`, background image URL and `img` source.
pub fn is_close_pattern<D: DocumentProvider + ?Sized>(
    doc: &D,
    node: NodeKey,
    config: &RelayoutConfig,
) -> bool {
    let keywords = &config.close_keywords;
    if contains_any(&class_name(doc, node), keywords) {
        return true;
    }
    let attribute_hit = ["id", "aria-label"].iter().any(|name| {
        doc.attribute(node, name)
            .is_some_and(|value| contains_any(&value.to_ascii_lowercase(), keywords))
    });
    if attribute_hit {
        return true;
    }
    if doc.tag_name(node).as_deref() == Some("img")
        && doc
            .attribute(node, "src")
            .is_some_and(|src| contains_any(&src.to_ascii_lowercase(), keywords))
    {
        return true;
    }
    doc.computed_style(node).is_ok_and(|style| {
        style.background_image.to_ascii_lowercase().contains("url(")
            && contains_any(&style.background_image.to_ascii_lowercase(), keywords)
    })
}

/// Innermost close-pattern matches under `scope` (inclusive).
///
/// A match that contains another match is dropped in favour of the inner one,
/// so an icon inside a close wrapper is reported once.
pub fn find_close_buttons<D: DocumentProvider + ?Sized>(
    doc: &D,
    scope: NodeKey,
    config: &RelayoutConfig,
) -> Vec<NodeKey> {
    let matches = collect(doc, scope, true, |node| match doc.computed_style(node) {
        Ok(style) if style.display == Display::None => Visit::SkipSubtree,
        Ok(style) if style.is_visible() && is_close_pattern(doc, node, config) => Visit::Accept,
        Ok(_) => Visit::Reject,
        Err(_) => Visit::SkipSubtree,
    });
    matches
        .iter()
        .copied()
        .filter(|candidate| {
            !matches
                .iter()
                .any(|other| other != candidate && contains(doc, *candidate, *other))
        })
        .collect()
}

/// Whether any close pattern exists under `scope` (inclusive).
pub fn contains_close_pattern<D: DocumentProvider + ?Sized>(
    doc: &D,
    scope: NodeKey,
    config: &RelayoutConfig,
) -> bool {
    !find_close_buttons(doc, scope, config).is_empty()
}

/// Form controls, ARIA widgets, tabbable elements, links and close buttons.
pub fn is_interactive<D: DocumentProvider + ?Sized>(
    doc: &D,
    node: NodeKey,
    config: &RelayoutConfig,
) -> bool {
    let tag = doc.tag_name(node).unwrap_or_default();
    if INTERACTIVE_TAGS.contains(&tag.as_str()) {
        return true;
    }
    if tag == "a" && doc.attribute(node, "href").is_some() {
        return true;
    }
    if doc
        .attribute(node, "role")
        .is_some_and(|role| INTERACTIVE_ROLES.contains(&role.trim().to_ascii_lowercase().as_str()))
    {
        return true;
    }
    if doc
        .attribute(node, "tabindex")
        .and_then(|index| index.trim().parse::<i32>().ok())
        .is_some_and(|index| index >= 0)
    {
        return true;
    }
    is_close_pattern(doc, node, config)
}

/// Whether `node` carries a carousel/slider class.
pub fn is_carousel<D: DocumentProvider + ?Sized>(
    doc: &D,
    node: NodeKey,
    config: &RelayoutConfig,
) -> bool {
    contains_any(&class_name(doc, node), &config.carousel_keywords)
}
