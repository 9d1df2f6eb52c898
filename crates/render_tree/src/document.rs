//! In-memory render tree implementing both provider ports.
//!
//! Layout is supplied by the host (or a test fixture) as untransformed border
//! boxes; the document only composes transforms, `max-height` clamping and
//! `display: none` on top of it so that patched styles show up in reported
//! geometry the way a browser would report them.

use crate::geometry::{EdgeInsets, Geometry, Viewport};
use crate::key::{NodeKey, NodeKeyAllocator};
use crate::parsers::{parse_declarations, parse_px, parse_transform, shorthand_durations};
use crate::provider::{
    AnimationKind, AnimationStart, ChangeSubscriber, DocumentProvider, MutationKind,
    MutationRecord, RuleLookup, StylePort,
};
use crate::style::{ComputedStyle, Display, Overflow, Transform2d};
use anyhow::{Result, anyhow};
use core::mem;
use indextree::{Arena, Node, NodeId};
use smallvec::SmallVec;
use std::collections::HashMap;

/// One element in the arena.
#[derive(Debug, Clone)]
struct RenderNode {
    key: NodeKey,
    tag: String,
    attrs: SmallVec<[(String, String); 4]>,
    /// Declarations parsed from the `style` attribute.
    inline_decls: Vec<(String, String)>,
    /// Untransformed border box.
    layout: Geometry,
    /// Resolved style before patches.
    style: ComputedStyle,
    /// Flushed style-port writes.
    patches: HashMap<String, String>,
}

impl RenderNode {
    fn new(key: NodeKey, tag: &str) -> Self {
        Self {
            key,
            tag: tag.to_ascii_lowercase(),
            attrs: SmallVec::new(),
            inline_decls: Vec::new(),
            layout: Geometry::default(),
            style: ComputedStyle::default(),
            patches: HashMap::new(),
        }
    }
}

/// A queued style-port write.
#[derive(Debug, Clone)]
enum PendingWrite {
    Set {
        node: NodeKey,
        property: String,
        value: String,
    },
    Remove {
        node: NodeKey,
        property: String,
    },
}

/// Arena-backed document with stable [`NodeKey`]s.
#[derive(Debug)]
pub struct Document {
    arena: Arena<RenderNode>,
    ids: HashMap<NodeKey, NodeId>,
    keys: NodeKeyAllocator,
    root: NodeId,
    viewport: Viewport,
    safe_area: EdgeInsets,
    rules: HashMap<NodeKey, HashMap<String, String>>,
    stylesheets_accessible: bool,
    pending_writes: Vec<PendingWrite>,
    records: Vec<MutationRecord>,
    animations: Vec<AnimationStart>,
    flush_count: u64,
}

impl Document {
    /// Create a document whose root `<html>` element spans the viewport.
    pub fn new(viewport: Viewport) -> Self {
        let mut arena = Arena::new();
        let mut root_node = RenderNode::new(NodeKey::ROOT, "html");
        root_node.layout = viewport.bounds();
        let root = arena.new_node(root_node);
        let mut ids = HashMap::new();
        ids.insert(NodeKey::ROOT, root);
        Self {
            arena,
            ids,
            keys: NodeKeyAllocator::new(),
            root,
            viewport,
            safe_area: EdgeInsets::default(),
            rules: HashMap::new(),
            stylesheets_accessible: true,
            pending_writes: Vec::new(),
            records: Vec::new(),
            animations: Vec::new(),
            flush_count: 0,
        }
    }

    fn id_of(&self, node: NodeKey) -> Result<NodeId> {
        self.ids
            .get(&node)
            .copied()
            .ok_or_else(|| anyhow!("unknown node {node:?}"))
    }

    fn node(&self, node: NodeKey) -> Result<&RenderNode> {
        let id = self.id_of(node)?;
        self.arena
            .get(id)
            .map(Node::get)
            .ok_or_else(|| anyhow!("node {node:?} was removed from the arena"))
    }

    fn node_mut(&mut self, node: NodeKey) -> Result<&mut RenderNode> {
        let id = self.id_of(node)?;
        self.arena
            .get_mut(id)
            .map(Node::get_mut)
            .ok_or_else(|| anyhow!("node {node:?} was removed from the arena"))
    }

    fn key_of(&self, id: NodeId) -> Option<NodeKey> {
        self.arena.get(id).map(|entry| entry.get().key)
    }

    /// Append a new element under `parent` and record the insertion.
    ///
    /// # Errors
    /// Returns an error if `parent` is unknown.
    pub fn append_element(&mut self, parent: NodeKey, tag: &str) -> Result<NodeKey> {
        let parent_id = self.id_of(parent)?;
        let key = self.keys.mint();
        let id = self.arena.new_node(RenderNode::new(key, tag));
        parent_id
            .checked_append(id, &mut self.arena)
            .map_err(|err| anyhow!("cannot append {key:?} to {parent:?}: {err}"))?;
        self.ids.insert(key, id);
        self.records.push(MutationRecord {
            target: parent,
            kind: MutationKind::ChildList {
                added: vec![key],
                removed: Vec::new(),
            },
        });
        Ok(key)
    }

    /// Detach `node` (and its subtree) and record the removal.
    ///
    /// # Errors
    /// Returns an error if `node` is unknown or is the root.
    pub fn remove_node(&mut self, node: NodeKey) -> Result<()> {
        if node == NodeKey::ROOT {
            return Err(anyhow!("the document root cannot be removed"));
        }
        let id = self.id_of(node)?;
        let parent = self
            .arena
            .get(id)
            .and_then(Node::parent)
            .and_then(|parent_id| self.key_of(parent_id));
        id.detach(&mut self.arena);
        if let Some(parent_key) = parent {
            self.records.push(MutationRecord {
                target: parent_key,
                kind: MutationKind::ChildList {
                    added: Vec::new(),
                    removed: vec![node],
                },
            });
        }
        Ok(())
    }

    /// Set an attribute; `style` is also parsed into inline declarations.
    ///
    /// # Errors
    /// Returns an error if `node` is unknown.
    pub fn set_attribute(&mut self, node: NodeKey, name: &str, value: &str) -> Result<()> {
        let name = name.to_ascii_lowercase();
        let entry = self.node_mut(node)?;
        if name == "style" {
            entry.inline_decls = parse_declarations(value);
        }
        if let Some(existing) = entry.attrs.iter_mut().find(|(attr, _)| *attr == name) {
            existing.1 = value.to_owned();
        } else {
            entry.attrs.push((name.clone(), value.to_owned()));
        }
        self.records.push(MutationRecord {
            target: node,
            kind: MutationKind::Attribute { name },
        });
        Ok(())
    }

    /// Set the untransformed border box the host laid the element out at.
    ///
    /// # Errors
    /// Returns an error if `node` is unknown.
    pub fn set_layout(&mut self, node: NodeKey, layout: Geometry) -> Result<()> {
        self.node_mut(node)?.layout = layout;
        Ok(())
    }

    /// Mutate the resolved (pre-patch) style of `node`.
    ///
    /// # Errors
    /// Returns an error if `node` is unknown.
    pub fn update_style<F: FnOnce(&mut ComputedStyle)>(
        &mut self,
        node: NodeKey,
        update: F,
    ) -> Result<()> {
        update(&mut self.node_mut(node)?.style);
        Ok(())
    }

    /// Declare `property: value` in a stylesheet rule matching `node`.
    pub fn set_rule_value(&mut self, node: NodeKey, property: &str, value: &str) {
        self.rules
            .entry(node)
            .or_default()
            .insert(property.to_ascii_lowercase(), value.to_owned());
    }

    /// Simulate cross-origin stylesheets that cannot be inspected.
    pub const fn set_stylesheets_accessible(&mut self, accessible: bool) {
        self.stylesheets_accessible = accessible;
    }

    pub const fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub const fn set_safe_area(&mut self, insets: EdgeInsets) {
        self.safe_area = insets;
    }

    /// Queue an animation/transition start notification for `node`.
    pub fn start_animation(&mut self, node: NodeKey, kind: AnimationKind) {
        self.animations.push(AnimationStart { target: node, kind });
    }

    /// Drain queued mutation records without delivering them.
    pub fn take_records(&mut self) -> Vec<MutationRecord> {
        mem::take(&mut self.records)
    }

    /// Deliver queued mutation records (as one batch) and animation starts.
    pub fn dispatch_changes<S: ChangeSubscriber + ?Sized>(&mut self, subscriber: &mut S) {
        let records = self.take_records();
        if !records.is_empty() {
            subscriber.on_mutation_batch(records);
        }
        for event in mem::take(&mut self.animations) {
            subscriber.on_animation_start(event);
        }
    }

    /// Flushed patch value for `property`, if any.
    pub fn patch_value(&self, node: NodeKey, property: &str) -> Option<String> {
        self.node(node)
            .ok()
            .and_then(|entry| entry.patches.get(property).cloned())
    }

    /// Number of style-port batches applied so far.
    pub const fn flush_count(&self) -> u64 {
        self.flush_count
    }

    /// Style with inline declarations, then flushed patches, folded in.
    fn effective_style(entry: &RenderNode) -> ComputedStyle {
        let mut style = entry.style.clone();
        for (property, value) in &entry.inline_decls {
            apply_override(&mut style, property, value);
        }
        for (property, value) in &entry.patches {
            apply_override(&mut style, property, value);
        }
        let size = Self::clamped_box(entry.layout, &style);
        style.transform = parse_transform(&style.transform_text, size.width, size.height)
            .unwrap_or(Transform2d::IDENTITY);
        style
    }

    /// Layout box after `max-height` clamping.
    fn clamped_box(layout: Geometry, style: &ComputedStyle) -> Geometry {
        let mut clamped = layout;
        if let Some(max_height) = style.max_height {
            clamped.height = clamped.height.min(max_height.max(0.0));
        }
        clamped
    }

    /// Map `rect` through `transform` applied about `origin`'s centre.
    fn apply_transform(rect: Geometry, transform: &Transform2d, origin: &Geometry) -> Geometry {
        let origin_x = origin.center_x();
        let origin_y = origin.center_y();
        let scale = transform.scale;
        Geometry::new(
            origin_x + transform.translate_x + scale * (rect.left - origin_x),
            origin_y + transform.translate_y + scale * (rect.top - origin_y),
            rect.width * scale,
            rect.height * scale,
        )
    }
}

/// Fold one inline declaration into a resolved style.
///
/// Only the properties the relayout core patches are understood; everything
/// else is expected to be resolved by the host already.
fn apply_override(style: &mut ComputedStyle, property: &str, value: &str) {
    match property {
        "transform" => value.clone_into(&mut style.transform_text),
        "overflow" => {
            let overflow = parse_overflow(value).unwrap_or(style.overflow_y);
            style.overflow_x = overflow;
            style.overflow_y = overflow;
        }
        "overflow-x" => style.overflow_x = parse_overflow(value).unwrap_or(style.overflow_x),
        "overflow-y" => style.overflow_y = parse_overflow(value).unwrap_or(style.overflow_y),
        "background-size" => value.clone_into(&mut style.background_size),
        "max-height" => style.max_height = parse_px(value),
        "transition" => style.transition_duration = shorthand_durations(value),
        "transition-duration" => value.clone_into(&mut style.transition_duration),
        _ => {}
    }
}

fn parse_overflow(value: &str) -> Option<Overflow> {
    match value.trim().to_ascii_lowercase().as_str() {
        "visible" => Some(Overflow::Visible),
        "hidden" => Some(Overflow::Hidden),
        "clip" => Some(Overflow::Clip),
        "auto" => Some(Overflow::Auto),
        "scroll" => Some(Overflow::Scroll),
        _ => None,
    }
}

impl DocumentProvider for Document {
    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn safe_area(&self) -> EdgeInsets {
        self.safe_area
    }

    fn root(&self) -> NodeKey {
        NodeKey::ROOT
    }

    fn parent(&self, node: NodeKey) -> Option<NodeKey> {
        let id = self.ids.get(&node)?;
        let parent_id = self.arena.get(*id)?.parent()?;
        self.key_of(parent_id)
    }

    fn children(&self, node: NodeKey) -> Vec<NodeKey> {
        let Some(id) = self.ids.get(&node) else {
            return Vec::new();
        };
        id.children(&self.arena)
            .filter_map(|child| self.key_of(child))
            .collect()
    }

    fn tag_name(&self, node: NodeKey) -> Option<String> {
        self.node(node).ok().map(|entry| entry.tag.clone())
    }

    fn attribute(&self, node: NodeKey, name: &str) -> Option<String> {
        let entry = self.node(node).ok()?;
        entry
            .attrs
            .iter()
            .find(|(attr, _)| attr.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
    }

    fn inline_style(&self, node: NodeKey, property: &str) -> Option<String> {
        let entry = self.node(node).ok()?;
        if let Some(patched) = entry.patches.get(property) {
            return Some(patched.clone());
        }
        entry
            .inline_decls
            .iter()
            .rev()
            .find(|(name, _)| name == property)
            .map(|(_, value)| value.clone())
    }

    fn matched_rule_value(&self, node: NodeKey, property: &str) -> RuleLookup {
        if !self.stylesheets_accessible {
            return RuleLookup::Inaccessible;
        }
        self.rules
            .get(&node)
            .and_then(|declared| declared.get(property))
            .map_or(RuleLookup::NotDeclared, |value| {
                RuleLookup::Found(value.clone())
            })
    }

    fn is_attached(&self, node: NodeKey) -> bool {
        self.ids.get(&node).is_some_and(|id| {
            id.ancestors(&self.arena)
                .last()
                .is_some_and(|top| top == self.root)
        })
    }

    fn geometry(&self, node: NodeKey) -> Result<Geometry> {
        if !self.is_attached(node) {
            return Err(anyhow!("node {node:?} is not attached"));
        }
        let id = self.id_of(node)?;
        let chain: Vec<&RenderNode> = id
            .ancestors(&self.arena)
            .filter_map(|step| self.arena.get(step).map(Node::get))
            .collect();
        let mut styles = Vec::with_capacity(chain.len());
        for entry in &chain {
            let style = Self::effective_style(entry);
            if style.display == Display::None {
                return Ok(Geometry::default());
            }
            styles.push(style);
        }
        let Some(own) = chain.first() else {
            return Err(anyhow!("node {node:?} has no arena entry"));
        };
        let Some(own_style) = styles.first() else {
            return Err(anyhow!("node {node:?} has no style"));
        };
        let mut rect = Self::clamped_box(own.layout, own_style);
        for (entry, style) in chain.iter().zip(styles.iter()) {
            if style.transform.is_identity() {
                continue;
            }
            let origin = Self::clamped_box(entry.layout, style);
            rect = Self::apply_transform(rect, &style.transform, &origin);
        }
        Ok(rect)
    }

    fn computed_style(&self, node: NodeKey) -> Result<ComputedStyle> {
        if !self.is_attached(node) {
            return Err(anyhow!("node {node:?} is not attached"));
        }
        Ok(Self::effective_style(self.node(node)?))
    }
}

impl StylePort for Document {
    fn set_style(&mut self, node: NodeKey, property: &str, value: &str) {
        self.pending_writes.push(PendingWrite::Set {
            node,
            property: property.to_ascii_lowercase(),
            value: value.to_owned(),
        });
    }

    fn remove_style(&mut self, node: NodeKey, property: &str) {
        self.pending_writes.push(PendingWrite::Remove {
            node,
            property: property.to_ascii_lowercase(),
        });
    }

    fn flush(&mut self) -> Result<()> {
        let writes = mem::take(&mut self.pending_writes);
        for write in writes {
            match write {
                PendingWrite::Set {
                    node,
                    property,
                    value,
                } => {
                    // Writes to nodes removed since they were queued are dropped.
                    if let Ok(entry) = self.node_mut(node) {
                        entry.patches.insert(property, value);
                    }
                }
                PendingWrite::Remove { node, property } => {
                    if let Ok(entry) = self.node_mut(node) {
                        entry.patches.remove(&property);
                    }
                }
            }
        }
        self.flush_count = self.flush_count.saturating_add(1);
        Ok(())
    }

    fn clear(&mut self, node: NodeKey) {
        self.pending_writes.retain(|write| match write {
            PendingWrite::Set { node: target, .. } | PendingWrite::Remove { node: target, .. } => {
                *target != node
            }
        });
        if let Ok(entry) = self.node_mut(node) {
            entry.patches.clear();
        }
    }
}
