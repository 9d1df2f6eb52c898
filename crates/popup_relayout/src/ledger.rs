//! Needs-restore set: every patched property with its pre-patch inline value.

use anyhow::Result;
use log::trace;
use render_tree::{DocumentProvider, NodeKey, StylePort};
use std::collections::HashSet;

/// One tracked write.
#[derive(Clone, Debug, PartialEq, Eq)]
struct PatchEntry {
    node: NodeKey,
    property: String,
    /// Inline value before the first patch; `None` means the property was unset.
    original: Option<String>,
}

/// Records the original value of a property the first time it is patched.
#[derive(Debug, Default)]
pub struct PatchLedger {
    entries: Vec<PatchEntry>,
    seen: HashSet<(NodeKey, String)>,
}

impl PatchLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `property: value` on `node`, remembering the pre-patch value.
    pub fn write<H: DocumentProvider + StylePort + ?Sized>(
        &mut self,
        host: &mut H,
        node: NodeKey,
        property: &str,
        value: &str,
    ) {
        let key = (node, property.to_owned());
        if !self.seen.contains(&key) {
            self.entries.push(PatchEntry {
                node,
                property: property.to_owned(),
                original: host.inline_style(node, property),
            });
            self.seen.insert(key);
        }
        host.set_style(node, property, value);
    }

    /// Undo every tracked write and flush once. Returns the number of properties restored.
    ///
    /// # Errors
    /// Returns an error if the style port rejects the batch.
    pub fn restore_styles<H: DocumentProvider + StylePort + ?Sized>(
        &mut self,
        host: &mut H,
    ) -> Result<usize> {
        if self.entries.is_empty() {
            return Ok(0);
        }
        let restored = self.entries.len();
        for entry in self.entries.drain(..).rev() {
            match entry.original {
                Some(value) => host.set_style(entry.node, &entry.property, &value),
                None => host.remove_style(entry.node, &entry.property),
            }
        }
        self.seen.clear();
        host.flush()?;
        trace!("restored {restored} patched properties");
        Ok(restored)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
