//! Geometry, stacking and rule lookup over the in-memory document.

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use core::cmp::Ordering;
    use render_tree::stacking::compare_stacking;
    use render_tree::walk::{Visit, child_towards, collect, compare_document_order};
    use render_tree::{
        Display, Document, DocumentProvider, Geometry, NodeKey, Position, RuleLookup, StylePort,
        Viewport,
    };

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// A scaled ancestor shrinks its descendants about the ancestor's centre.
    ///
    /// # Errors
    /// Returns an error if building the fixture fails.
    #[test]
    fn ancestor_scale_moves_descendants() -> Result<()> {
        init();
        let mut doc = Document::new(Viewport::new(400.0, 800.0));
        let wrapper = doc.append_element(NodeKey::ROOT, "div")?;
        doc.set_layout(wrapper, Geometry::new(0.0, 0.0, 400.0, 800.0))?;
        let child = doc.append_element(wrapper, "div")?;
        doc.set_layout(child, Geometry::new(0.0, 0.0, 400.0, 100.0))?;
        doc.set_style(wrapper, "transform", "scale(0.5)");
        doc.flush()?;
        let rect = doc.geometry(child)?;
        assert!((rect.top - 200.0).abs() < 0.01);
        assert!((rect.left - 100.0).abs() < 0.01);
        assert!((rect.height - 50.0).abs() < 0.01);
        Ok(())
    }

    /// `display: none` anywhere up the chain collapses the box.
    ///
    /// # Errors
    /// Returns an error if building the fixture fails.
    #[test]
    fn hidden_ancestor_collapses_box() -> Result<()> {
        init();
        let mut doc = Document::new(Viewport::default());
        let wrapper = doc.append_element(NodeKey::ROOT, "div")?;
        let child = doc.append_element(wrapper, "span")?;
        doc.set_layout(child, Geometry::new(10.0, 10.0, 50.0, 50.0))?;
        doc.update_style(wrapper, |style| style.display = Display::None)?;
        assert!(doc.geometry(child)?.is_empty());
        Ok(())
    }

    /// Max-height patches clamp the reported box.
    ///
    /// # Errors
    /// Returns an error if building the fixture fails.
    #[test]
    fn max_height_patch_clamps() -> Result<()> {
        init();
        let mut doc = Document::new(Viewport::default());
        let list = doc.append_element(NodeKey::ROOT, "ul")?;
        doc.set_layout(list, Geometry::new(0.0, 100.0, 375.0, 900.0))?;
        doc.set_style(list, "max-height", "300px");
        doc.flush()?;
        assert!((doc.geometry(list)?.height - 300.0).abs() < f32::EPSILON);
        assert_eq!(doc.computed_style(list)?.max_height, Some(300.0));
        Ok(())
    }

    /// Higher z-index wins; equal contexts fall back to document order.
    ///
    /// # Errors
    /// Returns an error if building the fixture fails.
    #[test]
    fn stacking_prefers_z_then_order() -> Result<()> {
        init();
        let mut doc = Document::new(Viewport::default());
        let low = doc.append_element(NodeKey::ROOT, "div")?;
        let high = doc.append_element(NodeKey::ROOT, "div")?;
        let later = doc.append_element(NodeKey::ROOT, "div")?;
        doc.update_style(low, |style| {
            style.position = Position::Fixed;
            style.z_index = Some(10);
        })?;
        doc.update_style(high, |style| {
            style.position = Position::Fixed;
            style.z_index = Some(100);
        })?;
        doc.update_style(later, |style| {
            style.position = Position::Fixed;
            style.z_index = Some(10);
        })?;
        assert_eq!(compare_stacking(&doc, high, low)?, Ordering::Greater);
        assert_eq!(compare_stacking(&doc, later, low)?, Ordering::Greater);
        assert_eq!(compare_document_order(&doc, low, later), Ordering::Less);
        Ok(())
    }

    /// Skipped subtrees are never visited.
    ///
    /// # Errors
    /// Returns an error if building the fixture fails.
    #[test]
    fn walk_respects_skip_subtree() -> Result<()> {
        init();
        let mut doc = Document::new(Viewport::default());
        let kept = doc.append_element(NodeKey::ROOT, "div")?;
        let pruned = doc.append_element(NodeKey::ROOT, "section")?;
        let hidden_child = doc.append_element(pruned, "div")?;
        let visited = collect(&doc, NodeKey::ROOT, false, |node| {
            if node == pruned {
                Visit::SkipSubtree
            } else {
                Visit::Accept
            }
        });
        assert_eq!(visited, vec![kept]);
        assert!(!visited.contains(&hidden_child));
        Ok(())
    }

    /// The branch towards a nested node is the ancestor's direct child.
    ///
    /// # Errors
    /// Returns an error if building the fixture fails.
    #[test]
    fn child_towards_finds_branch() -> Result<()> {
        init();
        let mut doc = Document::new(Viewport::default());
        let outer = doc.append_element(NodeKey::ROOT, "div")?;
        let wrapper = doc.append_element(outer, "div")?;
        let leaf = doc.append_element(wrapper, "span")?;
        assert_eq!(child_towards(&doc, outer, leaf), Some(wrapper));
        assert_eq!(child_towards(&doc, NodeKey::ROOT, leaf), Some(outer));
        assert_eq!(child_towards(&doc, leaf, outer), None);
        assert_eq!(child_towards(&doc, outer, outer), None);
        Ok(())
    }

    /// Stylesheet lookups report cross-origin sheets distinctly.
    ///
    /// # Errors
    /// Returns an error if building the fixture fails.
    #[test]
    fn rule_lookup_distinguishes_inaccessible() -> Result<()> {
        init();
        let mut doc = Document::new(Viewport::default());
        let sheet = doc.append_element(NodeKey::ROOT, "div")?;
        doc.set_rule_value(sheet, "bottom", "0px");
        assert_eq!(
            doc.matched_rule_value(sheet, "bottom"),
            RuleLookup::Found("0px".to_owned())
        );
        assert_eq!(doc.matched_rule_value(sheet, "top"), RuleLookup::NotDeclared);
        doc.set_stylesheets_accessible(false);
        assert_eq!(
            doc.matched_rule_value(sheet, "bottom"),
            RuleLookup::Inaccessible
        );
        Ok(())
    }
}
