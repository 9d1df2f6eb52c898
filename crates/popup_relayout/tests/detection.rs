//! Mask pairing, candidate selection and archetype rules over hand-built pages.

#[cfg(test)]
mod tests {
    use anyhow::{Result, anyhow};
    use popup_relayout::classifier::predict;
    use popup_relayout::decision_tree::classify;
    use popup_relayout::locator::locate;
    use popup_relayout::{DecisionTreeType, PopupInfo, RelayoutConfig, StructuralType};
    use render_tree::{Document, Geometry, NodeKey, Position, Rgba, Viewport};

    const WIDTH: f32 = 375.0;
    const HEIGHT: f32 = 667.0;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn translucent() -> Rgba {
        Rgba::new(0, 0, 0, 128)
    }

    /// Full-screen fixed translucent backdrop appended under `parent`.
    fn fixed_mask(doc: &mut Document, parent: NodeKey, z_index: i32) -> Result<NodeKey> {
        let mask = doc.append_element(parent, "div")?;
        doc.set_layout(mask, Geometry::new(0.0, 0.0, WIDTH, HEIGHT))?;
        doc.update_style(mask, |style| {
            style.position = Position::Fixed;
            style.z_index = Some(z_index);
            style.background_color = translucent();
        })?;
        Ok(mask)
    }

    fn located(doc: &Document, config: &RelayoutConfig) -> Result<PopupInfo> {
        locate(doc, NodeKey::ROOT, config)?.ok_or_else(|| anyhow!("no popup located"))
    }

    /// An in-flow backdrop inside a fixed wrapper pairs with its own child,
    /// rooted at the wrapper.
    ///
    /// # Errors
    /// Returns an error if the fixture cannot be built.
    #[test]
    fn in_flow_mask_is_type_a() -> Result<()> {
        init();
        let config = RelayoutConfig::default();
        let mut doc = Document::new(Viewport::new(WIDTH, HEIGHT));
        let wrapper = doc.append_element(NodeKey::ROOT, "div")?;
        doc.set_layout(wrapper, Geometry::new(0.0, 0.0, WIDTH, HEIGHT))?;
        doc.update_style(wrapper, |style| style.position = Position::Fixed)?;
        let mask = doc.append_element(wrapper, "div")?;
        doc.set_layout(mask, Geometry::new(0.0, 0.0, WIDTH, HEIGHT))?;
        doc.update_style(mask, |style| style.background_color = translucent())?;
        let panel = doc.append_element(mask, "div")?;
        doc.set_layout(panel, Geometry::new(30.0, 150.0, 315.0, 360.0))?;

        let popup = located(&doc, &config)?;
        assert_eq!(popup.structural_type, StructuralType::A);
        assert_eq!(popup.root, wrapper);
        assert_eq!(popup.mask, mask);
        assert_eq!(popup.content, panel);
        assert_eq!(popup.root_position, Position::Fixed);
        Ok(())
    }

    /// Without an out-of-flow ancestor the page root hosts the backdrop and
    /// the classifier turns the candidate down.
    ///
    /// # Errors
    /// Returns an error if the fixture cannot be built.
    #[test]
    fn static_backdrop_on_page_root_is_rejected() -> Result<()> {
        init();
        let config = RelayoutConfig::default();
        let mut doc = Document::new(Viewport::new(WIDTH, HEIGHT));
        let mask = doc.append_element(NodeKey::ROOT, "div")?;
        doc.set_layout(mask, Geometry::new(0.0, 0.0, WIDTH, HEIGHT))?;
        doc.update_style(mask, |style| style.background_color = translucent())?;
        let panel = doc.append_element(mask, "div")?;
        doc.set_layout(panel, Geometry::new(30.0, 150.0, 315.0, 360.0))?;
        assert!(locate(&doc, NodeKey::ROOT, &config)?.is_none());
        Ok(())
    }

    /// Sibling content painted before the mask needs a strictly higher z-index.
    ///
    /// # Errors
    /// Returns an error if the fixture cannot be built.
    #[test]
    fn preceding_sibling_content_needs_higher_z() -> Result<()> {
        init();
        let config = RelayoutConfig::default();
        let mut doc = Document::new(Viewport::new(WIDTH, HEIGHT));
        let dialog = doc.append_element(NodeKey::ROOT, "div")?;
        doc.set_layout(dialog, Geometry::new(30.0, 150.0, 315.0, 360.0))?;
        doc.update_style(dialog, |style| {
            style.position = Position::Fixed;
            style.z_index = Some(100);
        })?;
        let mask = fixed_mask(&mut doc, NodeKey::ROOT, 100)?;
        assert!(locate(&doc, NodeKey::ROOT, &config)?.is_none());

        doc.update_style(dialog, |style| style.z_index = Some(101))?;
        let popup = located(&doc, &config)?;
        assert_eq!(popup.structural_type, StructuralType::B);
        assert_eq!(popup.root, NodeKey::ROOT);
        assert_eq!(popup.mask, mask);
        assert_eq!(popup.content, dialog);
        assert_eq!(popup.mask_z_index, 100);
        Ok(())
    }

    /// A backdrop nested inside another keeps only the inner popup.
    ///
    /// # Errors
    /// Returns an error if the fixture cannot be built.
    #[test]
    fn nested_masks_prefer_the_inner_popup() -> Result<()> {
        init();
        let config = RelayoutConfig::default();
        let mut doc = Document::new(Viewport::new(WIDTH, HEIGHT));
        let outer = fixed_mask(&mut doc, NodeKey::ROOT, 100)?;
        let inner = fixed_mask(&mut doc, outer, 200)?;
        let panel = doc.append_element(inner, "div")?;
        doc.set_layout(panel, Geometry::new(30.0, 150.0, 315.0, 360.0))?;

        let popup = located(&doc, &config)?;
        assert_eq!(popup.root, inner);
        assert_eq!(popup.mask, inner);
        assert_eq!(popup.content, panel);
        Ok(())
    }

    /// A backdrop short of the fast-path share is still accepted by the scorer.
    ///
    /// # Errors
    /// Returns an error if the fixture cannot be built.
    #[test]
    fn partial_backdrop_goes_through_the_scorer() -> Result<()> {
        init();
        let config = RelayoutConfig::default();
        let mut doc = Document::new(Viewport::new(WIDTH, HEIGHT));
        let mask = doc.append_element(NodeKey::ROOT, "div")?;
        doc.set_layout(mask, Geometry::new(0.0, 67.0, WIDTH, 600.0))?;
        doc.update_style(mask, |style| {
            style.position = Position::Fixed;
            style.z_index = Some(50);
            style.background_color = translucent();
        })?;
        let panel = doc.append_element(mask, "div")?;
        doc.set_layout(panel, Geometry::new(30.0, 150.0, 315.0, 360.0))?;
        let close = doc.append_element(panel, "span")?;
        doc.set_attribute(close, "aria-label", "Close")?;
        doc.set_layout(close, Geometry::new(305.0, 160.0, 30.0, 30.0))?;

        let popup = located(&doc, &config)?;
        assert!(popup.mask_area_ratio < config.fast_path_mask_ratio);
        assert!(popup.mask_area_ratio > config.mask_area_ratio);
        assert!(popup.has_close_button);
        let prediction = predict(&popup);
        assert!(prediction.is_popup());
        assert!(prediction.probability > 0.5);
        Ok(())
    }

    /// Fixed bars stacked above the mask shrink the band; bars beneath it do not.
    ///
    /// # Errors
    /// Returns an error if the fixture cannot be built.
    #[test]
    fn sticky_bars_above_the_mask_are_measured() -> Result<()> {
        init();
        let config = RelayoutConfig::default();
        let mut doc = Document::new(Viewport::new(WIDTH, HEIGHT));
        let header = doc.append_element(NodeKey::ROOT, "header")?;
        doc.set_layout(header, Geometry::new(0.0, 0.0, WIDTH, 60.0))?;
        doc.update_style(header, |style| {
            style.position = Position::Fixed;
            style.z_index = Some(200);
        })?;
        let tab_bar = doc.append_element(NodeKey::ROOT, "nav")?;
        doc.set_layout(tab_bar, Geometry::new(0.0, 617.0, WIDTH, 50.0))?;
        doc.update_style(tab_bar, |style| {
            style.position = Position::Fixed;
            style.z_index = Some(10);
        })?;
        let mask = fixed_mask(&mut doc, NodeKey::ROOT, 100)?;
        let panel = doc.append_element(mask, "div")?;
        doc.set_layout(panel, Geometry::new(30.0, 150.0, 315.0, 360.0))?;

        let popup = located(&doc, &config)?;
        assert_eq!(popup.root, mask);
        assert!((popup.sticky_top_height - 60.0).abs() < f32::EPSILON);
        assert!(popup.sticky_bottom_height.abs() < f32::EPSILON);

        doc.update_style(tab_bar, |style| style.z_index = Some(300))?;
        let popup = located(&doc, &config)?;
        assert!((popup.sticky_bottom_height - 50.0).abs() < f32::EPSILON);
        Ok(())
    }

    /// A `picker` sheet with evenly sized rows under a fading gradient.
    ///
    /// # Errors
    /// Returns an error if the fixture cannot be built.
    #[test]
    fn wheel_picker_is_classified_picker() -> Result<()> {
        init();
        let config = RelayoutConfig::default();
        let mut doc = Document::new(Viewport::new(WIDTH, HEIGHT));
        let mask = fixed_mask(&mut doc, NodeKey::ROOT, 100)?;
        let sheet = doc.append_element(mask, "div")?;
        doc.set_attribute(sheet, "class", "date-picker")?;
        doc.set_layout(sheet, Geometry::new(0.0, 367.0, WIDTH, 300.0))?;
        let column = doc.append_element(sheet, "ul")?;
        doc.set_layout(column, Geometry::new(0.0, 400.0, WIDTH, 216.0))?;
        for row in 0..3_u8 {
            let item = doc.append_element(column, "li")?;
            doc.set_attribute(item, "style", "height: 36px")?;
            let top = 400.0 + f32::from(row) * 36.0;
            doc.set_layout(item, Geometry::new(0.0, top, WIDTH, 36.0))?;
        }
        let fade = doc.append_element(sheet, "div")?;
        doc.set_layout(fade, Geometry::new(0.0, 400.0, WIDTH, 216.0))?;
        doc.update_style(fade, |style| {
            "linear-gradient(rgba(255,255,255,0.9), rgba(255,255,255,0))"
                .clone_into(&mut style.background_image);
        })?;

        let popup = located(&doc, &config)?;
        assert_eq!(popup.content, sheet);
        assert_eq!(classify(&doc, &popup, &config)?, DecisionTreeType::Picker);
        Ok(())
    }

    /// A corner close button sitting over the card's image.
    ///
    /// # Errors
    /// Returns an error if the fixture cannot be built.
    #[test]
    fn corner_close_over_image_is_button_overlap() -> Result<()> {
        init();
        let config = RelayoutConfig::default();
        let mut doc = Document::new(Viewport::new(WIDTH, HEIGHT));
        let mask = fixed_mask(&mut doc, NodeKey::ROOT, 100)?;
        let card = doc.append_element(mask, "div")?;
        doc.set_layout(card, Geometry::new(30.0, 150.0, 315.0, 360.0))?;
        doc.update_style(card, |style| style.position = Position::Relative)?;
        let image = doc.append_element(card, "div")?;
        doc.set_layout(image, Geometry::new(30.0, 150.0, 315.0, 360.0))?;
        let close = doc.append_element(card, "div")?;
        doc.set_attribute(close, "class", "btn-close")?;
        doc.set_layout(close, Geometry::new(325.0, 140.0, 30.0, 30.0))?;
        doc.update_style(close, |style| style.position = Position::Absolute)?;

        let popup = located(&doc, &config)?;
        assert_eq!(popup.content, card);
        assert_eq!(
            classify(&doc, &popup, &config)?,
            DecisionTreeType::CenterButtonOverlap
        );

        doc.set_layout(close, Geometry::new(325.0, 560.0, 30.0, 30.0))?;
        assert_eq!(classify(&doc, &popup, &config)?, DecisionTreeType::Center);
        Ok(())
    }

    /// A flush sheet without a readable `bottom: 0` only counts as a bottom
    /// sheet when the stylesheets cannot be inspected.
    ///
    /// # Errors
    /// Returns an error if the fixture cannot be built.
    #[test]
    fn unreadable_stylesheets_trust_measurement() -> Result<()> {
        init();
        let config = RelayoutConfig::default();
        let mut doc = Document::new(Viewport::new(WIDTH, HEIGHT));
        let mask = fixed_mask(&mut doc, NodeKey::ROOT, 100)?;
        let sheet = doc.append_element(mask, "div")?;
        doc.set_layout(sheet, Geometry::new(0.0, 367.0, WIDTH, 300.0))?;
        doc.update_style(sheet, |style| style.position = Position::Fixed)?;

        let popup = located(&doc, &config)?;
        assert_eq!(classify(&doc, &popup, &config)?, DecisionTreeType::Center);
        doc.set_stylesheets_accessible(false);
        assert_eq!(classify(&doc, &popup, &config)?, DecisionTreeType::Bottom);
        Ok(())
    }

    /// The branch holding a wrapped mask never competes with the sheet it backs.
    ///
    /// # Errors
    /// Returns an error if the fixture cannot be built.
    #[test]
    fn wrapped_mask_branch_is_not_a_sheet_candidate() -> Result<()> {
        init();
        let config = RelayoutConfig::default();
        let mut doc = Document::new(Viewport::new(WIDTH, HEIGHT));
        let wrapper = doc.append_element(NodeKey::ROOT, "div")?;
        doc.set_layout(wrapper, Geometry::new(0.0, 0.0, WIDTH, HEIGHT))?;
        doc.update_style(wrapper, |style| {
            style.position = Position::Fixed;
            style.z_index = Some(100);
        })?;
        let mask = fixed_mask(&mut doc, wrapper, 100)?;
        let sheet = doc.append_element(NodeKey::ROOT, "div")?;
        doc.set_layout(sheet, Geometry::new(0.0, 367.0, WIDTH, 300.0))?;
        doc.update_style(sheet, |style| {
            style.position = Position::Fixed;
            style.z_index = Some(100);
            style.background_color = Rgba::new(255, 255, 255, 255);
        })?;
        doc.set_rule_value(sheet, "bottom", "0px");

        let popup = located(&doc, &config)?;
        assert_eq!(popup.structural_type, StructuralType::B);
        assert_eq!(popup.mask, mask);
        assert_eq!(popup.content, sheet);
        assert_eq!(classify(&doc, &popup, &config)?, DecisionTreeType::Bottom);
        Ok(())
    }
}
