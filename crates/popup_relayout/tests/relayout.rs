//! Single relayout passes over clipped popups, without the scheduling layer.

#[cfg(test)]
mod tests {
    use anyhow::{Result, anyhow};
    use popup_relayout::ledger::PatchLedger;
    use popup_relayout::locator::locate;
    use popup_relayout::{
        DecisionTreeType, PopupInfo, RelayoutConfig, RelayoutOutcome, RelayoutReport, Repair,
        Repairable as _,
    };
    use render_tree::{
        Document, DocumentProvider as _, Geometry, NodeKey, Overflow, Position, Rgba, Viewport,
    };

    const WIDTH: f32 = 375.0;
    const HEIGHT: f32 = 667.0;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn page_with_mask() -> Result<(Document, NodeKey)> {
        let mut doc = Document::new(Viewport::new(WIDTH, HEIGHT));
        let mask = doc.append_element(NodeKey::ROOT, "div")?;
        doc.set_layout(mask, Geometry::new(0.0, 0.0, WIDTH, HEIGHT))?;
        doc.update_style(mask, |style| {
            style.position = Position::Fixed;
            style.z_index = Some(100);
            style.background_color = Rgba::new(0, 0, 0, 128);
        })?;
        Ok((doc, mask))
    }

    /// A 300px wide card `height` tall, centred on the viewport.
    fn tall_card(height: f32) -> Result<(Document, NodeKey, NodeKey)> {
        let (mut doc, mask) = page_with_mask()?;
        let card = doc.append_element(mask, "div")?;
        doc.set_layout(card, Geometry::new(37.5, (HEIGHT - height) / 2.0, 300.0, height))?;
        Ok((doc, mask, card))
    }

    fn run_pass(
        doc: &mut Document,
        config: &RelayoutConfig,
    ) -> Result<(PopupInfo, RelayoutReport)> {
        let popup = locate(&*doc, NodeKey::ROOT, config)?.ok_or_else(|| anyhow!("no popup"))?;
        let mut ledger = PatchLedger::new();
        let report = Repair::PopupWindowRelayout.repair(doc, &popup, config, &mut ledger)?;
        Ok((popup, report))
    }

    /// A bottom sheet running off the top is scaled and pinned back to the bottom edge.
    ///
    /// # Errors
    /// Returns an error if the fixture cannot be built or measured.
    #[test]
    fn bottom_sheet_is_pinned_to_the_bottom() -> Result<()> {
        init();
        let config = RelayoutConfig::default();
        let (mut doc, mask) = page_with_mask()?;
        let sheet = doc.append_element(mask, "div")?;
        doc.set_layout(sheet, Geometry::new(0.0, -133.0, WIDTH, 800.0))?;
        doc.update_style(sheet, |style| {
            style.position = Position::Fixed;
            style.background_color = Rgba::new(255, 255, 255, 255);
        })?;
        doc.set_rule_value(sheet, "bottom", "0px");

        let (_, report) = run_pass(&mut doc, &config)?;
        assert_eq!(report.outcome, RelayoutOutcome::Applied);
        assert_eq!(report.archetype, Some(DecisionTreeType::Bottom));
        assert_eq!(report.transformed, vec![sheet]);
        assert_eq!(doc.flush_count(), 1);
        let rect = doc.geometry(sheet)?;
        assert!((rect.bottom() - HEIGHT).abs() < 0.5, "sheet ends at {}", rect.bottom());
        assert!(rect.top > 0.0);
        Ok(())
    }

    /// Content three viewports tall stops shrinking at the configured floor.
    ///
    /// # Errors
    /// Returns an error if the fixture cannot be built or measured.
    #[test]
    fn scale_is_clamped_to_the_floor() -> Result<()> {
        init();
        let config = RelayoutConfig::default();
        let (mut doc, _, card) = tall_card(HEIGHT * 3.0)?;
        let (_, report) = run_pass(&mut doc, &config)?;
        assert_eq!(report.archetype, Some(DecisionTreeType::Center));
        let scale = report.scale.ok_or_else(|| anyhow!("no scale"))?;
        assert!((scale - config.min_scale).abs() < 1e-6, "scale {scale}");
        assert!((doc.geometry(card)?.height - HEIGHT * 1.5).abs() < 0.5);
        Ok(())
    }

    /// Cropping `cover` backgrounds inside the scaled group switch to `contain`.
    ///
    /// # Errors
    /// Returns an error if the fixture cannot be built.
    #[test]
    fn cover_backgrounds_become_contain() -> Result<()> {
        init();
        let config = RelayoutConfig::default();
        let (mut doc, _, card) = tall_card(HEIGHT * 1.4)?;
        let hero = doc.append_element(card, "div")?;
        doc.set_layout(hero, Geometry::new(37.5, -100.0, 300.0, 200.0))?;
        doc.update_style(hero, |style| {
            "url(banner.png)".clone_into(&mut style.background_image);
            "cover".clone_into(&mut style.background_size);
        })?;
        let (_, report) = run_pass(&mut doc, &config)?;
        assert_eq!(report.outcome, RelayoutOutcome::Applied);
        assert_eq!(doc.patch_value(hero, "background-size").as_deref(), Some("contain"));
        assert!(doc.patch_value(card, "background-size").is_none());
        Ok(())
    }

    /// Wheel pickers are classified but never transformed.
    ///
    /// # Errors
    /// Returns an error if the fixture cannot be built.
    #[test]
    fn picker_is_left_unscaled() -> Result<()> {
        init();
        let config = RelayoutConfig::default();
        let (mut doc, mask) = page_with_mask()?;
        let sheet = doc.append_element(mask, "div")?;
        doc.set_attribute(sheet, "class", "picker")?;
        doc.set_layout(sheet, Geometry::new(0.0, 167.0, WIDTH, 600.0))?;
        let column = doc.append_element(sheet, "ul")?;
        doc.set_layout(column, Geometry::new(0.0, 300.0, WIDTH, 180.0))?;
        for row in 0..5_u8 {
            let item = doc.append_element(column, "li")?;
            doc.set_attribute(item, "style", "height: 36px")?;
            let top = 300.0 + f32::from(row) * 36.0;
            doc.set_layout(item, Geometry::new(0.0, top, WIDTH, 36.0))?;
        }
        doc.update_style(column, |style| {
            "linear-gradient(rgba(255,255,255,0.95), rgba(255,255,255,0.4))"
                .clone_into(&mut style.background_image);
        })?;

        let (_, report) = run_pass(&mut doc, &config)?;
        assert_eq!(report.outcome, RelayoutOutcome::PickerSkipped);
        assert_eq!(report.archetype, Some(DecisionTreeType::Picker));
        assert!(report.transformed.is_empty());
        assert!(doc.patch_value(sheet, "transform").is_none());
        Ok(())
    }

    /// A close button clipped inside a scroller opens the scroller up and
    /// joins the truncated set.
    ///
    /// # Errors
    /// Returns an error if the fixture cannot be built.
    #[test]
    fn clipped_close_button_unclips_its_scroller() -> Result<()> {
        init();
        let config = RelayoutConfig::default();
        let (mut doc, mask) = page_with_mask()?;
        let card = doc.append_element(mask, "div")?;
        doc.set_layout(card, Geometry::new(30.0, 100.0, 315.0, 400.0))?;
        let scroller = doc.append_element(card, "div")?;
        doc.set_layout(scroller, Geometry::new(30.0, 100.0, 315.0, 400.0))?;
        doc.update_style(scroller, |style| style.overflow_y = Overflow::Auto)?;
        let body = doc.append_element(scroller, "div")?;
        doc.set_layout(body, Geometry::new(30.0, 100.0, 315.0, 700.0))?;
        let close = doc.append_element(scroller, "div")?;
        doc.set_attribute(close, "class", "close")?;
        doc.set_layout(close, Geometry::new(320.0, 780.0, 30.0, 30.0))?;

        let (_, report) = run_pass(&mut doc, &config)?;
        assert!(report.close_button_truncated_by_scroll);
        assert!(report.truncated.contains(&close));
        assert_eq!(report.outcome, RelayoutOutcome::Applied);
        assert_eq!(report.transformed, vec![card]);
        assert_eq!(doc.patch_value(scroller, "overflow").as_deref(), Some("visible"));
        Ok(())
    }

    /// A corner close button is pushed down to the bottom of the scaled content.
    ///
    /// # Errors
    /// Returns an error if the fixture cannot be built or measured.
    #[test]
    fn overlapping_close_button_moves_below_content() -> Result<()> {
        init();
        let config = RelayoutConfig::default();
        let (mut doc, mask, card) = tall_card(900.0)?;
        doc.update_style(card, |style| style.position = Position::Relative)?;
        let image = doc.append_element(card, "div")?;
        doc.set_layout(image, Geometry::new(37.5, -116.5, 300.0, 900.0))?;
        let close = doc.append_element(card, "div")?;
        doc.set_attribute(close, "class", "close")?;
        doc.set_layout(close, Geometry::new(322.5, -126.5, 30.0, 30.0))?;
        doc.update_style(close, |style| style.position = Position::Absolute)?;

        let (popup, report) = run_pass(&mut doc, &config)?;
        assert_eq!(popup.root, mask);
        assert_eq!(report.archetype, Some(DecisionTreeType::CenterButtonOverlap));
        assert!(!report.close_button_check.flagged);
        let shifted = doc
            .patch_value(close, "transform")
            .ok_or_else(|| anyhow!("close button was not moved"))?;
        assert!(shifted.starts_with("translateY("), "{shifted}");
        let image_bottom = doc.geometry(image)?.bottom();
        let close_top = doc.geometry(close)?.top;
        assert!((close_top - image_bottom).abs() < 1.0, "{close_top} vs {image_bottom}");
        Ok(())
    }

    /// Passes that stop early still report a drifted close button.
    ///
    /// # Errors
    /// Returns an error if the fixture cannot be built.
    #[test]
    fn early_exit_keeps_close_button_check() -> Result<()> {
        init();
        let config = RelayoutConfig::default();
        let (mut doc, mask) = page_with_mask()?;
        let sheet = doc.append_element(mask, "div")?;
        doc.set_layout(sheet, Geometry::new(0.0, 317.0, WIDTH, 300.0))?;
        doc.update_style(sheet, |style| {
            style.position = Position::Fixed;
            style.background_color = Rgba::new(255, 255, 255, 255);
        })?;
        let close = doc.append_element(sheet, "div")?;
        doc.set_attribute(close, "class", "close")?;
        doc.set_layout(close, Geometry::new(335.0, 597.0, 30.0, 30.0))?;
        doc.update_style(close, |style| {
            style.position = Position::Absolute;
            style.inset.bottom = Some(-20.0);
        })?;

        let (_, report) = run_pass(&mut doc, &config)?;
        assert_eq!(report.outcome, RelayoutOutcome::NoTruncation);
        assert_eq!(doc.flush_count(), 0);
        assert!(report.close_button_check.flagged);
        assert_eq!(report.close_button_check.button, Some(close));
        Ok(())
    }
}
