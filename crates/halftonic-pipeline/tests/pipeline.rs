//! Integration tests: whole-pipeline behavior through the public API.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use halftonic_pipeline::dither::DitherAlgorithm;
use halftonic_pipeline::{
    Editor, EffectSettings, EffectsOrder, Primitives, RgbaImage, StageId, color, render,
};
use image::Rgba;

fn gradient(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, _| {
        let v = (x * 255 / (w - 1)) as u8;
        Rgba([v, v, v, 255])
    })
}

fn only(stages: &[StageId]) -> EffectSettings {
    let mut settings = EffectSettings::default();
    for stage in stages {
        settings.set_enabled(*stage, true);
    }
    settings
}

#[test]
fn solid_black_gives_one_full_dot_per_cell() {
    let source = RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255]));
    let out = render(&source, &only(&[StageId::Halftone]), &EffectsOrder::default(), 0);
    let record = out.geometry.expect("halftone records geometry");
    let Primitives::Dots(dots) = &record.primitives else {
        panic!("expected dots, got {:?}", record.kind);
    };
    assert_eq!(dots.len(), 100);
    for dot in dots {
        assert!((dot.size - 10.0).abs() < 1e-9);
        assert!(((dot.center.x - 5.0) % 10.0).abs() < 1e-9);
        assert!(((dot.center.y - 5.0) % 10.0).abs() < 1e-9);
    }
}

#[test]
fn stage_order_is_observable() {
    let source = gradient(60, 30);
    let settings = only(&[StageId::Threshold, StageId::Halftone]);
    let forward: EffectsOrder = "threshold,halftone".parse().unwrap();
    let reverse: EffectsOrder = "halftone,threshold".parse().unwrap();

    let a = render(&source, &settings, &forward, 0);
    let b = render(&source, &settings, &reverse, 0);
    assert_ne!(a.image, b.image);
    assert!(a.geometry.is_some());
    assert!(b.geometry.is_none());
}

#[test]
fn neutral_color_stage_is_identity() {
    let source = RgbaImage::from_fn(17, 9, |x, y| Rgba([x as u8 * 13, y as u8 * 27, 99, 200]));
    let out = render(&source, &only(&[StageId::Color]), &EffectsOrder::default(), 0);
    assert_eq!(out.image, source);
}

#[test]
fn double_invert_round_trips() {
    let source = RgbaImage::from_fn(17, 9, |x, y| Rgba([x as u8 * 13, y as u8 * 27, 99, 200]));
    let mut settings = color::ColorSettings::default();
    settings.enabled = true;
    settings.invert = true;
    let once = color::adjust(&source, &settings);
    assert_ne!(once, source);
    assert_eq!(color::adjust(&once, &settings), source);
}

#[test]
fn ordered_dither_is_repeatable() {
    let mut settings = only(&[StageId::Dither]);
    settings.dither.algorithm = DitherAlgorithm::Ordered;
    settings.dither.threshold = 128;
    let source = gradient(64, 16);
    let a = render(&source, &settings, &EffectsOrder::default(), 1);
    let b = render(&source, &settings, &EffectsOrder::default(), 2);
    assert_eq!(a.image, b.image);
}

#[test]
fn binary_checkerboard_survives_ordered_dither() {
    let source = RgbaImage::from_fn(2, 2, |x, y| {
        if (x + y) % 2 == 0 {
            Rgba([255, 255, 255, 255])
        } else {
            Rgba([0, 0, 0, 255])
        }
    });
    let mut settings = only(&[StageId::Dither]);
    settings.dither.algorithm = DitherAlgorithm::Ordered;
    let out = render(&source, &settings, &EffectsOrder::default(), 0);
    assert_eq!(out.image, source);
}

#[test]
fn everything_enabled_is_seed_deterministic_and_keeps_size() {
    let mut settings = only(&StageId::ALL);
    settings.glitch.noise.enabled = true;
    settings.glitch.blocks.enabled = true;
    settings.grid.split_enabled = true;
    let source = gradient(48, 40);
    let a = render(&source, &settings, &EffectsOrder::default(), 11);
    let b = render(&source, &settings, &EffectsOrder::default(), 11);
    assert_eq!(a.image, b.image);
    assert_eq!(a.image.dimensions(), (48, 40));
    assert_eq!(a.applied, EffectsOrder::default().stages());
}

#[test]
fn order_documents_are_validated() {
    let json = serde_json::to_string(&EffectsOrder::default()).unwrap();
    let back: EffectsOrder = serde_json::from_str(&json).unwrap();
    assert_eq!(back, EffectsOrder::default());
    assert!(serde_json::from_str::<EffectsOrder>(r#"["color","color"]"#).is_err());
}

#[test]
fn editor_presents_latest_generation_only() {
    let mut editor = Editor::new(gradient(30, 30)).with_seed(5);
    let stale = editor.set_settings(only(&[StageId::Halftone]));
    let stale_frame = stale.run().unwrap();
    let fresh = editor.set_settings(only(&[StageId::Dither]));
    assert!(!editor.present(stale_frame));
    let frame = fresh.run().unwrap();
    assert!(editor.present(frame));
    assert_eq!(editor.displayed().unwrap().applied, vec![StageId::Dither]);
}
