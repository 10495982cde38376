use std::sync::Arc;

use image::Rgba;

use coursecast_core::{
    BackgroundGenerator, BackgroundSpec, ColorPalette, PaletteCatalog, Pattern, ProcessingOptions, Quality,
    background::{render, seed_for},
};

fn spec(pattern: Pattern, seed: u64) -> BackgroundSpec {
    let catalog = PaletteCatalog::standard();
    BackgroundSpec {
        seed,
        palette: catalog.get("sunset").unwrap().clone(),
        pattern,
        width: 64,
        height: 48,
    }
}

fn generator() -> BackgroundGenerator {
    BackgroundGenerator::new(Arc::new(PaletteCatalog::standard()), 64, 48)
}

#[test]
fn same_spec_renders_identical_pixels() {
    for pattern in [Pattern::Solid, Pattern::Gradient, Pattern::Geometric, Pattern::Noise] {
        let a = render(&spec(pattern, 42));
        let b = render(&spec(pattern, 42));
        assert_eq!(a.dimensions(), (64, 48));
        assert_eq!(a.as_raw(), b.as_raw(), "{pattern:?}");
    }
}

#[test]
fn different_seeds_vary_noise() {
    let a = render(&spec(Pattern::Noise, 1));
    let b = render(&spec(Pattern::Noise, 2));
    assert_ne!(a.as_raw(), b.as_raw());
}

#[test]
fn solid_fill_uses_one_palette_color() {
    let spec = spec(Pattern::Solid, 9);
    let img = render(&spec);
    let first = *img.get_pixel(0, 0);
    assert!(spec.palette.colors.contains(&first));
    assert!(img.pixels().all(|p| *p == first));
}

#[test]
fn gradient_rows_are_uniform_and_start_on_palette() {
    let spec = spec(Pattern::Gradient, 3);
    let img = render(&spec);
    assert!(spec.palette.colors.contains(img.get_pixel(0, 0)));
    for y in 0..img.height() {
        let row_color = *img.get_pixel(0, y);
        for x in 0..img.width() {
            assert_eq!(*img.get_pixel(x, y), row_color);
        }
    }
}

#[test]
fn gradient_endpoints_ignore_weights() {
    let red = Rgba([255, 0, 0, 255]);
    let blue = Rgba([0, 0, 255, 255]);
    let palette = ColorPalette::new("duo", vec![red, blue], vec![1.0, 0.0], "test").unwrap();

    let touched = (0..500u64)
        .filter(|&seed| {
            let img = render(&BackgroundSpec {
                seed,
                palette: palette.clone(),
                pattern: Pattern::Gradient,
                width: 4,
                height: 4,
            });
            img.pixels().any(|p| p[2] > 0)
        })
        .count();

    // Uniform endpoints reach blue in about three of four seeds.
    assert!(touched > 300, "blue appeared in only {touched}/500 gradients");
    assert!(touched < 450, "blue appeared in {touched}/500 gradients");
}

#[test]
fn noise_stays_within_fifteen_of_a_palette_color() {
    let spec = spec(Pattern::Noise, 5);
    let img = render(&spec);

    let near = |base: &image::Rgba<u8>, px: &image::Rgba<u8>| {
        (0..3).all(|c| (base[c] as i16 - px[c] as i16).abs() <= 15) && base[3] == px[3]
    };
    let base = spec
        .palette
        .colors
        .iter()
        .find(|base| img.pixels().all(|px| near(base, px)));
    assert!(base.is_some(), "no palette color within ±15 of every pixel");
}

#[test]
fn explicit_style_beats_quality() {
    let options = ProcessingOptions {
        quality: Quality::High,
        background_style: Some(Pattern::Noise),
        ..Default::default()
    };
    assert_eq!(BackgroundGenerator::select_pattern(&options), Pattern::Noise);
}

#[test]
fn quality_picks_default_pattern() {
    let high = ProcessingOptions {
        quality: Quality::High,
        ..Default::default()
    };
    let standard = ProcessingOptions::default();
    assert_eq!(BackgroundGenerator::select_pattern(&high), Pattern::Geometric);
    assert_eq!(BackgroundGenerator::select_pattern(&standard), Pattern::Gradient);
}

#[test]
fn plan_with_seed_is_reproducible() {
    let generator = generator();
    let options = ProcessingOptions::default();
    let text = "Design thinking for teams";
    let seed = seed_for(text, 1_000);

    let a = generator.plan_with_seed(text, &options, seed);
    let b = generator.plan_with_seed(text, &options, seed);
    assert_eq!(a.palette.name, "lavender");
    assert_eq!(render(&a).as_raw(), render(&b).as_raw());
}

#[test]
fn seed_mixes_text_and_clock() {
    assert_eq!(seed_for("abc", 10), seed_for("abc", 10));
    assert_ne!(seed_for("abc", 10), seed_for("abc", 11));
    assert_ne!(seed_for("abc", 10), seed_for("abd", 10));
}

#[test]
fn generate_writes_png_of_requested_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/background.png");
    let options = ProcessingOptions {
        quality: Quality::High,
        ..Default::default()
    };

    let written = generator()
        .generate("Ocean currents", &options, &path)
        .unwrap();

    assert_eq!(written, path);
    let img = image::open(&path).unwrap();
    assert_eq!((img.width(), img.height()), (64, 48));
}
