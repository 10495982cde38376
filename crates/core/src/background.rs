//! Procedural lesson backgrounds.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use image::{ImageError, ImageFormat, Rgba, RgbaImage};
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::debug;

use crate::{
    error::{CourseError, Result},
    palette::{ColorPalette, PaletteCatalog},
    types::{Pattern, ProcessingOptions, Quality},
    workspace::text_hash,
};

/// Everything needed to reproduce a background pixel for pixel.
#[derive(Debug, Clone)]
pub struct BackgroundSpec {
    pub seed: u64,
    pub palette: ColorPalette,
    pub pattern: Pattern,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct BackgroundGenerator {
    catalog: Arc<PaletteCatalog>,
    width: u32,
    height: u32,
}

/// Seed from lesson text mixed with a clock reading, so reruns of the same
/// lesson get fresh artwork.
pub fn seed_for(text: &str, nanos: u64) -> u64 {
    text_hash(text).wrapping_add(nanos)
}

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

impl BackgroundGenerator {
    pub fn new(catalog: Arc<PaletteCatalog>, width: u32, height: u32) -> Self {
        Self {
            catalog,
            width,
            height,
        }
    }

    /// Explicit style wins; otherwise high quality gets geometric shapes.
    pub fn select_pattern(options: &ProcessingOptions) -> Pattern {
        match (options.background_style, options.quality) {
            (Some(style), _) => style,
            (None, Quality::High) => Pattern::Geometric,
            (None, Quality::Standard) => Pattern::Gradient,
        }
    }

    pub fn plan_with_seed(&self, text: &str, options: &ProcessingOptions, seed: u64) -> BackgroundSpec {
        BackgroundSpec {
            seed,
            palette: self.catalog.select(text, options.quality).clone(),
            pattern: Self::select_pattern(options),
            width: self.width,
            height: self.height,
        }
    }

    pub fn plan(&self, text: &str, options: &ProcessingOptions) -> BackgroundSpec {
        self.plan_with_seed(text, options, seed_for(text, now_nanos()))
    }

    /// Renders and writes a PNG. CPU bound; run it off the async executor.
    pub fn generate(
        &self,
        text: &str,
        options: &ProcessingOptions,
        output_path: &Path,
    ) -> Result<PathBuf> {
        let spec = self.plan(text, options);
        debug!(
            palette = %spec.palette.name,
            pattern = spec.pattern.name(),
            seed = spec.seed,
            "rendering background"
        );
        write_png(&spec, output_path)?;
        Ok(output_path.to_path_buf())
    }
}

pub fn write_png(spec: &BackgroundSpec, output_path: &Path) -> Result<()> {
    let to_render_error = |source: ImageError| CourseError::BackgroundRender {
        path: output_path.to_path_buf(),
        source,
    };

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| to_render_error(ImageError::IoError(e)))?;
    }

    render(spec)
        .save_with_format(output_path, ImageFormat::Png)
        .map_err(to_render_error)
}

/// Pure function of the spec.
pub fn render(spec: &BackgroundSpec) -> RgbaImage {
    let mut rng = StdRng::seed_from_u64(spec.seed);
    let mut img = RgbaImage::new(spec.width, spec.height);

    match spec.pattern {
        Pattern::Solid => {
            let color = spec.palette.weighted_random_color(&mut rng);
            fill(&mut img, color);
        }
        Pattern::Gradient => draw_gradient(&mut img, &spec.palette, &mut rng),
        Pattern::Geometric => draw_geometric(&mut img, &spec.palette, &mut rng),
        Pattern::Noise => draw_noise(&mut img, &spec.palette, &mut rng),
    }

    img
}

fn fill(img: &mut RgbaImage, color: Rgba<u8>) {
    for pixel in img.pixels_mut() {
        *pixel = color;
    }
}

fn draw_gradient(img: &mut RgbaImage, palette: &ColorPalette, rng: &mut StdRng) {
    // Endpoints are unweighted so every palette color can appear.
    let top = palette.random_color(rng);
    let bottom = palette.random_color(rng);
    let height = img.height().max(1) as f64;

    for y in 0..img.height() {
        let ratio = y as f64 / height;
        let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * ratio) as u8;
        let color = Rgba([
            lerp(top[0], bottom[0]),
            lerp(top[1], bottom[1]),
            lerp(top[2], bottom[2]),
            255,
        ]);
        for x in 0..img.width() {
            img.put_pixel(x, y, color);
        }
    }
}

fn draw_geometric(img: &mut RgbaImage, palette: &ColorPalette, rng: &mut StdRng) {
    fill(img, palette.weighted_random_color(rng));

    let (width, height) = (img.width() as i64, img.height() as i64);
    if width == 0 || height == 0 {
        return;
    }

    let shapes = 5 + rng.gen_range(0..10);
    for _ in 0..shapes {
        let color = palette.random_color(rng);
        let kind = rng.gen_range(0..3);
        let x = rng.gen_range(0..width);
        let y = rng.gen_range(0..height);

        match kind {
            0 => {
                let radius = 20 + rng.gen_range(0..80i64);
                for dy in -radius..=radius {
                    for dx in -radius..=radius {
                        if dx * dx + dy * dy <= radius * radius {
                            plot(img, x + dx, y + dy, color);
                        }
                    }
                }
            }
            1 => {
                let w = 40 + rng.gen_range(0..120i64);
                let h = 40 + rng.gen_range(0..120i64);
                for py in y..y + h {
                    for px in x..x + w {
                        plot(img, px, py, color);
                    }
                }
            }
            _ => {
                let size = 30 + rng.gen_range(0..70i64);
                for i in 0..size {
                    for j in 0..=i {
                        plot(img, x - i / 2 + j, y + i, color);
                    }
                }
            }
        }
    }
}

fn draw_noise(img: &mut RgbaImage, palette: &ColorPalette, rng: &mut StdRng) {
    let base = palette.weighted_random_color(rng);
    for pixel in img.pixels_mut() {
        let variation: i16 = rng.gen_range(-15..15);
        let shift = |c: u8| (c as i16 + variation).clamp(0, 255) as u8;
        *pixel = Rgba([shift(base[0]), shift(base[1]), shift(base[2]), base[3]]);
    }
}

fn plot(img: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && x < img.width() as i64 && y < img.height() as i64 {
        img.put_pixel(x as u32, y as u32, color);
    }
}
