//! Named color palettes and mood-based selection.

use image::Rgba;
use rand::Rng;

use crate::{
    error::{CourseError, Result},
    types::Quality,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ColorPalette {
    pub name: String,
    pub colors: Vec<Rgba<u8>>,
    /// Parallel to `colors`, summing to 1.
    pub weights: Vec<f64>,
    pub mood: String,
}

impl ColorPalette {
    pub fn new(
        name: impl Into<String>,
        colors: Vec<Rgba<u8>>,
        weights: Vec<f64>,
        mood: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        if colors.is_empty() {
            return Err(CourseError::configuration(format!(
                "palette '{name}' has no colors"
            )));
        }
        if colors.len() != weights.len() {
            return Err(CourseError::configuration(format!(
                "palette '{name}' has {} colors but {} weights",
                colors.len(),
                weights.len()
            )));
        }
        let total: f64 = weights.iter().sum();
        if weights.iter().any(|w| *w < 0.0) || (total - 1.0).abs() > 1e-6 {
            return Err(CourseError::configuration(format!(
                "palette '{name}' weights must be non-negative and sum to 1 (got {total})"
            )));
        }
        Ok(Self {
            name,
            colors,
            weights,
            mood: mood.into(),
        })
    }

    /// Uniform pick.
    pub fn random_color<R: Rng>(&self, rng: &mut R) -> Rgba<u8> {
        self.colors[rng.gen_range(0..self.colors.len())]
    }

    /// Pick proportional to `weights`. Rounding slack falls to the last color.
    pub fn weighted_random_color<R: Rng>(&self, rng: &mut R) -> Rgba<u8> {
        let r: f64 = rng.gen_range(0.0..1.0);
        let mut cumulative = 0.0;
        for (color, weight) in self.colors.iter().zip(&self.weights) {
            cumulative += weight;
            if r <= cumulative {
                return *color;
            }
        }
        self.colors[self.colors.len() - 1]
    }
}

/// Keyword groups checked in order; the first group with any hit wins.
const MOOD_RULES: &[(&[&str], &str)] = &[
    (&["business", "professional", "corporate"], "professional"),
    (&["nature", "environment", "green"], "forest"),
    (&["relax", "calm", "ocean"], "ocean"),
    (&["energy", "vibrant", "sunset"], "sunset"),
    (&["creative", "art", "design"], "lavender"),
];

/// Immutable set of palettes, shared read-only across lessons.
#[derive(Debug, Clone)]
pub struct PaletteCatalog {
    palettes: Vec<ColorPalette>,
}

fn rgb(r: u8, g: u8, b: u8) -> Rgba<u8> {
    Rgba([r, g, b, 255])
}

impl PaletteCatalog {
    pub fn new(palettes: Vec<ColorPalette>) -> Result<Self> {
        if palettes.is_empty() {
            return Err(CourseError::configuration("palette catalog is empty"));
        }
        Ok(Self { palettes })
    }

    /// The five built-in palettes.
    pub fn standard() -> Self {
        let palette = |name: &str, colors: [Rgba<u8>; 4], weights: [f64; 4], mood: &str| ColorPalette {
            name: name.to_string(),
            colors: colors.to_vec(),
            weights: weights.to_vec(),
            mood: mood.to_string(),
        };

        Self {
            palettes: vec![
                palette(
                    "ocean",
                    [rgb(0, 119, 190), rgb(0, 180, 216), rgb(144, 224, 239), rgb(255, 255, 255)],
                    [0.4, 0.3, 0.2, 0.1],
                    "calm",
                ),
                palette(
                    "forest",
                    [rgb(34, 139, 34), rgb(107, 142, 35), rgb(144, 238, 144), rgb(245, 245, 220)],
                    [0.3, 0.3, 0.25, 0.15],
                    "natural",
                ),
                palette(
                    "sunset",
                    [rgb(255, 94, 77), rgb(255, 154, 0), rgb(237, 117, 57), rgb(255, 206, 84)],
                    [0.3, 0.25, 0.25, 0.2],
                    "energetic",
                ),
                palette(
                    "lavender",
                    [rgb(230, 230, 250), rgb(216, 191, 216), rgb(221, 160, 221), rgb(238, 130, 238)],
                    [0.3, 0.25, 0.25, 0.2],
                    "elegant",
                ),
                palette(
                    "professional",
                    [rgb(52, 73, 94), rgb(108, 117, 125), rgb(189, 195, 199), rgb(236, 240, 241)],
                    [0.35, 0.25, 0.25, 0.15],
                    "professional",
                ),
            ],
        }
    }

    pub fn get(&self, name: &str) -> Option<&ColorPalette> {
        self.palettes.iter().find(|p| p.name == name)
    }

    pub fn palettes(&self) -> &[ColorPalette] {
        &self.palettes
    }

    /// Chooses a palette from lesson text, falling back on the quality tier.
    /// Deterministic for a given text and tier.
    pub fn select(&self, text: &str, quality: Quality) -> &ColorPalette {
        let lowered = text.to_lowercase();
        let matched = MOOD_RULES
            .iter()
            .find(|(keywords, _)| keywords.iter().any(|k| lowered.contains(k)))
            .map(|(_, palette)| *palette);

        let name = matched.unwrap_or(match quality {
            Quality::High => "ocean",
            Quality::Standard => "professional",
        });

        self.get(name).unwrap_or(&self.palettes[0])
    }
}

impl Default for PaletteCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
