//! Validation prediction grids
//!
//! Tiles up to 16 validation images into one PNG. Each tile carries a
//! "gt / pred" caption above the image, drawn with the `font8x8` bitmap
//! font, and a frame that is green when the prediction is right and red
//! when it is wrong. The long captions with class names also go into the
//! figure event.

use std::path::Path;

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgb, RgbImage};
use rand::seq::index::sample;
use rand::Rng;

use crate::dataset::{class_name, denormalize_image};
use crate::utils::error::{MaskClassifierError, Result};

/// Tiles per figure
pub const MAX_TILES: usize = 16;

const BORDER: u32 = 2;
/// Glyphs are 8x8 pixels
const GLYPH: u32 = 8;
/// Two caption lines with a pixel of spacing around each
const CAPTION_HEIGHT: u32 = 2 * (GLYPH + 1) + 1;
/// Fits "pred: 17"
const CAPTION_WIDTH: u32 = 8 * GLYPH + 2;
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const CORRECT: Rgb<u8> = Rgb([40, 167, 69]);
const WRONG: Rgb<u8> = Rgb([220, 53, 69]);

/// One normalised CHW image with its label and prediction
#[derive(Debug, Clone)]
pub struct GridSample {
    pub image: Vec<f32>,
    pub label: usize,
    pub prediction: usize,
}

/// Rendered figure plus one caption per tile
#[derive(Debug, Clone)]
pub struct PredictionGrid {
    pub image: RgbImage,
    pub captions: Vec<String>,
}

impl PredictionGrid {
    /// Tile `samples` (each `height` x `width`) into a square-ish grid
    pub fn build(samples: &[GridSample], (height, width): (u32, u32), mean: [f32; 3], std: [f32; 3]) -> Self {
        let count = samples.len().min(MAX_TILES);
        let cols = (count as f64).sqrt().ceil().max(1.0) as u32;
        let rows = (count as u32).div_ceil(cols).max(1);

        let tile_w = (width + 2 * BORDER).max(CAPTION_WIDTH);
        let tile_h = CAPTION_HEIGHT + height + 2 * BORDER;
        let mut canvas = RgbImage::from_pixel(cols * tile_w, rows * tile_h, BACKGROUND);
        let plane = (height * width) as usize;

        let mut captions = Vec::with_capacity(count);
        for (i, sample) in samples.iter().take(count).enumerate() {
            let ox = (i as u32 % cols) * tile_w;
            let oy = (i as u32 / cols) * tile_h;
            let frame = if sample.label == sample.prediction {
                CORRECT
            } else {
                WRONG
            };

            let right = ox + tile_w;
            draw_text(&mut canvas, ox + 1, oy + 1, right, &format!("gt: {}", sample.label), frame);
            draw_text(
                &mut canvas,
                ox + 1,
                oy + GLYPH + 2,
                right,
                &format!("pred: {}", sample.prediction),
                frame,
            );

            let fy = oy + CAPTION_HEIGHT;
            for y in 0..height + 2 * BORDER {
                for x in 0..width + 2 * BORDER {
                    canvas.put_pixel(ox + x, fy + y, frame);
                }
            }

            let pixels = denormalize_image(&sample.image, mean, std);
            if pixels.len() >= 3 * plane {
                for y in 0..height {
                    for x in 0..width {
                        let idx = (y * width + x) as usize;
                        let px = Rgb([pixels[idx], pixels[plane + idx], pixels[2 * plane + idx]]);
                        canvas.put_pixel(ox + BORDER + x, fy + BORDER + y, px);
                    }
                }
            }

            captions.push(format!(
                "gt: {} ({}), pred: {} ({})",
                sample.label,
                class_name(sample.label),
                sample.prediction,
                class_name(sample.prediction)
            ));
        }

        Self {
            image: canvas,
            captions,
        }
    }

    pub fn num_tiles(&self) -> usize {
        self.captions.len()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.image.save(path).map_err(|e| {
            MaskClassifierError::Resource(format!("writing figure {}: {}", path.display(), e))
        })
    }
}

/// Draw `text` with its top-left corner at `(x, y)`, clipped at column `right`
fn draw_text(canvas: &mut RgbImage, x: u32, y: u32, right: u32, text: &str, color: Rgb<u8>) {
    let right = right.min(canvas.width());
    for (i, ch) in text.chars().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(ch) else {
            continue;
        };
        let gx = x + i as u32 * GLYPH;
        for (row, bits) in glyph.iter().enumerate() {
            let py = y + row as u32;
            if py >= canvas.height() {
                break;
            }
            for col in 0..GLYPH {
                let px = gx + col;
                if px < right && (bits >> col) & 1 == 1 {
                    canvas.put_pixel(px, py, color);
                }
            }
        }
    }
}

/// Which items of a batch of `batch_len` go into the figure
pub fn figure_indices<R: Rng>(batch_len: usize, shuffle: bool, rng: &mut R) -> Vec<usize> {
    let n = batch_len.min(MAX_TILES);
    if shuffle {
        let mut picked = sample(rng, batch_len, n).into_vec();
        picked.sort_unstable();
        picked
    } else {
        (0..n).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn samples(n: usize) -> Vec<GridSample> {
        (0..n)
            .map(|i| GridSample {
                image: vec![0.0; 3 * 4 * 5],
                label: i % 18,
                prediction: if i % 2 == 0 { i % 18 } else { 0 },
            })
            .collect()
    }

    #[test]
    fn test_grid_layout_and_borders() {
        let grid = PredictionGrid::build(&samples(5), (4, 5), [0.5; 3], [0.25; 3]);
        // 5 tiles: 3 columns, 2 rows; tiles are as wide as the caption
        let tile_h = CAPTION_HEIGHT + 8;
        assert_eq!(grid.image.dimensions(), (3 * CAPTION_WIDTH, 2 * tile_h));
        assert_eq!(grid.num_tiles(), 5);
        assert_eq!(*grid.image.get_pixel(0, CAPTION_HEIGHT), CORRECT);
        assert_eq!(*grid.image.get_pixel(CAPTION_WIDTH, CAPTION_HEIGHT), WRONG);
        // interior holds the denormalised mean
        assert_eq!(
            *grid.image.get_pixel(BORDER, CAPTION_HEIGHT + BORDER),
            Rgb([127, 127, 127])
        );
        assert!(grid.captions[1].starts_with("gt: 1"));
    }

    #[test]
    fn test_captions_are_drawn_on_each_tile() {
        let grid = PredictionGrid::build(&samples(2), (4, 5), [0.0; 3], [1.0; 3]);
        let band = |ox: u32| -> Vec<Rgb<u8>> {
            (0..CAPTION_HEIGHT)
                .flat_map(|y| (ox..ox + CAPTION_WIDTH).map(move |x| (x, y)))
                .map(|(x, y)| *grid.image.get_pixel(x, y))
                .filter(|p| *p != BACKGROUND)
                .collect()
        };

        let first = band(0);
        assert!(!first.is_empty());
        assert!(first.iter().all(|p| *p == CORRECT));

        let second = band(CAPTION_WIDTH);
        assert!(!second.is_empty());
        assert!(second.iter().all(|p| *p == WRONG));
    }

    #[test]
    fn test_text_is_clipped_to_its_tile() {
        let mut canvas = RgbImage::from_pixel(20, 8, BACKGROUND);
        draw_text(&mut canvas, 0, 0, 10, "WWWW", WRONG);
        assert!((10..20).all(|x| (0..8).all(|y| *canvas.get_pixel(x, y) == BACKGROUND)));
        assert!((0..10).any(|x| (0..8).any(|y| *canvas.get_pixel(x, y) == WRONG)));
    }

    #[test]
    fn test_grid_caps_tiles() {
        let grid = PredictionGrid::build(&samples(40), (4, 5), [0.0; 3], [1.0; 3]);
        assert_eq!(grid.num_tiles(), MAX_TILES);
    }

    #[test]
    fn test_figure_indices() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(figure_indices(5, false, &mut rng), vec![0, 1, 2, 3, 4]);
        let picked = figure_indices(64, true, &mut rng);
        assert_eq!(picked.len(), MAX_TILES);
        assert!(picked.iter().all(|&i| i < 64));
    }

    #[test]
    fn test_save_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.png");
        PredictionGrid::build(&samples(2), (4, 5), [0.0; 3], [1.0; 3])
            .save(&path)
            .unwrap();
        assert!(path.exists());
    }
}
