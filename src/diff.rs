//! Pixel diff between a baseline image and its candidate.
//!
//! Sensitivity is strict: a pixel counts as changed when any of its channels
//! differs at all. The changed share is rounded up to one decimal place so
//! borderline drift never reports as a pass.

use image::{Rgb, RgbImage};
use serde::Serialize;

use crate::error::{RegressionError, Result};
use crate::snapshot::SnapshotKey;

/// Mask value of an unchanged pixel
pub const MASK_UNCHANGED: u8 = 0;

/// Mask value of a changed pixel
pub const MASK_CHANGED: u8 = 255;

/// Colour stenciled over changed pixels in the highlight image (magenta)
pub const HIGHLIGHT_COLOR: Rgb<u8> = Rgb([255, 0, 255]);

/// Images kept for a failing comparison
#[derive(Debug, Clone)]
pub struct DiffImages {
    /// Baseline with changed pixels painted in [`HIGHLIGHT_COLOR`]
    pub highlight: RgbImage,
    pub baseline: RgbImage,
    pub candidate: RgbImage,
}

/// Outcome of comparing one baseline/candidate pair
#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub key: SnapshotKey,
    pub unchanged_pixels: u64,
    pub changed_pixels: u64,
    /// Rounded up to one decimal; `None` when nothing changed
    pub changed_percentage: Option<f64>,
    #[serde(skip)]
    pub images: Option<DiffImages>,
}

impl Comparison {
    pub fn passed(&self) -> bool {
        self.changed_pixels == 0
    }

    pub fn total_pixels(&self) -> u64 {
        self.unchanged_pixels + self.changed_pixels
    }
}

/// Compare two decoded images stored under `key`
pub fn compare(key: SnapshotKey, baseline: RgbImage, candidate: RgbImage) -> Result<Comparison> {
    if baseline.dimensions() != candidate.dimensions() {
        return Err(RegressionError::DimensionMismatch {
            key: key.token(),
            base: baseline.dimensions(),
            candidate: candidate.dimensions(),
        });
    }

    let mask = difference_mask(&baseline, &candidate);
    let histogram = histogram(&mask);
    let unchanged = histogram[MASK_UNCHANGED as usize];
    let changed = histogram[MASK_CHANGED as usize];

    if changed == 0 {
        return Ok(Comparison {
            key,
            unchanged_pixels: unchanged,
            changed_pixels: 0,
            changed_percentage: None,
            images: None,
        });
    }

    let highlight = highlight(&baseline, &mask);
    Ok(Comparison {
        key,
        unchanged_pixels: unchanged,
        changed_pixels: changed,
        changed_percentage: Some(round_up_percentage(changed, unchanged + changed)),
        images: Some(DiffImages {
            highlight,
            baseline,
            candidate,
        }),
    })
}

/// Decode two PNG buffers and compare them
pub fn compare_png(key: SnapshotKey, baseline: &[u8], candidate: &[u8]) -> Result<Comparison> {
    let baseline = image::load_from_memory(baseline)?.to_rgb8();
    let candidate = image::load_from_memory(candidate)?.to_rgb8();
    compare(key, baseline, candidate)
}

/// Binary mask: the largest channel difference of each pixel, thresholded at 1
pub fn difference_mask(baseline: &RgbImage, candidate: &RgbImage) -> image::GrayImage {
    image::GrayImage::from_fn(baseline.width(), baseline.height(), |x, y| {
        let a = baseline.get_pixel(x, y).0;
        let b = candidate.get_pixel(x, y).0;
        let intensity = a
            .iter()
            .zip(b.iter())
            .map(|(p, q)| p.abs_diff(*q))
            .max()
            .unwrap_or(0);
        if intensity == 0 {
            image::Luma([MASK_UNCHANGED])
        } else {
            image::Luma([MASK_CHANGED])
        }
    })
}

fn histogram(mask: &image::GrayImage) -> [u64; 256] {
    let mut counts = [0u64; 256];
    for pixel in mask.pixels() {
        counts[pixel.0[0] as usize] += 1;
    }
    counts
}

fn highlight(baseline: &RgbImage, mask: &image::GrayImage) -> RgbImage {
    let mut out = baseline.clone();
    for (x, y, pixel) in mask.enumerate_pixels() {
        if pixel.0[0] == MASK_CHANGED {
            out.put_pixel(x, y, HIGHLIGHT_COLOR);
        }
    }
    out
}

/// `changed / total` as a percentage, rounded up to one decimal place.
///
/// Computed in integer tenths of a percent so exact values such as 12.3%
/// are not pushed up by floating point error.
pub fn round_up_percentage(changed: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let numerator = changed as u128 * 1000;
    let total = total as u128;
    let tenths = numerator.div_ceil(total);
    tenths as f64 / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key() -> SnapshotKey {
        SnapshotKey::new(0, "t", "default", 0)
    }

    fn solid(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb(color))
    }

    #[test]
    fn test_identical_images_pass() {
        let image = solid(20, 10, [12, 34, 56]);
        let comparison = compare(key(), image.clone(), image).unwrap();
        assert!(comparison.passed());
        assert_eq!(comparison.changed_pixels, 0);
        assert_eq!(comparison.unchanged_pixels, 200);
        assert_eq!(comparison.changed_percentage, None);
        assert!(comparison.images.is_none());
    }

    #[test]
    fn test_counts_cover_every_pixel() {
        let baseline = solid(10, 10, [0, 0, 0]);
        let mut candidate = baseline.clone();
        for x in 0..10 {
            candidate.put_pixel(x, 0, Rgb([0, 0, 1]));
        }
        let comparison = compare(key(), baseline, candidate).unwrap();
        assert_eq!(comparison.changed_pixels, 10);
        assert_eq!(comparison.total_pixels(), 100);
        assert_eq!(comparison.changed_percentage, Some(10.0));
    }

    #[test]
    fn test_single_channel_difference_counts() {
        let baseline = solid(1, 1, [100, 100, 100]);
        let candidate = solid(1, 1, [100, 101, 100]);
        let comparison = compare(key(), baseline, candidate).unwrap();
        assert_eq!(comparison.changed_pixels, 1);
        assert_eq!(comparison.changed_percentage, Some(100.0));
    }

    #[test]
    fn test_highlight_paints_changed_pixels() {
        let baseline = solid(4, 4, [10, 20, 30]);
        let mut candidate = baseline.clone();
        candidate.put_pixel(1, 2, Rgb([200, 200, 200]));
        let comparison = compare(key(), baseline, candidate).unwrap();
        let images = comparison.images.unwrap();
        assert_eq!(*images.highlight.get_pixel(1, 2), HIGHLIGHT_COLOR);
        assert_eq!(*images.highlight.get_pixel(0, 0), Rgb([10, 20, 30]));
        assert_eq!(*images.candidate.get_pixel(1, 2), Rgb([200, 200, 200]));
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = compare(key(), solid(4, 4, [0; 3]), solid(4, 5, [0; 3])).unwrap_err();
        match err {
            RegressionError::DimensionMismatch { key, base, candidate } => {
                assert_eq!(key, "0:t:default:0:");
                assert_eq!(base, (4, 4));
                assert_eq!(candidate, (4, 5));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_percentage_rounds_up() {
        // 1234 of 10000 = 12.34%
        assert_eq!(round_up_percentage(1234, 10000), 12.4);
        // 123 of 1000 = 12.3% exactly
        assert_eq!(round_up_percentage(123, 1000), 12.3);
        assert_eq!(round_up_percentage(1, 1_000_000), 0.1);
        assert_eq!(round_up_percentage(3, 3), 100.0);
    }

    #[test]
    fn test_compare_png_bytes() {
        let mut buf = std::io::Cursor::new(Vec::new());
        solid(3, 3, [1, 2, 3])
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        let png = buf.into_inner();
        let comparison = compare_png(key(), &png, &png).unwrap();
        assert!(comparison.passed());
    }
}
