//! Binary morphology on grayscale rasters.
//!
//! Masks are `GrayImage`s where `255` is foreground (ink) and `0` is background. Thresholding
//! and region labelling come from `imageproc`; the rectangular line kernels used for ruling
//! detection are applied as two separable passes.

use std::collections::HashMap;

use image::{GrayImage, Luma};
use imageproc::contrast;
use imageproc::map::{map_colors, map_colors2};
use imageproc::region_labelling::{self, Connectivity};

/// Rectangular region in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    /// Left column.
    pub x: u32,
    /// Top row.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl PixelRect {
    /// Row just below the rectangle.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

/// Threshold chosen by Otsu's method over the image histogram.
pub fn otsu_level(gray: &GrayImage) -> u8 {
    contrast::otsu_level(gray)
}

/// Binarize with dark pixels (at or below `level`) as foreground.
pub fn threshold_inverted(gray: &GrayImage, level: u8) -> GrayImage {
    map_colors(gray, |Luma([value]): Luma<u8>| {
        Luma([if value <= level { 255 } else { 0 }])
    })
}

/// Erode with a `kernel_width × kernel_height` rectangle anchored at its center.
///
/// Out-of-bounds pixels do not constrain the result.
pub fn erode(mask: &GrayImage, kernel_width: u32, kernel_height: u32) -> GrayImage {
    morph(mask, kernel_width, kernel_height, true)
}

/// Dilate with a `kernel_width × kernel_height` rectangle anchored at its center.
pub fn dilate(mask: &GrayImage, kernel_width: u32, kernel_height: u32) -> GrayImage {
    morph(mask, kernel_width, kernel_height, false)
}

fn morph(mask: &GrayImage, kernel_width: u32, kernel_height: u32, erode: bool) -> GrayImage {
    // Separable: a rectangle is a horizontal pass followed by a vertical pass.
    let horizontal = morph_line(mask, kernel_width.max(1), true, erode);
    morph_line(&horizontal, kernel_height.max(1), false, erode)
}

fn morph_line(mask: &GrayImage, length: u32, horizontal: bool, erode: bool) -> GrayImage {
    if length == 1 {
        return mask.clone();
    }
    let (width, height) = mask.dimensions();
    let before = i64::from(length / 2);
    let after = i64::from(length) - before - 1;

    GrayImage::from_fn(width, height, |x, y| {
        let (origin, limit) = if horizontal {
            (i64::from(x), i64::from(width))
        } else {
            (i64::from(y), i64::from(height))
        };
        let start = (origin - before).max(0);
        let end = (origin + after).min(limit - 1);
        let mut hit = erode;
        for offset in start..=end {
            let value = if horizontal {
                mask.get_pixel(offset as u32, y)[0]
            } else {
                mask.get_pixel(x, offset as u32)[0]
            };
            if erode && value == 0 {
                hit = false;
                break;
            }
            if !erode && value > 0 {
                hit = true;
                break;
            }
        }
        Luma([if hit { 255 } else { 0 }])
    })
}

/// Per-pixel saturating sum of two masks of equal size.
pub fn saturating_add(a: &GrayImage, b: &GrayImage) -> GrayImage {
    map_colors2(a, b, |Luma([left]): Luma<u8>, Luma([right]): Luma<u8>| {
        Luma([left.saturating_add(right)])
    })
}

/// Bounding rectangles of 8-connected foreground regions, in scan order of their first pixel.
pub fn connected_components(mask: &GrayImage) -> Vec<PixelRect> {
    let labels = region_labelling::connected_components(mask, Connectivity::Eight, Luma([0u8]));

    let mut slots: HashMap<u32, usize> = HashMap::new();
    let mut bounds: Vec<(u32, u32, u32, u32)> = Vec::new();
    for (x, y, Luma([label])) in labels.enumerate_pixels() {
        if *label == 0 {
            continue;
        }
        let slot = *slots.entry(*label).or_insert_with(|| {
            bounds.push((x, y, x, y));
            bounds.len() - 1
        });
        let entry = &mut bounds[slot];
        entry.0 = entry.0.min(x);
        entry.1 = entry.1.min(y);
        entry.2 = entry.2.max(x);
        entry.3 = entry.3.max(y);
    }

    bounds
        .into_iter()
        .map(|(min_x, min_y, max_x, max_y)| PixelRect {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(width: u32, height: u32) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([0]))
    }

    #[test]
    fn otsu_separates_two_levels() {
        let mut gray = GrayImage::from_pixel(10, 10, Luma([220]));
        for x in 0..10 {
            for y in 0..3 {
                gray.put_pixel(x, y, Luma([30]));
            }
        }
        let level = otsu_level(&gray);
        assert!((30..220).contains(&level), "level {level}");
        let binary = threshold_inverted(&gray, level);
        assert_eq!(binary.get_pixel(0, 0)[0], 255);
        assert_eq!(binary.get_pixel(0, 9)[0], 0);
    }

    #[test]
    fn horizontal_opening_keeps_long_lines_only() {
        let mut mask = blank(100, 20);
        for x in 5..95 {
            mask.put_pixel(x, 5, Luma([255]));
        }
        for x in 10..20 {
            mask.put_pixel(x, 15, Luma([255]));
        }
        let eroded = erode(&mask, 40, 1);
        assert!(eroded.get_pixel(50, 5)[0] > 0);
        assert_eq!(eroded.get_pixel(15, 15)[0], 0);

        let restored = dilate(&eroded, 40, 1);
        assert!(restored.get_pixel(10, 5)[0] > 0);
    }

    #[test]
    fn components_report_bounding_boxes() {
        let mut mask = blank(30, 30);
        for i in 2..8 {
            mask.put_pixel(i, i, Luma([255]));
        }
        mask.put_pixel(20, 25, Luma([255]));
        let regions = connected_components(&mask);
        assert_eq!(
            regions,
            vec![
                PixelRect {
                    x: 2,
                    y: 2,
                    width: 6,
                    height: 6
                },
                PixelRect {
                    x: 20,
                    y: 25,
                    width: 1,
                    height: 1
                },
            ]
        );
    }

    #[test]
    fn saturating_add_clamps() {
        let a = GrayImage::from_pixel(2, 2, Luma([200]));
        let b = GrayImage::from_pixel(2, 2, Luma([100]));
        assert_eq!(saturating_add(&a, &b).get_pixel(1, 1)[0], 255);
    }
}
