//! Image preparation: the fixed legibility pipeline for scanned sheets.
//!
//! The sheets are scanned in landscape and faxed-quality black and white.
//! Before the VLM sees a page it goes through, in this exact order:
//!
//! 1. 90° counter-clockwise rotation (the tables are scanned sideways)
//! 2. contrast ×1.5 — lifts faint print off the grey background
//! 3. sharpness ×2.0 — recovers pencil stroke edges lost to scanner blur
//! 4. brightness ×1.1 — compensates the slight darkening from step 2
//!
//! The factors are deliberately not configurable: they were tuned against
//! the actual sheet stock and changing one changes what the model misreads.
//!
//! The enhancement operators blend against a reference image the way photo
//! editors define them: contrast interpolates between the image and its
//! mean-luminance grey, sharpness between the image and a smoothed copy,
//! brightness between the image and black. A factor of 1.0 is always the
//! identity; factors above 1.0 exaggerate.
//!
//! The enhanced page is persisted as a PNG so the operator can inspect it
//! at the confirmation gate. Each page gets its own file — the path is
//! never reused within a run, so page N's image survives page N+1.

use crate::error::PageError;
use image::{DynamicImage, RgbImage};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Contrast multiplier applied to every page.
pub const CONTRAST_FACTOR: f32 = 1.5;
/// Sharpness multiplier applied to every page.
pub const SHARPNESS_FACTOR: f32 = 2.0;
/// Brightness multiplier applied to every page.
pub const BRIGHTNESS_FACTOR: f32 = 1.1;

/// Run the fixed enhancement pipeline on one rasterised page.
///
/// Pure function: the input image is not modified.
pub fn enhance_page(img: &DynamicImage) -> DynamicImage {
    let rotated = img.rotate270();
    let rgb = rotated.to_rgb8();

    let contrasted = adjust_contrast(&rgb, CONTRAST_FACTOR);
    let sharpened = adjust_sharpness(&contrasted, SHARPNESS_FACTOR);
    let brightened = adjust_brightness(&sharpened, BRIGHTNESS_FACTOR);

    debug!(
        "Enhanced page: {}x{} → {}x{}",
        img.width(),
        img.height(),
        brightened.width(),
        brightened.height()
    );

    DynamicImage::ImageRgb8(brightened)
}

/// Persist an enhanced page for operator inspection.
///
/// Writes `enhanced_page_{n}.png` under `dir`. Failure here is
/// page-recoverable: the page is skipped, the run continues.
pub fn persist_enhanced(
    img: &DynamicImage,
    dir: &Path,
    page_num: usize,
) -> Result<PathBuf, PageError> {
    let path = dir.join(format!("enhanced_page_{page_num}.png"));
    img.save(&path).map_err(|e| PageError::EnhanceFailed {
        page: page_num,
        detail: format!("could not write '{}': {}", path.display(), e),
    })?;
    debug!("Saved enhanced image to {}", path.display());
    Ok(path)
}

// ── Enhancement operators ────────────────────────────────────────────────

/// Blend each channel against the image's mean luminance:
/// `out = mean + factor × (px − mean)`.
fn adjust_contrast(img: &RgbImage, factor: f32) -> RgbImage {
    let mean = mean_luminance(img);
    map_channels(img, |c| mean + factor * (c - mean))
}

/// Blend each channel against a 3×3-smoothed copy:
/// `out = smooth + factor × (px − smooth)`.
fn adjust_sharpness(img: &RgbImage, factor: f32) -> RgbImage {
    // Mild smoothing kernel; the centre weight keeps thin pencil strokes
    // from washing out entirely before the blend re-amplifies them.
    let kernel = [
        1.0 / 13.0, 1.0 / 13.0, 1.0 / 13.0,
        1.0 / 13.0, 5.0 / 13.0, 1.0 / 13.0,
        1.0 / 13.0, 1.0 / 13.0, 1.0 / 13.0,
    ];
    let smooth: RgbImage = image::imageops::filter3x3(img, &kernel);

    let mut out = RgbImage::new(img.width(), img.height());
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let orig = img.get_pixel(x, y);
        let base = smooth.get_pixel(x, y);
        for ch in 0..3 {
            let o = orig[ch] as f32;
            let s = base[ch] as f32;
            pixel[ch] = clamp_u8(s + factor * (o - s));
        }
    }
    out
}

/// Scale every channel: `out = factor × px`.
fn adjust_brightness(img: &RgbImage, factor: f32) -> RgbImage {
    map_channels(img, |c| c * factor)
}

/// Mean ITU-R 601 luminance over the whole image.
fn mean_luminance(img: &RgbImage) -> f32 {
    let pixel_count = (img.width() as u64 * img.height() as u64).max(1);
    let sum: f64 = img
        .pixels()
        .map(|p| {
            0.299 * p[0] as f64 + 0.587 * p[1] as f64 + 0.114 * p[2] as f64
        })
        .sum();
    (sum / pixel_count as f64) as f32
}

fn map_channels(img: &RgbImage, f: impl Fn(f32) -> f32) -> RgbImage {
    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        for ch in 0..3 {
            pixel[ch] = clamp_u8(f(pixel[ch] as f32));
        }
    }
    out
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn uniform(w: u32, h: u32, value: u8) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([value, value, value]))
    }

    #[test]
    fn rotation_swaps_dimensions() {
        let img = DynamicImage::ImageRgb8(uniform(30, 10, 128));
        let enhanced = enhance_page(&img);
        assert_eq!(enhanced.width(), 10);
        assert_eq!(enhanced.height(), 30);
    }

    #[test]
    fn contrast_is_identity_on_uniform_image() {
        let img = uniform(8, 8, 100);
        let out = adjust_contrast(&img, CONTRAST_FACTOR);
        // A uniform image equals its own mean, so contrast changes nothing.
        assert_eq!(out.get_pixel(3, 3), &Rgb([100, 100, 100]));
    }

    #[test]
    fn contrast_spreads_values_from_the_mean() {
        // Two-tone image: half 100, half 200, mean 150.
        let mut img = uniform(4, 2, 100);
        for x in 0..4 {
            img.put_pixel(x, 1, Rgb([200, 200, 200]));
        }
        let out = adjust_contrast(&img, 1.5);
        // 150 + 1.5 × (100 − 150) = 75; 150 + 1.5 × (200 − 150) = 225.
        assert_eq!(out.get_pixel(0, 0)[0], 75);
        assert_eq!(out.get_pixel(0, 1)[0], 225);
    }

    #[test]
    fn brightness_scales_and_clamps() {
        let out = adjust_brightness(&uniform(2, 2, 100), BRIGHTNESS_FACTOR);
        assert_eq!(out.get_pixel(0, 0)[0], 110);
        let out = adjust_brightness(&uniform(2, 2, 250), BRIGHTNESS_FACTOR);
        assert_eq!(out.get_pixel(0, 0)[0], 255);
    }

    #[test]
    fn sharpness_is_identity_on_uniform_image() {
        let out = adjust_sharpness(&uniform(8, 8, 77), SHARPNESS_FACTOR);
        assert_eq!(out.get_pixel(4, 4)[0], 77);
    }

    #[test]
    fn sharpness_amplifies_an_edge() {
        // A dark stroke on a light field should get darker at its centre
        // after sharpening (overshoot away from the smoothed value).
        let mut img = uniform(9, 9, 220);
        img.put_pixel(4, 4, Rgb([60, 60, 60]));
        let out = adjust_sharpness(&img, SHARPNESS_FACTOR);
        assert!(
            out.get_pixel(4, 4)[0] < 60,
            "stroke centre should darken, got {}",
            out.get_pixel(4, 4)[0]
        );
    }

    #[test]
    fn persist_writes_page_unique_png() {
        let dir = tempfile::tempdir().unwrap();
        let img = DynamicImage::ImageRgb8(uniform(4, 4, 128));
        let p1 = persist_enhanced(&img, dir.path(), 1).unwrap();
        let p2 = persist_enhanced(&img, dir.path(), 2).unwrap();
        assert_ne!(p1, p2, "each page must get its own file");
        assert!(p1.exists());
        assert!(p2.exists());
        assert!(p1.file_name().unwrap().to_str().unwrap().contains("1"));
    }

    #[test]
    fn persist_into_missing_dir_is_page_recoverable() {
        let img = DynamicImage::ImageRgb8(uniform(4, 4, 128));
        let err = persist_enhanced(&img, Path::new("/nonexistent/dir"), 3).unwrap_err();
        assert!(matches!(err, PageError::EnhanceFailed { page: 3, .. }));
    }
}
