//! Canonical-frame preprocessing.
//!
//! Resizes the scan to a fixed canonical resolution, converts to grayscale
//! with perceptual weights, stretches contrast about the midpoint, and
//! median-filters impulse noise. The image is deliberately not binarized:
//! the decision stage needs the full gray gradation to tell a faint mark
//! from a heavy one. The whole stage is a pure function of its inputs.

use image::{imageops::FilterType, DynamicImage, GrayImage};

/// Preprocessing parameters.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Canonical frame width in pixels (A4 at ~150 DPI).
    pub canonical_width: u32,
    /// Canonical frame height in pixels.
    pub canonical_height: u32,
    /// Linear contrast gain about the 128 gray midpoint.
    pub contrast_factor: f32,
    /// Overall quality below this raises the low-quality flag.
    pub min_quality: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            canonical_width: 1240,
            canonical_height: 1754,
            contrast_factor: 1.3,
            min_quality: 50.0,
        }
    }
}

/// Per-sheet quality metrics, each on a 0..100 scale. Informational: a
/// poor score is flagged on the report, never fatal.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct ImageQuality {
    /// Gray dynamic range, (max − min) / 255 × 100.
    pub contrast: f32,
    /// RMS Laplacian edge response, scaled and capped at 100.
    pub sharpness: f32,
    /// 0.6 · contrast + 0.4 · sharpness.
    pub overall: f32,
}

/// A sheet normalized into the canonical frame.
#[derive(Debug)]
pub struct Preprocessed {
    pub canonical: GrayImage,
    pub quality: ImageQuality,
}

/// Run the full preprocessing chain on a decoded scan.
pub fn preprocess(image: &DynamicImage, config: &PreprocessConfig) -> Preprocessed {
    let resized = image.resize_exact(
        config.canonical_width,
        config.canonical_height,
        FilterType::CatmullRom,
    );
    let mut gray = weighted_grayscale(&resized);
    stretch_contrast(&mut gray, config.contrast_factor);
    let canonical = median3(&gray);
    let quality = assess_quality(&canonical);
    Preprocessed { canonical, quality }
}

/// Grayscale with 0.299/0.587/0.114 channel weights.
///
/// Not `to_luma8()`: that uses Rec.709 weights, and the printed-sheet
/// darkness thresholds downstream are calibrated against these.
fn weighted_grayscale(image: &DynamicImage) -> GrayImage {
    let rgb = image.to_rgb8();
    let (w, h) = rgb.dimensions();
    let mut gray = GrayImage::new(w, h);
    for (src, dst) in rgb.pixels().zip(gray.pixels_mut()) {
        let [r, g, b] = src.0;
        let v = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        dst.0[0] = v.round().clamp(0.0, 255.0) as u8;
    }
    gray
}

/// Linear contrast stretch about 128, clamped to [0, 255].
fn stretch_contrast(gray: &mut GrayImage, factor: f32) {
    let intercept = 128.0 * (1.0 - factor);
    for p in gray.pixels_mut() {
        p.0[0] = (p.0[0] as f32 * factor + intercept).clamp(0.0, 255.0) as u8;
    }
}

/// 3×3 median filter with border pixels copied through unfiltered.
fn median3(gray: &GrayImage) -> GrayImage {
    let (w, h) = gray.dimensions();
    let mut out = gray.clone();
    if w < 3 || h < 3 {
        return out;
    }
    let src = gray.as_raw();
    let dst: &mut [u8] = &mut out;
    let stride = w as usize;
    for y in 1..(h as usize - 1) {
        for x in 1..(stride - 1) {
            let mut window = [0u8; 9];
            let mut k = 0;
            for dy in 0..3 {
                let base = (y + dy - 1) * stride + x - 1;
                window[k..k + 3].copy_from_slice(&src[base..base + 3]);
                k += 3;
            }
            window.sort_unstable();
            dst[y * stride + x] = window[4];
        }
    }
    out
}

/// Score the canonical image: dynamic-range contrast plus RMS Laplacian
/// sharpness, combined 60/40.
pub fn assess_quality(gray: &GrayImage) -> ImageQuality {
    let (w, h) = gray.dimensions();
    let data = gray.as_raw();

    let mut min = u8::MAX;
    let mut max = u8::MIN;
    for &v in data {
        min = min.min(v);
        max = max.max(v);
    }
    let contrast = (max.saturating_sub(min)) as f32 / 255.0 * 100.0;

    let mut lap_sq_sum = 0.0f64;
    if w >= 3 && h >= 3 {
        let stride = w as usize;
        for y in 1..(h as usize - 1) {
            for x in 1..(stride - 1) {
                let idx = y * stride + x;
                let c = data[idx] as f64;
                let lap = (4.0 * c
                    - data[idx - stride] as f64
                    - data[idx + stride] as f64
                    - data[idx - 1] as f64
                    - data[idx + 1] as f64)
                    .abs();
                lap_sq_sum += lap * lap;
            }
        }
    }
    let sharpness =
        ((lap_sq_sum / (w as f64 * h as f64)).sqrt() / 10.0).min(100.0) as f32;

    let overall = 0.6 * contrast + 0.4 * sharpness;
    ImageQuality {
        contrast,
        sharpness,
        overall,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, RgbImage};

    fn gray_of(pixels: &[&[u8]]) -> GrayImage {
        let h = pixels.len() as u32;
        let w = pixels[0].len() as u32;
        GrayImage::from_fn(w, h, |x, y| Luma([pixels[y as usize][x as usize]]))
    }

    #[test]
    fn grayscale_uses_perceptual_weights() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, image::Rgb([255, 0, 0])));
        let gray = weighted_grayscale(&img);
        // 0.299 * 255 ≈ 76, where Rec.709 would give ≈ 54.
        assert_eq!(gray.get_pixel(0, 0).0[0], 76);
    }

    #[test]
    fn contrast_stretch_pivots_at_midpoint() {
        let mut gray = gray_of(&[&[128, 100, 200]]);
        stretch_contrast(&mut gray, 1.3);
        assert_eq!(gray.get_pixel(0, 0).0[0], 128);
        assert_eq!(gray.get_pixel(1, 0).0[0], 91); // 100*1.3 - 38.4 = 91.6
        assert_eq!(gray.get_pixel(2, 0).0[0], 221); // 200*1.3 - 38.4 = 221.6
    }

    #[test]
    fn median_removes_impulse_but_keeps_borders() {
        let img = gray_of(&[
            &[9, 200, 200, 200, 9],
            &[200, 200, 200, 200, 200],
            &[200, 200, 0, 200, 200],
            &[200, 200, 200, 200, 200],
            &[9, 200, 200, 200, 9],
        ]);
        let out = median3(&img);
        // Center impulse suppressed.
        assert_eq!(out.get_pixel(2, 2).0[0], 200);
        // Border pixels pass through untouched.
        assert_eq!(out.get_pixel(0, 0).0[0], 9);
        assert_eq!(out.get_pixel(4, 4).0[0], 9);
    }

    #[test]
    fn flat_image_scores_zero_quality() {
        let q = assess_quality(&GrayImage::from_pixel(32, 32, Luma([180])));
        assert_eq!(q.contrast, 0.0);
        assert_eq!(q.sharpness, 0.0);
        assert_eq!(q.overall, 0.0);
    }

    #[test]
    fn full_range_image_maxes_contrast() {
        let img = GrayImage::from_fn(32, 32, |x, _| Luma([if x < 16 { 0 } else { 255 }]));
        let q = assess_quality(&img);
        assert_eq!(q.contrast, 100.0);
        assert!(q.sharpness > 0.0);
    }

    #[test]
    fn preprocessing_is_bit_identical_across_runs() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(900, 1273, |x, y| {
            image::Rgb([(x % 251) as u8, (y % 241) as u8, ((x + y) % 239) as u8])
        }));
        let config = PreprocessConfig::default();
        let a = preprocess(&img, &config);
        let b = preprocess(&img, &config);
        assert_eq!(a.canonical.as_raw(), b.canonical.as_raw());
        assert_eq!(a.quality.overall, b.quality.overall);
    }
}
