//! Sheet image acquisition: decoding and scan validation.

use image::DynamicImage;

use crate::error::OmrError;

/// Scan acceptance parameters.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Minimum accepted scan width in pixels.
    pub min_width: u32,
    /// Minimum accepted scan height in pixels.
    pub min_height: u32,
    /// Expected page aspect ratio (height / width) for an A4 portrait scan.
    pub target_aspect: f32,
    /// Accepted deviation from the target aspect before the scan is flagged.
    pub aspect_tolerance: f32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            min_width: 800,
            min_height: 1100,
            target_aspect: 1.414,
            aspect_tolerance: 0.1,
        }
    }
}

/// A decoded scan that passed resolution validation.
#[derive(Debug)]
pub struct LoadedSheet {
    pub image: DynamicImage,
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: f32,
    /// The scan deviates from the expected page proportions. Non-fatal:
    /// tilted or loosely cropped photos are still attempted.
    pub aspect_mismatch: bool,
}

/// Decode raw bytes and validate the result as an answer-sheet scan.
pub fn load_from_bytes(bytes: &[u8], config: &LoaderConfig) -> Result<LoadedSheet, OmrError> {
    let image = image::load_from_memory(bytes)?;
    validate(image, config)
}

/// Validate an already-decoded image.
///
/// Resolution below the minimum is fatal: bubbles become too small to score
/// reliably. An off-target aspect ratio only raises a flag.
pub fn validate(image: DynamicImage, config: &LoaderConfig) -> Result<LoadedSheet, OmrError> {
    let width = image.width();
    let height = image.height();
    if width < config.min_width || height < config.min_height {
        return Err(OmrError::ResolutionTooLow {
            width,
            height,
            min_width: config.min_width,
            min_height: config.min_height,
        });
    }
    let aspect_ratio = height as f32 / width as f32;
    let aspect_mismatch = (aspect_ratio - config.target_aspect).abs() > config.aspect_tolerance;
    Ok(LoadedSheet {
        image,
        width,
        height,
        aspect_ratio,
        aspect_mismatch,
    })
}
