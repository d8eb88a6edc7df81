//! Fiducial corner marker detection.
//!
//! The printed sheet carries a solid black square near each page corner.
//! Each corner region of the canonical image is scanned with a sliding
//! window scored by its blackness ratio; the densest window above the
//! threshold wins. This is an axis-aligned anchor, not a perspective
//! correction: it absorbs uniform offset and scale, and tolerates only
//! slight skew. All four markers are required for calibration; otherwise
//! the caller falls back to the uniform full-frame mapping.

use image::GrayImage;

/// Corner search parameters.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CornerConfig {
    /// Marker window size as a fraction of the smaller image dimension.
    pub marker_frac: f32,
    /// Search region size as a multiple of the marker window.
    pub search_slack: f32,
    /// Brightness below which a pixel counts as black.
    pub black_threshold: u8,
    /// Minimum blackness ratio for a window to qualify as a marker.
    pub min_black_ratio: f32,
}

impl Default for CornerConfig {
    fn default() -> Self {
        Self {
            marker_frac: 0.03,
            search_slack: 1.5,
            black_threshold: 128,
            min_black_ratio: 0.7,
        }
    }
}

/// One detected marker center with the blackness ratio of its window.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct CornerMark {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

/// All four detected markers.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CornerSet {
    pub top_left: CornerMark,
    pub top_right: CornerMark,
    pub bottom_left: CornerMark,
    pub bottom_right: CornerMark,
}

/// Search the four corner regions. Returns `None` unless every marker was
/// found; a partial set is worse than none because a three-point anchor
/// would shear the grid.
pub fn find_corners(gray: &GrayImage, config: &CornerConfig) -> Option<CornerSet> {
    let (w, h) = gray.dimensions();
    let min_dim = w.min(h);
    let marker = ((min_dim as f32 * config.marker_frac).round() as u32).max(4);
    let search = (((marker as f32) * config.search_slack) as u32)
        .max(marker)
        .min(min_dim);

    let right = w.saturating_sub(search);
    let bottom = h.saturating_sub(search);
    let regions = [(0, 0), (right, 0), (0, bottom), (right, bottom)];

    let mut found = [None; 4];
    for (i, &(x0, y0)) in regions.iter().enumerate() {
        found[i] = scan_region(gray, x0, y0, search, marker, config);
        match found[i] {
            Some(m) => tracing::debug!(
                corner = i,
                x = m.x,
                y = m.y,
                confidence = m.confidence,
                "corner marker found"
            ),
            None => tracing::debug!(corner = i, "corner marker not found"),
        }
    }

    match found {
        [Some(tl), Some(tr), Some(bl), Some(br)] => Some(CornerSet {
            top_left: tl,
            top_right: tr,
            bottom_left: bl,
            bottom_right: br,
        }),
        _ => None,
    }
}

/// Slide a marker-sized window over one search region and keep the
/// blackest qualifying position.
fn scan_region(
    gray: &GrayImage,
    x0: u32,
    y0: u32,
    search: u32,
    marker: u32,
    config: &CornerConfig,
) -> Option<CornerMark> {
    let step = (marker / 4).max(1);
    let span = search.saturating_sub(marker);
    let mut best: Option<CornerMark> = None;

    let mut dy = 0;
    while dy <= span {
        let mut dx = 0;
        while dx <= span {
            let ratio = black_ratio(gray, x0 + dx, y0 + dy, marker, config.black_threshold);
            if ratio >= config.min_black_ratio
                && best.map_or(true, |b| ratio > b.confidence)
            {
                best = Some(CornerMark {
                    x: (x0 + dx) as f32 + marker as f32 / 2.0,
                    y: (y0 + dy) as f32 + marker as f32 / 2.0,
                    confidence: ratio,
                });
            }
            dx += step;
        }
        dy += step;
    }
    best
}

/// Fraction of window pixels darker than the threshold.
fn black_ratio(gray: &GrayImage, x0: u32, y0: u32, size: u32, threshold: u8) -> f32 {
    let (w, h) = gray.dimensions();
    let x1 = (x0 + size).min(w);
    let y1 = (y0 + size).min(h);
    if x0 >= x1 || y0 >= y1 {
        return 0.0;
    }
    let data = gray.as_raw();
    let stride = w as usize;
    let mut dark = 0u32;
    let mut total = 0u32;
    for y in y0..y1 {
        let base = y as usize * stride;
        for x in x0..x1 {
            if data[base + x as usize] < threshold {
                dark += 1;
            }
            total += 1;
        }
    }
    dark as f32 / total as f32
}
