//! Per-bubble mark scoring from pixel statistics.
//!
//! Each bubble is sampled inside a circle mask within a window around its
//! mapped center. Three independent measures on a 0..100 scale feed one
//! weighted score: darkness (how dark the ink is), coverage (how much of
//! the circle is filled, against a threshold adapted to the local paper
//! brightness), and uniformity (how evenly it is filled, separating a
//! deliberate fill from a stray pen line).

use image::GrayImage;

use crate::coords::BubbleCoord;

/// Weights combining the three bubble measures into the final score.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub darkness: f32,
    pub coverage: f32,
    pub uniformity: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            darkness: 0.5,
            coverage: 0.3,
            uniformity: 0.2,
        }
    }
}

/// Pixel statistics for one bubble, all on a 0..100 scale.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BubbleAnalysis {
    pub letter: crate::exam::Letter,
    pub darkness: f32,
    pub coverage: f32,
    pub uniformity: f32,
    pub final_score: f32,
}

/// Window half-extent as a multiple of the bubble radius. Wide enough to
/// include surrounding paper for the adaptive coverage threshold.
const WINDOW_SCALE: f32 = 2.5;

/// Score one bubble of the canonical image.
pub fn analyze_bubble(
    gray: &GrayImage,
    bubble: &BubbleCoord,
    radius: f32,
    weights: &ScoreWeights,
) -> BubbleAnalysis {
    let (w, h) = gray.dimensions();
    let data = gray.as_raw();
    let stride = w as usize;

    let half = radius * WINDOW_SCALE;
    let x0 = (bubble.x - half).floor().max(0.0) as u32;
    let y0 = (bubble.y - half).floor().max(0.0) as u32;
    let x1 = ((bubble.x + half).ceil() as u32).min(w.saturating_sub(1));
    let y1 = ((bubble.y + half).ceil() as u32).min(h.saturating_sub(1));

    let r_sq = radius * radius;
    let mut window_sum = 0.0f64;
    let mut window_count = 0u32;
    let mut circle = Vec::new();

    for y in y0..=y1 {
        let base = y as usize * stride;
        let dy = y as f32 - bubble.y;
        for x in x0..=x1 {
            let v = data[base + x as usize];
            window_sum += v as f64;
            window_count += 1;
            let dx = x as f32 - bubble.x;
            if dx * dx + dy * dy <= r_sq {
                circle.push(v);
            }
        }
    }

    if circle.is_empty() || window_count == 0 {
        return BubbleAnalysis {
            letter: bubble.letter,
            darkness: 0.0,
            coverage: 0.0,
            uniformity: 0.0,
            final_score: 0.0,
        };
    }

    let window_mean = (window_sum / window_count as f64) as f32;
    let n = circle.len() as f32;

    let circle_sum: f64 = circle.iter().map(|&v| v as f64).sum();
    let circle_mean = (circle_sum / n as f64) as f32;
    let darkness = (255.0 - circle_mean) / 255.0 * 100.0;

    // Marked pixels are counted against the local paper brightness, so a
    // gray photo does not read as fully covered.
    let mark_threshold = (window_mean - 20.0).max(100.0);
    let marked = circle.iter().filter(|&&v| (v as f32) < mark_threshold).count();
    let coverage = marked as f32 / n * 100.0;

    let variance: f64 = circle
        .iter()
        .map(|&v| {
            let d = v as f64 - circle_mean as f64;
            d * d
        })
        .sum::<f64>()
        / n as f64;
    let uniformity = 100.0 - (variance.sqrt() as f32) / 255.0 * 100.0;

    let final_score = weights.darkness * darkness
        + weights.coverage * coverage
        + weights.uniformity * uniformity;

    BubbleAnalysis {
        letter: bubble.letter,
        darkness,
        coverage,
        uniformity,
        final_score,
    }
}
