//! Audit rendering: the canonical frame with every sampled bubble drawn
//! over it, so a human can see exactly where the analyzer looked and what
//! it concluded.

use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut};

use crate::coords::CoordinateMap;
use crate::decision::QuestionDecision;

const BUBBLE: Rgb<u8> = Rgb([0, 190, 0]);
const CHOSEN: Rgb<u8> = Rgb([220, 0, 0]);
const WARNING: Rgb<u8> = Rgb([255, 150, 0]);

/// Render the overlay. `decisions` must parallel `coords.questions`.
pub fn render(
    canonical: &GrayImage,
    coords: &CoordinateMap,
    decisions: &[QuestionDecision],
) -> RgbImage {
    let mut img = RgbImage::from_fn(canonical.width(), canonical.height(), |x, y| {
        let v = canonical.get_pixel(x, y).0[0];
        Rgb([v, v, v])
    });

    let r = coords.bubble_radius_px.round() as i32;
    for (q, d) in coords.questions.iter().zip(decisions) {
        for b in &q.bubbles {
            draw_hollow_circle_mut(&mut img, (b.x as i32, b.y as i32), r, BUBBLE);
        }
        if let Some(answer) = d.decision.answer {
            let b = q.bubbles[answer.index()];
            draw_hollow_circle_mut(&mut img, (b.x as i32, b.y as i32), r + 3, CHOSEN);
        }
        if d.decision.warning.is_some() {
            let first = q.bubbles[0];
            let cx = (first.x - 2.0 * coords.bubble_radius_px) as i32;
            draw_filled_circle_mut(&mut img, (cx, first.y as i32), (r / 3).max(2), WARNING);
        }
    }
    img
}
