//! Bubble coordinate mapping into the canonical pixel frame.
//!
//! A pure function of exam structure, sheet layout, and canonical frame
//! size: the same mm-space walk that prints the sheet is projected to
//! pixels. Without detected fiducials the projection is a uniform page
//! scale; with all four corner markers the known marker centers and the
//! detected ones are blended bilinearly, absorbing offset and non-uniform
//! scale between print and scan.

use crate::corners::CornerSet;
use crate::exam::{ExamStructure, Letter, OPTION_COUNT};
use crate::layout::{SheetLayout, PAGE_WIDTH_MM};

/// One bubble center in canonical pixels.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct BubbleCoord {
    pub letter: Letter,
    pub x: f32,
    pub y: f32,
}

/// Pixel positions of one question's bubbles.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct QuestionCoords {
    pub number: u32,
    pub bubbles: [BubbleCoord; OPTION_COUNT],
}

/// Every bubble of the sheet, in question order 1..N.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CoordinateMap {
    pub questions: Vec<QuestionCoords>,
    /// Shared bubble radius in canonical pixels.
    pub bubble_radius_px: f32,
    /// True when the map was anchored on detected corner markers.
    pub corner_anchored: bool,
}

impl CoordinateMap {
    /// Build the map, anchored on corners when a full set was detected.
    /// The pixel scale comes from the canonical width against the physical
    /// page width; the canonical frame keeps the page aspect, so one scale
    /// serves both axes.
    pub fn build(
        exam: &ExamStructure,
        layout: &SheetLayout,
        width: u32,
        corners: Option<&CornerSet>,
    ) -> CoordinateMap {
        let scale = width as f32 / PAGE_WIDTH_MM;
        let project: Box<dyn Fn([f32; 2]) -> (f32, f32)> = match corners {
            Some(set) => {
                let anchors = CornerAnchors::new(layout, set);
                Box::new(move |mm| anchors.project(mm))
            }
            None => Box::new(move |mm| (mm[0] * scale, mm[1] * scale)),
        };

        let questions = layout
            .question_slots(exam)
            .into_iter()
            .map(|slot| QuestionCoords {
                number: slot.number,
                bubbles: std::array::from_fn(|i| {
                    let (x, y) = project(slot.bubbles[i].center_mm);
                    BubbleCoord {
                        letter: slot.bubbles[i].letter,
                        x,
                        y,
                    }
                }),
            })
            .collect();

        CoordinateMap {
            questions,
            bubble_radius_px: layout.bubble_radius_mm * scale,
            corner_anchored: corners.is_some(),
        }
    }
}

/// Bilinear blend between the four known marker centers (mm) and the four
/// detected ones (px).
struct CornerAnchors {
    origin_mm: [f32; 2],
    span_mm: [f32; 2],
    px: [[f32; 2]; 4],
}

impl CornerAnchors {
    fn new(layout: &SheetLayout, set: &CornerSet) -> CornerAnchors {
        let centers = layout.corner_centers_mm();
        CornerAnchors {
            origin_mm: centers[0],
            span_mm: [
                centers[1][0] - centers[0][0],
                centers[2][1] - centers[0][1],
            ],
            px: [
                [set.top_left.x, set.top_left.y],
                [set.top_right.x, set.top_right.y],
                [set.bottom_left.x, set.bottom_left.y],
                [set.bottom_right.x, set.bottom_right.y],
            ],
        }
    }

    fn project(&self, mm: [f32; 2]) -> (f32, f32) {
        let u = (mm[0] - self.origin_mm[0]) / self.span_mm[0];
        let v = (mm[1] - self.origin_mm[1]) / self.span_mm[1];
        let [tl, tr, bl, br] = self.px;
        let x = tl[0] * (1.0 - u) * (1.0 - v)
            + tr[0] * u * (1.0 - v)
            + bl[0] * (1.0 - u) * v
            + br[0] * u * v;
        let y = tl[1] * (1.0 - u) * (1.0 - v)
            + tr[1] * u * (1.0 - v)
            + bl[1] * (1.0 - u) * v
            + br[1] * u * v;
        (x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corners::CornerMark;
    use crate::exam::tests::sample_exam;

    const W: u32 = 1240;

    fn mark(x: f32, y: f32) -> CornerMark {
        CornerMark {
            x,
            y,
            confidence: 1.0,
        }
    }

    /// Detected corners exactly where the uniform scale would print them.
    fn aligned_corners(layout: &SheetLayout) -> CornerSet {
        let scale = W as f32 / PAGE_WIDTH_MM;
        let c = layout.corner_centers_mm();
        CornerSet {
            top_left: mark(c[0][0] * scale, c[0][1] * scale),
            top_right: mark(c[1][0] * scale, c[1][1] * scale),
            bottom_left: mark(c[2][0] * scale, c[2][1] * scale),
            bottom_right: mark(c[3][0] * scale, c[3][1] * scale),
        }
    }

    #[test]
    fn one_entry_with_five_bubbles_per_question() {
        let exam = sample_exam(&[8, 5]);
        let map = CoordinateMap::build(&exam, &SheetLayout::default(), W, None);
        assert_eq!(map.questions.len(), 13);
        for (i, q) in map.questions.iter().enumerate() {
            assert_eq!(q.number, i as u32 + 1);
            assert_eq!(q.bubbles.len(), OPTION_COUNT);
            for pair in q.bubbles.windows(2) {
                assert!(pair[1].x > pair[0].x);
            }
        }
        assert!(!map.corner_anchored);
        assert!(map.bubble_radius_px > 0.0);
    }

    #[test]
    fn same_inputs_give_identical_maps() {
        let exam = sample_exam(&[10]);
        let layout = SheetLayout::default();
        let a = CoordinateMap::build(&exam, &layout, W, None);
        let b = CoordinateMap::build(&exam, &layout, W, None);
        for (qa, qb) in a.questions.iter().zip(&b.questions) {
            for (ba, bb) in qa.bubbles.iter().zip(&qb.bubbles) {
                assert_eq!((ba.x, ba.y), (bb.x, bb.y));
            }
        }
    }

    #[test]
    fn aligned_corners_reproduce_the_uniform_scale() {
        let exam = sample_exam(&[6]);
        let layout = SheetLayout::default();
        let set = aligned_corners(&layout);
        let plain = CoordinateMap::build(&exam, &layout, W, None);
        let anchored = CoordinateMap::build(&exam, &layout, W, Some(&set));
        assert!(anchored.corner_anchored);
        for (qa, qb) in plain.questions.iter().zip(&anchored.questions) {
            for (ba, bb) in qa.bubbles.iter().zip(&qb.bubbles) {
                assert!((ba.x - bb.x).abs() < 0.01, "{} vs {}", ba.x, bb.x);
                assert!((ba.y - bb.y).abs() < 0.01, "{} vs {}", ba.y, bb.y);
            }
        }
    }

    #[test]
    fn shifted_corners_shift_every_bubble() {
        let exam = sample_exam(&[4]);
        let layout = SheetLayout::default();
        let mut set = aligned_corners(&layout);
        let (dx, dy) = (7.0, -4.0);
        for m in [
            &mut set.top_left,
            &mut set.top_right,
            &mut set.bottom_left,
            &mut set.bottom_right,
        ] {
            m.x += dx;
            m.y += dy;
        }
        let plain = CoordinateMap::build(&exam, &layout, W, None);
        let anchored = CoordinateMap::build(&exam, &layout, W, Some(&set));
        for (qa, qb) in plain.questions.iter().zip(&anchored.questions) {
            for (ba, bb) in qa.bubbles.iter().zip(&qb.bubbles) {
                assert!((bb.x - ba.x - dx).abs() < 0.01);
                assert!((bb.y - ba.y - dy).abs() < 0.01);
            }
        }
    }
}
