//! Shared answer-sheet layout in millimeter space.
//!
//! One pure parameter set and one traversal position every bubble, both
//! when the sheet is generated for print and when a scan is graded. The
//! grader never re-derives geometry on its own: printed sheet and pixel
//! analysis cannot drift apart as long as both consume this module.

use crate::exam::{ExamStructure, Letter, OPTION_COUNT};

/// A4 page width in millimeters.
pub const PAGE_WIDTH_MM: f32 = 210.0;
/// A4 page height in millimeters.
pub const PAGE_HEIGHT_MM: f32 = 297.0;

/// Millimeter-space layout parameters of the printed answer sheet.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SheetLayout {
    /// X of the answer grid's left edge.
    pub grid_start_x_mm: f32,
    /// Y where the answer grid begins, below the student-info header block.
    pub grid_start_y_mm: f32,
    /// Questions printed side by side in one row.
    pub questions_per_row: u32,
    /// Horizontal stride between question columns.
    pub column_width_mm: f32,
    /// Vertical stride between question rows.
    pub row_height_mm: f32,
    /// Width reserved for the printed question number.
    pub question_number_width_mm: f32,
    /// Bubble circle radius.
    pub bubble_radius_mm: f32,
    /// Center-to-center spacing between option bubbles.
    pub bubble_spacing_mm: f32,
    /// Vertical offset from the row origin down to the bubble centers.
    pub bubble_y_offset_mm: f32,
    /// Height of a printed subject header line.
    pub subject_header_mm: f32,
    /// Height of a printed section header line.
    pub section_header_mm: f32,
    /// Vertical gap after each section.
    pub section_spacing_mm: f32,
    /// Vertical gap after each subject.
    pub subject_spacing_mm: f32,
    /// Side length of the solid corner fiducial squares.
    pub corner_size_mm: f32,
    /// Margin from the page edges to the corner squares.
    pub corner_margin_mm: f32,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            grid_start_x_mm: 23.0,
            grid_start_y_mm: 120.0,
            questions_per_row: 2,
            column_width_mm: 90.0,
            row_height_mm: 8.0,
            question_number_width_mm: 12.0,
            bubble_radius_mm: 2.2,
            bubble_spacing_mm: 11.0,
            bubble_y_offset_mm: 3.0,
            subject_header_mm: 10.0,
            section_header_mm: 7.0,
            section_spacing_mm: 2.0,
            subject_spacing_mm: 3.0,
            corner_size_mm: 15.0,
            corner_margin_mm: 5.0,
        }
    }
}

/// One bubble center in millimeter space.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct BubbleSlot {
    pub letter: Letter,
    pub center_mm: [f32; 2],
}

/// One question's printed position with its five bubble centers.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct QuestionSlot {
    pub number: u32,
    /// Row origin of the question cell (left edge, row top).
    pub origin_mm: [f32; 2],
    pub bubbles: [BubbleSlot; OPTION_COUNT],
}

impl SheetLayout {
    /// Centers of the four corner fiducials, in TL, TR, BL, BR order.
    pub fn corner_centers_mm(&self) -> [[f32; 2]; 4] {
        let near = self.corner_margin_mm + self.corner_size_mm / 2.0;
        let far_x = PAGE_WIDTH_MM - near;
        let far_y = PAGE_HEIGHT_MM - near;
        [[near, near], [far_x, near], [near, far_y], [far_x, far_y]]
    }

    /// Position every question of the exam on the page.
    ///
    /// Questions are numbered 1..N in subject-then-section order and laid
    /// out row by row, `questions_per_row` cells wide, with header and
    /// spacing bands advancing the cursor between blocks. This is the one
    /// traversal shared by sheet generation and grading.
    pub fn question_slots(&self, exam: &ExamStructure) -> Vec<QuestionSlot> {
        let per_row = self.questions_per_row.max(1);
        let mut slots = Vec::with_capacity(exam.total_questions() as usize);
        let mut number = 1u32;
        let mut y = self.grid_start_y_mm;

        for subject in &exam.subjects {
            y += self.subject_header_mm;
            for section in &subject.sections {
                y += self.section_header_mm;
                let mut placed = 0u32;
                while placed < section.question_count {
                    for col in 0..per_row {
                        if placed + col >= section.question_count {
                            break;
                        }
                        let x = self.grid_start_x_mm + col as f32 * self.column_width_mm;
                        slots.push(self.slot_at(number, x, y));
                        number += 1;
                    }
                    placed += per_row;
                    y += self.row_height_mm;
                }
                y += self.section_spacing_mm;
            }
            y += self.subject_spacing_mm;
        }
        slots
    }

    fn slot_at(&self, number: u32, x: f32, y: f32) -> QuestionSlot {
        let bubble_start_x = x + self.question_number_width_mm;
        let bubble_y = y + self.bubble_y_offset_mm;
        let bubbles = std::array::from_fn(|i| BubbleSlot {
            letter: Letter::ALL[i],
            center_mm: [bubble_start_x + i as f32 * self.bubble_spacing_mm, bubble_y],
        });
        QuestionSlot {
            number,
            origin_mm: [x, y],
            bubbles,
        }
    }

    /// Build the exportable coordinate template for an exam.
    pub fn template(&self, exam: &ExamStructure) -> SheetTemplate {
        let corners = self.corner_centers_mm();
        let span_x = corners[1][0] - corners[0][0];
        let span_y = corners[2][1] - corners[0][1];
        let questions = self
            .question_slots(exam)
            .into_iter()
            .map(|slot| TemplateQuestion {
                number: slot.number,
                bubbles: slot
                    .bubbles
                    .iter()
                    .map(|b| TemplateBubble {
                        letter: b.letter,
                        absolute_mm: b.center_mm,
                        relative: [
                            (b.center_mm[0] - corners[0][0]) / span_x,
                            (b.center_mm[1] - corners[0][1]) / span_y,
                        ],
                    })
                    .collect(),
            })
            .collect();
        SheetTemplate {
            version: TEMPLATE_VERSION.to_string(),
            exam_id: exam.id.clone(),
            page_size_mm: [PAGE_WIDTH_MM, PAGE_HEIGHT_MM],
            corner_centers_mm: corners,
            layout: self.clone(),
            questions,
        }
    }
}

/// Template schema version.
pub const TEMPLATE_VERSION: &str = "2.0";

/// Exportable mm-space coordinate template for the sheet generator.
///
/// Bubble positions are given both absolute and normalized to the span
/// between corner fiducial centers, so a consumer that locates the
/// fiducials can reconstruct every bubble without knowing the layout.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetTemplate {
    pub version: String,
    pub exam_id: String,
    pub page_size_mm: [f32; 2],
    pub corner_centers_mm: [[f32; 2]; 4],
    pub layout: SheetLayout,
    pub questions: Vec<TemplateQuestion>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateQuestion {
    pub number: u32,
    pub bubbles: Vec<TemplateBubble>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateBubble {
    pub letter: Letter,
    pub absolute_mm: [f32; 2],
    /// Position normalized to the corner-center span, 0..1 inside the grid.
    pub relative: [f32; 2],
}
