//! Optical mark recognition for printed multiple-choice answer sheets.
//!
//! Takes a scan or photo of an A4 answer sheet, finds every bubble of the
//! exam it was printed from, and grades the marks against an answer key.
//!
//! Pipeline stages:
//! 1. **Load**: decode and validate resolution and page proportions.
//! 2. **Preprocess**: resize to the canonical frame, perceptual grayscale,
//!    contrast stretch, median denoise, quality score.
//! 3. **Corners**: search for the four printed fiducial squares; fall back
//!    to a uniform full-frame mapping when they are not all found.
//! 4. **Coordinates**: project the shared mm-space sheet layout into
//!    canonical pixels.
//! 5. **Analyze**: darkness, coverage, and uniformity per bubble.
//! 6. **Decide**: comparative top-two decision with review warnings.
//! 7. **Grade**: match against the key and roll scores up section →
//!    subject → exam.
//!
//! [`SheetProcessor`] is the entry point:
//!
//! ```no_run
//! use sheetmark::{AnswerKey, ExamStructure, SheetProcessor};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let exam = ExamStructure::from_json_file("exam.json".as_ref())?;
//! let key = AnswerKey::from_json_file("key.json".as_ref())?;
//! let processor = SheetProcessor::new(exam, key)?;
//! let report = processor.process_bytes(&std::fs::read("scan.png")?)?;
//! println!("{:.1}%", report.grading.percentage);
//! # Ok(())
//! # }
//! ```

mod analyze;
mod coords;
mod corners;
mod debug_draw;
mod decision;
mod error;
mod exam;
mod grade;
mod layout;
mod loader;
mod pipeline;
mod preprocess;
mod processor;

pub use analyze::{BubbleAnalysis, ScoreWeights};
pub use coords::{BubbleCoord, CoordinateMap, QuestionCoords};
pub use corners::{CornerConfig, CornerMark, CornerSet};
pub use debug_draw::render as render_debug_overlay;
pub use decision::{Decision, DecisionConfig, MarkWarning, QuestionDecision};
pub use error::OmrError;
pub use exam::{AnswerKey, ExamStructure, Letter, Section, Subject, OPTION_COUNT};
pub use grade::{Grade, GradingResult, QuestionResult, SectionResult, SubjectResult};
pub use layout::{
    BubbleSlot, QuestionSlot, SheetLayout, SheetTemplate, TemplateBubble, TemplateQuestion,
    PAGE_HEIGHT_MM, PAGE_WIDTH_MM, TEMPLATE_VERSION,
};
pub use loader::{LoadedSheet, LoaderConfig};
pub use pipeline::{OmrConfig, SheetFlags, SheetReport};
pub use preprocess::{ImageQuality, PreprocessConfig};
pub use processor::SheetProcessor;
