//! Stage orchestration for one sheet.
//!
//! Load → preprocess → corner search → coordinate mapping → per-question
//! analysis and decision → grading. Fatal errors abort the sheet between
//! stages; recoverable conditions become flags on the report and the run
//! continues. A wall-clock budget is checked at each stage boundary.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use image::DynamicImage;

use crate::analyze::analyze_bubble;
use crate::corners::{self, CornerConfig, CornerSet};
use crate::coords::CoordinateMap;
use crate::decision::{decide, DecisionConfig, QuestionDecision};
use crate::error::OmrError;
use crate::exam::{AnswerKey, ExamStructure, Letter};
use crate::grade::{grade, GradingResult};
use crate::layout::SheetLayout;
use crate::loader::{self, LoaderConfig};
use crate::preprocess::{preprocess, ImageQuality, PreprocessConfig};

/// Full processing configuration, one nested struct per stage.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OmrConfig {
    pub loader: LoaderConfig,
    pub preprocess: PreprocessConfig,
    pub corners: CornerConfig,
    pub layout: SheetLayout,
    pub decision: DecisionConfig,
    /// Per-sheet wall-clock ceiling in seconds. `None` disables the budget.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_budget_secs: Option<f32>,
}

impl Default for OmrConfig {
    fn default() -> Self {
        Self {
            loader: LoaderConfig::default(),
            preprocess: PreprocessConfig::default(),
            corners: CornerConfig::default(),
            layout: SheetLayout::default(),
            decision: DecisionConfig::default(),
            time_budget_secs: Some(30.0),
        }
    }
}

/// Recoverable conditions observed while processing a sheet.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetFlags {
    /// The scan's proportions deviate from the printed page.
    pub aspect_ratio_mismatch: bool,
    /// Overall image quality fell below the configured floor.
    pub low_quality: bool,
    /// Corner markers were not all found; the uniform full-frame mapping
    /// was used instead.
    pub uncalibrated_corners: bool,
}

/// Everything produced for one sheet.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetReport {
    /// Original scan size before canonical resize, [width, height].
    pub image_size: [u32; 2],
    pub quality: ImageQuality,
    pub flags: SheetFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corners: Option<CornerSet>,
    /// Detected answers only, question → letter. Unanswered questions are
    /// absent.
    pub answers: BTreeMap<u32, Letter>,
    pub grading: GradingResult,
    pub duration_secs: f64,
    /// Ordered per-sheet processing log.
    pub log: Vec<String>,
}

/// Everything the pipeline computed, including intermediates the debug
/// renderer needs.
#[derive(Debug)]
pub(crate) struct PipelineOutput {
    pub report: SheetReport,
    pub canonical: image::GrayImage,
    pub coords: CoordinateMap,
    pub decisions: Vec<QuestionDecision>,
}

struct StageClock {
    start: Instant,
    budget: Option<Duration>,
    budget_secs: f32,
}

impl StageClock {
    fn new(budget_secs: Option<f32>) -> StageClock {
        StageClock {
            start: Instant::now(),
            budget: budget_secs
                .filter(|&s| s > 0.0)
                .map(Duration::from_secs_f32),
            budget_secs: budget_secs.unwrap_or(0.0),
        }
    }

    fn check(&self, stage: &'static str) -> Result<(), OmrError> {
        if let Some(budget) = self.budget {
            if self.start.elapsed() > budget {
                return Err(OmrError::ProcessingTimeout {
                    stage,
                    budget_secs: self.budget_secs,
                });
            }
        }
        Ok(())
    }

    fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

pub(crate) fn run_bytes(
    bytes: &[u8],
    exam: &ExamStructure,
    key: &AnswerKey,
    config: &OmrConfig,
) -> Result<PipelineOutput, OmrError> {
    let clock = StageClock::new(config.time_budget_secs);
    let sheet = loader::load_from_bytes(bytes, &config.loader)?;
    run_sheet(sheet, exam, key, config, clock)
}

pub(crate) fn run_image(
    image: &DynamicImage,
    exam: &ExamStructure,
    key: &AnswerKey,
    config: &OmrConfig,
) -> Result<PipelineOutput, OmrError> {
    let clock = StageClock::new(config.time_budget_secs);
    let sheet = loader::validate(image.clone(), &config.loader)?;
    run_sheet(sheet, exam, key, config, clock)
}

fn run_sheet(
    sheet: loader::LoadedSheet,
    exam: &ExamStructure,
    key: &AnswerKey,
    config: &OmrConfig,
    clock: StageClock,
) -> Result<PipelineOutput, OmrError> {
    let mut log = Vec::new();
    let mut flags = SheetFlags::default();
    flags.aspect_ratio_mismatch = sheet.aspect_mismatch;
    log_line(
        &mut log,
        format!(
            "image loaded: {}x{}px, aspect {:.3}{}",
            sheet.width,
            sheet.height,
            sheet.aspect_ratio,
            if sheet.aspect_mismatch {
                " (off-target, flagged)"
            } else {
                ""
            }
        ),
    );
    clock.check("load")?;

    let pre = preprocess(&sheet.image, &config.preprocess);
    flags.low_quality = pre.quality.overall < config.preprocess.min_quality;
    log_line(
        &mut log,
        format!(
            "preprocessed to {}x{}: contrast {:.1}, sharpness {:.1}, overall {:.1}{}",
            config.preprocess.canonical_width,
            config.preprocess.canonical_height,
            pre.quality.contrast,
            pre.quality.sharpness,
            pre.quality.overall,
            if flags.low_quality {
                " (low quality, flagged)"
            } else {
                ""
            }
        ),
    );
    if flags.low_quality {
        tracing::warn!(overall = pre.quality.overall, "low image quality");
    }
    clock.check("preprocess")?;

    let corners = corners::find_corners(&pre.canonical, &config.corners);
    flags.uncalibrated_corners = corners.is_none();
    log_line(
        &mut log,
        match &corners {
            Some(_) => "corner markers: 4/4 found, grid anchored".to_string(),
            None => "corner markers incomplete, using full-frame mapping".to_string(),
        },
    );
    clock.check("corners")?;

    let coords = CoordinateMap::build(
        exam,
        &config.layout,
        config.preprocess.canonical_width,
        corners.as_ref(),
    );
    log_line(
        &mut log,
        format!(
            "coordinate map: {} questions, bubble radius {:.1}px",
            coords.questions.len(),
            coords.bubble_radius_px
        ),
    );
    clock.check("coordinates")?;

    let mut decisions = Vec::with_capacity(coords.questions.len());
    for q in &coords.questions {
        let scores: Vec<_> = q
            .bubbles
            .iter()
            .map(|b| {
                analyze_bubble(
                    &pre.canonical,
                    b,
                    coords.bubble_radius_px,
                    &config.decision.weights,
                )
            })
            .collect();
        let decision = decide(&scores, &config.decision);
        decisions.push(QuestionDecision {
            number: q.number,
            decision,
            scores,
        });
    }
    let marked = decisions
        .iter()
        .filter(|d| d.decision.answer.is_some())
        .count();
    log_line(
        &mut log,
        format!("analysis: {marked}/{} questions marked", decisions.len()),
    );
    clock.check("analysis")?;

    let grading = grade(&decisions, exam, key, config.decision.review_confidence)?;
    log_line(
        &mut log,
        format!(
            "graded: {}/{} correct, score {:.1}/{:.1} ({:.1}%), grade {}",
            grading.correct_answers,
            grading.total_questions,
            grading.total_score,
            grading.max_score,
            grading.percentage,
            grading.grade.numeric
        ),
    );
    clock.check("grading")?;

    let answers: BTreeMap<u32, Letter> = decisions
        .iter()
        .filter_map(|d| d.decision.answer.map(|a| (d.number, a)))
        .collect();

    let report = SheetReport {
        image_size: [sheet.width, sheet.height],
        quality: pre.quality,
        flags,
        corners,
        answers,
        grading,
        duration_secs: clock.elapsed_secs(),
        log,
    };
    Ok(PipelineOutput {
        report,
        canonical: pre.canonical,
        coords,
        decisions,
    })
}

fn log_line(log: &mut Vec<String>, line: String) {
    tracing::info!("{line}");
    log.push(line);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exam::tests::sample_exam;
    use image::{DynamicImage, Rgb, RgbImage};

    const W: u32 = 1240;
    const H: u32 = 1754;

    fn key_all(exam: &ExamStructure, letter: Letter) -> AnswerKey {
        AnswerKey {
            exam_id: exam.id.clone(),
            variant: "A".into(),
            answers: (1..=exam.total_questions()).map(|q| (q, letter)).collect(),
        }
    }

    /// Render a synthetic scan at canonical resolution: white page with
    /// the chosen bubble of each question filled solid.
    fn render_sheet(exam: &ExamStructure, config: &OmrConfig, marks: &[(u32, Letter)]) -> DynamicImage {
        let mut img = RgbImage::from_pixel(W, H, Rgb([255, 255, 255]));
        let coords = CoordinateMap::build(exam, &config.layout, W, None);
        for q in &coords.questions {
            if let Some(&(_, letter)) = marks.iter().find(|(n, _)| *n == q.number) {
                let b = q.bubbles[letter.index()];
                let r = coords.bubble_radius_px + 1.0;
                let r_sq = r * r;
                for y in (b.y - r) as u32..=(b.y + r) as u32 {
                    for x in (b.x - r) as u32..=(b.x + r) as u32 {
                        let dx = x as f32 - b.x;
                        let dy = y as f32 - b.y;
                        if dx * dx + dy * dy <= r_sq {
                            img.put_pixel(x, y, Rgb([10, 10, 10]));
                        }
                    }
                }
            }
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn clean_full_marks_sheet_grades_one_hundred_percent() {
        let exam = sample_exam(&[10]);
        let key = key_all(&exam, Letter::C);
        let config = OmrConfig::default();
        let marks: Vec<_> = (1..=10).map(|q| (q, Letter::C)).collect();
        let img = render_sheet(&exam, &config, &marks);

        let out = run_image(&img, &exam, &key, &config).unwrap();
        let report = out.report;
        assert_eq!(report.grading.correct_answers, 10);
        assert_eq!(report.grading.percentage, 100.0);
        assert_eq!(report.grading.grade.numeric, 5);
        assert_eq!(report.answers.len(), 10);
        // Plain synthetic page has no printed fiducials.
        assert!(report.flags.uncalibrated_corners);
        assert!(!report.log.is_empty());
    }

    #[test]
    fn blank_sheet_reads_all_unanswered() {
        let exam = sample_exam(&[6]);
        let key = key_all(&exam, Letter::A);
        let config = OmrConfig::default();
        let img = render_sheet(&exam, &config, &[]);

        let report = run_image(&img, &exam, &key, &config).unwrap().report;
        assert_eq!(report.grading.unanswered, 6);
        assert_eq!(report.grading.total_score, 0.0);
        assert!(report.answers.is_empty());
        assert_eq!(report.grading.warnings, 6);
    }

    #[test]
    fn undersized_scan_fails_before_any_analysis() {
        let exam = sample_exam(&[4]);
        let key = key_all(&exam, Letter::A);
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(700, 900, Rgb([255, 255, 255])));
        let err = run_image(&img, &exam, &key, &OmrConfig::default()).unwrap_err();
        assert!(matches!(err, OmrError::ResolutionTooLow { .. }));
    }

    #[test]
    fn exhausted_budget_times_out_at_a_stage_boundary() {
        let exam = sample_exam(&[4]);
        let key = key_all(&exam, Letter::A);
        let mut config = OmrConfig::default();
        config.time_budget_secs = Some(1e-9);
        let img = render_sheet(&exam, &config, &[]);
        let err = run_image(&img, &exam, &key, &config).unwrap_err();
        assert!(matches!(err, OmrError::ProcessingTimeout { .. }));
    }

    #[test]
    fn wrong_answers_are_marked_incorrect() {
        let exam = sample_exam(&[4]);
        let key = key_all(&exam, Letter::A);
        let config = OmrConfig::default();
        let marks = vec![
            (1, Letter::A),
            (2, Letter::B),
            (3, Letter::A),
            (4, Letter::E),
        ];
        let img = render_sheet(&exam, &config, &marks);
        let report = run_image(&img, &exam, &key, &config).unwrap().report;
        assert_eq!(report.grading.correct_answers, 2);
        assert_eq!(report.grading.incorrect_answers, 2);
        assert_eq!(report.answers.get(&2), Some(&Letter::B));
        assert_eq!(report.answers.get(&4), Some(&Letter::E));
    }

    #[test]
    fn key_gap_fails_the_sheet() {
        let exam = sample_exam(&[3]);
        let mut key = key_all(&exam, Letter::A);
        key.answers.remove(&2);
        let config = OmrConfig::default();
        let img = render_sheet(&exam, &config, &[(1, Letter::A)]);
        let err = run_image(&img, &exam, &key, &config).unwrap_err();
        assert!(matches!(err, OmrError::MissingAnswerKey { question: 2, .. }));
    }
}
