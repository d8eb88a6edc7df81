//! High-level entry point owning configuration, exam, and key.

use image::{DynamicImage, RgbImage};
use rayon::prelude::*;

use crate::debug_draw;
use crate::error::OmrError;
use crate::exam::{AnswerKey, ExamStructure};
use crate::pipeline::{self, OmrConfig, SheetReport};

/// Grades scanned sheets for one exam variant.
///
/// Construction validates the exam structure and checks that the key
/// covers every question, so a key gap surfaces before any sheet is
/// touched rather than halfway through a batch.
#[derive(Debug)]
pub struct SheetProcessor {
    config: OmrConfig,
    exam: ExamStructure,
    key: AnswerKey,
}

impl SheetProcessor {
    pub fn new(exam: ExamStructure, key: AnswerKey) -> Result<SheetProcessor, OmrError> {
        Self::with_config(exam, key, OmrConfig::default())
    }

    pub fn with_config(
        exam: ExamStructure,
        key: AnswerKey,
        config: OmrConfig,
    ) -> Result<SheetProcessor, OmrError> {
        exam.validate()?;
        key.validate_against(&exam)?;
        Ok(SheetProcessor { config, exam, key })
    }

    pub fn config(&self) -> &OmrConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut OmrConfig {
        &mut self.config
    }

    pub fn exam(&self) -> &ExamStructure {
        &self.exam
    }

    pub fn answer_key(&self) -> &AnswerKey {
        &self.key
    }

    /// Grade one sheet from encoded image bytes.
    pub fn process_bytes(&self, bytes: &[u8]) -> Result<SheetReport, OmrError> {
        Ok(pipeline::run_bytes(bytes, &self.exam, &self.key, &self.config)?.report)
    }

    /// Grade one already-decoded sheet.
    pub fn process_image(&self, image: &DynamicImage) -> Result<SheetReport, OmrError> {
        Ok(pipeline::run_image(image, &self.exam, &self.key, &self.config)?.report)
    }

    /// Grade one sheet and also render the audit overlay.
    pub fn process_with_debug(
        &self,
        image: &DynamicImage,
    ) -> Result<(SheetReport, RgbImage), OmrError> {
        let out = pipeline::run_image(image, &self.exam, &self.key, &self.config)?;
        let overlay = debug_draw::render(&out.canonical, &out.coords, &out.decisions);
        Ok((out.report, overlay))
    }

    /// Grade a batch of sheets in parallel, one result per input. A failed
    /// sheet never aborts the rest of the batch.
    pub fn process_batch(&self, sheets: &[Vec<u8>]) -> Vec<Result<SheetReport, OmrError>> {
        sheets
            .par_iter()
            .map(|bytes| self.process_bytes(bytes))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exam::tests::sample_exam;
    use crate::exam::Letter;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    fn key_all(exam: &ExamStructure, letter: Letter) -> AnswerKey {
        AnswerKey {
            exam_id: exam.id.clone(),
            variant: "A".into(),
            answers: (1..=exam.total_questions()).map(|q| (q, letter)).collect(),
        }
    }

    fn png_bytes(img: &RgbImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img.clone())
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn construction_rejects_an_incomplete_key() {
        let exam = sample_exam(&[5]);
        let mut key = key_all(&exam, Letter::A);
        key.answers.remove(&5);
        match SheetProcessor::new(exam, key) {
            Err(OmrError::MissingAnswerKey { question, .. }) => assert_eq!(question, 5),
            other => panic!("expected MissingAnswerKey, got {other:?}"),
        }
    }

    #[test]
    fn config_overrides_stick() {
        let exam = sample_exam(&[2]);
        let key = key_all(&exam, Letter::A);
        let mut processor = SheetProcessor::new(exam, key).unwrap();
        processor.config_mut().decision.min_mark_score = 50.0;
        processor.config_mut().time_budget_secs = None;
        assert_eq!(processor.config().decision.min_mark_score, 50.0);
        assert!(processor.config().time_budget_secs.is_none());
    }

    #[test]
    fn batch_keeps_per_sheet_results_independent() {
        let exam = sample_exam(&[2]);
        let key = key_all(&exam, Letter::A);
        let processor = SheetProcessor::new(exam, key).unwrap();

        let blank = png_bytes(&RgbImage::from_pixel(1240, 1754, Rgb([255, 255, 255])));
        let tiny = png_bytes(&RgbImage::from_pixel(100, 100, Rgb([255, 255, 255])));
        let garbage = b"not an image".to_vec();

        let results = processor.process_batch(&[blank, tiny, garbage]);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(OmrError::ResolutionTooLow { .. })
        ));
        assert!(matches!(results[2], Err(OmrError::ImageDecode(_))));
    }

    #[test]
    fn debug_overlay_matches_canonical_size() {
        let exam = sample_exam(&[2]);
        let key = key_all(&exam, Letter::A);
        let processor = SheetProcessor::new(exam, key).unwrap();
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(1240, 1754, Rgb([255, 255, 255])));
        let (report, overlay) = processor.process_with_debug(&img).unwrap();
        assert_eq!(overlay.dimensions(), (1240, 1754));
        assert_eq!(report.grading.unanswered, 2);
    }
}
