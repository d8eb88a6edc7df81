//! Error taxonomy for sheet processing.
//!
//! Fatal conditions abort the sheet and surface here; recoverable ones
//! (missing corner markers, low image quality, aspect mismatch) are flags
//! on the report instead.

use thiserror::Error;

/// Fatal sheet-processing errors.
#[derive(Debug, Error)]
pub enum OmrError {
    /// The input bytes could not be decoded as an image.
    #[error("failed to decode sheet image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The scan is too small to resolve individual bubbles.
    #[error(
        "sheet resolution {width}x{height}px is below the required minimum {min_width}x{min_height}px"
    )]
    ResolutionTooLow {
        width: u32,
        height: u32,
        min_width: u32,
        min_height: u32,
    },

    /// The answer key does not cover a question the exam defines.
    #[error("answer key variant '{variant}' has no entry for question {question}")]
    MissingAnswerKey { variant: String, question: u32 },

    /// The per-sheet wall-clock budget was exceeded.
    #[error("sheet processing exceeded the {budget_secs}s budget during the {stage} stage")]
    ProcessingTimeout { stage: &'static str, budget_secs: f32 },

    /// The exam structure is self-inconsistent.
    #[error("invalid exam structure: {0}")]
    InvalidExam(String),
}
