//! Score aggregation against the answer key.
//!
//! Decisions are matched to the key in the shared question order, scored
//! by section rules, and rolled up section → subject → exam. Wrong-answer
//! scores may be negative (penalty marking); totals and the percentage
//! are left unclamped so a penalized result below zero is visible to the
//! caller rather than silently floored.

use crate::decision::{MarkWarning, QuestionDecision};
use crate::error::OmrError;
use crate::exam::{AnswerKey, ExamStructure, Letter};

/// Discrete grade on the 2..5 scale.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub numeric: u8,
    pub label: String,
}

fn grade_for(percentage: f64) -> Grade {
    let (numeric, label) = if percentage >= 86.0 {
        (5, "A'lo")
    } else if percentage >= 71.0 {
        (4, "Yaxshi")
    } else if percentage >= 56.0 {
        (3, "Qoniqarli")
    } else {
        (2, "Qoniqarsiz")
    };
    Grade {
        numeric,
        label: label.to_string(),
    }
}

/// Outcome of one graded question.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResult {
    pub question_number: u32,
    pub student_answer: Option<Letter>,
    pub correct_answer: Letter,
    pub is_correct: bool,
    pub points_earned: f64,
    pub confidence: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<MarkWarning>,
    /// All five bubble analyses, for audit and calibration.
    pub all_scores: Vec<crate::analyze::BubbleAnalysis>,
}

/// Per-section rollup.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionResult {
    pub section_id: String,
    pub section_name: String,
    pub correct: u32,
    pub incorrect: u32,
    pub unanswered: u32,
    pub score: f64,
    pub max_score: f64,
    pub questions: Vec<QuestionResult>,
}

/// Per-subject rollup.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectResult {
    pub subject_id: String,
    pub subject_name: String,
    pub correct: u32,
    pub incorrect: u32,
    pub unanswered: u32,
    pub score: f64,
    pub max_score: f64,
    pub sections: Vec<SectionResult>,
}

/// The full graded outcome for one sheet.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingResult {
    pub total_questions: u32,
    pub answered_questions: u32,
    pub correct_answers: u32,
    pub incorrect_answers: u32,
    pub unanswered: u32,
    /// Questions whose decision confidence fell below the review bar.
    pub low_confidence: u32,
    /// Questions carrying any mark warning.
    pub warnings: u32,
    pub total_score: f64,
    pub max_score: f64,
    /// total / max × 100; zero when max is zero, negative when penalties
    /// outweigh earned points.
    pub percentage: f64,
    pub grade: Grade,
    pub subjects: Vec<SubjectResult>,
    /// Flat per-question detail in sheet order.
    pub questions: Vec<QuestionResult>,
}

/// Grade a sheet's decisions against the answer key.
///
/// `decisions` must be in question order 1..N, exactly one per question of
/// the exam; the pipeline guarantees this by walking the shared layout.
/// A key gap fails the whole sheet rather than inventing an answer.
pub fn grade(
    decisions: &[QuestionDecision],
    exam: &ExamStructure,
    key: &AnswerKey,
    review_confidence: u8,
) -> Result<GradingResult, OmrError> {
    let mut subjects = Vec::with_capacity(exam.subjects.len());
    let mut questions = Vec::with_capacity(decisions.len());
    let mut idx = 0usize;

    for subject in &exam.subjects {
        let mut subject_result = SubjectResult {
            subject_id: subject.id.clone(),
            subject_name: subject.name.clone(),
            correct: 0,
            incorrect: 0,
            unanswered: 0,
            score: 0.0,
            max_score: 0.0,
            sections: Vec::with_capacity(subject.sections.len()),
        };

        for section in &subject.sections {
            let mut section_result = SectionResult {
                section_id: section.id.clone(),
                section_name: section.name.clone(),
                correct: 0,
                incorrect: 0,
                unanswered: 0,
                score: 0.0,
                max_score: section.question_count as f64 * section.correct_score,
                questions: Vec::with_capacity(section.question_count as usize),
            };

            for _ in 0..section.question_count {
                let qd = decisions.get(idx).ok_or_else(|| {
                    OmrError::InvalidExam(format!(
                        "decision list ends at {idx} but the exam defines more questions"
                    ))
                })?;
                idx += 1;

                let correct_answer = key.require(qd.number)?;
                let student_answer = qd.decision.answer;
                let is_correct = student_answer == Some(correct_answer);
                let points_earned = match student_answer {
                    None => {
                        section_result.unanswered += 1;
                        0.0
                    }
                    Some(_) if is_correct => {
                        section_result.correct += 1;
                        section.correct_score
                    }
                    Some(_) => {
                        section_result.incorrect += 1;
                        section.wrong_score
                    }
                };
                section_result.score += points_earned;

                questions.push(QuestionResult {
                    question_number: qd.number,
                    student_answer,
                    correct_answer,
                    is_correct,
                    points_earned,
                    confidence: qd.decision.confidence,
                    warning: qd.decision.warning,
                    all_scores: qd.scores.clone(),
                });
            }

            subject_result.correct += section_result.correct;
            subject_result.incorrect += section_result.incorrect;
            subject_result.unanswered += section_result.unanswered;
            subject_result.score += section_result.score;
            subject_result.max_score += section_result.max_score;
            subject_result.sections.push(section_result);
        }
        subjects.push(subject_result);
    }

    let total_questions = exam.total_questions();
    let correct_answers: u32 = subjects.iter().map(|s| s.correct).sum();
    let incorrect_answers: u32 = subjects.iter().map(|s| s.incorrect).sum();
    let unanswered: u32 = subjects.iter().map(|s| s.unanswered).sum();
    let total_score: f64 = subjects.iter().map(|s| s.score).sum();
    let max_score: f64 = subjects.iter().map(|s| s.max_score).sum();
    let percentage = if max_score > 0.0 {
        total_score / max_score * 100.0
    } else {
        0.0
    };
    let low_confidence = questions
        .iter()
        .filter(|q| q.confidence < review_confidence)
        .count() as u32;
    let warnings = questions.iter().filter(|q| q.warning.is_some()).count() as u32;

    Ok(GradingResult {
        total_questions,
        answered_questions: correct_answers + incorrect_answers,
        correct_answers,
        incorrect_answers,
        unanswered,
        low_confidence,
        warnings,
        total_score,
        max_score,
        percentage,
        grade: grade_for(percentage),
        subjects,
        questions,
    })
}
