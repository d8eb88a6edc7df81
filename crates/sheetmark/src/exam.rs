//! Exam structure and answer key data model.
//!
//! These records are authored elsewhere (exam editor, key editor) and
//! arrive as JSON; the grading core treats them as read-only input.
//! Question numbers are assigned 1..N in subject-then-section traversal
//! order with no gaps, and every component that touches questions walks
//! the structure in that same order.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::OmrError;

/// Number of answer options per question.
pub const OPTION_COUNT: usize = 5;

/// One answer option letter.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum Letter {
    A,
    B,
    C,
    D,
    E,
}

impl Letter {
    /// All options in printed bubble order (left to right).
    pub const ALL: [Letter; OPTION_COUNT] =
        [Letter::A, Letter::B, Letter::C, Letter::D, Letter::E];

    /// Zero-based position of this option within a bubble row.
    pub fn index(self) -> usize {
        match self {
            Letter::A => 0,
            Letter::B => 1,
            Letter::C => 2,
            Letter::D => 3,
            Letter::E => 4,
        }
    }

    pub fn from_index(index: usize) -> Option<Letter> {
        Letter::ALL.get(index).copied()
    }

    pub fn as_char(self) -> char {
        match self {
            Letter::A => 'A',
            Letter::B => 'B',
            Letter::C => 'C',
            Letter::D => 'D',
            Letter::E => 'E',
        }
    }
}

impl fmt::Display for Letter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// A contiguous block of same-scored questions within a subject.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub name: String,
    /// Number of questions printed in this section.
    pub question_count: u32,
    /// Points awarded per correct answer.
    pub correct_score: f64,
    /// Points added per wrong answer (zero or negative for penalties).
    pub wrong_score: f64,
}

/// A named subject grouping one or more sections.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub sections: Vec<Section>,
}

/// The full exam definition the sheet was printed from.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamStructure {
    pub id: String,
    pub name: String,
    pub subjects: Vec<Subject>,
}

impl ExamStructure {
    /// Load and validate an exam definition from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, OmrError> {
        let text = fs::read_to_string(path)
            .map_err(|e| OmrError::InvalidExam(format!("{}: {e}", path.display())))?;
        let exam: ExamStructure = serde_json::from_str(&text)
            .map_err(|e| OmrError::InvalidExam(format!("{}: {e}", path.display())))?;
        exam.validate()?;
        Ok(exam)
    }

    /// Check structural consistency: at least one question overall and no
    /// empty sections.
    pub fn validate(&self) -> Result<(), OmrError> {
        if self.subjects.is_empty() {
            return Err(OmrError::InvalidExam(format!(
                "exam '{}' has no subjects",
                self.id
            )));
        }
        for subject in &self.subjects {
            if subject.sections.is_empty() {
                return Err(OmrError::InvalidExam(format!(
                    "subject '{}' has no sections",
                    subject.id
                )));
            }
            for section in &subject.sections {
                if section.question_count == 0 {
                    return Err(OmrError::InvalidExam(format!(
                        "section '{}' has zero questions",
                        section.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Total number of questions across all subjects and sections.
    pub fn total_questions(&self) -> u32 {
        self.subjects
            .iter()
            .flat_map(|s| &s.sections)
            .map(|sec| sec.question_count)
            .sum()
    }

    /// Maximum attainable score if every question is answered correctly.
    pub fn max_score(&self) -> f64 {
        self.subjects
            .iter()
            .flat_map(|s| &s.sections)
            .map(|sec| sec.question_count as f64 * sec.correct_score)
            .sum()
    }
}

/// The correct answer per question for one exam variant.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerKey {
    pub exam_id: String,
    pub variant: String,
    pub answers: BTreeMap<u32, Letter>,
}

impl AnswerKey {
    pub fn from_json_file(path: &Path) -> Result<Self, OmrError> {
        let text = fs::read_to_string(path)
            .map_err(|e| OmrError::InvalidExam(format!("{}: {e}", path.display())))?;
        let key: AnswerKey = serde_json::from_str(&text)
            .map_err(|e| OmrError::InvalidExam(format!("{}: {e}", path.display())))?;
        Ok(key)
    }

    pub fn get(&self, question: u32) -> Option<Letter> {
        self.answers.get(&question).copied()
    }

    /// Look up the correct answer, erroring on a gap in the key. A key that
    /// skips a question must never be graded as if the answer were "A".
    pub fn require(&self, question: u32) -> Result<Letter, OmrError> {
        self.get(question).ok_or_else(|| OmrError::MissingAnswerKey {
            variant: self.variant.clone(),
            question,
        })
    }

    /// Verify the key covers every question of the exam. Reports the first
    /// missing question number.
    pub fn validate_against(&self, exam: &ExamStructure) -> Result<(), OmrError> {
        for question in 1..=exam.total_questions() {
            self.require(question)?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_exam(counts: &[u32]) -> ExamStructure {
        ExamStructure {
            id: "exam-1".into(),
            name: "Midterm".into(),
            subjects: vec![Subject {
                id: "sub-1".into(),
                name: "Mathematics".into(),
                sections: counts
                    .iter()
                    .enumerate()
                    .map(|(i, &n)| Section {
                        id: format!("sec-{i}"),
                        name: format!("Part {i}"),
                        question_count: n,
                        correct_score: 2.0,
                        wrong_score: 0.0,
                    })
                    .collect(),
            }],
        }
    }

    fn full_key(exam: &ExamStructure) -> AnswerKey {
        AnswerKey {
            exam_id: exam.id.clone(),
            variant: "A".into(),
            answers: (1..=exam.total_questions()).map(|q| (q, Letter::B)).collect(),
        }
    }

    #[test]
    fn totals_sum_over_sections() {
        let exam = sample_exam(&[4, 6]);
        assert_eq!(exam.total_questions(), 10);
        assert_eq!(exam.max_score(), 20.0);
    }

    #[test]
    fn validate_rejects_empty_section() {
        let exam = sample_exam(&[3, 0]);
        assert!(matches!(exam.validate(), Err(OmrError::InvalidExam(_))));
    }

    #[test]
    fn key_gap_is_an_error_not_a_default() {
        let exam = sample_exam(&[5]);
        let mut key = full_key(&exam);
        key.answers.remove(&3);
        match key.validate_against(&exam) {
            Err(OmrError::MissingAnswerKey { question, .. }) => assert_eq!(question, 3),
            other => panic!("expected MissingAnswerKey, got {other:?}"),
        }
    }

    #[test]
    fn key_roundtrips_through_json() {
        let exam = sample_exam(&[2]);
        let key = full_key(&exam);
        let json = serde_json::to_string(&key).unwrap();
        let back: AnswerKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back.answers, key.answers);
        assert_eq!(back.variant, key.variant);
    }

    #[test]
    fn exam_json_uses_camel_case_fields() {
        let exam = sample_exam(&[1]);
        let json = serde_json::to_string(&exam).unwrap();
        assert!(json.contains("questionCount"));
        assert!(json.contains("correctScore"));
    }

    #[test]
    fn letter_index_roundtrip() {
        for (i, letter) in Letter::ALL.iter().enumerate() {
            assert_eq!(letter.index(), i);
            assert_eq!(Letter::from_index(i), Some(*letter));
        }
        assert_eq!(Letter::from_index(5), None);
    }
}
