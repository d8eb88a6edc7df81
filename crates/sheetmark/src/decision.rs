//! Comparative answer decision from per-bubble scores.
//!
//! Absolute thresholds alone misread real sheets, so the decision compares
//! the two best-scoring bubbles of each question. The rules run in order:
//! no qualifying mark, then ambiguous double mark, then weak separation,
//! then a clear answer with a gap-derived confidence.

use crate::analyze::{BubbleAnalysis, ScoreWeights};
use crate::exam::Letter;

/// Decision thresholds and weights. Injected everywhere a decision is
/// made, so calibration runs can sweep them without touching code.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Minimum final score for any bubble to count as a mark at all.
    pub min_mark_score: f32,
    /// Top-two gap below which the question reads as double-marked.
    pub multiple_marks_band: f32,
    /// Top-two gap below which the separation is flagged as weak.
    pub low_difference_band: f32,
    /// Confidence below which a question is queued for manual review.
    pub review_confidence: u8,
    /// Weights for the per-bubble score combination.
    pub weights: ScoreWeights,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            min_mark_score: 35.0,
            multiple_marks_band: 10.0,
            low_difference_band: 15.0,
            review_confidence: 70,
            weights: ScoreWeights::default(),
        }
    }
}

/// Soft per-question signals. Never fatal; they ride along into the
/// report for manual review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarkWarning {
    NoMark,
    MultipleMarks,
    LowDifference,
}

/// Outcome for one question before grading.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct Decision {
    pub answer: Option<Letter>,
    /// 0..100.
    pub confidence: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<MarkWarning>,
}

/// One question's decision together with the raw bubble scores that
/// produced it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct QuestionDecision {
    pub number: u32,
    pub decision: Decision,
    pub scores: Vec<BubbleAnalysis>,
}

/// Decide one question from its bubble scores.
pub fn decide(scores: &[BubbleAnalysis], config: &DecisionConfig) -> Decision {
    let mut ranked: Vec<&BubbleAnalysis> = scores.iter().collect();
    ranked.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let Some(first) = ranked.first().copied() else {
        return Decision {
            answer: None,
            confidence: 0,
            warning: Some(MarkWarning::NoMark),
        };
    };
    let second_score = ranked.get(1).map_or(0.0, |b| b.final_score);

    if first.final_score < config.min_mark_score {
        return Decision {
            answer: None,
            confidence: 0,
            warning: Some(MarkWarning::NoMark),
        };
    }

    let gap = first.final_score - second_score;
    if gap < config.multiple_marks_band {
        return Decision {
            answer: Some(first.letter),
            confidence: 40,
            warning: Some(MarkWarning::MultipleMarks),
        };
    }
    if gap < config.low_difference_band {
        return Decision {
            answer: Some(first.letter),
            confidence: 60,
            warning: Some(MarkWarning::LowDifference),
        };
    }

    let lone_mark_bonus = if second_score < config.min_mark_score {
        10.0
    } else {
        0.0
    };
    let confidence = (first.final_score + 0.5 * gap + lone_mark_bonus)
        .round()
        .min(100.0) as u8;
    Decision {
        answer: Some(first.letter),
        confidence,
        warning: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(letter: Letter, final_score: f32) -> BubbleAnalysis {
        BubbleAnalysis {
            letter,
            darkness: final_score,
            coverage: final_score,
            uniformity: final_score,
            final_score,
        }
    }

    fn row(values: [f32; 5]) -> Vec<BubbleAnalysis> {
        Letter::ALL
            .iter()
            .zip(values)
            .map(|(&l, v)| score(l, v))
            .collect()
    }

    #[test]
    fn all_faint_bubbles_read_as_no_mark() {
        let d = decide(&row([30.0, 20.0, 10.0, 5.0, 0.0]), &DecisionConfig::default());
        assert_eq!(d.answer, None);
        assert_eq!(d.confidence, 0);
        assert_eq!(d.warning, Some(MarkWarning::NoMark));
    }

    #[test]
    fn close_top_two_read_as_multiple_marks() {
        let d = decide(&row([55.0, 50.0, 10.0, 5.0, 0.0]), &DecisionConfig::default());
        assert_eq!(d.answer, Some(Letter::A));
        assert_eq!(d.confidence, 40);
        assert_eq!(d.warning, Some(MarkWarning::MultipleMarks));
    }

    #[test]
    fn moderate_gap_flags_low_difference() {
        let d = decide(&row([60.0, 48.0, 10.0, 5.0, 0.0]), &DecisionConfig::default());
        assert_eq!(d.answer, Some(Letter::A));
        assert_eq!(d.confidence, 60);
        assert_eq!(d.warning, Some(MarkWarning::LowDifference));
    }

    #[test]
    fn clear_lone_mark_gets_bonus_confidence() {
        let d = decide(&row([80.0, 20.0, 10.0, 5.0, 0.0]), &DecisionConfig::default());
        assert_eq!(d.answer, Some(Letter::A));
        // 80 + 0.5 * 60 + 10 = 120, capped at 100.
        assert_eq!(d.confidence, 100);
        assert_eq!(d.warning, None);
    }

    #[test]
    fn two_strong_marks_with_clear_winner_skip_the_bonus() {
        let d = decide(&row([75.0, 40.0, 10.0, 5.0, 0.0]), &DecisionConfig::default());
        assert_eq!(d.answer, Some(Letter::A));
        // 75 + 0.5 * 35, second above the mark floor so no bonus.
        assert_eq!(d.confidence, 93);
        assert_eq!(d.warning, None);
    }

    #[test]
    fn winner_is_by_score_not_position() {
        let d = decide(&row([10.0, 5.0, 85.0, 0.0, 0.0]), &DecisionConfig::default());
        assert_eq!(d.answer, Some(Letter::C));
    }

    #[test]
    fn confidence_is_monotone_in_the_gap() {
        let config = DecisionConfig::default();
        let first = 70.0;
        let mut last = 0u8;
        // Sweep the runner-up downward; confidence must never drop.
        for second in (0..=54).rev() {
            let d = decide(&row([first, second as f32, 0.0, 0.0, 0.0]), &config);
            assert!(
                d.confidence >= last,
                "confidence dropped from {last} to {} at gap {}",
                d.confidence,
                first - second as f32
            );
            last = d.confidence;
        }
    }

    #[test]
    fn thresholds_come_from_the_config() {
        let config = DecisionConfig {
            min_mark_score: 60.0,
            ..DecisionConfig::default()
        };
        let d = decide(&row([55.0, 10.0, 0.0, 0.0, 0.0]), &config);
        assert_eq!(d.warning, Some(MarkWarning::NoMark));
    }
}
