// src/engine/grading.rs

use std::collections::HashMap;

use crate::models::competency::CompetencyMapping;

/// The questions an attempt is graded on.
///
/// Both variants grade identically; they differ in where the sequence came
/// from, which matters for integrity checks on resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionSet {
    /// The event's fixed question set, used when the event has no packages.
    Legacy { question_ids: Vec<i64> },
    /// A per-attempt assignment drawn from the event's packages.
    Assigned {
        question_ids: Vec<i64>,
        question_count: usize,
    },
}

impl QuestionSet {
    pub fn question_ids(&self) -> &[i64] {
        match self {
            QuestionSet::Legacy { question_ids } | QuestionSet::Assigned { question_ids, .. } => {
                question_ids
            }
        }
    }

    pub fn contains(&self, question_id: i64) -> bool {
        self.question_ids().contains(&question_id)
    }

    pub fn is_empty(&self) -> bool {
        self.question_ids().is_empty()
    }

    /// True when the bank no longer matches the snapshot taken at draw time.
    pub fn is_stale(&self, live_question_count: usize) -> bool {
        match self {
            QuestionSet::Legacy { .. } => false,
            QuestionSet::Assigned { question_count, .. } => *question_count != live_question_count,
        }
    }
}

/// Answer key for one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerKey {
    pub question_id: i64,
    pub score_value: i32,
    pub correct_option_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradeOutcome {
    pub score: i32,
    pub passed: bool,
    pub correct_count: usize,
    pub total_questions: usize,
}

/// Scores the questions of `set` against the selected options.
///
/// Score is the integer percentage of available points earned, or 0 when
/// nothing is worth any points. Unanswered questions earn nothing.
pub fn grade(
    set: &QuestionSet,
    keys: &HashMap<i64, AnswerKey>,
    selections: &HashMap<i64, Option<i64>>,
    pass_percentage: i32,
) -> GradeOutcome {
    let mut earned: i64 = 0;
    let mut available: i64 = 0;
    let mut correct_count = 0;

    for question_id in set.question_ids() {
        let Some(key) = keys.get(question_id) else {
            continue;
        };
        available += i64::from(key.score_value);

        let selected = selections.get(question_id).copied().flatten();
        if selected.is_some() && selected == key.correct_option_id {
            earned += i64::from(key.score_value);
            correct_count += 1;
        }
    }

    let score = if available == 0 {
        0
    } else {
        (earned * 100 / available) as i32
    };

    GradeOutcome {
        score,
        passed: score >= pass_percentage,
        correct_count,
        total_questions: set.question_ids().len(),
    }
}

/// Whether a mapping grants its competency for a passed attempt.
pub fn mapping_applies(mapping: &CompetencyMapping, category: &str, title: &str, score: i32) -> bool {
    if !mapping.category.eq_ignore_ascii_case(category) {
        return false;
    }
    if let Some(pattern) = &mapping.title_pattern {
        if !title.to_lowercase().contains(&pattern.to_lowercase()) {
            return false;
        }
    }
    mapping.min_score.is_none_or(|min| score >= min)
}

/// The level to store, or None when the existing level must be kept.
pub fn upgraded_level(existing: Option<i32>, granted: i32) -> Option<i32> {
    match existing {
        Some(current) if current >= granted => None,
        _ => Some(granted),
    }
}
