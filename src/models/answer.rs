// src/models/answer.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'answer_records' table. Unique per (attempt, question).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AnswerRecord {
    pub attempt_id: i64,
    pub question_id: i64,

    /// Selected option; None means the question was seen but left unanswered.
    pub option_id: Option<i64>,

    pub updated_at: DateTime<Utc>,
}

/// DTO for the autosave call.
#[derive(Debug, Deserialize)]
pub struct SaveAnswerRequest {
    pub question_id: i64,
    pub option_id: Option<i64>,
}

/// DTO for the final submission.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitAttemptRequest {
    /// Final answers, merged over what autosave already stored.
    /// Key: Question ID, Value: selected option ID.
    #[serde(default)]
    pub answers: HashMap<i64, i64>,
}

#[derive(Debug, Serialize)]
pub struct SubmitAttemptResponse {
    pub attempt_id: i64,
    pub score: i32,
    pub passed: bool,
    pub correct_count: usize,
    pub total_questions: usize,
}
