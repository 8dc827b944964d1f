// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Represents the 'questions' table.
/// `package_id` is None for the event's legacy fixed question set.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Question {
    pub id: i64,
    pub event_id: i64,
    pub package_id: Option<i64>,
    pub position: i32,
    pub content: String,

    /// Points credited when the correct option is selected.
    pub score_value: i32,
}

/// Represents the 'question_options' table. Exactly one option per question is correct.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QuestionOption {
    pub id: i64,
    pub question_id: i64,
    pub position: i32,
    pub content: String,
    pub is_correct: bool,
}

/// DTO for sending a question to a worker (correct flags stripped).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub content: String,
    pub options: Vec<PublicOption>,
}

#[derive(Debug, Serialize)]
pub struct PublicOption {
    pub id: i64,
    pub content: String,
}

/// DTO for creating a question with its options.
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 2000))]
    pub content: String,
    #[validate(range(min = 0, max = 1000))]
    pub score_value: Option<i32>,
    #[validate(custom(function = validate_options), nested)]
    pub options: Vec<CreateOptionRequest>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CreateOptionRequest {
    #[validate(length(min = 1, max = 500))]
    pub content: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// DTO for attaching a package to an event.
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePackageRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(nested)]
    pub questions: Vec<CreateQuestionRequest>,
}

/// DTO for attaching questions directly to an event (legacy fixed set).
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionsRequest {
    #[validate(length(min = 1), nested)]
    pub questions: Vec<CreateQuestionRequest>,
}

fn validate_options(options: &[CreateOptionRequest]) -> Result<(), validator::ValidationError> {
    if options.len() < 2 {
        return Err(validator::ValidationError::new("at_least_two_options"));
    }
    if options.iter().filter(|o| o.is_correct).count() != 1 {
        return Err(validator::ValidationError::new("exactly_one_correct_option"));
    }
    Ok(())
}
