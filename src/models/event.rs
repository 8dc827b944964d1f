// src/models/event.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'assessment_events' table.
/// One administrative exam event; every invited worker gets one attempt under it.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AssessmentEvent {
    pub id: i64,
    pub title: String,
    pub category: String,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub pass_percentage: i32,
    pub is_token_required: bool,

    /// Shared secret workers type in before starting a token-gated exam.
    #[serde(skip)]
    pub access_token: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// DTO for creating an event together with its attempts.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateEventRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 100))]
    pub category: String,
    pub scheduled_at: DateTime<Utc>,
    #[validate(range(min = 1, max = 1440))]
    pub duration_minutes: i32,
    #[validate(range(min = 0, max = 100))]
    pub pass_percentage: i32,
    #[serde(default)]
    pub is_token_required: bool,
    /// Explicit token; one is generated when a token is required and none is given.
    #[validate(length(min = 4, max = 64))]
    pub access_token: Option<String>,
    #[validate(length(min = 1, message = "At least one worker must be invited."))]
    pub worker_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct CreateEventResponse {
    pub id: i64,
    pub attempt_ids: Vec<i64>,
    pub access_token: Option<String>,
}
