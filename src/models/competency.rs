// src/models/competency.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'competency_mappings' table.
/// Declares which competency a passed exam grants, and at what level.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CompetencyMapping {
    pub id: i64,
    pub competency_item: String,
    pub category: String,

    /// Case-insensitive substring the event title must contain, if set.
    pub title_pattern: Option<String>,

    pub level_granted: i32,

    /// Minimum score required on top of passing, if set.
    pub min_score: Option<i32>,
}

/// Represents the 'competency_levels' table. One row per (worker, competency item).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CompetencyLevel {
    pub id: i64,
    pub worker_id: i64,
    pub competency_item: String,
    pub current_level: i32,
    pub target_level: Option<i32>,
    pub source: String,
    pub source_attempt_id: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateMappingRequest {
    #[validate(length(min = 1, max = 200))]
    pub competency_item: String,
    #[validate(length(min = 1, max = 100))]
    pub category: String,
    #[validate(length(min = 1, max = 200))]
    pub title_pattern: Option<String>,
    #[validate(range(min = 1, max = 10))]
    pub level_granted: i32,
    #[validate(range(min = 0, max = 100))]
    pub min_score: Option<i32>,
}
