// src/models/assignment.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, types::Json};

/// Represents the 'assignments' table.
/// A worker's materialized question order for one attempt.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Assignment {
    pub id: i64,
    pub attempt_id: i64,
    pub worker_id: i64,

    /// Question ids in the order they are shown to the worker.
    pub question_ids: Json<Vec<i64>>,

    /// Minimum package length when the assignment was drawn; compared on resume
    /// to detect edits to the question bank.
    pub question_count: i32,

    pub created_at: DateTime<Utc>,
}
