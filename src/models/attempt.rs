// src/models/attempt.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::{answer::AnswerRecord, question::PublicQuestion};

/// Lifecycle status of one exam attempt, stored as snake_case text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AttemptStatus {
    Upcoming,
    Open,
    InProgress,
    Completed,
    Abandoned,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Upcoming => "upcoming",
            AttemptStatus::Open => "open",
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptStatus::Completed | AttemptStatus::Abandoned)
    }
}

/// Columns selected by every attempt query; joins the owning event so the
/// lifecycle checks have schedule, duration and threshold at hand.
pub const ATTEMPT_SELECT: &str = "\
    SELECT a.id, a.event_id, a.worker_id, a.status, a.exam_window_close_at, a.started_at, \
    a.completed_at, a.elapsed_seconds, a.last_active_page, a.score, a.is_passed, a.updated_at, \
    e.title, e.category, e.scheduled_at, e.duration_minutes, e.pass_percentage, e.is_token_required \
    FROM attempts a JOIN assessment_events e ON e.id = a.event_id";

/// One worker's attempt at an event, joined with the event's settings.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Attempt {
    pub id: i64,
    pub event_id: i64,
    pub worker_id: i64,
    pub status: AttemptStatus,
    pub exam_window_close_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub elapsed_seconds: i64,
    pub last_active_page: i32,
    pub score: Option<i32>,
    pub is_passed: Option<bool>,
    pub updated_at: DateTime<Utc>,

    pub title: String,
    pub category: String,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub pass_percentage: i32,
    pub is_token_required: bool,
}

/// Attempt as listed to its worker or to an administrator, with the status as of now.
#[derive(Debug, Serialize)]
pub struct AttemptSummary {
    pub id: i64,
    pub event_id: i64,
    pub worker_id: i64,
    pub title: String,
    pub category: String,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: AttemptStatus,
    pub locked: bool,
    pub score: Option<i32>,
    pub is_passed: Option<bool>,
}

/// Represents the append-only 'attempt_history' ledger.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AttemptHistory {
    pub id: i64,
    pub attempt_id: i64,
    pub event_id: i64,
    pub worker_id: i64,
    pub title: String,
    pub category: String,
    pub attempt_number: i32,
    pub status: AttemptStatus,
    pub score: Option<i32>,
    pub is_passed: Option<bool>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub archived_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyTokenRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyTokenResponse {
    pub ticket: String,
    pub expires_in: u64, // seconds
}

#[derive(Debug, Default, Deserialize)]
pub struct EnterAttemptRequest {
    /// Ticket returned by verify-token; only needed for token-gated exams.
    pub ticket: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProgressRequest {
    pub elapsed_seconds: i64,
    pub last_active_page: i32,
}

#[derive(Debug, Serialize)]
pub struct CheckStatusResponse {
    pub closed: bool,
    pub status: AttemptStatus,
    pub redirect_hint: Option<&'static str>,
}

/// Resume information returned on every entry.
#[derive(Debug, Serialize)]
pub struct ResumeState {
    pub elapsed_seconds: i64,
    pub last_active_page: i32,
    pub remaining_seconds: i64,
    pub expired: bool,
    pub answers: Vec<AnswerRecord>,
}

#[derive(Debug, Serialize)]
pub struct EnterAttemptResponse {
    pub attempt_id: i64,
    pub title: String,
    pub status: AttemptStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_minutes: i32,
    pub questions: Vec<PublicQuestion>,
    pub resume: ResumeState,
}
