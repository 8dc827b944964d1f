// src/services/overrides.rs

//! Administrative overrides. Every operation runs in one transaction; a
//! failure part-way leaves no attempt touched.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    engine::lifecycle::{self, effective_status},
    error::AppError,
    models::attempt::{Attempt, AttemptStatus},
    services::{assignment, grading, store},
};

#[derive(Debug, Serialize)]
pub struct CloseEarlyReport {
    pub event_id: i64,
    /// Attempts whose window was closed, graded ones included.
    pub locked: usize,
    pub graded: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct ForceCloseAllReport {
    pub event_id: i64,
    pub abandoned: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct ReshuffleReport {
    pub reshuffled: Vec<i64>,
    pub skipped: Vec<i64>,
}

/// Locks every attempt of the event now and grades the ones in progress.
pub async fn close_early(
    pool: &SqlitePool,
    event_id: i64,
    now: DateTime<Utc>,
) -> Result<CloseEarlyReport, AppError> {
    let mut tx = store::begin_write(pool).await?;
    store::require_event(&mut tx, event_id).await?;

    let locked = sqlx::query(
        "UPDATE attempts SET exam_window_close_at = $1, updated_at = $2 WHERE event_id = $3",
    )
    .bind(now)
    .bind(now)
    .bind(event_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let attempts = store::fetch_event_attempts(&mut tx, event_id).await?;
    let mut graded = Vec::new();
    for attempt in attempts
        .iter()
        .filter(|a| a.status == AttemptStatus::InProgress)
    {
        let set = assignment::load_question_set(&mut tx, attempt).await?;
        grading::complete_with_grade(&mut tx, attempt, &set, now).await?;
        graded.push(attempt.id);
    }

    tx.commit().await?;

    Ok(CloseEarlyReport {
        event_id,
        locked: usize::try_from(locked).unwrap_or_default(),
        graded,
    })
}

/// Abandons every attempt of the event that is open or in progress. Nothing is graded.
pub async fn force_close_all(
    pool: &SqlitePool,
    event_id: i64,
    now: DateTime<Utc>,
) -> Result<ForceCloseAllReport, AppError> {
    let mut tx = store::begin_write(pool).await?;
    store::require_event(&mut tx, event_id).await?;

    let attempts = store::fetch_event_attempts(&mut tx, event_id).await?;
    let targets: Vec<i64> = attempts
        .iter()
        .filter(|a| {
            matches!(
                effective_status(a, now),
                AttemptStatus::Open | AttemptStatus::InProgress
            )
        })
        .map(|a| a.id)
        .collect();

    for attempt_id in &targets {
        sqlx::query("UPDATE attempts SET status = 'abandoned', updated_at = $1 WHERE id = $2")
            .bind(now)
            .bind(attempt_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(ForceCloseAllReport {
        event_id,
        abandoned: targets,
    })
}

/// Closes one attempt as completed with a zero score.
pub async fn force_close(
    pool: &SqlitePool,
    attempt_id: i64,
    now: DateTime<Utc>,
) -> Result<Attempt, AppError> {
    let mut tx = store::begin_write(pool).await?;
    let attempt = store::require_attempt(&mut tx, attempt_id).await?;
    lifecycle::check_force_close(&attempt, now)?;

    sqlx::query(
        r#"
        UPDATE attempts
        SET status = 'completed', score = 0, is_passed = FALSE, completed_at = $1, updated_at = $2
        WHERE id = $3
        "#,
    )
    .bind(now)
    .bind(now)
    .bind(attempt_id)
    .execute(&mut *tx)
    .await?;

    let attempt = store::require_attempt(&mut tx, attempt_id).await?;
    tx.commit().await?;
    Ok(attempt)
}

/// Archives the attempt's outcome to the history ledger and reopens it for a retake.
///
/// Returns the attempt number recorded in the ledger.
pub async fn reset(pool: &SqlitePool, attempt_id: i64, now: DateTime<Utc>) -> Result<i32, AppError> {
    let mut tx = store::begin_write(pool).await?;
    let attempt = store::require_attempt(&mut tx, attempt_id).await?;
    lifecycle::check_reset(&attempt)?;

    let attempt_number = archive(&mut tx, &attempt, now).await?;

    sqlx::query(
        r#"
        UPDATE attempts
        SET status = 'open', started_at = NULL, completed_at = NULL, elapsed_seconds = 0,
            last_active_page = 0, score = NULL, is_passed = NULL, exam_window_close_at = NULL,
            updated_at = $1
        WHERE id = $2
        "#,
    )
    .bind(now)
    .bind(attempt_id)
    .execute(&mut *tx)
    .await?;

    store::delete_assignment_and_answers(&mut tx, attempt_id).await?;
    tx.commit().await?;

    Ok(attempt_number)
}

async fn archive(
    conn: &mut SqliteConnection,
    attempt: &Attempt,
    now: DateTime<Utc>,
) -> Result<i32, AppError> {
    let previous: i32 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(attempt_number), 0) FROM attempt_history WHERE worker_id = $1 AND title = $2",
    )
    .bind(attempt.worker_id)
    .bind(&attempt.title)
    .fetch_one(&mut *conn)
    .await?;
    let attempt_number = previous + 1;

    sqlx::query(
        r#"
        INSERT INTO attempt_history
            (attempt_id, event_id, worker_id, title, category, attempt_number, status,
             score, is_passed, started_at, completed_at, archived_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(attempt.id)
    .bind(attempt.event_id)
    .bind(attempt.worker_id)
    .bind(&attempt.title)
    .bind(&attempt.category)
    .bind(attempt_number)
    .bind(attempt.status)
    .bind(attempt.score)
    .bind(attempt.is_passed)
    .bind(attempt.started_at)
    .bind(attempt.completed_at)
    .bind(now)
    .execute(conn)
    .await?;

    Ok(attempt_number)
}

/// Replaces one attempt's assignment with a fresh draw. Saved answers are discarded.
pub async fn reshuffle_attempt(
    pool: &SqlitePool,
    attempt_id: i64,
    now: DateTime<Utc>,
) -> Result<Vec<i64>, AppError> {
    let mut tx = store::begin_write(pool).await?;
    let attempt = store::require_attempt(&mut tx, attempt_id).await?;
    if !lifecycle::can_reshuffle(&attempt, now) {
        return Err(AppError::InvalidState(format!(
            "Cannot reshuffle an attempt that is {}.",
            effective_status(&attempt, now).as_str()
        )));
    }

    let set = assignment::redraw(&mut tx, &attempt, now).await?;
    tx.commit().await?;
    Ok(set.question_ids().to_vec())
}

/// Reshuffles every eligible attempt of the event; running and finished ones are skipped.
pub async fn reshuffle_event(
    pool: &SqlitePool,
    event_id: i64,
    now: DateTime<Utc>,
) -> Result<ReshuffleReport, AppError> {
    let mut tx = store::begin_write(pool).await?;
    store::require_event(&mut tx, event_id).await?;

    let attempts = store::fetch_event_attempts(&mut tx, event_id).await?;
    let mut report = ReshuffleReport {
        reshuffled: Vec::new(),
        skipped: Vec::new(),
    };
    for attempt in &attempts {
        if lifecycle::can_reshuffle(attempt, now) {
            assignment::redraw(&mut tx, attempt, now).await?;
            report.reshuffled.push(attempt.id);
        } else {
            report.skipped.push(attempt.id);
        }
    }

    tx.commit().await?;
    Ok(report)
}
