// src/services/session.rs

//! Worker-facing operations on a single attempt.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::{
    cache::{CachedStatus, StatusCache},
    engine::lifecycle::{self, EntryKind},
    error::AppError,
    models::{
        answer::{AnswerRecord, SubmitAttemptResponse},
        attempt::{
            Attempt, AttemptSummary, CheckStatusResponse, EnterAttemptResponse, ResumeState,
        },
    },
    services::{assignment, grading, store},
};

fn ensure_owner(attempt: &Attempt, worker_id: i64) -> Result<(), AppError> {
    if attempt.worker_id != worker_id {
        tracing::warn!(
            "Worker {} tried to act on attempt {} owned by {}",
            worker_id,
            attempt.id,
            attempt.worker_id
        );
        return Err(AppError::Forbidden("This attempt belongs to another worker".to_string()));
    }
    Ok(())
}

pub fn summarize(attempt: &Attempt, now: DateTime<Utc>) -> AttemptSummary {
    AttemptSummary {
        id: attempt.id,
        event_id: attempt.event_id,
        worker_id: attempt.worker_id,
        title: attempt.title.clone(),
        category: attempt.category.clone(),
        scheduled_at: attempt.scheduled_at,
        duration_minutes: attempt.duration_minutes,
        status: lifecycle::effective_status(attempt, now),
        locked: lifecycle::is_window_closed(attempt, now),
        score: attempt.score,
        is_passed: attempt.is_passed,
    }
}

pub async fn list_my_attempts(
    pool: &SqlitePool,
    worker_id: i64,
    now: DateTime<Utc>,
) -> Result<Vec<AttemptSummary>, AppError> {
    let mut conn = pool.acquire().await?;
    let attempts = store::fetch_worker_attempts(&mut conn, worker_id).await?;
    Ok(attempts.iter().map(|a| summarize(a, now)).collect())
}

/// Checks the access token of a token-gated attempt. The caller issues the entry ticket.
pub async fn verify_access_token(
    pool: &SqlitePool,
    attempt_id: i64,
    worker_id: i64,
    token: &str,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let mut conn = pool.acquire().await?;
    let attempt = store::require_attempt(&mut conn, attempt_id).await?;
    ensure_owner(&attempt, worker_id)?;
    lifecycle::ensure_window_open(&attempt, now)?;

    let event = store::require_event(&mut conn, attempt.event_id).await?;
    let expected = event.access_token.as_deref().unwrap_or_default();
    if !event.is_token_required || expected.is_empty() {
        return Ok(());
    }

    if !expected.eq_ignore_ascii_case(token.trim()) {
        tracing::warn!("Wrong access token for attempt {} by worker {}", attempt_id, worker_id);
        return Err(AppError::BadRequest("The access token is not valid.".to_string()));
    }
    Ok(())
}

/// Starts or resumes an attempt and returns everything the client needs to render it.
///
/// `token_satisfied` is true when the token gate does not apply to the caller
/// (administrator role or a valid entry ticket).
pub async fn enter_attempt(
    pool: &SqlitePool,
    attempt_id: i64,
    worker_id: i64,
    token_satisfied: bool,
    now: DateTime<Utc>,
) -> Result<EnterAttemptResponse, AppError> {
    let mut tx = store::begin_write(pool).await?;

    let attempt = store::require_attempt(&mut tx, attempt_id).await?;
    ensure_owner(&attempt, worker_id)?;
    let kind = lifecycle::check_entry(&attempt, now, token_satisfied)?;

    let mut set = assignment::ensure_question_set(&mut tx, &attempt, now).await?;
    let live_count = assignment::live_question_count(&mut tx, attempt.event_id).await?;

    if set.is_stale(live_count) {
        match kind {
            EntryKind::Resume => {
                // Progress can no longer be trusted; wipe it and hand over to an administrator.
                sqlx::query(
                    "UPDATE attempts SET elapsed_seconds = 0, last_active_page = 0, updated_at = $1 \
                     WHERE id = $2",
                )
                .bind(now)
                .bind(attempt.id)
                .execute(&mut *tx)
                .await?;
                sqlx::query("DELETE FROM answer_records WHERE attempt_id = $1")
                    .bind(attempt.id)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;

                tracing::warn!(
                    "Question bank of event {} changed under running attempt {}; resume state cleared",
                    attempt.event_id,
                    attempt.id
                );
                return Err(AppError::QuestionBankChanged);
            }
            EntryKind::Start => {
                set = assignment::redraw(&mut tx, &attempt, now).await?;
            }
        }
    }

    if set.is_empty() {
        tracing::error!("Event {} has no questions to assign", attempt.event_id);
        return Err(AppError::Configuration(
            "This exam has no questions configured. Please contact an administrator.".to_string(),
        ));
    }

    if kind == EntryKind::Start {
        sqlx::query(
            r#"
            UPDATE attempts
            SET status = 'in_progress', started_at = COALESCE(started_at, $1), updated_at = $2
            WHERE id = $3 AND status IN ('upcoming', 'open', 'in_progress')
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(attempt.id)
        .execute(&mut *tx)
        .await?;
        tracing::info!("Worker {} started attempt {}", worker_id, attempt.id);
    }

    let attempt = store::require_attempt(&mut tx, attempt_id).await?;
    let questions = store::public_questions(&mut tx, set.question_ids()).await?;
    let answers = store::fetch_answer_records(&mut tx, attempt_id).await?;
    tx.commit().await?;

    let timing = lifecycle::resume_timing(&attempt);
    Ok(EnterAttemptResponse {
        attempt_id: attempt.id,
        title: attempt.title,
        status: attempt.status,
        started_at: attempt.started_at,
        duration_minutes: attempt.duration_minutes,
        questions,
        resume: ResumeState {
            elapsed_seconds: attempt.elapsed_seconds,
            last_active_page: attempt.last_active_page,
            remaining_seconds: timing.remaining_seconds,
            expired: timing.expired,
            answers,
        },
    })
}

/// Autosave of one answer. A `None` option clears the selection.
pub async fn save_answer(
    pool: &SqlitePool,
    attempt_id: i64,
    worker_id: i64,
    question_id: i64,
    option_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let mut conn = pool.acquire().await?;

    let attempt = store::require_attempt(&mut conn, attempt_id).await?;
    ensure_owner(&attempt, worker_id)?;
    lifecycle::check_answer_write(&attempt, now)?;

    let set = assignment::load_question_set(&mut conn, &attempt).await?;
    if !set.contains(question_id) {
        return Err(AppError::BadRequest(
            "Question is not part of this attempt".to_string(),
        ));
    }
    if let Some(option_id) = option_id {
        if !store::option_belongs_to_question(&mut conn, question_id, option_id).await? {
            return Err(AppError::BadRequest(
                "Option does not belong to the question".to_string(),
            ));
        }
    }

    // Single statement: the status guard and the upsert are applied atomically.
    let result = sqlx::query(
        r#"
        INSERT INTO answer_records (attempt_id, question_id, option_id, updated_at)
        SELECT $1, $2, $3, $4
        WHERE EXISTS (
            SELECT 1 FROM attempts
            WHERE id = $1 AND status = 'in_progress' AND exam_window_close_at IS NULL
        )
        ON CONFLICT(attempt_id, question_id) DO UPDATE SET
            option_id = excluded.option_id,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(attempt_id)
    .bind(question_id)
    .bind(option_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::InvalidState(
            "Answers can no longer be saved for this attempt.".to_string(),
        ));
    }
    Ok(())
}

/// Saved answers of an attempt. Owners and administrators may read them.
pub async fn get_answers(
    pool: &SqlitePool,
    attempt_id: i64,
    worker_id: i64,
    is_admin: bool,
) -> Result<Vec<AnswerRecord>, AppError> {
    let mut conn = pool.acquire().await?;
    let attempt = store::require_attempt(&mut conn, attempt_id).await?;
    if !is_admin {
        ensure_owner(&attempt, worker_id)?;
    }
    store::fetch_answer_records(&mut conn, attempt_id).await
}

/// Persists client-side resume state. Elapsed time never moves backwards.
pub async fn update_progress(
    pool: &SqlitePool,
    attempt_id: i64,
    worker_id: i64,
    elapsed_seconds: i64,
    last_active_page: i32,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if elapsed_seconds < 0 || last_active_page < 0 {
        return Err(AppError::BadRequest(
            "Elapsed time and page must not be negative".to_string(),
        ));
    }

    let mut conn = pool.acquire().await?;
    let attempt = store::require_attempt(&mut conn, attempt_id).await?;
    ensure_owner(&attempt, worker_id)?;
    lifecycle::check_answer_write(&attempt, now)?;

    sqlx::query(
        r#"
        UPDATE attempts
        SET elapsed_seconds = MAX(elapsed_seconds, $1), last_active_page = $2, updated_at = $3
        WHERE id = $4 AND status = 'in_progress'
        "#,
    )
    .bind(elapsed_seconds)
    .bind(last_active_page)
    .bind(now)
    .bind(attempt_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Final submission: merges the submitted answers, grades and completes the attempt.
pub async fn submit_attempt(
    pool: &SqlitePool,
    attempt_id: i64,
    worker_id: i64,
    answers: &HashMap<i64, i64>,
    grace_seconds: i64,
    now: DateTime<Utc>,
) -> Result<SubmitAttemptResponse, AppError> {
    let mut tx = store::begin_write(pool).await?;

    let attempt = store::require_attempt(&mut tx, attempt_id).await?;
    ensure_owner(&attempt, worker_id)?;
    if let Err(e) = lifecycle::check_submission(&attempt, now, grace_seconds) {
        if matches!(e, AppError::TimeExpired) {
            tracing::warn!("Late submission refused for attempt {}", attempt_id);
        }
        return Err(e);
    }

    let set = assignment::ensure_question_set(&mut tx, &attempt, now).await?;

    let mut submitted: Vec<(&i64, &i64)> = answers.iter().collect();
    submitted.sort_unstable();
    for (&question_id, &option_id) in submitted {
        if !set.contains(question_id) {
            return Err(AppError::BadRequest(format!(
                "Question {} is not part of this attempt",
                question_id
            )));
        }
        if !store::option_belongs_to_question(&mut tx, question_id, option_id).await? {
            return Err(AppError::BadRequest(format!(
                "Option {} does not belong to question {}",
                option_id, question_id
            )));
        }
        store::upsert_answer(&mut tx, attempt_id, question_id, Some(option_id), now).await?;
    }

    let outcome = grading::complete_with_grade(&mut tx, &attempt, &set, now).await?;
    tx.commit().await?;

    Ok(SubmitAttemptResponse {
        attempt_id,
        score: outcome.score,
        passed: outcome.passed,
        correct_count: outcome.correct_count,
        total_questions: outcome.total_questions,
    })
}

/// Worker self-cancel.
pub async fn abandon_attempt(
    pool: &SqlitePool,
    attempt_id: i64,
    worker_id: i64,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let mut tx = store::begin_write(pool).await?;
    let attempt = store::require_attempt(&mut tx, attempt_id).await?;
    ensure_owner(&attempt, worker_id)?;
    lifecycle::check_abandon(&attempt, now)?;

    sqlx::query(
        "UPDATE attempts SET status = 'abandoned', updated_at = $1 \
         WHERE id = $2 AND status IN ('upcoming', 'open', 'in_progress')",
    )
    .bind(now)
    .bind(attempt_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!("Worker {} abandoned attempt {}", worker_id, attempt_id);
    Ok(())
}

/// Polling endpoint. Served from the per-attempt cache while it is fresh.
pub async fn check_status(
    pool: &SqlitePool,
    cache: &StatusCache,
    attempt_id: i64,
    worker_id: i64,
    is_admin: bool,
    now: DateTime<Utc>,
) -> Result<CheckStatusResponse, AppError> {
    let cached = match cache.get(attempt_id).await {
        Some(cached) => cached,
        None => {
            let mut conn = pool.acquire().await?;
            let attempt = store::require_attempt(&mut conn, attempt_id).await?;
            let status = lifecycle::effective_status(&attempt, now);
            let cached = CachedStatus {
                event_id: attempt.event_id,
                worker_id: attempt.worker_id,
                status,
                closed: status.is_terminal() || lifecycle::is_window_closed(&attempt, now),
            };
            cache.put(attempt_id, cached).await;
            cached
        }
    };

    if !is_admin && cached.worker_id != worker_id {
        return Err(AppError::Forbidden("This attempt belongs to another worker".to_string()));
    }

    Ok(CheckStatusResponse {
        closed: cached.closed,
        status: cached.status,
        redirect_hint: lifecycle::redirect_hint(cached.status, cached.closed),
    })
}
