// src/services/events.rs

//! Event setup (events, question banks, competency mappings) and the
//! administrative read models.

use chrono::{DateTime, Utc};
use rand::{Rng, distributions::Alphanumeric};
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    engine::assignment::fresh_rng,
    error::AppError,
    models::{
        attempt::{AttemptHistory, AttemptSummary},
        competency::{CompetencyLevel, CreateMappingRequest},
        event::{CreateEventRequest, CreateEventResponse},
        question::CreateQuestionRequest,
    },
    services::{session, store},
};

const GENERATED_TOKEN_LEN: usize = 6;
const DEFAULT_SCORE_VALUE: i32 = 10;

fn generate_access_token() -> String {
    let mut rng = fresh_rng();
    (0..GENERATED_TOKEN_LEN)
        .map(|_| char::from(rng.sample(Alphanumeric)).to_ascii_uppercase())
        .collect()
}

/// Creates an event and one attempt per invited worker.
pub async fn create_event(
    pool: &SqlitePool,
    req: CreateEventRequest,
    now: DateTime<Utc>,
) -> Result<CreateEventResponse, AppError> {
    let access_token = match (req.is_token_required, req.access_token) {
        (true, Some(token)) => Some(token.trim().to_string()),
        (true, None) => Some(generate_access_token()),
        (false, _) => None,
    };

    let mut worker_ids = req.worker_ids;
    worker_ids.sort_unstable();
    worker_ids.dedup();

    let mut tx = store::begin_write(pool).await?;

    let event_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO assessment_events
            (title, category, scheduled_at, duration_minutes, pass_percentage,
             is_token_required, access_token, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(req.title.trim())
    .bind(req.category.trim())
    .bind(req.scheduled_at)
    .bind(req.duration_minutes)
    .bind(req.pass_percentage)
    .bind(req.is_token_required)
    .bind(&access_token)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    let mut attempt_ids = Vec::with_capacity(worker_ids.len());
    for worker_id in worker_ids {
        let attempt_id: i64 = sqlx::query_scalar(
            "INSERT INTO attempts (event_id, worker_id, status, updated_at) \
             VALUES ($1, $2, 'upcoming', $3) RETURNING id",
        )
        .bind(event_id)
        .bind(worker_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        attempt_ids.push(attempt_id);
    }

    tx.commit().await?;

    Ok(CreateEventResponse {
        id: event_id,
        attempt_ids,
        access_token,
    })
}

/// Deletes an event with everything hanging off it. History and competencies stay.
pub async fn delete_event(pool: &SqlitePool, event_id: i64) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM assessment_events WHERE id = $1")
        .bind(event_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Event not found".to_string()));
    }
    Ok(())
}

async fn insert_questions(
    conn: &mut SqliteConnection,
    event_id: i64,
    package_id: Option<i64>,
    questions: &[CreateQuestionRequest],
) -> Result<Vec<i64>, AppError> {
    let last_position: i32 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(position), 0) FROM questions WHERE event_id = $1 AND package_id IS $2",
    )
    .bind(event_id)
    .bind(package_id)
    .fetch_one(&mut *conn)
    .await?;

    let mut ids = Vec::with_capacity(questions.len());
    for (offset, question) in questions.iter().enumerate() {
        let position = last_position + 1 + offset as i32;
        let question_id: i64 = sqlx::query_scalar(
            "INSERT INTO questions (event_id, package_id, position, content, score_value) \
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(event_id)
        .bind(package_id)
        .bind(position)
        .bind(&question.content)
        .bind(question.score_value.unwrap_or(DEFAULT_SCORE_VALUE))
        .fetch_one(&mut *conn)
        .await?;

        for (option_position, option) in question.options.iter().enumerate() {
            sqlx::query(
                "INSERT INTO question_options (question_id, position, content, is_correct) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(question_id)
            .bind(option_position as i32 + 1)
            .bind(&option.content)
            .bind(option.is_correct)
            .execute(&mut *conn)
            .await?;
        }
        ids.push(question_id);
    }
    Ok(ids)
}

/// Adds a question package to the event. Returns the package id and its question ids.
pub async fn add_package(
    pool: &SqlitePool,
    event_id: i64,
    name: &str,
    questions: &[CreateQuestionRequest],
) -> Result<(i64, Vec<i64>), AppError> {
    let mut tx = store::begin_write(pool).await?;
    store::require_event(&mut tx, event_id).await?;

    let package_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO question_packages (event_id, name, position)
        VALUES ($1, $2, (SELECT COALESCE(MAX(position), 0) + 1 FROM question_packages WHERE event_id = $1))
        RETURNING id
        "#,
    )
    .bind(event_id)
    .bind(name.trim())
    .fetch_one(&mut *tx)
    .await?;

    let question_ids = insert_questions(&mut tx, event_id, Some(package_id), questions).await?;
    tx.commit().await?;

    Ok((package_id, question_ids))
}

/// Appends questions to the event's fixed (package-less) question set.
pub async fn add_legacy_questions(
    pool: &SqlitePool,
    event_id: i64,
    questions: &[CreateQuestionRequest],
) -> Result<Vec<i64>, AppError> {
    let mut tx = store::begin_write(pool).await?;
    store::require_event(&mut tx, event_id).await?;
    let ids = insert_questions(&mut tx, event_id, None, questions).await?;
    tx.commit().await?;
    Ok(ids)
}

pub async fn list_event_attempts(
    pool: &SqlitePool,
    event_id: i64,
    now: DateTime<Utc>,
) -> Result<Vec<AttemptSummary>, AppError> {
    let mut conn = pool.acquire().await?;
    store::require_event(&mut conn, event_id).await?;
    let attempts = store::fetch_event_attempts(&mut conn, event_id).await?;
    Ok(attempts.iter().map(|a| session::summarize(a, now)).collect())
}

pub async fn worker_history(
    pool: &SqlitePool,
    worker_id: i64,
) -> Result<Vec<AttemptHistory>, AppError> {
    let rows = sqlx::query_as::<_, AttemptHistory>(
        r#"
        SELECT id, attempt_id, event_id, worker_id, title, category, attempt_number, status,
               score, is_passed, started_at, completed_at, archived_at
        FROM attempt_history
        WHERE worker_id = $1
        ORDER BY archived_at DESC, id DESC
        "#,
    )
    .bind(worker_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn worker_competencies(
    pool: &SqlitePool,
    worker_id: i64,
) -> Result<Vec<CompetencyLevel>, AppError> {
    let rows = sqlx::query_as::<_, CompetencyLevel>(
        r#"
        SELECT id, worker_id, competency_item, current_level, target_level, source,
               source_attempt_id, updated_at
        FROM competency_levels
        WHERE worker_id = $1
        ORDER BY competency_item
        "#,
    )
    .bind(worker_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn create_mapping(pool: &SqlitePool, req: &CreateMappingRequest) -> Result<i64, AppError> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO competency_mappings (competency_item, category, title_pattern, level_granted, min_score)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(req.competency_item.trim())
    .bind(req.category.trim())
    .bind(req.title_pattern.as_deref().map(str::trim))
    .bind(req.level_granted)
    .bind(req.min_score)
    .fetch_one(pool)
    .await?;
    Ok(id)
}
