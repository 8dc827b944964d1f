// src/services/store.rs

//! Queries shared by the worker-facing and administrative operations.
//!
//! Every function takes a plain connection so callers decide whether it runs
//! inside a transaction (`&mut *tx`) or on a pooled connection.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool, Transaction};

use crate::{
    engine::grading::AnswerKey,
    error::AppError,
    models::{
        answer::AnswerRecord,
        assignment::Assignment,
        attempt::{ATTEMPT_SELECT, Attempt},
        event::AssessmentEvent,
        question::{PublicOption, PublicQuestion, Question, QuestionOption},
    },
};

/// Opens a transaction that holds the write lock from its first statement.
///
/// Concurrent writers then wait on the busy timeout instead of failing when a
/// deferred read lock cannot be upgraded.
pub async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>, AppError> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

pub async fn fetch_attempt(
    conn: &mut SqliteConnection,
    attempt_id: i64,
) -> Result<Option<Attempt>, AppError> {
    let attempt = sqlx::query_as::<_, Attempt>(&format!("{ATTEMPT_SELECT} WHERE a.id = $1"))
        .bind(attempt_id)
        .fetch_optional(conn)
        .await?;
    Ok(attempt)
}

pub async fn require_attempt(
    conn: &mut SqliteConnection,
    attempt_id: i64,
) -> Result<Attempt, AppError> {
    fetch_attempt(conn, attempt_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Attempt not found".to_string()))
}

pub async fn fetch_event_attempts(
    conn: &mut SqliteConnection,
    event_id: i64,
) -> Result<Vec<Attempt>, AppError> {
    let attempts = sqlx::query_as::<_, Attempt>(&format!(
        "{ATTEMPT_SELECT} WHERE a.event_id = $1 ORDER BY a.id"
    ))
    .bind(event_id)
    .fetch_all(conn)
    .await?;
    Ok(attempts)
}

pub async fn fetch_worker_attempts(
    conn: &mut SqliteConnection,
    worker_id: i64,
) -> Result<Vec<Attempt>, AppError> {
    let attempts = sqlx::query_as::<_, Attempt>(&format!(
        "{ATTEMPT_SELECT} WHERE a.worker_id = $1 ORDER BY e.scheduled_at DESC, a.id DESC"
    ))
    .bind(worker_id)
    .fetch_all(conn)
    .await?;
    Ok(attempts)
}

pub async fn require_event(
    conn: &mut SqliteConnection,
    event_id: i64,
) -> Result<AssessmentEvent, AppError> {
    sqlx::query_as::<_, AssessmentEvent>(
        "SELECT id, title, category, scheduled_at, duration_minutes, pass_percentage, \
         is_token_required, access_token, created_at \
         FROM assessment_events WHERE id = $1",
    )
    .bind(event_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Event not found".to_string()))
}

/// Question ids of every package of the event, packages and questions in stored order.
/// Packages without questions are included as empty lists.
pub async fn package_question_ids(
    conn: &mut SqliteConnection,
    event_id: i64,
) -> Result<Vec<Vec<i64>>, AppError> {
    let package_ids: Vec<i64> = sqlx::query_scalar(
        "SELECT id FROM question_packages WHERE event_id = $1 ORDER BY position, id",
    )
    .bind(event_id)
    .fetch_all(&mut *conn)
    .await?;

    if package_ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT package_id, id FROM questions \
         WHERE event_id = $1 AND package_id IS NOT NULL \
         ORDER BY position, id",
    )
    .bind(event_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_package: HashMap<i64, Vec<i64>> = HashMap::new();
    for (package_id, question_id) in rows {
        by_package.entry(package_id).or_default().push(question_id);
    }

    Ok(package_ids
        .into_iter()
        .map(|id| by_package.remove(&id).unwrap_or_default())
        .collect())
}

/// The event's fixed question set (questions not attached to any package).
pub async fn legacy_question_ids(
    conn: &mut SqliteConnection,
    event_id: i64,
) -> Result<Vec<i64>, AppError> {
    let ids: Vec<i64> = sqlx::query_scalar(
        "SELECT id FROM questions WHERE event_id = $1 AND package_id IS NULL ORDER BY position, id",
    )
    .bind(event_id)
    .fetch_all(conn)
    .await?;
    Ok(ids)
}

pub async fn fetch_assignment(
    conn: &mut SqliteConnection,
    attempt_id: i64,
) -> Result<Option<Assignment>, AppError> {
    let assignment = sqlx::query_as::<_, Assignment>(
        "SELECT id, attempt_id, worker_id, question_ids, question_count, created_at \
         FROM assignments WHERE attempt_id = $1",
    )
    .bind(attempt_id)
    .fetch_optional(conn)
    .await?;
    Ok(assignment)
}

/// Removes the assignment and every saved answer of an attempt.
pub async fn delete_assignment_and_answers(
    conn: &mut SqliteConnection,
    attempt_id: i64,
) -> Result<(), AppError> {
    sqlx::query("DELETE FROM answer_records WHERE attempt_id = $1")
        .bind(attempt_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM assignments WHERE attempt_id = $1")
        .bind(attempt_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn fetch_answer_records(
    conn: &mut SqliteConnection,
    attempt_id: i64,
) -> Result<Vec<AnswerRecord>, AppError> {
    let records = sqlx::query_as::<_, AnswerRecord>(
        "SELECT attempt_id, question_id, option_id, updated_at \
         FROM answer_records WHERE attempt_id = $1 ORDER BY question_id",
    )
    .bind(attempt_id)
    .fetch_all(conn)
    .await?;
    Ok(records)
}

/// Saved selections keyed by question id.
pub async fn fetch_selections(
    conn: &mut SqliteConnection,
    attempt_id: i64,
) -> Result<HashMap<i64, Option<i64>>, AppError> {
    Ok(fetch_answer_records(conn, attempt_id)
        .await?
        .into_iter()
        .map(|record| (record.question_id, record.option_id))
        .collect())
}

/// Insert-or-update keyed by (attempt, question); one row per key no matter how often it runs.
pub async fn upsert_answer(
    conn: &mut SqliteConnection,
    attempt_id: i64,
    question_id: i64,
    option_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO answer_records (attempt_id, question_id, option_id, updated_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT(attempt_id, question_id) DO UPDATE SET
            option_id = excluded.option_id,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(attempt_id)
    .bind(question_id)
    .bind(option_id)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn option_belongs_to_question(
    conn: &mut SqliteConnection,
    question_id: i64,
    option_id: i64,
) -> Result<bool, AppError> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT id FROM question_options WHERE id = $1 AND question_id = $2")
            .bind(option_id)
            .bind(question_id)
            .fetch_optional(conn)
            .await?;
    Ok(found.is_some())
}

async fn fetch_questions(
    conn: &mut SqliteConnection,
    question_ids: &[i64],
) -> Result<Vec<Question>, AppError> {
    if question_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder = QueryBuilder::<Sqlite>::new(
        "SELECT id, event_id, package_id, position, content, score_value FROM questions WHERE id IN (",
    );
    let mut separated = builder.separated(",");
    for id in question_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    Ok(builder.build_query_as::<Question>().fetch_all(conn).await?)
}

async fn fetch_options(
    conn: &mut SqliteConnection,
    question_ids: &[i64],
) -> Result<Vec<QuestionOption>, AppError> {
    if question_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder = QueryBuilder::<Sqlite>::new(
        "SELECT id, question_id, position, content, is_correct FROM question_options WHERE question_id IN (",
    );
    let mut separated = builder.separated(",");
    for id in question_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(") ORDER BY question_id, position, id");

    Ok(builder.build_query_as::<QuestionOption>().fetch_all(conn).await?)
}

/// Answer keys for the given questions.
pub async fn fetch_answer_keys(
    conn: &mut SqliteConnection,
    question_ids: &[i64],
) -> Result<HashMap<i64, AnswerKey>, AppError> {
    let questions = fetch_questions(&mut *conn, question_ids).await?;
    let options = fetch_options(&mut *conn, question_ids).await?;

    let mut correct: HashMap<i64, i64> = HashMap::new();
    for option in options.into_iter().filter(|o| o.is_correct) {
        correct.entry(option.question_id).or_insert(option.id);
    }

    Ok(questions
        .into_iter()
        .map(|q| {
            let key = AnswerKey {
                question_id: q.id,
                score_value: q.score_value,
                correct_option_id: correct.get(&q.id).copied(),
            };
            (q.id, key)
        })
        .collect())
}

/// Worker-facing payload for the given questions, in the given order, without correct flags.
pub async fn public_questions(
    conn: &mut SqliteConnection,
    question_ids: &[i64],
) -> Result<Vec<PublicQuestion>, AppError> {
    let questions = fetch_questions(&mut *conn, question_ids).await?;
    let options = fetch_options(&mut *conn, question_ids).await?;

    let mut options_by_question: HashMap<i64, Vec<PublicOption>> = HashMap::new();
    for option in options {
        options_by_question
            .entry(option.question_id)
            .or_default()
            .push(PublicOption {
                id: option.id,
                content: option.content,
            });
    }

    let mut by_id: HashMap<i64, Question> = questions.into_iter().map(|q| (q.id, q)).collect();
    Ok(question_ids
        .iter()
        .filter_map(|id| by_id.remove(id))
        .map(|q| PublicQuestion {
            options: options_by_question.remove(&q.id).unwrap_or_default(),
            id: q.id,
            content: q.content,
        })
        .collect())
}
