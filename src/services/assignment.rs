// src/services/assignment.rs

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, types::Json};

use crate::{
    engine::{
        assignment::{common_length, draw_questions, fresh_rng},
        grading::QuestionSet,
    },
    error::AppError,
    models::{assignment::Assignment, attempt::Attempt},
    services::store,
};

fn assigned(assignment: Assignment) -> QuestionSet {
    QuestionSet::Assigned {
        question_count: usize::try_from(assignment.question_count).unwrap_or_default(),
        question_ids: assignment.question_ids.0,
    }
}

/// Question count every package of the event can currently supply.
pub async fn live_question_count(
    conn: &mut SqliteConnection,
    event_id: i64,
) -> Result<usize, AppError> {
    let packages = store::package_question_ids(conn, event_id).await?;
    Ok(common_length(&packages))
}

/// The attempt's existing question set: its assignment if it has one, else the legacy set.
pub async fn load_question_set(
    conn: &mut SqliteConnection,
    attempt: &Attempt,
) -> Result<QuestionSet, AppError> {
    if let Some(assignment) = store::fetch_assignment(&mut *conn, attempt.id).await? {
        return Ok(assigned(assignment));
    }
    let question_ids = store::legacy_question_ids(conn, attempt.event_id).await?;
    Ok(QuestionSet::Legacy { question_ids })
}

/// Returns the attempt's question set, drawing and storing an assignment on first use.
///
/// Events without packages use the legacy set and never get an assignment row.
/// Concurrent first entries race on the unique `attempt_id`; the loser reads the winner's row.
pub async fn ensure_question_set(
    conn: &mut SqliteConnection,
    attempt: &Attempt,
    now: DateTime<Utc>,
) -> Result<QuestionSet, AppError> {
    if let Some(assignment) = store::fetch_assignment(&mut *conn, attempt.id).await? {
        return Ok(assigned(assignment));
    }

    let packages = store::package_question_ids(&mut *conn, attempt.event_id).await?;
    if packages.is_empty() {
        let question_ids = store::legacy_question_ids(conn, attempt.event_id).await?;
        return Ok(QuestionSet::Legacy { question_ids });
    }

    let question_count = common_length(&packages);
    let question_ids = {
        let mut rng = fresh_rng();
        draw_questions(&packages, &mut rng)
    };

    tracing::debug!(
        "Drew {} questions from {} packages for attempt {}",
        question_ids.len(),
        packages.len(),
        attempt.id
    );

    sqlx::query(
        r#"
        INSERT INTO assignments (attempt_id, worker_id, question_ids, question_count, created_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT(attempt_id) DO NOTHING
        "#,
    )
    .bind(attempt.id)
    .bind(attempt.worker_id)
    .bind(Json(&question_ids))
    .bind(question_count as i64)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let stored = store::fetch_assignment(conn, attempt.id)
        .await?
        .ok_or_else(|| AppError::InternalServerError("Assignment vanished after insert".to_string()))?;
    Ok(assigned(stored))
}

/// Discards the attempt's assignment and saved answers and draws a fresh one.
pub async fn redraw(
    conn: &mut SqliteConnection,
    attempt: &Attempt,
    now: DateTime<Utc>,
) -> Result<QuestionSet, AppError> {
    store::delete_assignment_and_answers(&mut *conn, attempt.id).await?;
    ensure_question_set(conn, attempt, now).await
}
