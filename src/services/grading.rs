// src/services/grading.rs

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    engine::grading::{GradeOutcome, QuestionSet, grade, mapping_applies, upgraded_level},
    error::AppError,
    models::{attempt::Attempt, competency::CompetencyMapping},
    services::store,
};

const COMPETENCY_SOURCE: &str = "assessment";

/// Grades an in-progress attempt from whatever answers are stored and marks it completed.
///
/// Used by worker submission and by close-early. A pass propagates competencies.
pub async fn complete_with_grade(
    conn: &mut SqliteConnection,
    attempt: &Attempt,
    set: &QuestionSet,
    now: DateTime<Utc>,
) -> Result<GradeOutcome, AppError> {
    let keys = store::fetch_answer_keys(&mut *conn, set.question_ids()).await?;
    let selections = store::fetch_selections(&mut *conn, attempt.id).await?;
    let outcome = grade(set, &keys, &selections, attempt.pass_percentage);

    let result = sqlx::query(
        r#"
        UPDATE attempts
        SET status = 'completed', score = $1, is_passed = $2, completed_at = $3, updated_at = $4
        WHERE id = $5 AND status = 'in_progress'
        "#,
    )
    .bind(outcome.score)
    .bind(outcome.passed)
    .bind(now)
    .bind(now)
    .bind(attempt.id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::InvalidState(
            "The attempt is no longer in progress.".to_string(),
        ));
    }

    tracing::info!(
        "Attempt {} graded: score {} ({})",
        attempt.id,
        outcome.score,
        if outcome.passed { "passed" } else { "failed" }
    );

    if outcome.passed {
        propagate_competencies(conn, attempt, outcome.score, now).await?;
    }

    Ok(outcome)
}

/// Raises the worker's competency levels granted by a passed attempt. Never lowers a level.
///
/// Returns the (competency item, new level) pairs that were written.
pub async fn propagate_competencies(
    conn: &mut SqliteConnection,
    attempt: &Attempt,
    score: i32,
    now: DateTime<Utc>,
) -> Result<Vec<(String, i32)>, AppError> {
    let mappings = sqlx::query_as::<_, CompetencyMapping>(
        "SELECT id, competency_item, category, title_pattern, level_granted, min_score \
         FROM competency_mappings WHERE lower(category) = lower($1) ORDER BY id",
    )
    .bind(&attempt.category)
    .fetch_all(&mut *conn)
    .await?;

    let mut upgraded = Vec::new();
    for mapping in mappings
        .iter()
        .filter(|m| mapping_applies(m, &attempt.category, &attempt.title, score))
    {
        let existing: Option<i32> = sqlx::query_scalar(
            "SELECT current_level FROM competency_levels WHERE worker_id = $1 AND competency_item = $2",
        )
        .bind(attempt.worker_id)
        .bind(&mapping.competency_item)
        .fetch_optional(&mut *conn)
        .await?;

        let Some(level) = upgraded_level(existing, mapping.level_granted) else {
            continue;
        };

        // The WHERE clause keeps the upgrade monotonic even against a concurrent writer.
        sqlx::query(
            r#"
            INSERT INTO competency_levels
                (worker_id, competency_item, current_level, source, source_attempt_id, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT(worker_id, competency_item) DO UPDATE SET
                current_level = excluded.current_level,
                source = excluded.source,
                source_attempt_id = excluded.source_attempt_id,
                updated_at = excluded.updated_at
            WHERE excluded.current_level > competency_levels.current_level
            "#,
        )
        .bind(attempt.worker_id)
        .bind(&mapping.competency_item)
        .bind(level)
        .bind(COMPETENCY_SOURCE)
        .bind(attempt.id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        tracing::info!(
            "Worker {} competency '{}' raised to level {}",
            attempt.worker_id,
            mapping.competency_item,
            level
        );
        upgraded.push((mapping.competency_item.clone(), level));
    }

    Ok(upgraded)
}
