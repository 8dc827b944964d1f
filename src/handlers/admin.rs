// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        competency::CreateMappingRequest,
        event::CreateEventRequest,
        question::{CreatePackageRequest, CreateQuestionsRequest},
    },
    services::{
        audit::{AuditAction, AuditEntry, record_quietly},
        events, overrides,
    },
    state::AppState,
    utils::jwt::Claims,
};

async fn audit(
    state: &AppState,
    claims: &Claims,
    action: AuditAction,
    target: String,
    detail: serde_json::Value,
) -> Result<(), AppError> {
    let actor_id = claims.worker_id()?;
    record_quietly(state.audit.as_ref(), AuditEntry::new(actor_id, action, target, detail)).await;
    Ok(())
}

/// Creates an event and invites the listed workers.
/// Admin only.
pub async fn create_event(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateEventRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let created = events::create_event(&state.pool, payload, Utc::now()).await?;
    audit(
        &state,
        &claims,
        AuditAction::EventCreated,
        format!("event:{}", created.id),
        json!({ "attempts": created.attempt_ids.len() }),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// Deletes an event with its attempts and question bank.
/// Admin only.
pub async fn delete_event(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(event_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    events::delete_event(&state.pool, event_id).await?;
    state.status_cache.invalidate_event(event_id).await;
    audit(
        &state,
        &claims,
        AuditAction::EventDeleted,
        format!("event:{}", event_id),
        json!({}),
    )
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_event_attempts(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempts = events::list_event_attempts(&state.pool, event_id, Utc::now()).await?;
    Ok(Json(attempts))
}

pub async fn add_package(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(event_id): Path<i64>,
    Json(payload): Json<CreatePackageRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let (package_id, question_ids) =
        events::add_package(&state.pool, event_id, &payload.name, &payload.questions).await?;
    audit(
        &state,
        &claims,
        AuditAction::PackageAdded,
        format!("event:{}", event_id),
        json!({ "package_id": package_id, "questions": question_ids.len() }),
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": package_id, "question_ids": question_ids })),
    ))
}

pub async fn add_legacy_questions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(event_id): Path<i64>,
    Json(payload): Json<CreateQuestionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let question_ids =
        events::add_legacy_questions(&state.pool, event_id, &payload.questions).await?;
    audit(
        &state,
        &claims,
        AuditAction::QuestionsAdded,
        format!("event:{}", event_id),
        json!({ "questions": question_ids.len() }),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(json!({ "question_ids": question_ids }))))
}

/// Closes the exam window for every attempt of the event and grades running attempts.
pub async fn close_early(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(event_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let report = overrides::close_early(&state.pool, event_id, Utc::now()).await?;
    state.status_cache.invalidate_event(event_id).await;
    audit(
        &state,
        &claims,
        AuditAction::CloseEarly,
        format!("event:{}", event_id),
        json!({ "locked": report.locked, "graded": report.graded }),
    )
    .await?;

    Ok(Json(report))
}

pub async fn force_close_all(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(event_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let report = overrides::force_close_all(&state.pool, event_id, Utc::now()).await?;
    state.status_cache.invalidate_event(event_id).await;
    audit(
        &state,
        &claims,
        AuditAction::ForceCloseAll,
        format!("event:{}", event_id),
        json!({ "abandoned": report.abandoned }),
    )
    .await?;

    Ok(Json(report))
}

pub async fn reshuffle_event(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(event_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let report = overrides::reshuffle_event(&state.pool, event_id, Utc::now()).await?;
    state.status_cache.invalidate_event(event_id).await;
    audit(
        &state,
        &claims,
        AuditAction::ReshuffleEvent,
        format!("event:{}", event_id),
        json!({ "reshuffled": report.reshuffled, "skipped": report.skipped }),
    )
    .await?;

    Ok(Json(report))
}

pub async fn force_close(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = overrides::force_close(&state.pool, attempt_id, Utc::now()).await?;
    state.status_cache.invalidate(attempt_id).await;
    audit(
        &state,
        &claims,
        AuditAction::ForceClose,
        format!("attempt:{}", attempt_id),
        json!({ "worker_id": attempt.worker_id }),
    )
    .await?;

    Ok(Json(json!({ "id": attempt.id, "status": attempt.status, "score": attempt.score })))
}

/// Archives the attempt to history and reopens it for a retake.
pub async fn reset_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempt_number = overrides::reset(&state.pool, attempt_id, Utc::now()).await?;
    state.status_cache.invalidate(attempt_id).await;
    audit(
        &state,
        &claims,
        AuditAction::ResetAttempt,
        format!("attempt:{}", attempt_id),
        json!({ "attempt_number": attempt_number }),
    )
    .await?;

    Ok(Json(json!({ "id": attempt_id, "attempt_number": attempt_number })))
}

pub async fn reshuffle_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let question_ids = overrides::reshuffle_attempt(&state.pool, attempt_id, Utc::now()).await?;
    state.status_cache.invalidate(attempt_id).await;
    audit(
        &state,
        &claims,
        AuditAction::ReshuffleAttempt,
        format!("attempt:{}", attempt_id),
        json!({ "questions": question_ids.len() }),
    )
    .await?;

    Ok(Json(json!({ "id": attempt_id, "question_ids": question_ids })))
}

pub async fn create_mapping(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateMappingRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let id = events::create_mapping(&state.pool, &payload).await?;
    audit(
        &state,
        &claims,
        AuditAction::MappingCreated,
        format!("mapping:{}", id),
        json!({ "competency_item": payload.competency_item, "level": payload.level_granted }),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

pub async fn worker_competencies(
    State(state): State<AppState>,
    Path(worker_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let levels = events::worker_competencies(&state.pool, worker_id).await?;
    Ok(Json(levels))
}

pub async fn worker_history(
    State(state): State<AppState>,
    Path(worker_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let history = events::worker_history(&state.pool, worker_id).await?;
    Ok(Json(history))
}
