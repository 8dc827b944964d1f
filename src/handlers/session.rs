// src/handlers/session.rs

//! Worker-facing attempt endpoints.

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;

use crate::{
    error::AppError,
    models::{
        answer::{SaveAnswerRequest, SubmitAttemptRequest},
        attempt::{EnterAttemptRequest, UpdateProgressRequest, VerifyTokenRequest, VerifyTokenResponse},
    },
    services::session,
    state::AppState,
    utils::jwt::{Claims, sign_entry_ticket, ticket_grants_entry},
};

/// Lists the caller's own attempts with their status as of now.
pub async fn list_my_attempts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let worker_id = claims.worker_id()?;
    let attempts = session::list_my_attempts(&state.pool, worker_id, Utc::now()).await?;
    Ok(Json(attempts))
}

/// Checks the access token and hands back a short-lived entry ticket.
pub async fn verify_token(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
    Json(payload): Json<VerifyTokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    let worker_id = claims.worker_id()?;
    session::verify_access_token(&state.pool, attempt_id, worker_id, &payload.token, Utc::now())
        .await?;

    let ttl = state.config.entry_ticket_ttl_seconds;
    let ticket = sign_entry_ticket(worker_id, attempt_id, &state.config.jwt_secret, ttl)?;

    Ok(Json(VerifyTokenResponse {
        ticket,
        expires_in: ttl,
    }))
}

/// Starts or resumes an attempt.
pub async fn enter_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
    payload: Option<Json<EnterAttemptRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let worker_id = claims.worker_id()?;
    let Json(payload) = payload.unwrap_or_default();

    let token_satisfied = claims.is_admin()
        || payload.ticket.as_deref().is_some_and(|ticket| {
            ticket_grants_entry(ticket, &state.config.jwt_secret, worker_id, attempt_id)
        });

    let result =
        session::enter_attempt(&state.pool, attempt_id, worker_id, token_satisfied, Utc::now())
            .await;
    state.status_cache.invalidate(attempt_id).await;

    Ok(Json(result?))
}

pub async fn save_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
    Json(payload): Json<SaveAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let worker_id = claims.worker_id()?;
    session::save_answer(
        &state.pool,
        attempt_id,
        worker_id,
        payload.question_id,
        payload.option_id,
        Utc::now(),
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_answers(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let worker_id = claims.worker_id()?;
    let answers =
        session::get_answers(&state.pool, attempt_id, worker_id, claims.is_admin()).await?;
    Ok(Json(answers))
}

pub async fn update_progress(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
    Json(payload): Json<UpdateProgressRequest>,
) -> Result<impl IntoResponse, AppError> {
    let worker_id = claims.worker_id()?;
    session::update_progress(
        &state.pool,
        attempt_id,
        worker_id,
        payload.elapsed_seconds,
        payload.last_active_page,
        Utc::now(),
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Final submission. Grades the attempt and returns the outcome.
pub async fn submit_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
    payload: Option<Json<SubmitAttemptRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let worker_id = claims.worker_id()?;
    let Json(payload) = payload.unwrap_or_default();

    let outcome = session::submit_attempt(
        &state.pool,
        attempt_id,
        worker_id,
        &payload.answers,
        state.config.submit_grace_seconds,
        Utc::now(),
    )
    .await?;
    state.status_cache.invalidate(attempt_id).await;

    Ok(Json(outcome))
}

pub async fn abandon_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let worker_id = claims.worker_id()?;
    session::abandon_attempt(&state.pool, attempt_id, worker_id, Utc::now()).await?;
    state.status_cache.invalidate(attempt_id).await;
    Ok(StatusCode::NO_CONTENT)
}

/// Lightweight poll used by the exam page to notice an administrative close.
pub async fn check_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let worker_id = claims.worker_id()?;
    let status = session::check_status(
        &state.pool,
        &state.status_cache,
        attempt_id,
        worker_id,
        claims.is_admin(),
        Utc::now(),
    )
    .await?;
    Ok(Json(status))
}
