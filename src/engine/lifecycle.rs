// src/engine/lifecycle.rs

//! Pure lifecycle rules for a single attempt.
//!
//! Nothing in here touches storage. Every function takes the current time
//! explicitly so read paths stay free of hidden mutation; callers persist the
//! resulting transition on the next state-changing call.

use chrono::{DateTime, Duration, Utc};

use crate::{
    error::AppError,
    models::attempt::{Attempt, AttemptStatus},
};

/// Status as observed at `now`. A stored `Upcoming` whose schedule has passed reads as `Open`.
pub fn effective_status(attempt: &Attempt, now: DateTime<Utc>) -> AttemptStatus {
    match attempt.status {
        AttemptStatus::Upcoming if attempt.scheduled_at <= now => AttemptStatus::Open,
        status => status,
    }
}

/// True once an administrator's hard close has taken effect.
pub fn is_window_closed(attempt: &Attempt, now: DateTime<Utc>) -> bool {
    attempt
        .exam_window_close_at
        .is_some_and(|close_at| close_at <= now)
}

pub fn ensure_window_open(attempt: &Attempt, now: DateTime<Utc>) -> Result<(), AppError> {
    if is_window_closed(attempt, now) {
        return Err(AppError::ExamClosed);
    }
    Ok(())
}

/// How an accepted entry proceeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// First entry: the attempt moves to `InProgress` and `StartedAt` is stamped.
    Start,
    /// The attempt is already running; resume state is handed back.
    Resume,
}

/// Applies the status, hard-close and token gates for an entry by the owner.
///
/// `token_satisfied` is true when no token is needed, the caller holds an
/// administrator role, or a valid entry ticket accompanied the request.
pub fn check_entry(
    attempt: &Attempt,
    now: DateTime<Utc>,
    token_satisfied: bool,
) -> Result<EntryKind, AppError> {
    ensure_window_open(attempt, now)?;

    match effective_status(attempt, now) {
        AttemptStatus::Upcoming => Err(AppError::InvalidState(
            "This exam has not opened yet.".to_string(),
        )),
        AttemptStatus::Completed => Err(AppError::InvalidState(
            "This exam has already been completed.".to_string(),
        )),
        AttemptStatus::Abandoned => Err(AppError::InvalidState(
            "This exam was cancelled. Ask an administrator to reset it.".to_string(),
        )),
        AttemptStatus::InProgress if attempt.started_at.is_some() => Ok(EntryKind::Resume),
        AttemptStatus::Open | AttemptStatus::InProgress => {
            if attempt.is_token_required && attempt.started_at.is_none() && !token_satisfied {
                return Err(AppError::TokenRequired);
            }
            Ok(EntryKind::Start)
        }
    }
}

/// Remaining time and expiry flag reported to a resuming client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeTiming {
    pub remaining_seconds: i64,
    pub expired: bool,
}

pub fn resume_timing(attempt: &Attempt) -> ResumeTiming {
    let remaining = i64::from(attempt.duration_minutes) * 60 - attempt.elapsed_seconds;
    ResumeTiming {
        remaining_seconds: remaining.max(0),
        expired: remaining <= 0,
    }
}

/// Latest instant a submission is still accepted, measured from the server-side start time.
pub fn submission_deadline(attempt: &Attempt, grace_seconds: i64) -> Option<DateTime<Utc>> {
    attempt.started_at.map(|started| {
        started
            + Duration::minutes(i64::from(attempt.duration_minutes))
            + Duration::seconds(grace_seconds)
    })
}

/// Gates a final submission: must be running, inside the window and inside the grace period.
pub fn check_submission(
    attempt: &Attempt,
    now: DateTime<Utc>,
    grace_seconds: i64,
) -> Result<(), AppError> {
    ensure_window_open(attempt, now)?;

    if effective_status(attempt, now) != AttemptStatus::InProgress {
        return Err(AppError::InvalidState(format!(
            "Cannot submit an attempt that is {}.",
            attempt.status.as_str()
        )));
    }

    let deadline = submission_deadline(attempt, grace_seconds).ok_or_else(|| {
        AppError::InvalidState("This attempt has not been started.".to_string())
    })?;

    if now > deadline {
        return Err(AppError::TimeExpired);
    }
    Ok(())
}

/// Answers can only be written while the attempt is running and the window is open.
pub fn check_answer_write(attempt: &Attempt, now: DateTime<Utc>) -> Result<(), AppError> {
    ensure_window_open(attempt, now)?;
    if attempt.status != AttemptStatus::InProgress {
        return Err(AppError::InvalidState(format!(
            "Answers cannot be saved while the attempt is {}.",
            effective_status(attempt, now).as_str()
        )));
    }
    Ok(())
}

/// Worker self-cancel is only possible before the attempt is finished.
pub fn check_abandon(attempt: &Attempt, now: DateTime<Utc>) -> Result<(), AppError> {
    match effective_status(attempt, now) {
        AttemptStatus::Open | AttemptStatus::InProgress => Ok(()),
        status => Err(AppError::InvalidState(format!(
            "Cannot abandon an attempt that is {}.",
            status.as_str()
        ))),
    }
}

/// Statuses an administrator's single force-close applies to.
pub fn check_force_close(attempt: &Attempt, now: DateTime<Utc>) -> Result<(), AppError> {
    match effective_status(attempt, now) {
        AttemptStatus::Open | AttemptStatus::InProgress => Ok(()),
        status => Err(AppError::InvalidState(format!(
            "Only open or in-progress attempts can be force-closed (attempt is {}).",
            status.as_str()
        ))),
    }
}

pub fn check_reset(attempt: &Attempt) -> Result<(), AppError> {
    match attempt.status {
        AttemptStatus::InProgress | AttemptStatus::Completed | AttemptStatus::Abandoned => Ok(()),
        status => Err(AppError::InvalidState(format!(
            "Nothing to reset: attempt is {}.",
            status.as_str()
        ))),
    }
}

/// Reshuffling is only allowed before work has started (or after it was abandoned).
pub fn can_reshuffle(attempt: &Attempt, now: DateTime<Utc>) -> bool {
    matches!(
        effective_status(attempt, now),
        AttemptStatus::Upcoming | AttemptStatus::Open | AttemptStatus::Abandoned
    )
}

/// Hint for a polling client once its attempt is closed.
pub fn redirect_hint(status: AttemptStatus, closed: bool) -> Option<&'static str> {
    match status {
        AttemptStatus::Completed => Some("results"),
        AttemptStatus::Abandoned => Some("attempts"),
        _ if closed => Some("attempts"),
        _ => None,
    }
}
