// src/services/audit.rs

//! Audit trail for administrative overrides.
//!
//! Entries are written after the action they describe has committed. A failed
//! write is logged and dropped; it never undoes the action.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::AppError;

/// Administrative action being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    EventCreated,
    EventDeleted,
    PackageAdded,
    QuestionsAdded,
    CloseEarly,
    ForceCloseAll,
    ForceClose,
    ResetAttempt,
    ReshuffleAttempt,
    ReshuffleEvent,
    MappingCreated,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::EventCreated => "event_created",
            AuditAction::EventDeleted => "event_deleted",
            AuditAction::PackageAdded => "package_added",
            AuditAction::QuestionsAdded => "questions_added",
            AuditAction::CloseEarly => "close_early",
            AuditAction::ForceCloseAll => "force_close_all",
            AuditAction::ForceClose => "force_close",
            AuditAction::ResetAttempt => "reset_attempt",
            AuditAction::ReshuffleAttempt => "reshuffle_attempt",
            AuditAction::ReshuffleEvent => "reshuffle_event",
            AuditAction::MappingCreated => "mapping_created",
        }
    }
}

/// A single audit log entry.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub actor_id: i64,
    pub action: AuditAction,
    /// e.g. "event:3" or "attempt:17"
    pub target: String,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        actor_id: i64,
        action: AuditAction,
        target: impl Into<String>,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            actor_id,
            action,
            target: target.into(),
            detail,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, entry: &AuditEntry) -> Result<(), AppError>;
}

/// Writes entries to the `audit_log` table.
pub struct SqliteAuditLog {
    pool: SqlitePool,
}

impl SqliteAuditLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLog for SqliteAuditLog {
    async fn record(&self, entry: &AuditEntry) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO audit_log (actor_id, action, target, detail, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(entry.actor_id)
        .bind(entry.action.as_str())
        .bind(&entry.target)
        .bind(entry.detail.to_string())
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Records `entry`, swallowing any failure.
pub async fn record_quietly(log: &dyn AuditLog, entry: AuditEntry) {
    tracing::info!(
        actor = entry.actor_id,
        action = entry.action.as_str(),
        target = %entry.target,
        "admin action"
    );
    if let Err(e) = log.record(&entry).await {
        tracing::warn!("Failed to write audit entry for {}: {}", entry.target, e);
    }
}
