use std::{sync::Arc, time::Duration};

use crate::cache::StatusCache;
use crate::config::Config;
use crate::services::audit::{AuditLog, SqliteAuditLog};
use axum::extract::FromRef;
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub status_cache: StatusCache,
    pub audit: Arc<dyn AuditLog>,
}

impl AppState {
    /// State with the default database-backed audit log.
    pub fn new(pool: SqlitePool, config: Config) -> Self {
        let status_cache = StatusCache::new(Duration::from_secs(config.status_cache_ttl_seconds));
        let audit = Arc::new(SqliteAuditLog::new(pool.clone()));
        Self {
            pool,
            config,
            status_cache,
            audit,
        }
    }
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
