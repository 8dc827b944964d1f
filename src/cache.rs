// src/cache.rs

//! Short-lived, per-attempt cache for the status polling endpoint.
//!
//! A stale entry can only delay a close notification, never report a closed
//! attempt as open for longer than the TTL.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::RwLock;

use crate::models::attempt::AttemptStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedStatus {
    pub event_id: i64,
    pub worker_id: i64,
    pub status: AttemptStatus,
    pub closed: bool,
}

#[derive(Clone)]
pub struct StatusCache {
    ttl: Duration,
    entries: Arc<RwLock<HashMap<i64, (Instant, CachedStatus)>>>,
}

impl StatusCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn get(&self, attempt_id: i64) -> Option<CachedStatus> {
        let entries = self.entries.read().await;
        entries
            .get(&attempt_id)
            .filter(|(stored_at, _)| stored_at.elapsed() < self.ttl)
            .map(|(_, status)| *status)
    }

    pub async fn put(&self, attempt_id: i64, status: CachedStatus) {
        if self.ttl.is_zero() {
            return;
        }
        let mut entries = self.entries.write().await;
        entries.retain(|_, (stored_at, _)| stored_at.elapsed() < self.ttl);
        entries.insert(attempt_id, (Instant::now(), status));
    }

    pub async fn invalidate(&self, attempt_id: i64) {
        self.entries.write().await.remove(&attempt_id);
    }

    pub async fn invalidate_event(&self, event_id: i64) {
        self.entries
            .write()
            .await
            .retain(|_, (_, status)| status.event_id != event_id);
    }
}
