//! Optional per-session state (spec §4.5 "Tool sessions"): a lookup-by-id
//! map orthogonal to the database-selection concurrency model above. Stdio
//! clients share the well-known `local` session.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

pub const LOCAL_SESSION_ID: &str = "local";

#[derive(Clone, Debug)]
pub struct ToolSession {
    pub id: String,
    pub user_id: Option<String>,
    pub active_operations: u64,
    pub metadata: Value,
    pub last_activity: DateTime<Utc>,
}

impl ToolSession {
    fn new(id: String) -> Self {
        Self {
            id,
            user_id: None,
            active_operations: 0,
            metadata: Value::Null,
            last_activity: Utc::now(),
        }
    }
}

/// A plain lookup-by-id map; does not participate in the generation/active-
/// ops concurrency model that guards database selection.
#[derive(Default)]
pub struct ToolSessionRegistry {
    sessions: RwLock<HashMap<String, ToolSession>>,
}

impl ToolSessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_create(&self, id: &str) -> ToolSession {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(id.to_string())
            .or_insert_with(|| ToolSession::new(id.to_string()))
            .clone()
    }

    pub async fn touch(&self, id: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(id) {
            session.last_activity = Utc::now();
        }
    }

    /// Evicts sessions whose `last_activity` is older than `ttl`. The
    /// well-known `local` session is never evicted.
    pub async fn evict_expired(&self, ttl: chrono::Duration) {
        let cutoff = Utc::now() - ttl;
        let mut sessions = self.sessions.write().await;
        sessions.retain(|id, s| id == LOCAL_SESSION_ID || s.last_activity > cutoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn eviction_never_removes_the_local_session() {
        let registry = ToolSessionRegistry::new();
        registry.get_or_create(LOCAL_SESSION_ID).await;
        registry.get_or_create("other").await;

        registry.evict_expired(chrono::Duration::seconds(-1)).await;

        let local = registry.get_or_create(LOCAL_SESSION_ID).await;
        assert_eq!(local.id, LOCAL_SESSION_ID);
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent_for_an_existing_session() {
        let registry = ToolSessionRegistry::new();
        let first = registry.get_or_create("abc").await;
        registry.touch("abc").await;
        let second = registry.get_or_create("abc").await;
        assert_eq!(first.id, second.id);
        assert!(second.last_activity >= first.last_activity);
    }
}
