//! Who is online right now.

use std::collections::HashMap;

use log::{trace, warn};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::handle::SessionHandle;

/// Logged-in username -> live session handle
#[derive(Default)]
pub struct PresenceRegistry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        PresenceRegistry::default()
    }

    /// Register `handle` as the live session for `username`
    pub async fn insert(&self, username: &str, handle: SessionHandle) {
        let previous = self.sessions.write().await.insert(username.to_string(), handle);
        if let Some(prev) = previous {
            // Unreachable while account.online guards logins; keep the newest.
            warn!("Replaced stale presence entry for {} (session {})", username, prev.id());
        }
        trace!("{} is now present", username);
    }

    /// Remove `username` only if it is still bound to `session_id`
    pub async fn remove(&self, username: &str, session_id: Uuid) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(username) {
            Some(h) if h.id() == session_id => {
                sessions.remove(username);
                trace!("{} is no longer present", username);
                true
            }
            _ => false,
        }
    }

    pub async fn get(&self, username: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(username).cloned()
    }

    pub async fn contains(&self, username: &str) -> bool {
        self.sessions.read().await.contains_key(username)
    }

    /// Point-in-time copy of the table, sorted by username.
    ///
    /// Callers iterate the copy so no registry lock is held while they talk
    /// to other sessions.
    pub async fn snapshot(&self) -> Vec<(String, SessionHandle)> {
        let mut entries: Vec<_> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(name, h)| (name.clone(), h.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
