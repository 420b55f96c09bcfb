//! Offline message queues.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use log::debug;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::handle::SessionHandle;
use super::presence::PresenceRegistry;
use super::protocol::Reply;

/// A message held for a recipient who was offline at send time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoEntry {
    pub id: Uuid,
    pub sender: String,
    pub recipient: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl MemoEntry {
    pub fn new(sender: &str, recipient: &str, content: &str) -> Self {
        MemoEntry {
            id: Uuid::new_v4(),
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    /// The line a recipient sees for this memo
    pub fn to_reply(&self) -> Reply {
        Reply::info(format!("{}: {}", self.sender, self.content))
    }
}

/// Outcome of [`MemoStore::queue_unless_present`]
#[derive(Debug)]
pub enum Delivery {
    /// Recipient is online; the caller delivers through this handle
    Live(SessionHandle),
    Queued(Uuid),
}

#[derive(Default)]
pub struct MemoStore {
    queues: Mutex<HashMap<String, VecDeque<MemoEntry>>>,
}

impl MemoStore {
    pub fn new() -> Self {
        MemoStore::default()
    }

    /// Queue a memo unconditionally
    pub async fn enqueue(&self, entry: MemoEntry) -> Uuid {
        let id = entry.id;
        let mut queues = self.queues.lock().await;
        debug!("Queued memo {} from {} for {}", id, entry.sender, entry.recipient);
        queues.entry(entry.recipient.clone()).or_default().push_back(entry);
        id
    }

    /// Queue a memo only if the recipient has a live session.
    ///
    /// Presence is checked while the queue lock is held, and a login drains
    /// its queue and becomes present under that same lock (see
    /// [`MemoStore::deliver_and_register`]). A memo is therefore either handed
    /// to a live session or drained by the recipient's next login. Closed
    /// sessions still listed as present count as offline.
    pub async fn queue_unless_present(
        &self,
        presence: &PresenceRegistry,
        sender: &str,
        recipient: &str,
        content: &str,
    ) -> Delivery {
        let mut queues = self.queues.lock().await;
        if let Some(handle) = presence.get(recipient).await.filter(|h| !h.is_closed()) {
            return Delivery::Live(handle);
        }
        let entry = MemoEntry::new(sender, recipient, content);
        let id = entry.id;
        debug!("Queued memo {} from {} for {}", id, sender, recipient);
        queues.entry(recipient.to_string()).or_default().push_back(entry);
        Delivery::Queued(id)
    }

    /// Send `recipient`'s queued memos to `handle`, oldest first, then make
    /// it present. Returns how many memos went out.
    ///
    /// Both steps happen under the queue lock, so no live message can reach
    /// the session ahead of an older memo.
    pub async fn deliver_and_register(&self, presence: &PresenceRegistry, recipient: &str, handle: SessionHandle) -> usize {
        let mut queues = self.queues.lock().await;
        let memos = queues.remove(recipient).unwrap_or_default();
        if !memos.is_empty() {
            debug!("Delivering {} memo(s) to {}", memos.len(), recipient);
        }
        for memo in &memos {
            handle.send(&memo.to_reply());
        }
        presence.insert(recipient, handle).await;
        memos.len()
    }

    /// Remove and return every memo for `recipient`, oldest first
    pub async fn take_all(&self, recipient: &str) -> Vec<MemoEntry> {
        self.queues
            .lock()
            .await
            .remove(recipient)
            .map(Vec::from)
            .unwrap_or_default()
    }

    pub async fn pending_for(&self, recipient: &str) -> usize {
        self.queues.lock().await.get(recipient).map_or(0, VecDeque::len)
    }

    pub async fn total_pending(&self) -> usize {
        self.queues.lock().await.values().map(VecDeque::len).sum()
    }
}
