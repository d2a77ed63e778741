//! Per-user conversation memory fed back to the chat model.

use std::collections::{HashMap, VecDeque};

use tokio::sync::Mutex;

use crate::{domain::UserId, model::ChatMessage};

/// Bounded history: only the `limit` most recent messages per user are kept.
pub struct ChatHistory {
    limit: usize,
    entries: Mutex<HashMap<UserId, VecDeque<ChatMessage>>>,
}

impl ChatHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub async fn recent(&self, user_id: UserId) -> Vec<ChatMessage> {
        self.entries
            .lock()
            .await
            .get(&user_id)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn append(&self, user_id: UserId, messages: impl IntoIterator<Item = ChatMessage>) {
        let mut entries = self.entries.lock().await;
        let queue = entries.entry(user_id).or_default();
        for m in messages {
            queue.push_back(m);
        }
        while queue.len() > self.limit {
            queue.pop_front();
        }
    }

    /// Record a profile change as a system note; the model sees it on the next turn.
    pub async fn note_config_update(&self, user_id: UserId, note: &str) {
        self.append(
            user_id,
            [ChatMessage::system(format!("[CONFIG UPDATE] {note}"))],
        )
        .await;
    }

    pub async fn clear(&self, user_id: UserId) {
        self.entries.lock().await.remove(&user_id);
    }
}
