use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use std::collections::VecDeque;
use std::error::Error;
use tokio::sync::RwLock;
use crate::history::HistoryStore;
use crate::models::chat::StoredMessage;

/// Process-local history; lost on restart.
#[derive(Default)]
pub struct MemoryHistoryStore {
    messages: RwLock<VecDeque<StoredMessage>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn add_message(&self, message: &StoredMessage) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.messages.write().await.push_back(message.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<StoredMessage>, Box<dyn Error + Send + Sync>> {
        let messages = self.messages.read().await;
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.iter().skip(skip).cloned().collect())
    }

    async fn purge_older_than(
        &self,
        cutoff: DateTime<Utc>
    ) -> Result<usize, Box<dyn Error + Send + Sync>> {
        let mut messages = self.messages.write().await;
        let before = messages.len();
        messages.retain(|m| m.created_at >= cutoff);
        Ok(before - messages.len())
    }
}
