use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use log::error;
use redis::{ Client, AsyncCommands };
use std::error::Error;
use crate::history::HistoryStore;
use crate::models::chat::StoredMessage;

/// History kept in one Redis sorted set, scored by creation time in millis.
pub struct RedisHistoryStore {
    client: Client,
    key: String,
}

impl RedisHistoryStore {
    pub fn new(host: &str, key: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        Ok(Self {
            client: Client::open(host)?,
            key: key.to_string(),
        })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }
}

#[async_trait]
impl HistoryStore for RedisHistoryStore {
    async fn add_message(&self, message: &StoredMessage) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut conn = self.get_connection().await?;
        let json_msg = serde_json::to_string(message)?;
        let _: i64 = conn.zadd(&self.key, json_msg, message.created_at.timestamp_millis()).await?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<StoredMessage>, Box<dyn Error + Send + Sync>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.get_connection().await?;
        let json_entries: Vec<String> = conn.zrevrange(&self.key, 0, (limit as isize) - 1).await?;
        let mut messages = Vec::with_capacity(json_entries.len());

        for json_entry in &json_entries {
            match serde_json::from_str::<StoredMessage>(json_entry) {
                Ok(msg) => messages.push(msg),
                Err(e) => {
                    error!("Error parsing history entry: {}", e);
                }
            }
        }
        messages.reverse();

        Ok(messages)
    }

    async fn purge_older_than(
        &self,
        cutoff: DateTime<Utc>
    ) -> Result<usize, Box<dyn Error + Send + Sync>> {
        let mut conn = self.get_connection().await?;
        // "(" makes the upper bound exclusive
        let max = format!("({}", cutoff.timestamp_millis());
        let removed: usize = conn.zrembyscore(&self.key, "-inf", max).await?;
        Ok(removed)
    }
}
