use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{ debug, error, info };
use tokio::sync::{ broadcast, Mutex };
use tokio::task::JoinHandle;
use tokio::time::{ Interval, MissedTickBehavior };

use crate::history::HistoryStore;
use crate::models::chat::{ ChatMessage, StoredMessage };

/// Shared state of the single chat room: history plus fan-out to every
/// connected client.
pub struct ChatRoom {
    history: Arc<dyn HistoryStore>,
    sender: broadcast::Sender<ChatMessage>,
    // held across store + broadcast so history order matches delivery order
    publish_lock: Mutex<()>,
}

impl ChatRoom {
    pub fn new(history: Arc<dyn HistoryStore>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { history, sender, publish_lock: Mutex::new(()) }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatMessage> {
        self.sender.subscribe()
    }

    /// Stamps `text` with the sender and current time, stores it and
    /// broadcasts it to all subscribers, the sender included.
    pub async fn publish(&self, username: &str, text: &str) -> ChatMessage {
        let _order = self.publish_lock.lock().await;
        let stored = StoredMessage::new(username, text);
        if let Err(e) = self.history.add_message(&stored).await {
            error!("Failed to store message from {}: {}", username, e);
        }

        let msg = stored.to_chat_message();
        match self.sender.send(msg.clone()) {
            Ok(receivers) => debug!("Broadcast message from {} to {} clients", username, receivers),
            Err(_) => debug!("No clients connected, message from {} not broadcast", username),
        }
        msg
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<ChatMessage>, Box<dyn Error + Send + Sync>> {
        let stored = self.history.recent(limit).await?;
        Ok(stored.iter().map(StoredMessage::to_chat_message).collect())
    }

    pub async fn purge_expired(
        &self,
        retention: chrono::Duration
    ) -> Result<usize, Box<dyn Error + Send + Sync>> {
        let removed = self.history.purge_older_than(Utc::now() - retention).await?;
        if removed > 0 {
            info!("Purged {} messages older than {} hours", removed, retention.num_hours());
        }
        Ok(removed)
    }
}

fn cleanup_ticker(every: Duration) -> Interval {
    let mut ticker = tokio::time::interval(every);
    // a slow store must not trigger back-to-back sweeps afterwards
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

pub fn spawn_cleanup_task(
    room: Arc<ChatRoom>,
    retention: chrono::Duration,
    every: Duration
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = cleanup_ticker(every);
        loop {
            ticker.tick().await;
            if let Err(e) = room.purge_expired(retention).await {
                error!("History cleanup failed: {}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistoryStore;

    #[tokio::test]
    async fn publish_stores_and_broadcasts() {
        let room = ChatRoom::new(Arc::new(MemoryHistoryStore::new()), 16);
        let mut first = room.subscribe();
        let mut second = room.subscribe();

        let sent = room.publish("alice", "hi all").await;
        assert_eq!(sent.username, "alice");
        assert_eq!(sent.message, "hi all");

        assert_eq!(first.recv().await.unwrap(), sent);
        assert_eq!(second.recv().await.unwrap(), sent);
        assert_eq!(room.recent(10).await.unwrap(), vec![sent]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_publishes_keep_history_in_delivery_order() {
        let room = Arc::new(ChatRoom::new(Arc::new(MemoryHistoryStore::new()), 1024));
        let mut listener = room.subscribe();

        let tasks: Vec<_> = (0..8)
            .map(|writer| {
                let room = Arc::clone(&room);
                tokio::spawn(async move {
                    for n in 0..25 {
                        room.publish(&format!("writer{writer}"), &format!("{writer}-{n}")).await;
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let mut delivered = Vec::new();
        for _ in 0..200 {
            delivered.push(listener.recv().await.unwrap().message);
        }
        let stored: Vec<_> = room
            .recent(200).await
            .unwrap()
            .into_iter()
            .map(|m| m.message)
            .collect();
        assert_eq!(stored, delivered);
    }

    #[tokio::test]
    async fn cleanup_ticker_delays_missed_ticks() {
        let ticker = cleanup_ticker(Duration::from_secs(300));
        assert_eq!(ticker.missed_tick_behavior(), MissedTickBehavior::Delay);
        assert_eq!(ticker.period(), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn publish_without_subscribers_still_stores() {
        let room = ChatRoom::new(Arc::new(MemoryHistoryStore::new()), 16);
        room.publish("bob", "anyone?").await;
        assert_eq!(room.recent(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn purge_keeps_fresh_messages() {
        let history = Arc::new(MemoryHistoryStore::new());
        history
            .add_message(&StoredMessage::at("old", "stale", Utc::now() - chrono::Duration::days(3))).await
            .unwrap();
        let room = ChatRoom::new(history, 16);
        room.publish("new", "fresh").await;

        assert_eq!(room.purge_expired(chrono::Duration::hours(48)).await.unwrap(), 1);
        let left = room.recent(10).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].message, "fresh");
    }
}
