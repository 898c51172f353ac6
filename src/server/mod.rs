pub mod api;
pub mod room;
pub mod websocket;

use crate::cli::ServeArgs;
use crate::history::HistoryStore;
use room::ChatRoom;
use log::info;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

pub struct Server {
    room: Arc<ChatRoom>,
    args: ServeArgs,
}

impl Server {
    pub fn new(history: Arc<dyn HistoryStore>, args: ServeArgs) -> Self {
        let room = Arc::new(ChatRoom::new(history, args.broadcast_capacity));
        Self { room, args }
    }

    pub fn room(&self) -> Arc<ChatRoom> {
        Arc::clone(&self.room)
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let cleanup_every = Duration::from_secs(self.args.cleanup_interval_secs.max(1));
        info!(
            "Purging messages older than {} hours every {}s",
            self.args.retention_hours,
            cleanup_every.as_secs()
        );
        let cleanup = room::spawn_cleanup_task(self.room(), self.args.retention(), cleanup_every);

        if let Some(http_port) = self.args.http_port {
            self.start_http_server(http_port).await?;
        }

        let result = self.start_ws_server().await;
        cleanup.abort();
        result
    }

    async fn start_http_server(&self, http_port: u16) -> Result<(), Box<dyn Error + Send + Sync>> {
        api::start_http_server(http_port, self.room(), self.args.clone()).await
    }

    async fn start_ws_server(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        websocket::start_ws_server(self.room(), self.args.clone()).await
    }
}
