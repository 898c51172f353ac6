use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the chat server (WebSocket broadcast + optional HTTP history API)
    Serve(ServeArgs),
    /// Join a chat server from the terminal
    Join(JoinArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    /// Host address and port for the WebSocket server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:8765")]
    pub server_addr: String,

    /// Optional port for the HTTP API (message history, health check).
    #[arg(long, env = "HTTP_PORT")]
    pub http_port: Option<u16>,

    // --- History Store Args ---
    /// Chat history store type (memory, redis)
    #[arg(long, env = "HISTORY_TYPE", default_value = "memory")]
    pub history_type: String,

    /// History store host endpoint (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "HISTORY_HOST", default_value = "redis://127.0.0.1:6379")]
    pub history_host: String,

    /// Sorted-set key holding chat messages in Redis.
    #[arg(long, env = "HISTORY_REDIS_KEY", default_value = "chat:messages")]
    pub history_redis_key: String,

    /// Messages older than this many hours are deleted.
    #[arg(long, env = "RETENTION_HOURS", default_value = "48")]
    pub retention_hours: u32,

    /// How often the retention sweep runs, in seconds.
    #[arg(long, env = "CLEANUP_INTERVAL_SECS", default_value = "300")]
    pub cleanup_interval_secs: u64,

    /// Capacity of the broadcast buffer; subscribers lagging further behind skip messages.
    #[arg(long, env = "BROADCAST_CAPACITY", default_value = "256")]
    pub broadcast_capacity: usize,

    /// Maximum number of new connections accepted per second, across all peers.
    #[arg(long, env = "MAX_CONNECTIONS_PER_SECOND", default_value = "10")]
    pub max_connections_per_second: u32,

    /// Optional path to the TLS certificate file (PEM format) for enabling WSS. Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling WSS. Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

impl ServeArgs {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.retention_hours))
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct JoinArgs {
    /// WebSocket URL of the chat server (ws:// only)
    #[arg(long, env = "CHAT_URL", default_value = "ws://127.0.0.1:8765")]
    pub url: String,

    /// Name shown next to your messages
    #[arg(short = 'u', long, env = "CHAT_USERNAME")]
    pub username: String,

    /// Id of the text input element
    #[arg(long, env = "CHAT_INPUT_ID", default_value = "chat-message")]
    pub input_id: String,

    /// Id of the display container element
    #[arg(long, env = "CHAT_DISPLAY_ID", default_value = "chat-box")]
    pub display_id: String,

    /// Visible rows of the display container
    #[arg(long, env = "CHAT_VIEWPORT_ROWS", default_value = "20")]
    pub viewport_rows: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_defaults() {
        let args = Args::try_parse_from(["live-chat", "serve"]).unwrap();
        let Command::Serve(serve) = args.command else {
            panic!("expected serve command");
        };
        assert_eq!(serve.history_type, "memory");
        assert_eq!(serve.retention(), chrono::Duration::hours(48));
        assert!(serve.http_port.is_none());
        assert!(!serve.enable_tls);
    }

    #[test]
    fn join_requires_username() {
        assert!(Args::try_parse_from(["live-chat", "join"]).is_err());

        let args = Args::try_parse_from(["live-chat", "join", "-u", "alice"]).unwrap();
        let Command::Join(join) = args.command else {
            panic!("expected join command");
        };
        assert_eq!(join.username, "alice");
        assert_eq!(join.input_id, "chat-message");
        assert_eq!(join.display_id, "chat-box");
    }
}
