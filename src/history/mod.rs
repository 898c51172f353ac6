mod memory;
mod redis;

pub use memory::MemoryHistoryStore;
pub use self::redis::RedisHistoryStore;

use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use log::info;
use std::error::Error;
use std::sync::Arc;
use crate::cli::ServeArgs;
use crate::models::chat::StoredMessage;

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn add_message(&self, message: &StoredMessage) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// The newest `limit` messages, oldest first.
    async fn recent(&self, limit: usize) -> Result<Vec<StoredMessage>, Box<dyn Error + Send + Sync>>;

    /// Deletes messages created before `cutoff`, returning how many went.
    async fn purge_older_than(
        &self,
        cutoff: DateTime<Utc>
    ) -> Result<usize, Box<dyn Error + Send + Sync>>;
}

pub fn create_history_store(
    args: &ServeArgs
) -> Result<Arc<dyn HistoryStore>, Box<dyn Error + Send + Sync>> {
    match args.history_type.to_lowercase().as_str() {
        "memory" => Ok(Arc::new(MemoryHistoryStore::new())),
        "redis" => {
            let store = RedisHistoryStore::new(&args.history_host, &args.history_redis_key)?;
            Ok(Arc::new(store))
        }
        _ =>
            Err(
                Box::new(
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("Unsupported history store type: {}", args.history_type)
                    )
                )
            ),
    }
}

pub fn initialize_history_store(
    args: &ServeArgs
) -> Result<Arc<dyn HistoryStore>, Box<dyn Error + Send + Sync>> {
    if args.history_type.eq_ignore_ascii_case("memory") {
        info!("Chat history will be kept in memory");
    } else {
        info!("Chat history will be stored in: {} at {}", args.history_type, args.history_host);
    }
    create_history_store(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use crate::cli::{ Args, Command };

    fn serve_args(extra: &[&str]) -> ServeArgs {
        let argv = ["live-chat", "serve"].iter().chain(extra.iter()).copied();
        match Args::try_parse_from(argv).unwrap().command {
            Command::Serve(serve) => serve,
            Command::Join(_) => panic!("expected serve command"),
        }
    }

    #[test]
    fn unknown_store_type_is_rejected() {
        let args = serve_args(&["--history-type", "qdrant"]);
        let err = create_history_store(&args).err().unwrap();
        assert!(err.to_string().contains("qdrant"));
    }

    #[test]
    fn memory_store_is_default() {
        assert!(create_history_store(&serve_args(&[])).is_ok());
    }
}
