use chrono::{ DateTime, Local, Utc };
use serde::{ Serialize, Deserialize };
use uuid::Uuid;

/// One line of chat as it travels to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub username: String,
    pub message: String,
    pub time: String,
}

/// A chat message as the server keeps it in history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub username: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn new(username: &str, message: &str) -> Self {
        Self::at(username, message, Utc::now())
    }

    pub fn at(username: &str, message: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.to_string(),
            message: message.to_string(),
            created_at,
        }
    }

    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage {
            username: self.username.clone(),
            message: self.message.clone(),
            time: time_label(self.created_at),
        }
    }
}

/// `HH:MM` in the server's local time zone.
pub fn time_label(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M").to_string()
}
