use serde::{ Serialize, Deserialize };
use crate::models::chat::ChatMessage;

/// Frames the server pushes to clients. Clients send raw text frames.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "message")] Message(ChatMessage),
    #[serde(rename = "error")] Error {
        message: String,
    },
}
