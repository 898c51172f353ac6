use std::time::Duration;

use futures::{ SinkExt, StreamExt };
use log::{ debug, info, warn, error };
use thiserror::Error;
use tokio::sync::mpsc::{ self, UnboundedReceiver, UnboundedSender };
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use url::Url;

use crate::models::chat::ChatMessage;
use crate::models::websocket::ServerMessage;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server url: {0}")]
    Url(#[from] url::ParseError),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("unsupported url scheme '{0}', only ws:// is supported")]
    UnsupportedScheme(String),
    #[error("connection is closed")]
    Closed,
}

/// Outbound half of a chat connection, as seen by the binder.
pub trait Channel {
    fn send(&self, text: &str) -> Result<(), ClientError>;
}

/// WebSocket connection to a chat server.
///
/// Built explicitly with [`ChatClient::connect`] and torn down with
/// [`ChatClient::disconnect`]; nothing happens implicitly.
pub struct ChatClient {
    outbound: UnboundedSender<Message>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl ChatClient {
    /// Opens the connection and starts the reader and writer tasks.
    ///
    /// Inbound chat messages arrive on the returned receiver in delivery order.
    /// The receiver yields `None` once the server closes the connection.
    pub async fn connect(
        server_url: &str,
        username: &str
    ) -> Result<(Self, UnboundedReceiver<ChatMessage>), ClientError> {
        let mut url = Url::parse(server_url)?;
        // no TLS connector is compiled into the client
        if url.scheme() != "ws" {
            return Err(ClientError::UnsupportedScheme(url.scheme().to_string()));
        }
        url.query_pairs_mut().append_pair("username", username);

        let (ws, _response) = connect_async(url.as_str()).await?;
        info!("Connected to {} as {}", server_url, username);

        let (mut sink, mut stream) = ws.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<ChatMessage>();

        let writer = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let closing = matches!(frame, Message::Close(_));
                if let Err(e) = sink.send(frame).await {
                    error!("Error sending to chat server: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(ServerMessage::Message(msg)) => {
                                if inbound_tx.send(msg).is_err() {
                                    debug!("Inbound receiver dropped, stopping reader");
                                    break;
                                }
                            }
                            Ok(ServerMessage::Error { message }) => {
                                warn!("Chat server reported an error: {}", message);
                            }
                            Err(e) => {
                                warn!("Dropping unparseable frame from chat server: {}", e);
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        info!("Chat server closed the connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Error reading from chat server: {}", e);
                        break;
                    }
                }
            }
        });

        Ok((Self { outbound, writer, reader }, inbound_rx))
    }

    /// Sends a close frame and waits for both tasks to wind down.
    pub async fn disconnect(self) {
        let Self { outbound, writer, mut reader } = self;

        if outbound.send(Message::Close(None)).is_err() {
            debug!("Writer already gone before disconnect");
        }
        drop(outbound);

        if let Err(e) = writer.await {
            error!("Writer task failed: {}", e);
        }
        match tokio::time::timeout(CLOSE_TIMEOUT, &mut reader).await {
            Ok(Err(e)) => error!("Reader task failed: {}", e),
            Ok(Ok(())) => {}
            Err(_) => {
                warn!("Chat server did not acknowledge close, dropping connection");
                reader.abort();
            }
        }
        info!("Disconnected from chat server");
    }
}

impl Channel for ChatClient {
    fn send(&self, text: &str) -> Result<(), ClientError> {
        self.outbound.send(Message::Text(text.to_string())).map_err(|_| ClientError::Closed)
    }
}
