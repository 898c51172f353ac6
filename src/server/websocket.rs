use crate::cli::ServeArgs;
use crate::models::chat::ChatMessage;
use crate::models::websocket::ServerMessage;
use crate::server::room::ChatRoom;

use std::collections::HashMap;
use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response, ErrorResponse};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_rustls::TlsAcceptor;

use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls_pemfile::{certs, pkcs8_private_keys};

use governor::{RateLimiter, Quota, state::{InMemoryState, NotKeyed}, clock::DefaultClock};
use url::form_urlencoded;

use log::{debug, info, warn, error};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};

const MAX_MESSAGE_SIZE: usize = 1 * 1024 * 1024;
pub const MAX_USERNAME_LEN: usize = 80;

pub type ConnectionLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub fn connection_limiter(per_second: u32) -> Arc<ConnectionLimiter> {
    let quota = Quota::per_second(NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

fn load_tls_config(
    cert_path: &str,
    key_path: &str
) -> Result<Arc<ServerConfig>, Box<dyn Error + Send + Sync>> {
    let cert_file = File::open(cert_path).map_err(|e|
        format!("Failed to open TLS certificate file '{}': {}", cert_path, e)
    )?;
    let key_file = File::open(key_path).map_err(|e|
        format!("Failed to open TLS key file '{}': {}", key_path, e)
    )?;

    let mut cert_reader = BufReader::new(cert_file);
    let mut key_reader = BufReader::new(key_file);
    let cert_chain: Vec<CertificateDer<'static>> = certs(&mut cert_reader)
        .collect::<Result<_, _>>()
        .map_err(|e| format!("Failed to read certificate(s): {}", e))?;

    let mut keys = pkcs8_private_keys(&mut key_reader);
    let key = match keys.next() {
        Some(Ok(k)) => PrivateKeyDer::Pkcs8(k),
        Some(Err(e)) => {
            return Err(format!("Error reading private key: {}", e).into());
        }
        None => {
            return Err("No PKCS8 private key found in key file".into());
        }
    };

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)?;
    Ok(Arc::new(config))
}

fn tls_acceptor(args: &ServeArgs) -> Result<Option<TlsAcceptor>, Box<dyn Error + Send + Sync>> {
    if !args.enable_tls {
        info!("TLS not enabled. Running plain WebSocket (WS) server.");
        return Ok(None);
    }
    match (&args.tls_cert_path, &args.tls_key_path) {
        (Some(cert_path), Some(key_path)) => {
            info!(
                "TLS enabled. Loading certificate from '{}' and key from '{}'",
                cert_path,
                key_path
            );
            let config = load_tls_config(cert_path, key_path)?;
            Ok(Some(TlsAcceptor::from(config)))
        }
        (Some(_), None) | (None, Some(_)) => {
            error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
            Err("Missing TLS certificate or key path".into())
        }
        (None, None) => {
            error!("--enable-tls was set but no certificate/key paths provided.");
            Err("TLS enabled without cert/key".into())
        }
    }
}

pub async fn start_ws_server(
    room: Arc<ChatRoom>,
    args: ServeArgs,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let tls = tls_acceptor(&args)?;
    let listener = TcpListener::bind(&args.server_addr).await?;
    let protocol = if tls.is_some() { "wss" } else { "ws" };
    info!("{} server listening on: {}", protocol.to_uppercase(), args.server_addr);

    serve(listener, room, tls, connection_limiter(args.max_connections_per_second)).await
}

/// Accept loop over an already bound listener.
pub async fn serve(
    listener: TcpListener,
    room: Arc<ChatRoom>,
    tls_acceptor: Option<TlsAcceptor>,
    limiter: Arc<ConnectionLimiter>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    loop {
        let (stream, peer) = listener.accept().await?;

        if limiter.check().is_err() {
            warn!("Global connection rate limit exceeded for {}. Dropping connection.", peer);
            continue;
        }

        info!("Incoming connection from: {}", peer);
        let room_clone = Arc::clone(&room);
        let tls_acceptor_clone = tls_acceptor.clone();

        tokio::spawn(async move {
            let process_result = if let Some(acceptor) = tls_acceptor_clone {
                match acceptor.accept(stream).await {
                    Ok(tls_stream) => {
                        info!("TLS handshake successful for {}", peer);
                        process_connection(peer, tls_stream, room_clone).await
                    }
                    Err(e) => {
                        error!("TLS handshake error for {}: {}", peer, e);
                        Err(Box::new(e) as Box<dyn Error + Send + Sync>)
                    }
                }
            } else {
                process_connection(peer, stream, room_clone).await
            };

            if let Err(e) = process_result {
                error!("Failed to process connection for {}: {}", peer, e);
            }
        });
    }
}

fn unauthorized(reason: &str) -> ErrorResponse {
    let mut res = ErrorResponse::new(Some(reason.to_string()));
    *res.status_mut() = StatusCode::UNAUTHORIZED;
    res
}

/// Pulls a usable `username` out of the handshake query string.
pub fn username_from_query(query: Option<&str>) -> Result<String, &'static str> {
    let params: HashMap<String, String> =
        form_urlencoded::parse(query.unwrap_or("").as_bytes()).into_owned().collect();

    let name = params.get("username").map(|s| s.trim()).unwrap_or("");
    if name.is_empty() {
        return Err("missing username");
    }
    if name.chars().count() > MAX_USERNAME_LEN {
        return Err("username too long");
    }
    Ok(name.to_string())
}

async fn process_connection<S>(
    peer: SocketAddr,
    stream: S,
    room: Arc<ChatRoom>,
) -> Result<(), Box<dyn Error + Send + Sync>>
    where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
{
    // Subscribe before the handshake completes so the client cannot miss
    // anything sent right after it connects.
    let updates = room.subscribe();
    let mut username = None;

    let auth_callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        match username_from_query(req.uri().query()) {
            Ok(name) => {
                info!("{} joined as {}", peer, name);
                username = Some(name);
                Ok(response)
            }
            Err(reason) => {
                warn!("{}: rejected handshake ({})", peer, reason);
                Err(unauthorized(reason))
            }
        }
    };

    let ws = match accept_hdr_async(stream, auth_callback).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("Handshake failed for {}: {}", peer, e);
            return Err(Box::new(e) as _);
        }
    };

    match username {
        Some(name) => {
            handle_connection(peer, ws, room, updates, name).await;
            Ok(())
        }
        None => Err("handshake accepted without username".into()),
    }
}

async fn send_server_message<S>(
    tx: &mut SplitSink<WebSocketStream<S>, Message>,
    msg: &ServerMessage
) -> Result<(), Box<dyn Error + Send + Sync>>
    where S: AsyncRead + AsyncWrite + Unpin
{
    let json = serde_json::to_string(msg)?;
    tx.send(Message::Text(json)).await?;
    Ok(())
}

pub async fn handle_connection<S>(
    peer: SocketAddr,
    websocket: WebSocketStream<S>,
    room: Arc<ChatRoom>,
    mut updates: broadcast::Receiver<ChatMessage>,
    username: String
)
    where S: AsyncRead + AsyncWrite + Unpin
{
    info!("New WebSocket connection: {} ({})", peer, username);
    let (mut tx, mut rx) = websocket.split();

    loop {
        tokio::select! {
            incoming = rx.next() => {
                let message = match incoming {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => {
                        match e {
                            | tokio_tungstenite::tungstenite::Error::ConnectionClosed
                            | tokio_tungstenite::tungstenite::Error::Protocol(_)
                            | tokio_tungstenite::tungstenite::Error::Utf8 => {
                                info!("WebSocket connection closed or protocol error for {}: {}", peer, e);
                            }
                            tokio_tungstenite::tungstenite::Error::Io(ref io_err) if
                                io_err.kind() == std::io::ErrorKind::ConnectionReset
                            => {
                                info!("WebSocket connection reset by peer {}", peer);
                            }
                            _ => {
                                error!("Error receiving message from {}: {}", peer, e);
                            }
                        }
                        break;
                    }
                    None => break,
                };

                if message.len() > MAX_MESSAGE_SIZE {
                    warn!(
                        "Message from {} exceeds size limit ({} > {})",
                        peer,
                        message.len(),
                        MAX_MESSAGE_SIZE
                    );
                    let error_msg = ServerMessage::Error {
                        message: "Message too large".to_string(),
                    };
                    if let Err(e) = send_server_message(&mut tx, &error_msg).await {
                        error!("Failed to send size limit error to {}: {}", peer, e);
                    }
                    break;
                }

                match message {
                    Message::Text(text) => {
                        if text.trim().is_empty() {
                            debug!("Ignoring blank message from {}", peer);
                            continue;
                        }
                        room.publish(&username, &text).await;
                    }
                    Message::Close(_) => {
                        info!("Received close frame from {}", peer);
                        break;
                    }
                    Message::Binary(_) => {
                        warn!("Ignoring binary message from {}", peer);
                    }
                    // tungstenite answers pings on its own
                    Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                }
            }
            update = updates.recv() => {
                match update {
                    Ok(msg) => {
                        if let Err(e) = send_server_message(&mut tx, &ServerMessage::Message(msg)).await {
                            error!("Error sending message to {}: {}", peer, e);
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("{} fell behind, skipped {} messages", peer, skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    if let Err(e) = tx.close().await {
        debug!("Close after session end for {}: {}", peer, e);
    }
    info!("WebSocket connection closed for {} ({})", peer, username);
}
