use crate::cli::ServeArgs;
use crate::dom::ChatLine;
use crate::server::room::ChatRoom;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use axum::{
    routing::get,
    Router,
    extract::{State, Query},
    response::IntoResponse,
    http::StatusCode,
    response::Html,
    Json,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use log::{info, error};

const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_HISTORY_LIMIT: usize = 500;

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
    /// `json` (default) or `html` for ready-to-insert `chat-message` divs
    pub format: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Clone)]
struct AppState {
    room: Arc<ChatRoom>,
    retention: chrono::Duration,
}

pub fn router(room: Arc<ChatRoom>, retention: chrono::Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/messages", get(messages_handler))
        .route("/api/health", get(health_handler))
        .layer(cors)
        .with_state(AppState { room, retention })
}

pub async fn start_http_server(
    http_port: u16,
    room: Arc<ChatRoom>,
    args: ServeArgs,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = format!("0.0.0.0:{}", http_port).parse::<SocketAddr>()?;
    info!("Starting HTTP API server on: http://{}", addr);

    let app = router(room, args.retention());

    if let (true, Some(cert_path), Some(key_path)) =
        (args.enable_tls, args.tls_cert_path.as_ref(), args.tls_key_path.as_ref())
    {
        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
            cert_path,
            key_path
        ).await?;

        tokio::spawn(async move {
            let result = axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await;

            if let Err(e) = result {
                error!("HTTPS server error: {}", e);
            }
        });

        info!("HTTPS server started with TLS enabled");
    } else {
        tokio::spawn(async move {
            match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => {
                    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                        error!("HTTP server error: {}", e);
                    }
                },
                Err(e) => {
                    error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
                }
            }
        });

        info!("HTTP server started");
    }

    Ok(())
}

async fn messages_handler(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).min(MAX_HISTORY_LIMIT);

    if let Err(e) = state.room.purge_expired(state.retention).await {
        error!("History cleanup before read failed: {}", e);
    }

    match state.room.recent(limit).await {
        Ok(messages) if query.format.as_deref() == Some("html") => {
            let body = messages
                .into_iter()
                .map(|msg| ChatLine::from(msg).to_html())
                .collect::<Vec<_>>()
                .join("\n");
            (StatusCode::OK, Html(body)).into_response()
        }
        Ok(messages) => (StatusCode::OK, Json(messages)).into_response(),
        Err(e) => {
            error!("Failed to load chat history: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody { error: "Failed to load chat history".into() }),
            ).into_response()
        }
    }
}

async fn health_handler() -> &'static str {
    "ok"
}
