//! Strangers relay server.
//!
//! A WebSocket relay that pairs anonymous connections two at a time and
//! carries their chat. Sessions survive a dropped connection for a grace
//! period so the user can come back to the same conversation.

use axum::{
    Router,
    extract::{
        Query, State,
        ws::{WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use std::sync::Arc;
use strangers_core::SessionId;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use strangers_relay::{
    DisabledPush, ExpoPush, PushGateway, RelayConfig, RelayState, Result, SqliteDirectory, api,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = RelayConfig::from_env()?;
    let directory = SqliteDirectory::open(&config.db_path)?;
    let push: Arc<dyn PushGateway> = if config.push_enabled {
        Arc::new(ExpoPush::new(config.push_url.clone()))
    } else {
        tracing::info!("Push notifications disabled");
        Arc::new(DisabledPush)
    };

    let state = RelayState::new(config.coordinator(), Arc::new(directory), push);

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/api/stats", get(api::get_stats))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = config.addr();
    tracing::info!("Strangers relay listening on {addr}");
    tracing::info!("WebSocket:  ws://{addr}/ws");
    tracing::info!(
        "Grace period {}s, abandon period {}s",
        config.grace_period.as_secs(),
        config.abandon_period.as_secs()
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

/// Query params for GET /ws.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectQuery {
    /// Resume this session instead of waiting for a new partner.
    #[serde(default, alias = "chatId")]
    session_id: Option<SessionId>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<RelayState>>,
    Query(query): Query<ConnectQuery>,
) -> impl IntoResponse {
    let resume = query.session_id.filter(|id| !id.is_empty());
    ws.on_upgrade(move |socket| handle_socket(socket, state, resume))
}

async fn handle_socket(socket: WebSocket, state: Arc<RelayState>, resume: Option<SessionId>) {
    strangers_relay::handle_connection(socket, state, resume).await;
}
