//! MCP over HTTP: one JSON-RPC message per `POST /mcp`

use std::net::SocketAddr;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::{catch_panic::CatchPanicLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::error::rpc_codes;
use crate::gateway::McpServer;
use crate::protocol::JsonRpcResponse;
use crate::{Error, Result};

/// Build the router. `max_body_size` is the only body limit applied;
/// axum's own default extractor limit is lifted.
pub fn create_router(server: McpServer, max_body_size: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/mcp", post(mcp_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_size))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(server)
}

/// Bind and serve until a shutdown signal arrives
pub async fn serve_http(server: McpServer, config: &ServerConfig) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| Error::Config(format!("Invalid listen address: {e}")))?;
    let listener = TcpListener::bind(addr).await?;

    let registry = server.gateway().registry();
    info!(%addr, "Listening");
    info!(
        databases = registry.len(),
        operations = registry.operation_count(),
        "  POST http://{addr}/mcp"
    );

    axum::serve(listener, create_router(server, config.max_body_size))
        .with_graceful_shutdown(super::shutdown_signal())
        .await
        .map_err(|e| Error::Transport(e.to_string()))
}

/// POST /mcp
async fn mcp_handler(State(server): State<McpServer>, body: Bytes) -> Response {
    let response = match std::str::from_utf8(&body) {
        Ok(text) => server.handle_line(text).await,
        Err(e) => Some(JsonRpcResponse::error(
            None,
            rpc_codes::PARSE_ERROR,
            format!("Body is not UTF-8: {e}"),
        )),
    };

    match response {
        Some(response) => (StatusCode::OK, Json(response)).into_response(),
        None => {
            debug!("Notification accepted");
            StatusCode::ACCEPTED.into_response()
        }
    }
}

/// GET /health: cached connection states, no probing
async fn health_handler(State(server): State<McpServer>) -> impl IntoResponse {
    let registry = server.gateway().registry();
    let databases: serde_json::Map<String, serde_json::Value> = registry
        .adapters()
        .map(|a| (a.name().to_string(), json!(a.state())))
        .collect();

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "operations": registry.operation_count(),
        "databases": databases,
    }))
}
