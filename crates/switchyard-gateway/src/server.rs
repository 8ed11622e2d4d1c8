use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::bridge::{self, PublishError};
use crate::dispatch;
use crate::handlers::RpcContext;
use crate::rpc::{ErrorCode, JsonRpcResponse, RpcError};
use crate::shutdown::ShutdownCoordinator;
use crate::state::GatewayState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub fn build_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/ws/broadcast", post(broadcast_handler))
        .route("/ps/publish/{topic}", post(publish_handler))
        .route("/api/v1/tools", get(tools_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind, start the relay and serve until the state's shutdown token fires.
pub async fn start(state: Arc<GatewayState>) -> anyhow::Result<ServerHandle> {
    let bind = state.config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    let addr = listener.local_addr()?;

    let token = state.shutdown.clone();
    let relay = bridge::spawn_relay(
        Arc::clone(&state.bus),
        Arc::clone(&state.topics),
        token.clone(),
        state.relay_config(),
    );

    let router = build_router(Arc::clone(&state));
    let serve_token = token.clone();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(serve_token.cancelled_owned())
            .await;
        if let Err(e) = result {
            error!(error = %e, "server stopped with error");
        }
    });

    info!(%addr, bus = state.bus.name(), tools = state.tools.count(), "gateway listening");

    Ok(ServerHandle {
        addr,
        server,
        relay,
        token,
    })
}

/// Running gateway. Dropping it leaves the tasks running; call
/// [`shutdown`](Self::shutdown) to stop them.
pub struct ServerHandle {
    addr: SocketAddr,
    server: JoinHandle<()>,
    relay: JoinHandle<()>,
    token: CancellationToken,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub async fn shutdown(self, timeout: Option<Duration>) {
        ShutdownCoordinator::with_token(self.token)
            .graceful_shutdown(vec![self.server, self.relay], timeout)
            .await;
        info!("gateway stopped");
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Reader handles frames strictly in order; a separate writer drains the
/// connection's send queue.
async fn handle_socket(socket: WebSocket, state: Arc<GatewayState>) {
    let (conn_id, mut rx) = state.connections.register();
    info!(conn_id = %conn_id, "connection opened");
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_id = conn_id.clone();
    let writer = tokio::spawn(async move {
        let mut ping = tokio::time::interval(HEARTBEAT_INTERVAL);
        ping.tick().await;
        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(text) => {
                        if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                _ = ping.tick() => {
                    if ws_tx.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = ws_tx.close().await;
        debug!(conn_id = %writer_id, "writer finished");
    });

    let ctx = RpcContext {
        connection_id: conn_id.clone(),
        state: Arc::clone(&state),
    };
    loop {
        let next = tokio::select! {
            () = state.shutdown.cancelled() => break,
            next = ws_rx.next() => next,
        };
        let reply = match next {
            Some(Ok(WsMessage::Text(text))) => dispatch::handle_frame(text.as_str(), &ctx).await,
            Some(Ok(WsMessage::Binary(_))) => {
                let err = RpcError::new(ErrorCode::ContentTypeError, "binary frames are not supported");
                serde_json::to_string(&JsonRpcResponse::error(Value::Null, &err)).ok()
            }
            Some(Ok(WsMessage::Close(_))) | None => break,
            Some(Ok(_)) => None,
            Some(Err(e)) => {
                debug!(conn_id = %conn_id, error = %e, "socket error");
                break;
            }
        };
        if let Some(reply) = reply {
            let sent = tokio::select! {
                () = state.shutdown.cancelled() => break,
                sent = state.connections.send_reply(&conn_id, reply) => sent,
            };
            if let Err(e) = sent {
                warn!(conn_id = %conn_id, error = %e, "connection lost while replying");
                break;
            }
        }
    }

    state.topics.cleanup_on_disconnect(&conn_id);
    state.connections.unregister(&conn_id);
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
        warn!(conn_id = %conn_id, "writer did not drain in time");
    }
    info!(conn_id = %conn_id, "connection closed");
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.connections.count(),
        "topics": state.topics.topic_count(),
        "tools": state.tools.count(),
    }))
}

#[derive(Deserialize)]
struct BroadcastQuery {
    message: String,
}

async fn broadcast_handler(
    State(state): State<Arc<GatewayState>>,
    Query(q): Query<BroadcastQuery>,
) -> impl IntoResponse {
    let frame = json!({"type": "broadcast", "message": q.message}).to_string();
    let delivered = state.connections.broadcast_all(&frame);
    info!(delivered, "broadcast sent");
    Json(json!({
        "message": format!("Broadcasted: {}", q.message),
        "delivered": delivered,
    }))
}

async fn publish_handler(
    State(state): State<Arc<GatewayState>>,
    Path(topic): Path<String>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    match bridge::publish(state.bus.as_ref(), &topic, &body).await {
        Ok(topic) => (
            StatusCode::OK,
            Json(json!({"status": "success", "topic": topic, "payload": body})),
        ),
        Err(e @ PublishError::Topic(_)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "error", "error": e.to_string()})),
        ),
        Err(e @ PublishError::Bus(_)) => {
            warn!(topic = %topic, error = %e, "http publish failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({"status": "error", "error": e.to_string()})),
            )
        }
    }
}

async fn tools_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let tools: Vec<Value> = state.tools.definitions().iter().map(|d| d.to_flat()).collect();
    Json(Value::Array(tools))
}
