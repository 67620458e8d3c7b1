use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use super::actor::RelayHandle;
use super::messages::ClientEvent;
use super::polling::{PollSessions, encode_batch};
use super::types::{ConnectionId, OutboundMessage};
use crate::config::Config;

pub const LIVENESS_TEXT: &str = "Signaling Server is running";

#[derive(Clone)]
struct AppState {
    relay: RelayHandle,
    sessions: PollSessions,
    config: Arc<Config>,
}

pub struct SignalingServer {
    state: AppState,
}

impl SignalingServer {
    /// Spawns the relay actor, so this must be called inside a tokio runtime.
    pub fn new(config: Config) -> Self {
        Self {
            state: AppState {
                relay: RelayHandle::spawn(),
                sessions: PollSessions::new(),
                config: Arc::new(config),
            },
        }
    }

    pub fn handle(&self) -> RelayHandle {
        self.state.relay.clone()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(index))
            .route("/ws", get(websocket_handler))
            .route("/poll", post(open_session))
            .route(
                "/poll/{sid}",
                get(poll_session).post(push_event).delete(close_session),
            )
            .layer(cors_layer(&self.state.config.cors_origins))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> std::io::Result<()> {
        let addr = self.state.config.bind_addr();
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already-bound listener.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        info!("Signaling server listening on {}", listener.local_addr()?);

        let reaper = tokio::spawn(reap_idle_sessions(self.state.clone()));
        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await;
        reaper.abort();
        result
    }
}

fn cors_layer(origins: &str) -> CorsLayer {
    if origins == "*" {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .split(',')
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();

    if allowed.is_empty() {
        warn!("No valid CORS origins configured, using permissive CORS");
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(allowed)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

async fn index() -> &'static str {
    LIVENESS_TEXT
}

async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundMessage>();
    let (ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel::<Message>();

    let conn = match state.relay.connect(tx).await {
        Ok(conn) => conn,
        Err(e) => {
            error!("Failed to register WebSocket connection: {}", e);
            return;
        }
    };
    info!("WebSocket connection {}", conn);

    let mut ping_interval = tokio::time::interval(state.config.ping_interval);
    let ping_timeout = state.config.ping_timeout;
    let mut waiting_for_pong = false;
    let mut pong_deadline: Option<tokio::time::Instant> = None;

    let send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(msg) = rx.recv() => {
                    if ws_tx.send(Message::Text(msg.into_inner())).await.is_err() {
                        break;
                    }
                }
                Some(ctrl_msg) = ctrl_rx.recv() => {
                    if ws_tx.send(ctrl_msg).await.is_err() {
                        break;
                    }
                }
                else => break,
            }
        }
    });

    loop {
        let pong_timeout = async {
            match pong_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = ping_interval.tick() => {
                if waiting_for_pong {
                    warn!("No Pong received, disconnecting {}", conn);
                    break;
                }
                if ctrl_tx.send(Message::Ping(Bytes::new())).is_err() {
                    break;
                }
                waiting_for_pong = true;
                pong_deadline = Some(tokio::time::Instant::now() + ping_timeout);
                debug!("Ping sent to {}", conn);
            }

            _ = pong_timeout => {
                warn!("Pong timeout, disconnecting {}", conn);
                break;
            }

            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        warn!("WebSocket error on {}: {}", conn, e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => {
                        let Some(event) = parse_event(text.as_str(), &conn) else {
                            continue;
                        };
                        if let Err(e) = state.relay.submit(&conn, event).await {
                            error!("Relay unavailable: {}", e);
                            break;
                        }
                    }
                    Message::Pong(_) => {
                        waiting_for_pong = false;
                        pong_deadline = None;
                        debug!("Pong received from {}", conn);
                    }
                    Message::Close(_) => {
                        info!("Close received from {}", conn);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    state.relay.disconnect(&conn).await;
    send_task.abort();
    info!("WebSocket disconnected: {}", conn);
}

/// Malformed envelopes are logged and dropped.
fn parse_event(text: &str, conn: &ConnectionId) -> Option<ClientEvent> {
    match serde_json::from_str(text) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Dropping malformed event from {}: {}", conn, e);
            None
        }
    }
}

async fn open_session(State(state): State<AppState>) -> Response {
    let (tx, rx) = mpsc::unbounded_channel::<OutboundMessage>();
    match state.relay.connect(tx).await {
        Ok(conn) => {
            state.sessions.insert(conn.clone(), rx);
            info!("Polling session opened: {}", conn);
            axum::Json(json!({ "sid": conn })).into_response()
        }
        Err(e) => {
            error!("Failed to open polling session: {}", e);
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

async fn poll_session(Path(sid): Path<String>, State(state): State<AppState>) -> Response {
    let conn = ConnectionId::from(sid);
    match state.sessions.poll(&conn, state.config.poll_timeout).await {
        Some(batch) => match encode_batch(&batch) {
            Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
            Err(e) => {
                error!("Failed to encode poll batch for {}: {}", conn, e);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn push_event(
    Path(sid): Path<String>,
    State(state): State<AppState>,
    body: String,
) -> StatusCode {
    let conn = ConnectionId::from(sid);
    if !state.sessions.touch(&conn) {
        return StatusCode::NOT_FOUND;
    }

    let Some(event) = parse_event(&body, &conn) else {
        return StatusCode::BAD_REQUEST;
    };

    match state.relay.submit(&conn, event).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(e) => {
            error!("Relay unavailable: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn close_session(Path(sid): Path<String>, State(state): State<AppState>) -> StatusCode {
    let conn = ConnectionId::from(sid);
    if !state.sessions.remove(&conn) {
        return StatusCode::NOT_FOUND;
    }
    state.relay.disconnect(&conn).await;
    info!("Polling session closed: {}", conn);
    StatusCode::NO_CONTENT
}

/// Treat polling sessions that stopped polling as transport-level disconnects.
async fn reap_idle_sessions(state: AppState) {
    let mut ticker = tokio::time::interval(state.config.session_timeout / 2);
    loop {
        ticker.tick().await;
        for conn in state.sessions.take_expired(state.config.session_timeout) {
            info!("Polling session {} timed out", conn);
            state.relay.disconnect(&conn).await;
        }
    }
}
