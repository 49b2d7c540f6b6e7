//! WebSocket debug server.
//!
//! Each connection to `/debug` gets its own session: a fresh engine run over
//! the server's pre-loaded series, parked until the client steps it.
//! Outbound traffic is raw envelope events from the live channel plus
//! `snapshot`/`error`/`export` control messages. Pending live events are
//! always written before a control message, so a snapshot follows the
//! events that led up to it.

use std::future::Future;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use replaylab_core::debug::{parse_command_with_limit, DebugCommand, ServerMessage};
use replaylab_core::domain::Bar;

use crate::config::{RunConfig, ServerConfig};
use crate::session::{DebugSession, SessionRegistry};

/// Control messages queued per connection before the reader waits.
const CONTROL_QUEUE: usize = 64;

/// Shared state for every connection.
pub struct ServerState {
    pub registry: SessionRegistry,
    pub config: RunConfig,
    pub server: ServerConfig,
    /// Loaded once at startup and shared by every session.
    pub series: Arc<Vec<Vec<Bar>>>,
}

impl ServerState {
    pub fn new(config: RunConfig, server: ServerConfig, series: Vec<Vec<Bar>>) -> Self {
        Self {
            registry: SessionRegistry::new(),
            config,
            server,
            series: Arc::new(series),
        }
    }
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/debug", get(ws_handler))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve until `shutdown` resolves, then shut down every open session.
pub async fn serve<F>(listener: TcpListener, state: Arc<ServerState>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "debug server listening");
    }
    let app = router(Arc::clone(&state));
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

    let open = state.registry.len();
    state.registry.shutdown_all().await;
    tracing::info!(sessions = open, "debug server stopped");
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<ServerState>) {
    let session = match state.registry.create(
        state.config.clone(),
        Arc::clone(&state.series),
        state.server.channel_capacity,
    ) {
        Ok(session) => session,
        Err(err) => {
            tracing::warn!(error = %err, "failed to start debug session");
            let reply = ServerMessage::error(err.to_string()).to_json();
            let _ = socket.send(Message::Text(reply)).await;
            return;
        }
    };
    tracing::info!(session = session.id(), "debug client connected");

    let (mut sender, mut receiver) = socket.split();
    let (control_tx, mut control_rx) = mpsc::channel::<String>(CONTROL_QUEUE);
    let mut live = session.take_live().unwrap_or_else(|| mpsc::channel(1).1);

    let writer = tokio::spawn(async move {
        let mut live_open = true;
        loop {
            let text = tokio::select! {
                biased;
                event = live.recv(), if live_open => match event {
                    Some(event) => event.to_string(),
                    None => {
                        live_open = false;
                        continue;
                    }
                },
                reply = control_rx.recv() => match reply {
                    Some(reply) => reply,
                    None => break,
                },
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = receiver.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                tracing::debug!(session = session.id(), error = %err, "socket read failed");
                break;
            }
        };
        match frame {
            Message::Text(text) => {
                handle_command(&text, &session, state.server.max_command_bytes, &control_tx).await;
            }
            Message::Binary(_) => {
                reply(&control_tx, ServerMessage::error("binary frames are not supported")).await;
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    writer.abort();
    let dropped = session.dropped_events();
    state.registry.close(session.id()).await;
    tracing::info!(session = session.id(), dropped, "debug client disconnected");
}

async fn handle_command(
    text: &str,
    session: &Arc<DebugSession>,
    max_bytes: usize,
    control: &mpsc::Sender<String>,
) {
    let command = match parse_command_with_limit(text, max_bytes) {
        Ok(command) => command,
        Err(err) => {
            tracing::debug!(session = session.id(), error = %err, "rejected client command");
            reply(control, ServerMessage::error(err.to_string())).await;
            return;
        }
    };

    if let DebugCommand::SetExport { mutations } = command {
        session.set_export(mutations);
        reply(control, ServerMessage::Export { mutations }).await;
        return;
    }

    match session.probe().send_command(&command) {
        Ok(handle) => {
            // Resolve off the reader so the client can keep talking.
            let session = Arc::clone(session);
            let control = control.clone();
            tokio::spawn(async move {
                let message = match handle.wait().await {
                    Ok(snap) => ServerMessage::snapshot(session.probe().is_session_active(), &snap),
                    Err(err) => ServerMessage::error(err.to_string()),
                };
                reply(&control, message).await;
            });
        }
        Err(err) => reply(control, ServerMessage::error(err.to_string())).await,
    }
}

async fn reply(control: &mpsc::Sender<String>, message: ServerMessage) {
    let _ = control.send(message.to_json()).await;
}
