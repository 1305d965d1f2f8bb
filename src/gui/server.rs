use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};

use super::messages::{GuiCommand, GuiPush};

const LOG_TARGET: &str = "gui::server";

const PUSH_CHANNEL_CAPACITY: usize = 64;

/// Core-side handle: push snapshots out, nothing else.
#[derive(Clone)]
pub struct GuiHandle {
    push: broadcast::Sender<GuiPush>,
}

impl GuiHandle {
    pub fn push(&self, message: GuiPush) {
        // No subscribers is fine; front-ends come and go.
        let _ = self.push.send(message);
    }
}

struct GuiState {
    push: broadcast::Sender<GuiPush>,
    commands: mpsc::UnboundedSender<GuiCommand>,
}

/// Bind the GUI WebSocket server on `port` and return the push handle, the
/// stream of client commands, and the server task.
pub async fn start(
    port: u16,
) -> Result<(GuiHandle, mpsc::UnboundedReceiver<GuiCommand>, JoinHandle<()>)> {
    let (push, _) = broadcast::channel(PUSH_CHANNEL_CAPACITY);
    let (commands, command_rx) = mpsc::unbounded_channel();

    let state = Arc::new(GuiState {
        push: push.clone(),
        commands,
    });

    let router = Router::new()
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind GUI port {port}"))?;
    tracing::info!(target: LOG_TARGET, %addr, "GUI websocket listening");

    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router.into_make_service()).await {
            tracing::warn!(target: LOG_TARGET, error = %e, "GUI server exited");
        }
    });

    Ok((GuiHandle { push }, command_rx, task))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GuiState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| client_loop(socket, state))
}

async fn client_loop(socket: WebSocket, state: Arc<GuiState>) {
    let (mut sink, mut stream) = socket.split();
    let mut pushes = state.push.subscribe();

    tracing::info!(target: LOG_TARGET, "GUI client connected");

    loop {
        tokio::select! {
            push = pushes.recv() => {
                match push {
                    Ok(message) => {
                        let Ok(text) = serde_json::to_string(&message) else { continue };
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(target: LOG_TARGET, skipped, "GUI client lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<GuiCommand>(&text) {
                            Ok(command) => {
                                let _ = state.commands.send(command);
                            }
                            Err(e) => {
                                tracing::warn!(
                                    target: LOG_TARGET,
                                    error = %e,
                                    "unparseable GUI command"
                                );
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(target: LOG_TARGET, error = %e, "GUI socket error");
                        break;
                    }
                }
            }
        }
    }

    tracing::info!(target: LOG_TARGET, "GUI client disconnected");
}
