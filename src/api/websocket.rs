use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use super::state::AppState;

#[derive(Debug, Deserialize)]
struct WsIncoming {
    #[serde(rename = "type")]
    msg_type: String,
    /// Only forward events of this run
    #[serde(default)]
    run_id: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::info!("WebSocket connection request from client: {}", client_id);
    ws.on_upgrade(move |socket| handle_socket(socket, client_id, state))
}

async fn handle_socket(socket: WebSocket, client_id: String, state: Arc<AppState>) {
    state.client_connected(&client_id);

    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.subscribe();
    let mut run_filter: Option<String> = None;

    loop {
        tokio::select! {
            event = rx.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Client {} lagged, {} events dropped", client_id, skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if run_filter.as_deref().is_some_and(|id| id != event.run_id()) {
                    continue;
                }
                let json = match serde_json::to_string(&event) {
                    Ok(j) => j,
                    Err(_) => continue,
                };
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                let Some(Ok(msg)) = incoming else { break };
                let Message::Text(text) = msg else { continue };
                let Ok(incoming) = serde_json::from_str::<WsIncoming>(&text) else { continue };
                match incoming.msg_type.as_str() {
                    "ping" => {
                        let pong = serde_json::json!({"type": "pong"}).to_string();
                        if sender.send(Message::Text(pong)).await.is_err() {
                            break;
                        }
                    }
                    "subscribe" => {
                        tracing::debug!(
                            "Client {} filtering on run {:?}",
                            client_id,
                            incoming.run_id
                        );
                        run_filter = incoming.run_id;
                    }
                    other => tracing::debug!("Ignoring WebSocket message type '{}'", other),
                }
            }
        }
    }

    state.client_disconnected(&client_id);
    tracing::info!("WebSocket disconnected: {}", client_id);
}
