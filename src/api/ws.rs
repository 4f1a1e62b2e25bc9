//! WebSocket stream of engine events

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::events::Event;

use super::AppState;

/// WebSocket message from client
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe {
        #[serde(default, rename = "campaignIds")]
        campaign_ids: Vec<String>,
    },
    Unsubscribe {
        #[serde(default, rename = "campaignIds")]
        campaign_ids: Vec<String>,
    },
    Ping,
}

/// WebSocket message to client
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Pong,
    Error { message: String },
    Event { event: Event },
}

/// Handle WebSocket upgrade
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let connection_id = Uuid::new_v4().to_string();

    let mut event_receiver = state.event_bus.subscribe();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<ServerMessage>();

    // Forward matching events and direct replies to the socket
    let event_bus = state.event_bus.clone();
    let conn_id = connection_id.clone();
    let send_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                received = event_receiver.recv() => match received {
                    Ok(event) => {
                        if !event_bus.should_deliver(&conn_id, &event).await {
                            continue;
                        }
                        ServerMessage::Event { event }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(connection_id = %conn_id, skipped, "WebSocket client lagging");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                reply = reply_rx.recv() => match reply {
                    Some(reply) => reply,
                    None => break,
                },
            };

            if let Ok(json) = serde_json::to_string(&msg) {
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    let event_bus = state.event_bus.clone();
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Subscribe { campaign_ids }) => {
                    for campaign_id in campaign_ids {
                        event_bus.subscribe_to_campaign(&connection_id, &campaign_id).await;
                    }
                }
                Ok(ClientMessage::Unsubscribe { campaign_ids }) => {
                    for campaign_id in campaign_ids {
                        event_bus
                            .unsubscribe_from_campaign(&connection_id, &campaign_id)
                            .await;
                    }
                }
                Ok(ClientMessage::Ping) => {
                    let _ = reply_tx.send(ServerMessage::Pong);
                }
                Err(e) => {
                    let _ = reply_tx.send(ServerMessage::Error {
                        message: format!("Invalid message: {}", e),
                    });
                }
            },
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }

    state.event_bus.remove_connection(&connection_id).await;
    send_task.abort();
}
