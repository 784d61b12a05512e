// SPDX-License-Identifier: Apache-2.0

use crate::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use intake_api::ws::ClientMessage;
use intake_model::InspectionId;
use tracing::{info, warn};

pub(crate) async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| client_connection(state, socket))
}

async fn client_connection(state: AppState, socket: WebSocket) {
    let (guard, mut outbound) = state.hub.register();
    let connection_id = guard.id();
    info!(connection_id, "live connection open");

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            message = outbound.recv() => {
                let Some(message) = message else { break };
                match serde_json::to_string(&message) {
                    Ok(text) => {
                        if sink.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(connection_id, "server message encode failed: {e}"),
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&state, connection_id, text.as_str());
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(connection_id, "live connection transport error: {e}");
                        break;
                    }
                }
            }
        }
    }

    // The guard drops here, removing the connection from the hub.
    info!(connection_id, "live connection closed");
}

/// Malformed messages are logged and ignored; they never close the
/// connection.
fn handle_client_message(state: &AppState, connection_id: u64, raw: &str) {
    match serde_json::from_str::<ClientMessage>(raw) {
        Ok(ClientMessage::SubscribeInspection { inspection_id }) => {
            match InspectionId::parse(&inspection_id) {
                Ok(id) => {
                    info!(connection_id, inspection_id = %id, "subscribed to inspection");
                    state.hub.subscribe(connection_id, id);
                }
                Err(e) => warn!(connection_id, "subscribe rejected: {e}"),
            }
        }
        Err(e) => warn!(connection_id, "malformed live message ignored: {e}"),
    }
}
