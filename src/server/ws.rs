//! Observer WebSocket endpoint.
//!
//! Each socket gets a writer task draining its bus queue and a read loop that
//! feeds commands to the dispatcher.

use super::SharedState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

pub(super) async fn observer_socket(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let id = state.next_observer_id();
    let (mut sender, mut receiver) = socket.split();
    let mut outbound = state.coordinator.connect(id.clone());
    info!(conn_id = %id, observers = state.coordinator.bus.connection_count(), "observer connected");

    // Ends when the bus drops this observer or the socket stops accepting writes.
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if sender.send(Message::Text(frame.as_ref().into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        state.coordinator.dispatcher.dispatch_raw(text.as_str());
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(conn_id = %id, error = %e, "observer receive error");
                        break;
                    }
                }
            }
            _ = &mut writer => {
                debug!(conn_id = %id, "observer writer finished");
                break;
            }
        }
    }

    state.coordinator.disconnect(&id);
    writer.abort();
    info!(conn_id = %id, "observer disconnected");
}
