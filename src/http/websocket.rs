//! WebSocket transport for the event bus bridge.
//!
//! # Responsibilities
//! - Complete the upgrade handshake on the bridge path
//! - Register the connection as a bridge session
//! - Decode client frames and hand them to the multiplexer
//! - Write queued server frames back to the client
//!
//! # Data Flow
//! ```text
//! Client ──text frames──→ reader loop ──→ SessionMultiplexer::handle_frame
//! Client ←──text frames── writer task ←── session outbox
//! ```
//!
//! # Design Decisions
//! - Reader and writer are split so a slow client never blocks decoding
//! - The session is removed as soon as either side ends
//! - A session dropped for a full outbox ends the connection
//! - Binary frames are refused with `invalid_frame`
//! - Ping/pong control frames are answered by axum

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use crate::bridge::{BridgeError, ClientFrame, ServerFrame, SessionMultiplexer};
use crate::http::server::AppState;
use crate::observability::metrics;

/// How long the writer may keep flushing after the session ends.
const WRITER_GRACE: Duration = Duration::from_secs(1);

/// Upgrade handler mounted under the bridge path.
pub async fn bridge_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let bridge = state.bridge.clone();
    let shutdown = state.shutdown.subscribe();
    ws.max_message_size(state.max_frame_bytes)
        .on_upgrade(move |socket| run_session(socket, bridge, shutdown))
}

/// Pump one connection until the client leaves or the gateway shuts down.
pub async fn run_session(socket: WebSocket, bridge: Arc<SessionMultiplexer>, mut shutdown: broadcast::Receiver<()>) {
    let (id, mut outbox) = bridge.connect();
    let (mut sink, mut stream) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = outbox.recv().await {
            let text = match frame.to_text() {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to encode bridge frame");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        let message = tokio::select! {
            message = stream.next() => message,
            _ = &mut writer => break,
            _ = shutdown.recv() => break,
        };

        match message {
            Some(Ok(Message::Text(text))) => match ClientFrame::parse(text.as_str()) {
                Ok(frame) => match bridge.handle_frame(id, frame) {
                    Ok(()) => {}
                    Err(BridgeError::UnknownSession(_)) => break,
                    Err(e) => tracing::debug!(session = %id, error = %e, "Bridge frame refused"),
                },
                Err(e) => {
                    tracing::debug!(session = %id, error = %e, "Undecodable bridge frame");
                    metrics::record_bridge_frame("inbound", "invalid");
                    bridge.push(id, ServerFrame::invalid_frame());
                }
            },
            Some(Ok(Message::Binary(_))) => {
                metrics::record_bridge_frame("inbound", "invalid");
                bridge.push(id, ServerFrame::invalid_frame());
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::debug!(session = %id, error = %e, "Bridge transport error");
                break;
            }
        }
    }

    // Dropping the session closes its outbox, which ends the writer unless
    // it is stuck on a client that stopped reading.
    bridge.disconnect(id);
    if !writer.is_finished() && tokio::time::timeout(WRITER_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }
}
