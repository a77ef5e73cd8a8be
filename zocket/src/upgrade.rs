//! Axum route handler that turns an HTTP upgrade request into a running
//! Zocket connection: extract headers and query, run the handshake
//! rejection check, then hand the upgraded socket to the connection's
//! inbound loop.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::info;
use zocket_core::core::ZocketCore;
use zocket_core::error::Rejection;
use zocket_core::transport::HandshakeRequest;

use crate::adapter::RoomBroadcastAdapter;
use crate::sink::WsSink;

/// Shared state for the Axum route: the runtime core plus the room
/// broadcast adapter every connection's sink subscribes through.
#[derive(Clone)]
pub struct ZocketState {
    pub core: ZocketCore,
    pub adapter: Arc<RoomBroadcastAdapter>,
}

impl ZocketState {
    pub fn new(core: ZocketCore, adapter: Arc<RoomBroadcastAdapter>) -> Self {
        Self { core, adapter }
    }
}

fn handshake_request(headers: &HeaderMap, query: Option<String>) -> HandshakeRequest {
    let headers = headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
        .collect();
    HandshakeRequest { headers, query: query.unwrap_or_default() }
}

/// `axum::routing::get` handler: register with `.route("/ws", get(zocket_upgrade))`.
pub async fn zocket_upgrade(
    State(state): State<ZocketState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    ws: WebSocketUpgrade,
) -> Response {
    let handshake = handshake_request(&headers, query);

    let handshake_values = match state.core.handle_upgrade(&handshake).await {
        Ok(values) => values,
        Err(Rejection::HandshakeInvalid { issues }) => {
            let status = StatusCode::from_u16(state.core.config().handshake_reject_status)
                .unwrap_or(StatusCode::BAD_REQUEST);
            let body = Json(json!({ "error": "Invalid headers", "details": issues }));
            return (status, body).into_response();
        }
        Err(other) => unreachable!("handle_upgrade only ever rejects with HandshakeInvalid: {other}"),
    };

    ws.on_upgrade(move |socket| run_connection(socket, state, handshake, handshake_values))
}

/// Drives one connection end to end: splits the socket, admits the
/// connection, feeds inbound frames to the core, and tears down on
/// disconnect. Runs for the lifetime of the socket.
async fn run_connection(
    socket: axum::extract::ws::WebSocket,
    state: ZocketState,
    handshake: HandshakeRequest,
    handshake_values: serde_json::Value,
) {
    let (sink, mut reader) = WsSink::spawn(socket, state.adapter.clone(), state.core.config().send_queue_capacity);
    let conn = state.core.handle_open(handshake, handshake_values, sink);
    let client_id = conn.client_id().to_string();
    info!(client_id, "websocket connection accepted");

    while let Some(frame) = reader.next_text().await {
        state.core.handle_message(&client_id, frame);
    }

    state.core.handle_close(&client_id).await;
}
