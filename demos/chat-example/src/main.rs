//! A minimal chat server built on Zocket: one room-scoped event
//! (`chat.say`), one RPC (`chat.join`), and an outgoing declaration
//! (`chat.onMessage`) so a generated client can type its subscription.
//!
//! Run with `cargo run -p example-chat`, then open a WebSocket to
//! `ws://127.0.0.1:8080/ws?username=alice`.

mod router;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use zocket::{zocket_upgrade, RoomBroadcastAdapter, ZocketState};
use zocket_core::core::ZocketCore;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = zocket_core::ZocketConfig::from_env();
    let adapter = Arc::new(RoomBroadcastAdapter::new(config.room_channel_capacity));

    let core = ZocketCore::builder(router::build())
        .config(config)
        .on_connect(router::on_connect)
        .on_disconnect(router::on_disconnect)
        .handshake_schema(router::UsernameHeader::validator())
        .build();

    let state = ZocketState::new(core, adapter);

    let app = axum::Router::new().route("/ws", get(zocket_upgrade)).with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], 8080));
    tracing::info!(%addr, "chat demo listening");
    let listener = tokio::net::TcpListener::bind(addr).await.expect("bind");
    axum::serve(listener, app).await.expect("serve");
}
