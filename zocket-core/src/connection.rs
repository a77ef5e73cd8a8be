//! Connection bookkeeping (half of the connection manager — the other
//! half, lifecycle sequencing and frame-ordering, lives in [`crate::core`]
//! since it needs the dispatch engine too).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use rand::Rng;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::transport::{HandshakeRequest, TransportError, TransportSink};

/// One admitted duplex connection.
///
/// Holds the write half of the transport plus the mutable "user context"
/// bag a handler can populate in `on_connect`: read-write, persists for
/// the connection's lifetime, shallow-copied per request into the ambient
/// [`crate::context::RequestContext`].
pub struct Connection {
    client_id: String,
    sink: Arc<dyn TransportSink>,
    write_lock: AsyncMutex<()>,
    user_context: DashMap<String, Value>,
    handshake: Arc<HandshakeRequest>,
    /// The validated/coerced value spec.md §3 calls `handshake_values` —
    /// see [`crate::core::ZocketCore::handle_upgrade`].
    handshake_values: Arc<Value>,
    /// Inbound frames, pushed by [`crate::core::ZocketCore::handle_message`]
    /// and drained in order by this connection's dispatch actor: a frame
    /// arriving before `on_connect` resolves is queued here, never dropped.
    inbound_tx: mpsc::UnboundedSender<String>,
    /// Set once `on_connect` resolves successfully: no handler, and per
    /// the policy in DESIGN.md no `on_disconnect` either, runs for a
    /// connection whose `on_connect` never completed.
    connected: AtomicBool,
}

impl Connection {
    pub(crate) fn new(
        client_id: String,
        sink: Arc<dyn TransportSink>,
        handshake: Arc<HandshakeRequest>,
        handshake_values: Arc<Value>,
    ) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        (
            Self {
                client_id,
                sink,
                write_lock: AsyncMutex::new(()),
                user_context: DashMap::new(),
                handshake,
                handshake_values,
                inbound_tx,
                connected: AtomicBool::new(false),
            },
            inbound_rx,
        )
    }

    pub fn handshake(&self) -> &HandshakeRequest {
        &self.handshake
    }

    pub(crate) fn handshake_values(&self) -> Arc<Value> {
        self.handshake_values.clone()
    }

    pub(crate) fn mark_connected(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Queue one raw inbound frame. Never fails under normal operation —
    /// the receiving half is held by the same connection's dispatch actor
    /// for its entire lifetime.
    pub(crate) fn enqueue_frame(&self, frame: String) {
        let _ = self.inbound_tx.send(frame);
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn user_context(&self) -> &DashMap<String, Value> {
        &self.user_context
    }

    /// This connection's transport sink, for wiring a [`crate::rooms::RoomOperations`]
    /// handle into a context (join/leave need it to call `subscribe`/`unsubscribe`).
    pub(crate) fn sink(&self) -> Arc<dyn TransportSink> {
        self.sink.clone()
    }

    /// Send one frame. Serialized behind a per-connection lock so that two
    /// concurrent sends (a handler reply racing a broadcast, say) can never
    /// interleave partial writes on the same socket.
    pub(crate) async fn send_text(&self, frame: String) -> Result<(), TransportError> {
        let _guard = self.write_lock.lock().await;
        self.sink.send_text(frame).await
    }

    pub(crate) async fn close(&self) {
        let _ = self.sink.close().await;
    }
}

/// All currently-admitted connections, keyed by `client_id`.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, Arc<Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, conn: Arc<Connection>) {
        self.connections.insert(conn.client_id().to_string(), conn);
    }

    pub(crate) fn remove(&self, client_id: &str) -> Option<Arc<Connection>> {
        self.connections.remove(client_id).map(|(_, c)| c)
    }

    pub fn get(&self, client_id: &str) -> Option<Arc<Connection>> {
        self.connections.get(client_id).map(|e| e.value().clone())
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.connections.contains_key(client_id)
    }

    /// Every currently-admitted client ID (the `broadcast()` target).
    pub fn client_ids(&self) -> Vec<String> {
        self.connections.iter().map(|e| e.key().clone()).collect()
    }

    /// Generate a `client_id` unique among currently-admitted connections:
    /// `client_<epoch_ms>_<base36_suffix>`. Collision-resistant (millisecond
    /// timestamp plus a random base36 suffix) but not cryptographic — it
    /// only needs to be unique among *live* connections, not unguessable.
    pub(crate) fn generate_client_id(&self, suffix_len: usize) -> String {
        const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
        loop {
            let epoch_ms = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis();
            let suffix: String = {
                let mut rng = rand::thread_rng();
                (0..suffix_len).map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char).collect()
            };
            let candidate = format!("client_{epoch_ms}_{suffix}");
            if !self.contains(&candidate) {
                return candidate;
            }
        }
    }
}
