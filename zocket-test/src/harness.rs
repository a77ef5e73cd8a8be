//! Drive a [`ZocketCore`] in-process, the same "wrap the real runtime, feed
//! it fake input, assert on what comes out" shape as the teacher's
//! `TestApp` wraps a `tower::Service` instead of binding a real listener.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::time::timeout;
use zocket_core::core::ZocketCore;
use zocket_core::error::Rejection;
use zocket_core::transport::{HandshakeRequest, TransportError, TransportSink};

use crate::adapter::TestAdapter;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// A fake write half: outbound frames land in an in-memory queue a
/// [`TestClient`] can drain, and `subscribe`/`unsubscribe` forward room
/// broadcasts from a [`TestAdapter`] the same way a real socket's
/// forwarder task would.
struct TestSink {
    outbound: mpsc::UnboundedSender<String>,
    adapter: TestAdapter,
    forwarders: DashMap<String, tokio::task::AbortHandle>,
    closed: std::sync::atomic::AtomicBool,
}

impl TransportSink for TestSink {
    fn send_text<'a>(&'a self, frame: String) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            if self.closed.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            self.outbound.send(frame).map_err(|_| TransportError::Closed)
        })
    }

    fn close<'a>(&'a self) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
            for entry in self.forwarders.iter() {
                entry.value().abort();
            }
            self.forwarders.clear();
            Ok(())
        })
    }

    fn subscribe<'a>(&'a self, topic: &'a str) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            if self.forwarders.contains_key(topic) {
                return Ok(());
            }
            let mut rx = self.adapter.subscribe_topic(topic);
            let outbound = self.outbound.clone();
            let handle = tokio::spawn(async move {
                while let Ok(frame) = rx.recv().await {
                    if outbound.send(String::from_utf8_lossy(&frame).into_owned()).is_err() {
                        break;
                    }
                }
            });
            self.forwarders.insert(topic.to_string(), handle.abort_handle());
            Ok(())
        })
    }

    fn unsubscribe<'a>(&'a self, topic: &'a str) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            if let Some((_, handle)) = self.forwarders.remove(topic) {
                handle.abort();
            }
            Ok(())
        })
    }
}

/// Wraps a built [`ZocketCore`] and its room adapter. Construct one per
/// test, then [`TestHarness::connect`] as many fake clients as the
/// scenario needs.
pub struct TestHarness {
    core: ZocketCore,
    adapter: TestAdapter,
}

impl TestHarness {
    pub fn new(core: ZocketCore) -> Self {
        let adapter = TestAdapter::new(core.config().room_channel_capacity);
        Self { core, adapter }
    }

    pub fn core(&self) -> &ZocketCore {
        &self.core
    }

    /// Run the handshake-rejection check, then (on success) admit a
    /// connection and start its actor. Mirrors what the Axum upgrade
    /// handler does before splitting a real socket.
    pub async fn connect(&self, handshake: HandshakeRequest) -> Result<TestClient, Rejection> {
        let handshake_values = self.core.handle_upgrade(&handshake).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Arc::new(TestSink {
            outbound: tx,
            adapter: self.adapter.clone(),
            forwarders: DashMap::new(),
            closed: std::sync::atomic::AtomicBool::new(false),
        });
        let conn = self.core.handle_open(handshake, handshake_values, sink);
        let client_id = conn.client_id().to_string();

        Ok(TestClient { core: self.core.clone(), client_id, inbound: AsyncMutex::new(rx), buffered: AsyncMutex::new(VecDeque::new()) })
    }

    /// Connect with an empty handshake — the common case for scenarios
    /// that don't exercise handshake validation.
    pub async fn connect_anonymous(&self) -> Result<TestClient, Rejection> {
        self.connect(HandshakeRequest::default()).await
    }
}

/// One fake connection: send frames in, read frames out, close it.
pub struct TestClient {
    core: ZocketCore,
    client_id: String,
    inbound: AsyncMutex<mpsc::UnboundedReceiver<String>>,
    buffered: AsyncMutex<VecDeque<Value>>,
}

impl TestClient {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Send one raw text frame, as if it arrived over the wire.
    pub fn send_raw(&self, frame: impl Into<String>) {
        self.core.handle_message(&self.client_id, frame.into());
    }

    /// Send a `{type, payload}` frame, the call/event shape.
    pub fn send(&self, event_type: &str, payload: Value) {
        self.send_raw(serde_json::json!({ "type": event_type, "payload": payload }).to_string());
    }

    /// Send a `{type, payload, rpcId}` frame and expect exactly one
    /// `__rpc_res` reply back, with the given timeout.
    pub async fn call(&self, event_type: &str, payload: Value, rpc_id: impl Into<Value>) -> Option<Value> {
        let rpc_id = rpc_id.into();
        self.send_raw(
            serde_json::json!({ "type": event_type, "payload": payload, "rpcId": rpc_id.clone() }).to_string(),
        );
        loop {
            let frame = self.recv_json().await?;
            if frame.get("type").and_then(Value::as_str) == Some("__rpc_res") && frame.get("rpcId") == Some(&rpc_id) {
                return frame.get("payload").cloned();
            }
        }
    }

    /// Pull the next outbound frame, parsed as JSON, waiting up to the
    /// harness's default timeout.
    pub async fn recv_json(&self) -> Option<Value> {
        if let Some(front) = self.buffered.lock().await.pop_front() {
            return Some(front);
        }
        let mut rx = self.inbound.lock().await;
        let frame = timeout(RECV_TIMEOUT, rx.recv()).await.ok().flatten()?;
        serde_json::from_str(&frame).ok()
    }

    /// Like [`TestClient::recv_json`] but only returns frames whose `type`
    /// matches, buffering and skipping anything else (e.g. a room
    /// broadcast interleaved with an RPC reply).
    pub async fn recv_event(&self, event_type: &str) -> Option<Value> {
        loop {
            let frame = self.recv_json().await?;
            if frame.get("type").and_then(Value::as_str) == Some(event_type) {
                return frame.get("payload").cloned();
            }
            self.buffered.lock().await.push_back(frame);
        }
    }

    /// Assert no frame arrives within the given window — used to confirm a
    /// rejected or silently-dropped frame produced no reply.
    pub async fn assert_silent(&self, within: Duration) {
        if let Some(front) = self.buffered.lock().await.pop_front() {
            panic!("expected silence, got buffered frame {front:?}");
        }
        let mut rx = self.inbound.lock().await;
        if let Ok(Some(frame)) = timeout(within, rx.recv()).await {
            panic!("expected silence, got frame {frame}");
        }
    }

    pub async fn close(&self) {
        self.core.handle_close(&self.client_id).await;
    }
}
