//! In-memory [`TransportAdapter`], the test-harness twin of the Axum
//! crate's `RoomBroadcastAdapter`: one `tokio::sync::broadcast` channel per
//! topic, so `toRoom` fan-out can be exercised end to end without a real
//! socket.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::broadcast;
use zocket_core::transport::{TransportAdapter, TransportError};
use zocket_core::ZocketConfig;

type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

#[derive(Clone)]
pub struct TestAdapter {
    topics: Arc<DashMap<String, broadcast::Sender<Bytes>>>,
    channel_capacity: usize,
}

impl TestAdapter {
    /// `channel_capacity` mirrors `zocket`'s `RoomBroadcastAdapter::new` —
    /// see [`ZocketConfig::room_channel_capacity`].
    pub fn new(channel_capacity: usize) -> Self {
        Self { topics: Default::default(), channel_capacity }
    }

    pub fn subscribe_topic(&self, topic: &str) -> broadcast::Receiver<Bytes> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.channel_capacity).0)
            .subscribe()
    }
}

impl Default for TestAdapter {
    fn default() -> Self {
        Self::new(ZocketConfig::default().room_channel_capacity)
    }
}

impl TransportAdapter for TestAdapter {
    fn supports_publish(&self) -> bool {
        true
    }

    fn publish<'a>(&'a self, topic: &'a str, frame: Bytes) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            let tx =
                self.topics.entry(topic.to_string()).or_insert_with(|| broadcast::channel(self.channel_capacity).0);
            let _ = tx.send(frame);
            Ok(())
        })
    }
}
