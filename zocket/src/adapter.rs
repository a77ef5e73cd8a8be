//! Room-publish transport adapter — a [`TransportAdapter`] backed by one
//! `tokio::sync::broadcast` channel per topic, the same shape as the
//! teacher's `WsRooms`/`WsBroadcaster` pair but storing raw frame bytes
//! instead of `axum::extract::ws::Message`, since `zocket-core` is
//! message-format agnostic.
//!
//! A single broadcast `send` reaches every subscriber in one call, which is
//! why `toRoom` prefers `publish` over iterating room members one at a
//! time: the cost is independent of room size.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::broadcast;
use zocket_core::transport::{TransportAdapter, TransportError};
use zocket_core::ZocketConfig;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The default production [`TransportAdapter`] for the Axum integration.
///
/// Topics are created lazily on first `subscribe`/`publish` and are never
/// removed — an idle channel with no subscribers costs one `DashMap` entry
/// and a few bytes, which is cheap enough not to bother garbage-collecting
/// against room churn.
#[derive(Clone)]
pub struct RoomBroadcastAdapter {
    topics: std::sync::Arc<DashMap<String, broadcast::Sender<Bytes>>>,
    channel_capacity: usize,
}

impl RoomBroadcastAdapter {
    /// `channel_capacity` sizes every per-topic broadcast channel this
    /// adapter opens — see [`ZocketConfig::room_channel_capacity`], the knob
    /// a deployment tunes. A subscriber that falls this many frames behind a
    /// room's publish rate starts dropping frames rather than blocking the
    /// publisher.
    pub fn new(channel_capacity: usize) -> Self {
        Self { topics: Default::default(), channel_capacity }
    }

    /// Get or create the channel for `topic` and subscribe to it. Used by
    /// [`crate::sink::WsSink::subscribe`] to start forwarding room
    /// broadcasts into one connection's outbound stream.
    pub fn subscribe_topic(&self, topic: &str) -> broadcast::Receiver<Bytes> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.channel_capacity).0)
            .subscribe()
    }
}

impl Default for RoomBroadcastAdapter {
    /// Sizes channels from [`ZocketConfig::default`]'s `room_channel_capacity`
    /// — callers that need the value to track `ZocketConfig::from_env()`
    /// should construct with [`RoomBroadcastAdapter::new`] instead.
    fn default() -> Self {
        Self::new(ZocketConfig::default().room_channel_capacity)
    }
}

impl TransportAdapter for RoomBroadcastAdapter {
    fn supports_publish(&self) -> bool {
        true
    }

    fn publish<'a>(&'a self, topic: &'a str, frame: Bytes) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            let tx =
                self.topics.entry(topic.to_string()).or_insert_with(|| broadcast::channel(self.channel_capacity).0);
            // No active subscribers is not an error: a room can exist with
            // zero *transport-level* listeners briefly between a join and
            // the forwarder task actually starting.
            let _ = tx.send(frame);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_a_subscriber() {
        let adapter = RoomBroadcastAdapter::new(256);
        let mut rx = adapter.subscribe_topic("lobby");
        adapter.publish("lobby", Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_not_an_error() {
        let adapter = RoomBroadcastAdapter::new(256);
        assert!(adapter.publish("empty-room", Bytes::from_static(b"x")).await.is_ok());
    }
}
