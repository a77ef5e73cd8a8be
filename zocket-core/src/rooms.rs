//! Room Registry — named groups of client IDs, tracked as membership sets
//! rather than broadcast channels.
//!
//! A `tokio::sync::broadcast` channel per room is the right shape when
//! every subscriber reads the same channel. `toRoom` needs per-recipient
//! delivery through each connection's own transport sink instead (so a
//! slow or disconnected member doesn't affect delivery to others, and so
//! `publish`-capable transports can be used in place of member iteration),
//! so the registry here tracks plain membership sets and leaves fan-out to
//! the send fabric.

use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use serde_json::Value;
use tracing::warn;

use crate::send::ServerSender;
use crate::transport::TransportSink;

/// Bidirectional membership index: room -> members and member -> rooms, so
/// a disconnecting connection can be removed from every room it joined in
/// one pass without scanning every room.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<String, DashSet<String>>,
    memberships: DashMap<String, DashSet<String>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `client_id` to `room`. Returns `true` iff membership changed;
    /// joining twice is a no-op on the second call.
    pub fn join(&self, room: &str, client_id: &str) -> bool {
        let members = self.rooms.entry(room.to_string()).or_default();
        let changed = members.insert(client_id.to_string());
        drop(members);
        if changed {
            self.memberships.entry(client_id.to_string()).or_default().insert(room.to_string());
        }
        changed
    }

    /// Remove `client_id` from `room`. Returns `true` iff it was a member.
    pub fn leave(&self, room: &str, client_id: &str) -> bool {
        let changed = match self.rooms.get(room) {
            Some(members) => members.remove(client_id).is_some(),
            None => false,
        };
        if changed {
            if let Some(members) = self.rooms.get(room) {
                if members.is_empty() {
                    drop(members);
                    self.rooms.remove_if(room, |_, v| v.is_empty());
                }
            }
            if let Some(joined) = self.memberships.get(client_id) {
                joined.remove(room);
            }
        }
        changed
    }

    /// Remove `client_id` from every room it belongs to. Called exactly
    /// once per connection, after `on_disconnect` has observed the final
    /// membership set.
    pub fn leave_all(&self, client_id: &str) {
        if let Some((_, joined)) = self.memberships.remove(client_id) {
            let room_names: Vec<String> = joined.iter().map(|e| e.clone()).collect();
            for room in room_names {
                if let Some(members) = self.rooms.get(&room) {
                    members.remove(client_id);
                    let empty = members.is_empty();
                    drop(members);
                    if empty {
                        self.rooms.remove_if(&room, |_, v| v.is_empty());
                    }
                }
            }
        }
    }

    /// Current member IDs of `room`, or an empty vec if the room doesn't
    /// exist (never an error — an empty room is indistinguishable from one
    /// that was never created).
    pub fn members(&self, room: &str) -> Vec<String> {
        self.rooms.get(room).map(|m| m.iter().map(|e| e.clone()).collect()).unwrap_or_default()
    }

    /// The rooms `client_id` currently belongs to — the final subscription
    /// set, as seen by `on_disconnect`.
    pub fn rooms_of(&self, client_id: &str) -> Vec<String> {
        self.memberships.get(client_id).map(|r| r.iter().map(|e| e.clone()).collect()).unwrap_or_default()
    }

    pub fn contains(&self, room: &str, client_id: &str) -> bool {
        self.rooms.get(room).map(|m| m.contains(client_id)).unwrap_or(false)
    }
}

/// Room operations exposed to handlers and lifecycle hooks via `ctx.rooms`.
/// One instance per connection, built fresh for each
/// request (and for `on_connect`/`on_disconnect`) from that connection's
/// `client_id`, transport sink, the shared [`RoomRegistry`], and the
/// shared [`ServerSender`] — the same four things [`crate::context`]
/// already threads through for `ctx.send`.
pub struct RoomOperations {
    client_id: String,
    sink: Arc<dyn TransportSink>,
    registry: Arc<RoomRegistry>,
    sender: Arc<ServerSender>,
}

impl RoomOperations {
    pub(crate) fn new(
        client_id: String,
        sink: Arc<dyn TransportSink>,
        registry: Arc<RoomRegistry>,
        sender: Arc<ServerSender>,
    ) -> Self {
        Self { client_id, sink, registry, sender }
    }

    /// Join `room`. Idempotent: returns `true` iff this call
    /// actually changed membership, `false` if already joined.
    pub async fn join(&self, room: impl Into<String>) -> bool {
        let room = room.into();
        let changed = self.registry.join(&room, &self.client_id);
        if changed {
            if let Err(e) = self.sink.subscribe(&room).await {
                warn!(room, error = %e, "transport subscribe failed");
            }
        }
        changed
    }

    /// Leave `room`. A no-op (returns `false`) if not currently a member.
    pub async fn leave(&self, room: impl Into<String>) -> bool {
        let room = room.into();
        let changed = self.registry.leave(&room, &self.client_id);
        if changed {
            if let Err(e) = self.sink.unsubscribe(&room).await {
                warn!(room, error = %e, "transport unsubscribe failed");
            }
        }
        changed
    }

    /// The connection's current subscription set.
    pub fn current(&self) -> Vec<String> {
        self.registry.rooms_of(&self.client_id)
    }

    /// Membership predicate for a single room.
    pub fn has(&self, room: &str) -> bool {
        self.registry.contains(room, &self.client_id)
    }

    /// Shortcut for `send.<route>(payload).toRoom([room])`, bypassing the
    /// typed sender on purpose for dynamic, runtime-chosen routes.
    pub async fn broadcast(&self, room: &str, route: impl Into<String>, payload: Value) {
        self.sender.to_room([room.to_string()]).emit(route, payload).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_is_idempotent() {
        let reg = RoomRegistry::new();
        assert!(reg.join("lobby", "c1"));
        assert!(!reg.join("lobby", "c1"));
        assert_eq!(reg.members("lobby"), vec!["c1".to_string()]);
    }

    #[test]
    fn leave_all_clears_every_room() {
        let reg = RoomRegistry::new();
        reg.join("a", "c1");
        reg.join("b", "c1");
        reg.leave_all("c1");
        assert!(reg.members("a").is_empty());
        assert!(reg.members("b").is_empty());
        assert!(reg.rooms_of("c1").is_empty());
    }

    #[test]
    fn leave_removes_only_named_room() {
        let reg = RoomRegistry::new();
        reg.join("a", "c1");
        reg.join("b", "c1");
        assert!(reg.leave("a", "c1"));
        assert_eq!(reg.rooms_of("c1"), vec!["b".to_string()]);
    }
}
