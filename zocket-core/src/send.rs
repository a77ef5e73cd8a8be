//! Send fabric — the three targeting modes (`to`, `toRoom`, `broadcast`)
//! over the outbound event shape `{type, payload}`.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tracing::warn;

use crate::connection::ConnectionRegistry;
use crate::context::RequestContext;
use crate::error::Rejection;
use crate::transport::TransportAdapter;

/// Owns the registries and transport adapter that every outbound send goes
/// through. One instance per running [`crate::core::ZocketCore`], shared by
/// every connection's [`RequestContext::send`].
///
/// Room membership itself isn't tracked here — `toRoom` has nothing to
/// iterate directly, by design (see `send_to_room`); membership lives in
/// [`crate::rooms::RoomRegistry`] and is only ever consulted by a transport
/// adapter's own `publish` implementation.
pub struct ServerSender {
    connections: Arc<ConnectionRegistry>,
    adapter: Arc<dyn TransportAdapter>,
    on_error: Option<Arc<dyn Fn(&str, &str) + Send + Sync>>,
}

impl ServerSender {
    pub(crate) fn new(
        connections: Arc<ConnectionRegistry>,
        adapter: Arc<dyn TransportAdapter>,
        on_error: Option<Arc<dyn Fn(&str, &str) + Send + Sync>>,
    ) -> Self {
        Self { connections, adapter, on_error }
    }

    /// Target specific connections by `client_id`.
    pub fn to<I, S>(self: &Arc<Self>, client_ids: I) -> Dispatch<'_>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Dispatch {
            sender: self,
            target: Target::Clients(client_ids.into_iter().map(Into::into).collect()),
        }
    }

    /// Target every member of one or more rooms.
    pub fn to_room<I, S>(self: &Arc<Self>, rooms: I) -> Dispatch<'_>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Dispatch { sender: self, target: Target::Rooms(rooms.into_iter().map(Into::into).collect()) }
    }

    /// Target every currently-admitted connection.
    pub fn broadcast(self: &Arc<Self>) -> Dispatch<'_> {
        Dispatch { sender: self, target: Target::Broadcast }
    }

    /// Send the `__rpc_res` reply frame to the single connection that made
    /// an RPC call (dispatch step 9). Not part of the public targeting API:
    /// a reply always goes to exactly the requester, never to a room or
    /// broadcast target.
    pub(crate) async fn reply_rpc(&self, client_id: &str, rpc_id: &Value, payload: Value) {
        let frame = serde_json::json!({
            "type": "__rpc_res",
            "payload": payload,
            "rpcId": rpc_id,
        })
        .to_string();
        self.send_to_one(client_id, frame).await;
    }

    async fn send_to_one(&self, client_id: &str, frame: String) {
        match self.connections.get(client_id) {
            Some(conn) => {
                if let Err(e) = conn.send_text(frame).await {
                    let reason = e.to_string();
                    self.reject(Rejection::SendFailed { client_id: client_id.to_string(), reason: reason.clone() });
                    if let Some(f) = &self.on_error {
                        f(client_id, &reason);
                    }
                }
            }
            None => {
                warn!(client_id, "send to unknown client_id dropped");
            }
        }
    }

    /// Log a per-recipient [`Rejection`] the same way [`crate::dispatch::DispatchEngine`]
    /// logs a per-frame one. Delivery to the rest of a `to`/`broadcast`
    /// target set continues regardless — see [`Dispatch::emit`].
    fn reject(&self, rejection: Rejection) {
        warn!(%rejection, "send rejected");
    }

    /// `toRoom` delegates to the transport adapter's `publish`. When the
    /// adapter doesn't implement it, this logs a warning and no-ops — it
    /// deliberately does NOT fall back to iterating room members, which
    /// would silently defeat the whole point of offering a
    /// publish-capable adapter, at the cost of a dropped send being only
    /// visible in the logs.
    async fn send_to_room(&self, room: &str, frame: &str) {
        if !self.adapter.supports_publish() {
            warn!(room, "toRoom has no publish-capable transport adapter, dropping");
            return;
        }
        if let Err(e) = self.adapter.publish(room, Bytes::from(frame.to_string())).await {
            warn!(room, error = %e, "room publish failed, dropping");
        }
    }
}

enum Target {
    Clients(Vec<String>),
    Rooms(Vec<String>),
    Broadcast,
}

/// A builder for one outbound send, already bound to its target set.
/// Terminal operation is [`Dispatch::emit`].
pub struct Dispatch<'a> {
    sender: &'a Arc<ServerSender>,
    target: Target,
}

impl<'a> Dispatch<'a> {
    pub(crate) fn new(sender: &'a Arc<ServerSender>, _ctx: &RequestContext) -> Self {
        // Constructed with no target yet; callers immediately chain `.to`/
        // `.to_room`/`.broadcast` off `ctx.send()`. Kept as an inherent
        // method so `RequestContext::send` has somewhere to delegate.
        Dispatch { sender, target: Target::Broadcast }
    }

    /// Same as [`Dispatch::new`], for callers with no [`RequestContext`] to
    /// hand in (lifecycle hooks — see [`crate::context::ConnectionContext::send`]).
    pub(crate) fn new_unbound(sender: &'a Arc<ServerSender>) -> Self {
        Dispatch { sender, target: Target::Broadcast }
    }

    pub fn to<I, S>(self, client_ids: I) -> Dispatch<'a>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Dispatch { sender: self.sender, target: Target::Clients(client_ids.into_iter().map(Into::into).collect()) }
    }

    pub fn to_room<I, S>(self, rooms: I) -> Dispatch<'a>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Dispatch { sender: self.sender, target: Target::Rooms(rooms.into_iter().map(Into::into).collect()) }
    }

    pub fn broadcast(self) -> Dispatch<'a> {
        Dispatch { sender: self.sender, target: Target::Broadcast }
    }

    /// Emit `{type, payload}` to the bound target. Individual delivery
    /// failures are logged as
    /// [`crate::error::Rejection::SendFailed`] and do not abort delivery to
    /// the rest of the target set.
    pub async fn emit(self, event_type: impl Into<String>, payload: Value) {
        let frame = serde_json::json!({
            "type": event_type.into(),
            "payload": payload,
        })
        .to_string();

        match self.target {
            Target::Clients(ids) => {
                for id in ids {
                    self.sender.send_to_one(&id, frame.clone()).await;
                }
            }
            Target::Rooms(rooms) => {
                for room in rooms {
                    self.sender.send_to_room(&room, &frame).await;
                }
            }
            Target::Broadcast => {
                for id in self.sender.connections.client_ids() {
                    self.sender.send_to_one(&id, frame.clone()).await;
                }
            }
        }
    }
}
