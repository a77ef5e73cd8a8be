//! Ambient context store.
//!
//! A `Sender` proxy captured inside a nested route closure at
//! router-definition time has no connection to close over — the connection
//! doesn't exist yet. Instead it resolves "the current request" through a
//! `tokio::task_local!`, scoped around exactly the handler/middleware
//! invocation for one frame.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use crate::rooms::{RoomOperations, RoomRegistry};
use crate::send::{Dispatch, ServerSender};
use crate::transport::TransportSink;

/// Per-request context, built fresh for each inbound frame by
/// shallow-copying the connection's persistent user context into a new
/// ambient per-request context.
///
/// Cheap to clone — it's an `Arc` around the actual fields, so handing a
/// clone to middleware and then to the handler costs one refcount bump.
#[derive(Clone)]
pub struct RequestContext {
    inner: Arc<Inner>,
}

struct Inner {
    client_id: String,
    route: String,
    rpc_id: Option<Value>,
    data: DashMap<String, Value>,
    sender: Arc<ServerSender>,
    sink: Arc<dyn TransportSink>,
    rooms: Arc<RoomRegistry>,
}

impl RequestContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        client_id: String,
        route: String,
        rpc_id: Option<Value>,
        user_context: &DashMap<String, Value>,
        sender: Arc<ServerSender>,
        sink: Arc<dyn TransportSink>,
        rooms: Arc<RoomRegistry>,
    ) -> Self {
        let data = DashMap::new();
        for entry in user_context.iter() {
            data.insert(entry.key().clone(), entry.value().clone());
        }
        Self { inner: Arc::new(Inner { client_id, route, rpc_id, data, sender, sink, rooms }) }
    }

    /// The connection this frame arrived on.
    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    /// The dotted route this frame dispatched to.
    pub fn route(&self) -> &str {
        &self.inner.route
    }

    /// The inbound frame's `rpcId`, if it was shaped as an RPC call.
    pub fn rpc_id(&self) -> Option<&Value> {
        self.inner.rpc_id.as_ref()
    }

    /// Read a value copied from the connection's user context at dispatch
    /// time, or set earlier in this same chain by another middleware.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.data.get(key).map(|v| v.clone())
    }

    /// Set a value visible to the rest of this chain (later middleware, the
    /// handler). Does not write back to the connection's persistent user
    /// context — this copy is per-request.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.inner.data.insert(key.into(), value);
    }

    /// Begin a send-fabric call scoped to this request (`ctx.send().to(...)`,
    /// `ctx.send().broadcast()`, ...).
    pub fn send(&self) -> Dispatch<'_> {
        Dispatch::new(&self.inner.sender, self)
    }

    /// Room membership operations for the connection this frame arrived
    /// on: `join`, `leave`, `current`, `has`, `broadcast`.
    pub fn rooms(&self) -> RoomOperations {
        RoomOperations::new(
            self.inner.client_id.clone(),
            self.inner.sink.clone(),
            self.inner.rooms.clone(),
            self.inner.sender.clone(),
        )
    }
}

/// Context passed to `on_connect` / `on_disconnect`.
///
/// Unlike [`RequestContext`], this is not a per-request snapshot: `get`/`set`
/// read and write the connection's actual, persistent user context
/// directly, since lifecycle hooks are where that context is meant to be
/// populated (`on_connect` authenticating a token and storing a user id,
/// say) and drained (`on_disconnect` reading final state before cleanup).
pub struct ConnectionContext {
    conn: Arc<crate::connection::Connection>,
    handshake: Arc<crate::transport::HandshakeRequest>,
    handshake_values: Arc<Value>,
    sender: Arc<ServerSender>,
    rooms: Arc<RoomRegistry>,
}

impl ConnectionContext {
    pub(crate) fn new(
        conn: Arc<crate::connection::Connection>,
        handshake: Arc<crate::transport::HandshakeRequest>,
        handshake_values: Arc<Value>,
        sender: Arc<ServerSender>,
        rooms: Arc<RoomRegistry>,
    ) -> Self {
        Self { conn, handshake, handshake_values, sender, rooms }
    }

    pub fn client_id(&self) -> &str {
        self.conn.client_id()
    }

    /// Raw handshake transport data — unvalidated headers and query string.
    /// Prefer [`ConnectionContext::handshake_values`] for anything covered
    /// by the configured handshake schema; this stays around for fields a
    /// schema doesn't name (an `x-role` header with no corresponding field,
    /// say).
    pub fn handshake(&self) -> &crate::transport::HandshakeRequest {
        &self.handshake
    }

    /// The validated, schema-coerced handshake value (spec.md §3's
    /// `handshake_values`) — whatever the configured `handshake_schema`
    /// returned from [`crate::core::ZocketCore::handle_upgrade`], or the
    /// raw merged field bag if no schema was configured.
    pub fn handshake_values(&self) -> &Value {
        &self.handshake_values
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.conn.user_context().get(key).map(|v| v.clone())
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.conn.user_context().insert(key.into(), value);
    }

    /// The final subscription set at the moment `on_disconnect` observes
    /// it — rooms the room registry still has this client in.
    pub fn rooms(&self) -> Vec<String> {
        self.rooms.rooms_of(self.conn.client_id())
    }

    pub fn send(&self) -> Dispatch<'_> {
        Dispatch::new_unbound(&self.sender)
    }

    /// A shallow copy sharing the same underlying connection, handshake and
    /// sender — used to hand a lifecycle hook its own owned value without
    /// making `ConnectionContext` broadly `Clone`.
    pub(crate) fn shallow_clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            handshake: self.handshake.clone(),
            handshake_values: self.handshake_values.clone(),
            sender: self.sender.clone(),
            rooms: self.rooms.clone(),
        }
    }
}

tokio::task_local! {
    static CURRENT: RequestContext;
}

impl RequestContext {
    /// Run `fut` with `self` as the ambient context, so that
    /// [`RequestContext::current`] resolves inside it without the future
    /// needing to receive a context parameter.
    pub(crate) async fn scope<F>(self, fut: F) -> F::Output
    where
        F: std::future::Future,
    {
        CURRENT.scope(self, fut).await
    }

    /// The context of the frame currently being dispatched, if called from
    /// within a handler or middleware invocation.
    ///
    /// Returns `None` outside of dispatch (e.g. from a task spawned off the
    /// request and detached from its scope).
    pub fn current() -> Option<RequestContext> {
        CURRENT.try_with(|c| c.clone()).ok()
    }
}
