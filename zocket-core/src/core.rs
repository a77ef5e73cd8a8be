//! Connection lifecycle orchestration — the piece that ties the router,
//! dispatch engine, connection manager, room registry and send fabric
//! together into one runnable core, independent of any particular
//! transport.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::task::AbortHandle;
use tracing::{info, warn};

use crate::config::ZocketConfig;
use crate::connection::{Connection, ConnectionRegistry};
use crate::context::ConnectionContext;
use crate::dispatch::DispatchEngine;
use crate::error::Rejection;
use crate::rooms::RoomRegistry;
use crate::router::Router;
use crate::schema::{SchemaValidator, ValidationOutcome};
use crate::send::ServerSender;
use crate::transport::{HandshakeRequest, NoPublishAdapter, TransportAdapter, TransportSink};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Runs once, successfully, when a connection is admitted. Use it to
/// authenticate the handshake, populate the connection's user context,
/// and join starting rooms.
pub trait ConnectHook: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a ConnectionContext) -> BoxFuture<'a, Result<(), String>>;
}

impl<F, Fut> ConnectHook for F
where
    F: Fn(ConnectionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
{
    fn call<'a>(&'a self, ctx: &'a ConnectionContext) -> BoxFuture<'a, Result<(), String>> {
        Box::pin((self)(clone_ctx(ctx)))
    }
}

/// Runs once, at most, when a connection goes away, and only if
/// `on_connect` fully resolved (see DESIGN.md for the chosen policy on a
/// connection whose `on_connect` threw or timed out).
pub trait DisconnectHook: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a ConnectionContext) -> BoxFuture<'a, Result<(), String>>;
}

impl<F, Fut> DisconnectHook for F
where
    F: Fn(ConnectionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
{
    fn call<'a>(&'a self, ctx: &'a ConnectionContext) -> BoxFuture<'a, Result<(), String>> {
        Box::pin((self)(clone_ctx(ctx)))
    }
}

// `ConnectionContext` doesn't implement `Clone` (it wraps an `Arc<Connection>`
// plus two more `Arc`s, so a manual shallow copy is just as cheap and keeps
// the type from claiming a `Clone` impl it has no other use for).
fn clone_ctx(ctx: &ConnectionContext) -> ConnectionContext {
    ctx.shallow_clone()
}

/// Builds a [`ZocketCore`].
pub struct ZocketCoreBuilder {
    router: Router,
    config: ZocketConfig,
    adapter: Arc<dyn TransportAdapter>,
    on_connect: Option<Arc<dyn ConnectHook>>,
    on_disconnect: Option<Arc<dyn DisconnectHook>>,
    on_error: Option<Arc<dyn Fn(&str, &str) + Send + Sync>>,
    handshake_validator: Option<Arc<dyn SchemaValidator>>,
}

impl ZocketCoreBuilder {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            config: ZocketConfig::default(),
            adapter: Arc::new(NoPublishAdapter),
            on_connect: None,
            on_disconnect: None,
            on_error: None,
            handshake_validator: None,
        }
    }

    pub fn config(mut self, config: ZocketConfig) -> Self {
        self.config = config;
        self
    }

    pub fn transport_adapter(mut self, adapter: impl TransportAdapter) -> Self {
        self.adapter = Arc::new(adapter);
        self
    }

    pub fn on_connect(mut self, hook: impl ConnectHook) -> Self {
        self.on_connect = Some(Arc::new(hook));
        self
    }

    pub fn on_disconnect(mut self, hook: impl DisconnectHook) -> Self {
        self.on_disconnect = Some(Arc::new(hook));
        self
    }

    /// Per-connection error callback: called with `(client_id, message)`
    /// whenever a transport send to that connection fails.
    pub fn on_error(mut self, f: impl Fn(&str, &str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Validate handshake headers/query against a schema before the
    /// connection is admitted.
    pub fn handshake_schema(mut self, validator: impl SchemaValidator) -> Self {
        self.handshake_validator = Some(Arc::new(validator));
        self
    }

    pub fn build(self) -> ZocketCore {
        let router = Arc::new(self.router);
        let connections = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomRegistry::new());
        let sender = Arc::new(ServerSender::new(connections.clone(), self.adapter, self.on_error.clone()));
        ZocketCore {
            inner: Arc::new(CoreInner {
                engine: DispatchEngine::new(router.clone(), rooms.clone()),
                router,
                connections,
                rooms,
                sender,
                config: self.config,
                on_connect: self.on_connect,
                on_disconnect: self.on_disconnect,
                on_error: self.on_error,
                handshake_validator: self.handshake_validator,
                actors: DashMap::new(),
            }),
        }
    }
}

struct CoreInner {
    router: Arc<Router>,
    engine: DispatchEngine,
    connections: Arc<ConnectionRegistry>,
    rooms: Arc<RoomRegistry>,
    sender: Arc<ServerSender>,
    config: ZocketConfig,
    on_connect: Option<Arc<dyn ConnectHook>>,
    on_disconnect: Option<Arc<dyn DisconnectHook>>,
    on_error: Option<Arc<dyn Fn(&str, &str) + Send + Sync>>,
    handshake_validator: Option<Arc<dyn SchemaValidator>>,
    actors: DashMap<String, AbortHandle>,
}

/// The transport-agnostic runtime for one Zocket server. Cheap to clone —
/// every field lives behind the shared `Arc<CoreInner>` — so a handle can
/// be cloned into every connection's actor task, an axum handler, or a
/// test harness.
#[derive(Clone)]
pub struct ZocketCore {
    inner: Arc<CoreInner>,
}

impl ZocketCore {
    pub fn builder(router: Router) -> ZocketCoreBuilder {
        ZocketCoreBuilder::new(router)
    }

    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    /// Tuning knobs for this running instance — a transport binding reads
    /// `send_queue_capacity` to size each connection's outbound channel.
    pub fn config(&self) -> &ZocketConfig {
        &self.inner.config
    }

    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.inner.rooms
    }

    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.inner.connections
    }

    pub fn sender(&self) -> &Arc<ServerSender> {
        &self.inner.sender
    }

    /// Validate a handshake before admitting the connection. Transports
    /// call this before upgrading the underlying stream so a rejected
    /// handshake never gets as far as a socket.
    ///
    /// On success, returns the *validated* handshake value — spec.md §3's
    /// `handshake_values` — coerced by the configured schema (defaults
    /// filled in, numeric strings parsed). With no schema configured this
    /// is just the merged header/query field bag. Pass the returned value
    /// straight through to [`ZocketCore::handle_open`]; it becomes what
    /// [`crate::context::ConnectionContext::handshake_values`] exposes to
    /// lifecycle hooks.
    pub async fn handle_upgrade(&self, handshake: &HandshakeRequest) -> Result<Value, Rejection> {
        let fields = handshake.merged_fields();
        let as_value = serde_json::to_value(&fields).unwrap_or(Value::Null);
        let Some(validator) = &self.inner.handshake_validator else { return Ok(as_value) };
        match validator.validate(&as_value).await {
            ValidationOutcome::Valid(coerced) => Ok(coerced),
            ValidationOutcome::Invalid(issues) => Err(Rejection::HandshakeInvalid { issues }),
        }
    }

    /// Admit a connection: assign a `client_id`, register it, and spawn
    /// its dispatch actor. `on_connect` runs inside that actor, so frames
    /// arriving before it resolves are queued, not dropped — see
    /// [`Connection::enqueue_frame`].
    ///
    /// `handshake_values` is the value returned by the preceding
    /// [`ZocketCore::handle_upgrade`] call.
    pub fn handle_open(
        &self,
        handshake: HandshakeRequest,
        handshake_values: Value,
        sink: Arc<dyn TransportSink>,
    ) -> Arc<Connection> {
        let client_id = self.inner.connections.generate_client_id(self.inner.config.client_id_suffix_len);
        let (conn, inbound_rx) =
            Connection::new(client_id.clone(), sink, Arc::new(handshake), Arc::new(handshake_values));
        let conn = Arc::new(conn);
        self.inner.connections.insert(conn.clone());

        let core = self.clone();
        let actor_conn = conn.clone();
        let handle = tokio::spawn(async move {
            core.run_connection_actor(actor_conn, inbound_rx).await;
        });
        self.inner.actors.insert(client_id, handle.abort_handle());

        conn
    }

    /// Queue one raw inbound frame for dispatch.
    pub fn handle_message(&self, client_id: &str, raw_frame: String) {
        match self.inner.connections.get(client_id) {
            Some(conn) => conn.enqueue_frame(raw_frame),
            None => warn!(client_id, "frame for unknown connection dropped"),
        }
    }

    /// Tear down a connection: stop its actor, run `on_disconnect` if
    /// `on_connect` ever succeeded, and release its room memberships.
    pub async fn handle_close(&self, client_id: &str) {
        let Some(conn) = self.inner.connections.remove(client_id) else { return };
        if let Some((_, handle)) = self.inner.actors.remove(client_id) {
            handle.abort();
        }

        if conn.is_connected() {
            if let Some(hook) = &self.inner.on_disconnect {
                let handshake = Arc::new(conn.handshake().clone());
                let ctx = ConnectionContext::new(
                    conn.clone(),
                    handshake,
                    conn.handshake_values(),
                    self.inner.sender.clone(),
                    self.inner.rooms.clone(),
                );
                let fut = hook.call(&ctx);
                match tokio::time::timeout(self.inner.config.disconnect_timeout, fut).await {
                    Ok(Ok(())) => {}
                    Ok(Err(reason)) => {
                        self.reject(client_id, Rejection::LifecycleThrew { phase: "on_disconnect", reason });
                    }
                    Err(_) => self.reject(
                        client_id,
                        Rejection::LifecycleThrew { phase: "on_disconnect", reason: "timed out".to_string() },
                    ),
                }
            }
        }

        self.inner.rooms.leave_all(client_id);
        conn.close().await;
        info!(client_id, "connection closed");
    }

    async fn run_connection_actor(
        self,
        conn: Arc<Connection>,
        mut inbound_rx: tokio::sync::mpsc::UnboundedReceiver<String>,
    ) {
        let handshake = Arc::new(conn.handshake().clone());

        if let Some(hook) = &self.inner.on_connect {
            let ctx = ConnectionContext::new(
                conn.clone(),
                handshake.clone(),
                conn.handshake_values(),
                self.inner.sender.clone(),
                self.inner.rooms.clone(),
            );
            let fut = hook.call(&ctx);
            match tokio::time::timeout(self.inner.config.connect_timeout, fut).await {
                Ok(Ok(())) => {}
                Ok(Err(reason)) => {
                    self.reject(conn.client_id(), Rejection::LifecycleThrew { phase: "on_connect", reason });
                    self.abandon_unconnected(&conn).await;
                    return;
                }
                Err(_) => {
                    self.reject(
                        conn.client_id(),
                        Rejection::LifecycleThrew { phase: "on_connect", reason: "timed out".to_string() },
                    );
                    self.abandon_unconnected(&conn).await;
                    return;
                }
            }
        }

        conn.mark_connected();
        info!(client_id = conn.client_id(), "connection opened");

        while let Some(frame) = inbound_rx.recv().await {
            // Steps 1-7 (parse, route, validate, middleware) are awaited
            // right here, one frame at a time, before the loop moves on to
            // the next — this is what makes handler *start* order match
            // receive order (spec.md §5 I6). Only the handler body and its
            // reply (steps 8-9) are spawned, so handlers are free to
            // pipeline their own `await`s without reordering each other's
            // entry point.
            let Some(ready) = self.inner.engine.prepare(&conn, &self.inner.sender, &frame).await else {
                continue;
            };
            let sender = self.inner.sender.clone();
            tokio::spawn(async move {
                DispatchEngine::invoke(ready, sender).await;
            });
        }
    }

    /// Log a lifecycle-hook [`Rejection`] the same way [`DispatchEngine`]
    /// logs a per-frame one: structured `client_id` field, `Display`-rendered
    /// rejection as the message.
    fn reject(&self, client_id: &str, rejection: Rejection) {
        warn!(client_id, %rejection, "connection lifecycle hook rejected");
    }

    /// A connection whose `on_connect` never resolved successfully never
    /// fully opened (see DESIGN.md): no `on_disconnect`, no room cleanup
    /// beyond what `on_connect` itself may have already done, just removal
    /// and a transport close.
    async fn abandon_unconnected(&self, conn: &Arc<Connection>) {
        self.inner.connections.remove(conn.client_id());
        self.inner.actors.remove(conn.client_id());
        self.inner.rooms.leave_all(conn.client_id());
        conn.close().await;
    }
}

