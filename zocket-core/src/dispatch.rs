//! Dispatch engine — the parse-validate-run-reply pipeline run once per
//! inbound frame, after the connection manager has established that the
//! frame is allowed to be processed at all (`on_connect` has resolved).
//!
//! Split into two halves on purpose. [`DispatchEngine::prepare`] covers
//! steps 1-7 (parse, route lookup, payload validation, middleware) and is
//! awaited synchronously, one frame at a time, by the connection's actor
//! loop in `crate::core` — this is what gives spec.md §5 I6 ("Implementations
//! MUST start handlers in order") its teeth: the handler for frame N cannot
//! be reached until frame N-1's middleware chain has finished running.
//! [`DispatchEngine::invoke`] covers steps 8-9 (the handler body and the RPC
//! reply) and is what the caller is expected to `tokio::spawn` per frame,
//! since spec.md explicitly allows handler *bodies* to pipeline — only their
//! start order is constrained.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::connection::Connection;
use crate::context::RequestContext;
use crate::error::Rejection;
use crate::handler::Handler;
use crate::middleware::run_chain;
use crate::rooms::RoomRegistry;
use crate::router::{Direction, Router};
use crate::schema::ValidationOutcome;
use crate::send::ServerSender;

/// One frame that cleared steps 1-7 and is ready for its handler to run.
/// Produced by [`DispatchEngine::prepare`], consumed by [`DispatchEngine::invoke`].
pub struct ReadyInvocation {
    client_id: String,
    route: String,
    rpc_id: Option<Value>,
    ctx: RequestContext,
    handler: Arc<dyn Handler>,
    payload: Value,
}

/// Runs the flattened [`Router`] against inbound frames.
///
/// Stateless beyond the router table and room registry handle — all
/// per-connection and per-request state is threaded through
/// [`DispatchEngine::prepare`]'s arguments, so one engine instance is
/// shared by every connection.
pub struct DispatchEngine {
    router: Arc<Router>,
    rooms: Arc<RoomRegistry>,
}

impl DispatchEngine {
    pub fn new(router: Arc<Router>, rooms: Arc<RoomRegistry>) -> Self {
        Self { router, rooms }
    }

    /// Steps 1-7 of spec.md §4.4: parse, extract fields, route lookup,
    /// validate the payload, build the ambient per-request context, run the
    /// middleware chain. Every rejection in this range is handled here by
    /// logging a [`Rejection`] and returning `None` — nothing here ever
    /// panics the caller's task or propagates an error to it.
    ///
    /// Must be `.await`ed by the caller before moving on to the next queued
    /// frame on the same connection: this is the ordering guarantee — the
    /// handler for frame N is never reached until frame N-1 has cleared
    /// middleware.
    pub async fn prepare(
        &self,
        conn: &Connection,
        sender: &Arc<ServerSender>,
        raw: &str,
    ) -> Option<ReadyInvocation> {
        // Steps 1-2: parse the frame and extract its three fields.
        let frame: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(_) => {
                reject(Rejection::FrameMalformed { reason: "invalid JSON" });
                return None;
            }
        };
        let Some(route) = frame.get("type").and_then(Value::as_str) else {
            reject(Rejection::FrameMalformed { reason: "missing or non-string `type`" });
            return None;
        };
        let route = route.to_string();
        let payload = frame.get("payload").cloned().unwrap_or(Value::Null);
        let rpc_id = frame.get("rpcId").cloned();

        // Step 3 (frame ordering / "wait for on_connect") is enforced by
        // the caller before `prepare` is ever invoked — see
        // `crate::core::ZocketCore`'s per-connection actor.

        // Step 4: route lookup. An `out`-only declaration is not
        // client-invocable, so it's unknown from dispatch's point of view.
        let Some(procedure) = self.router.get(&route).filter(|p| p.direction == Direction::In) else {
            reject(Rejection::RouteUnknown { route });
            return None;
        };

        // Step 5: payload validation.
        let payload = match procedure.validator.validate(&payload).await {
            ValidationOutcome::Valid(value) => value,
            ValidationOutcome::Invalid(issues) => {
                // Resolved Open Question (see DESIGN.md): even when `rpcId`
                // is present, an invalid payload is dropped silently. No
                // error reply is sent; the caller times out.
                reject(Rejection::PayloadInvalid { route, issues });
                return None;
            }
        };

        // Step 6: build the ambient per-request context from the
        // connection's persistent user context.
        let ctx = RequestContext::new(
            conn.client_id().to_string(),
            route.clone(),
            rpc_id.clone(),
            conn.user_context(),
            Arc::clone(sender),
            conn.sink(),
            Arc::clone(&self.rooms),
        );

        // Step 7: middleware chain, aborting silently on the first throw.
        if let Err(e) = run_chain(&procedure.middleware, &ctx, &payload).await {
            reject(Rejection::MiddlewareRejected { route, reason: e.to_string() });
            return None;
        }

        let handler = procedure.handler.clone().expect("Direction::In procedures always have a handler");
        Some(ReadyInvocation { client_id: conn.client_id().to_string(), route, rpc_id, ctx, handler, payload })
    }

    /// Steps 8-9 of spec.md §4.4: invoke the handler with the ambient
    /// context scoped, then reply on success if the frame was RPC-shaped.
    ///
    /// Unlike [`DispatchEngine::prepare`], callers are free to run this
    /// concurrently across frames (spawn one task per `invoke` call) — only
    /// the *start* order of handlers is constrained by spec.md §5 I6, not
    /// their completion order.
    pub async fn invoke(ready: ReadyInvocation, sender: Arc<ServerSender>) {
        let ReadyInvocation { client_id, route, rpc_id, ctx, handler, payload } = ready;
        let ctx_for_scope = ctx.clone();
        let result = ctx_for_scope.scope(async { handler.call(&ctx, payload).await }).await;

        match result {
            Ok(reply) => {
                if let Some(rpc_id) = rpc_id {
                    sender.reply_rpc(&client_id, &rpc_id, reply.unwrap_or(Value::Null)).await;
                }
            }
            Err(e) => {
                // Resolved Open Question (see DESIGN.md): a handler throw
                // never produces an error reply, even for RPC frames.
                reject(Rejection::HandlerThrew { route, reason: e.to_string() });
            }
        }
    }
}

fn reject(rejection: Rejection) {
    warn!(%rejection, "frame rejected");
}
