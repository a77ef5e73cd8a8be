//! Middleware chain (spec.md §4.4 dispatch step 6), grounded on the
//! teacher's `Interceptor<R, S>::around` — an RPITIT trait so ordinary
//! `async fn` middleware never needs boxing, plus an `Arc<dyn ErasedMiddleware>`
//! seam for the chain stored in the dispatch table (RPITIT traits aren't
//! object-safe, so the erasure happens once, at registration).

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::context::RequestContext;

/// Error returned by a middleware. Treated identically to a handler throw:
/// the chain aborts, no later middleware or handler runs, and — per
/// spec.md's Open Question resolution (see DESIGN.md) — no reply is sent
/// even if the frame carried an `rpcId`.
#[derive(Debug, Clone)]
pub struct MiddlewareError(pub String);

impl std::fmt::Display for MiddlewareError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for MiddlewareError {}

/// One link in a route's middleware chain.
///
/// Implementors inspect (and may mutate, via interior mutability on shared
/// state) the request context before the handler runs. Unlike the handler,
/// a middleware has no reply value — its only outputs are "continue" (`Ok`)
/// or "abort" (`Err`).
pub trait Middleware: Send + Sync + 'static {
    fn around<'a>(
        &'a self,
        ctx: &'a RequestContext,
        payload: &'a Value,
    ) -> Pin<Box<dyn Future<Output = Result<(), MiddlewareError>> + Send + 'a>>;
}

impl<F, Fut> Middleware for F
where
    F: Fn(RequestContext, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), MiddlewareError>> + Send + 'static,
{
    fn around<'a>(
        &'a self,
        ctx: &'a RequestContext,
        payload: &'a Value,
    ) -> Pin<Box<dyn Future<Output = Result<(), MiddlewareError>> + Send + 'a>> {
        let ctx = ctx.clone();
        let payload = payload.clone();
        Box::pin((self)(ctx, payload))
    }
}

/// Runs a chain in order, stopping at the first `Err`.
///
/// This is the whole of spec.md's dispatch step 6: "run the middleware
/// chain in declaration order; if any middleware throws, abort silently."
pub(crate) async fn run_chain(
    chain: &[std::sync::Arc<dyn Middleware>],
    ctx: &RequestContext,
    payload: &Value,
) -> Result<(), MiddlewareError> {
    for mw in chain {
        mw.around(ctx, payload).await?;
    }
    Ok(())
}
