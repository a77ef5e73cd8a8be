//! Procedure handlers — the leaves of a flattened router.
//!
//! Plain `async fn` in the trait, no boxing, no macro at the call site.
//! Handlers are stored behind
//! `Arc<dyn DynHandler>` in the dispatch table, which is the one place a
//! boxed future is unavoidable (trait objects can't be built from an
//! RPITIT-returning trait).

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::context::RequestContext;

/// Error returned by a handler body. Always non-fatal: the dispatch engine
/// logs it as [`crate::error::Rejection::HandlerThrew`] and moves on.
#[derive(Debug, Clone)]
pub struct HandlerError(pub String);

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for HandlerError {}

impl From<String> for HandlerError {
    fn from(s: String) -> Self {
        HandlerError(s)
    }
}

impl From<&str> for HandlerError {
    fn from(s: &str) -> Self {
        HandlerError(s.to_string())
    }
}

/// A procedure body. Implemented directly by ordinary `async fn`-returning
/// closures via the blanket impl below — route definitions almost never
/// need to write this trait by hand.
///
/// Returns the value to reply with when the inbound frame carried an
/// `rpcId` (ignored for event-shaped frames). `Ok(None)` from an RPC
/// procedure replies with a `null` payload.
pub trait Handler: Send + Sync + 'static {
    fn call(
        &self,
        ctx: &RequestContext,
        payload: Value,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Value>, HandlerError>> + Send + '_>>;
}

impl<F, Fut> Handler for F
where
    F: Fn(RequestContext, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Value>, HandlerError>> + Send + 'static,
{
    fn call(
        &self,
        ctx: &RequestContext,
        payload: Value,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Value>, HandlerError>> + Send + '_>> {
        let ctx = ctx.clone();
        Box::pin((self)(ctx, payload))
    }
}
