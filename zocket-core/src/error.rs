//! Error taxonomy for the Zocket server runtime.
//!
//! Two distinct error shapes:
//!
//! - [`RouterBuildError`] — a *fatal*, startup-time configuration error.
//!   Raised by [`crate::router::Router::build`], never seen at runtime.
//! - [`Rejection`] — the non-fatal, per-frame or per-connection disposition
//!   table. Never propagated across connections or returned to callers;
//!   logged via `tracing::warn!` and the frame/connection is dropped.

use std::fmt;

/// A configuration error raised while flattening a router tree.
///
/// These are startup errors: the process should fail to boot rather than
/// serve with a malformed dispatch table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterBuildError {
    /// Two procedures were declared at the same dotted path.
    DuplicateRoute(String),
    /// An `out` procedure had a handler attached (outgoing procedures are
    /// declarations only).
    HandlerOnOutgoing(String),
    /// An `in` procedure had no handler.
    MissingHandler(String),
    /// A route segment used the reserved name `__rpc_res`.
    ReservedSegment(String),
}

impl fmt::Display for RouterBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterBuildError::DuplicateRoute(path) => {
                write!(f, "duplicate route registered at `{path}`")
            }
            RouterBuildError::HandlerOnOutgoing(path) => {
                write!(f, "outgoing procedure `{path}` must not have a handler")
            }
            RouterBuildError::MissingHandler(path) => {
                write!(f, "incoming procedure `{path}` has no handler")
            }
            RouterBuildError::ReservedSegment(path) => {
                write!(f, "`{path}` uses the reserved route segment `__rpc_res`")
            }
        }
    }
}

impl std::error::Error for RouterBuildError {}

/// The non-fatal per-frame / per-connection disposition taxonomy (spec.md §7).
///
/// Every variant here is logged and results in the frame (or connection)
/// being dropped; none of them produce a reply or propagate to any other
/// connection.
#[derive(Debug)]
pub enum Rejection {
    /// Handshake metadata failed the configured headers schema. Carries
    /// the structured issues verbatim so the HTTP 400 rejection body can
    /// report `{"error": "Invalid headers", "details": issues}` per
    /// spec.md §6 without re-deriving them from a flattened string.
    HandshakeInvalid { issues: Vec<crate::schema::ValidationIssue> },
    /// The raw frame was not valid UTF-8 JSON, or `type` was missing/non-string.
    FrameMalformed { reason: &'static str },
    /// `type` did not match any entry in the dispatch table.
    RouteUnknown { route: String },
    /// The payload schema rejected the input.
    PayloadInvalid { route: String, issues: Vec<crate::schema::ValidationIssue> },
    /// A middleware in the chain returned an error (treated as a throw).
    MiddlewareRejected { route: String, reason: String },
    /// The handler itself returned an error.
    HandlerThrew { route: String, reason: String },
    /// A transport-level send to one recipient failed; delivery to others
    /// continues.
    SendFailed { client_id: String, reason: String },
    /// `on_connect` or `on_disconnect` returned an error.
    LifecycleThrew { phase: &'static str, reason: String },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::HandshakeInvalid { issues } => {
                write!(f, "handshake invalid ({} issue(s))", issues.len())
            }
            Rejection::FrameMalformed { reason } => write!(f, "malformed frame: {reason}"),
            Rejection::RouteUnknown { route } => write!(f, "unknown route `{route}`"),
            Rejection::PayloadInvalid { route, issues } => {
                write!(f, "payload invalid for `{route}` ({} issue(s))", issues.len())
            }
            Rejection::MiddlewareRejected { route, reason } => {
                write!(f, "middleware rejected `{route}`: {reason}")
            }
            Rejection::HandlerThrew { route, reason } => {
                write!(f, "handler for `{route}` threw: {reason}")
            }
            Rejection::SendFailed { client_id, reason } => {
                write!(f, "send to `{client_id}` failed: {reason}")
            }
            Rejection::LifecycleThrew { phase, reason } => {
                write!(f, "{phase} threw: {reason}")
            }
        }
    }
}

impl std::error::Error for Rejection {}
