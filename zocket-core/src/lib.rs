//! Transport-agnostic runtime for Zocket: a bidirectional RPC-and-event
//! framework over a duplex byte stream.
//!
//! This crate has no socket of its own — see the `zocket` crate for the
//! Axum WebSocket binding, or `zocket-test` for an in-process harness.
//! Everything here operates on [`transport::TransportSink`]/
//! [`transport::TransportAdapter`] and plain frame strings.

pub mod config;
pub mod connection;
pub mod context;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod rooms;
pub mod router;
pub mod schema;
pub mod send;
pub mod transport;

pub use config::ZocketConfig;
pub use connection::{Connection, ConnectionRegistry};
pub use context::{ConnectionContext, RequestContext};
pub use core::{ConnectHook, DisconnectHook, ZocketCore, ZocketCoreBuilder};
pub use dispatch::DispatchEngine;
pub use error::{Rejection, RouterBuildError};
pub use handler::{Handler, HandlerError};
pub use middleware::{Middleware, MiddlewareError};
pub use rooms::{RoomOperations, RoomRegistry};
pub use router::{Direction, Procedure, Router, RouterBuilder};
pub use schema::{FnValidator, NoopValidator, SchemaValidator, TypedValidator, ValidationIssue, ValidationOutcome};
pub use send::{Dispatch, ServerSender};
pub use transport::{HandshakeRequest, NoPublishAdapter, TransportAdapter, TransportError, TransportSink};
