//! Transport adapter interface — the boundary between `zocket-core`'s
//! dispatch engine and whatever duplex byte stream actually carries
//! frames. One trait per connection for sending, one trait for the
//! process-wide adapter (so a server-wide `publish` can be implemented more
//! cheaply than "iterate every member and send").

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Metadata observed during the handshake, before a connection is admitted.
///
/// Deliberately narrow: headers and a query string, the two things every
/// duplex-stream transport (raw WebSocket, an HTTP upgrade, a test harness)
/// can produce without committing to one HTTP library's request type.
#[derive(Debug, Clone, Default)]
pub struct HandshakeRequest {
    pub headers: Vec<(String, String)>,
    pub query: String,
}

impl HandshakeRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Merge headers and query-string parameters into one field bag, with
    /// the query string winning on conflict — the escape hatch for browser
    /// WebSocket constructors, which can't set custom headers and so ferry
    /// them through the URL instead.
    pub fn merged_fields(&self) -> std::collections::BTreeMap<String, String> {
        let mut fields: std::collections::BTreeMap<String, String> =
            self.headers.iter().map(|(k, v)| (k.to_ascii_lowercase(), v.clone())).collect();
        for (k, v) in form_urlencoded::parse(self.query.trim_start_matches('?').as_bytes()) {
            fields.insert(k.to_ascii_lowercase(), v.into_owned());
        }
        fields
    }
}

/// The write half of one connection's duplex stream.
///
/// `ZocketCore` never touches the underlying socket directly — every
/// outbound frame, from a handler reply to a broadcast, ends up as one call
/// to [`TransportSink::send_text`] on the connection's sink.
pub trait TransportSink: Send + Sync + 'static {
    /// Send one complete text frame (a serialized JSON object).
    fn send_text<'a>(&'a self, frame: String) -> BoxFuture<'a, Result<(), TransportError>>;

    /// Close the underlying stream. Best-effort: errors are logged, not
    /// propagated.
    fn close<'a>(&'a self) -> BoxFuture<'a, Result<(), TransportError>>;

    /// Subscribe this connection to `topic` at the transport level.
    /// Called by [`crate::rooms::RoomOperations::join`]. Default is a
    /// no-op: only adapters backed by a transport with native topic
    /// subscriptions (a message broker, a WS library with its own
    /// broadcast groups) need to override this.
    fn subscribe<'a>(&'a self, _topic: &'a str) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async { Ok(()) })
    }

    /// Symmetric with [`TransportSink::subscribe`].
    fn unsubscribe<'a>(&'a self, _topic: &'a str) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async { Ok(()) })
    }
}

/// Process-wide transport capabilities beyond per-connection send.
///
/// The only operation here is `publish`, used by `toRoom` targeting when
/// the underlying transport can fan out to a topic itself rather than the
/// send fabric iterating every member's sink one at a time. Implementing
/// it is optional: adapters that can't support it report so via
/// [`TransportAdapter::supports_publish`], and `toRoom` logs a warning and
/// no-ops rather than falling back to member iteration — iterating would
/// quietly defeat the performance reason for offering a publish-capable
/// adapter in the first place.
pub trait TransportAdapter: Send + Sync + 'static {
    fn supports_publish(&self) -> bool {
        false
    }

    /// Publish `frame` to every connection subscribed to `topic` at the
    /// transport level. Only called when [`TransportAdapter::supports_publish`]
    /// returns `true`.
    fn publish<'a>(
        &'a self,
        _topic: &'a str,
        _frame: Bytes,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async { Err(TransportError::PublishUnsupported) })
    }
}

/// A transport adapter that never supports topic-level publish; `toRoom`
/// against it logs a warning and no-ops rather than iterating members (see
/// [`TransportAdapter`]). Useful for adapters with no native pub/sub
/// primitive, where `toRoom` isn't expected to be exercised.
pub struct NoPublishAdapter;

impl TransportAdapter for NoPublishAdapter {
    fn supports_publish(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub enum TransportError {
    Closed,
    PublishUnsupported,
    Other(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Closed => write!(f, "connection closed"),
            TransportError::PublishUnsupported => write!(f, "transport does not support publish"),
            TransportError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for TransportError {}
