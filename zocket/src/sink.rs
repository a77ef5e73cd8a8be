//! [`TransportSink`] over an Axum `WebSocket`, in the same split-socket
//! shape as the teacher's `WsStream`: a background task owns the write
//! half and receives frames over an `mpsc` channel, so any number of
//! callers (dispatch, room forwarders, lifecycle hooks) can hold a cheap
//! `Clone`-able handle and send concurrently without fighting over a
//! `&mut WebSocket`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::warn;
use zocket_core::transport::{TransportError, TransportSink};

use crate::adapter::RoomBroadcastAdapter;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One connection's write half, plus the set of room-forwarder tasks
/// currently feeding it.
pub struct WsSink {
    outbound: mpsc::Sender<Message>,
    adapter: Arc<RoomBroadcastAdapter>,
    forwarders: DashMap<String, AbortHandle>,
}

impl WsSink {
    /// Split `socket`, spawn the writer task, and return the sink plus the
    /// read half for the caller to drive (the caller owns the connection's
    /// inbound loop; the sink only ever writes).
    ///
    /// `queue_capacity` bounds the outbound channel — `ZocketConfig::send_queue_capacity`
    /// is the knob a deployment tunes; a slow reader fills it and
    /// subsequent sends wait rather than growing memory without bound.
    pub fn spawn(socket: WebSocket, adapter: Arc<RoomBroadcastAdapter>, queue_capacity: usize) -> (Arc<Self>, WsReader) {
        let (mut write, read) = socket.split();
        let (tx, mut rx) = mpsc::channel::<Message>(queue_capacity.max(1));

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if write.send(msg).await.is_err() {
                    break;
                }
            }
            let _ = write.close().await;
        });

        let sink = Arc::new(Self { outbound: tx, adapter, forwarders: DashMap::new() });
        (sink, WsReader { read })
    }
}

impl TransportSink for WsSink {
    fn send_text<'a>(&'a self, frame: String) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            self.outbound.send(Message::Text(frame.into())).await.map_err(|_| TransportError::Closed)
        })
    }

    fn close<'a>(&'a self) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            for entry in self.forwarders.iter() {
                entry.value().abort();
            }
            self.forwarders.clear();
            // Dropping the sender side closes the writer task's loop on its
            // own; an explicit close message is best-effort.
            let _ = self.outbound.send(Message::Close(None)).await;
            Ok(())
        })
    }

    fn subscribe<'a>(&'a self, topic: &'a str) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            if self.forwarders.contains_key(topic) {
                return Ok(());
            }
            let mut rx = self.adapter.subscribe_topic(topic);
            let outbound = self.outbound.clone();
            let handle = tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(frame) => {
                            let text = String::from_utf8_lossy(&frame).into_owned();
                            if outbound.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "room forwarder lagged, frames dropped");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
            self.forwarders.insert(topic.to_string(), handle.abort_handle());
            Ok(())
        })
    }

    fn unsubscribe<'a>(&'a self, topic: &'a str) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            if let Some((_, handle)) = self.forwarders.remove(topic) {
                handle.abort();
            }
            Ok(())
        })
    }
}

/// The read half of a connection's socket, owned by the caller that drives
/// its inbound loop (see [`crate::upgrade::run_connection`]).
pub struct WsReader {
    read: futures_util::stream::SplitStream<WebSocket>,
}

impl WsReader {
    /// Pull the next text frame, skipping ping/pong/binary frames we don't
    /// speak and returning `None` on a close frame or stream end.
    pub async fn next_text(&mut self) -> Option<String> {
        loop {
            match self.read.next().await? {
                Ok(Message::Text(text)) => return Some(text.to_string()),
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => {
                    warn!(error = %e, "websocket read error");
                    return None;
                }
            }
        }
    }
}
