//! Runtime tuning for [`crate::core::ZocketCore`], loaded from the
//! environment: construct sane defaults, then let `ZOCKET_*` variables
//! override individual fields.

use std::env;
use std::time::Duration;

/// Tuning knobs for a running [`crate::core::ZocketCore`] instance.
///
/// None of these affect dispatch *semantics* (ordering, lifecycle,
/// taxonomy) — they size buffers and pick defaults the core otherwise
/// leaves to the implementation.
#[derive(Debug, Clone)]
pub struct ZocketConfig {
    /// Bounded channel capacity for each connection's outbound send queue.
    pub send_queue_capacity: usize,
    /// Number of random hex characters appended when generating a
    /// `client_id`.
    pub client_id_suffix_len: usize,
    /// How long `on_connect` may run before it's treated as a lifecycle
    /// failure (frames must wait for it, so it cannot hang forever).
    pub connect_timeout: Duration,
    /// How long `on_disconnect` may run before the server stops waiting on
    /// it (it still runs to completion in the background).
    pub disconnect_timeout: Duration,
    /// Capacity of the broadcast channel a transport adapter opens per room
    /// topic (e.g. `zocket`'s `RoomBroadcastAdapter`). A slow subscriber
    /// that falls this far behind the room's publish rate starts dropping
    /// frames rather than blocking the publisher.
    pub room_channel_capacity: usize,
    /// HTTP status code a transport binding should reject a handshake with
    /// when `handle_upgrade` returns `Rejection::HandshakeInvalid` (spec.md
    /// §6: "validation failure -> HTTP 400"). Only consulted by HTTP-based
    /// transport bindings; `zocket-core` itself never issues an HTTP
    /// response.
    pub handshake_reject_status: u16,
}

impl Default for ZocketConfig {
    fn default() -> Self {
        Self {
            send_queue_capacity: 256,
            client_id_suffix_len: 12,
            connect_timeout: Duration::from_secs(10),
            disconnect_timeout: Duration::from_secs(5),
            room_channel_capacity: 256,
            handshake_reject_status: 400,
        }
    }
}

impl ZocketConfig {
    /// Start from [`Default`], then apply `ZOCKET_*` environment overrides.
    ///
    /// Unset or unparseable variables are ignored and the default is kept —
    /// a malformed tuning variable should never prevent the process from
    /// booting.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = parse_env("ZOCKET_SEND_QUEUE_CAPACITY") {
            cfg.send_queue_capacity = v;
        }
        if let Some(v) = parse_env("ZOCKET_CLIENT_ID_SUFFIX_LEN") {
            cfg.client_id_suffix_len = v;
        }
        if let Some(v) = parse_env::<u64>("ZOCKET_CONNECT_TIMEOUT_MS") {
            cfg.connect_timeout = Duration::from_millis(v);
        }
        if let Some(v) = parse_env::<u64>("ZOCKET_DISCONNECT_TIMEOUT_MS") {
            cfg.disconnect_timeout = Duration::from_millis(v);
        }
        if let Some(v) = parse_env("ZOCKET_ROOM_CHANNEL_CAPACITY") {
            cfg.room_channel_capacity = v;
        }
        if let Some(v) = parse_env("ZOCKET_HANDSHAKE_REJECT_STATUS") {
            cfg.handshake_reject_status = v;
        }

        cfg
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = ZocketConfig::default();
        assert!(cfg.send_queue_capacity > 0);
        assert!(cfg.client_id_suffix_len > 0);
        assert!(cfg.room_channel_capacity > 0);
        assert_eq!(cfg.handshake_reject_status, 400);
    }

    #[test]
    fn room_channel_capacity_env_override_applies() {
        env::set_var("ZOCKET_ROOM_CHANNEL_CAPACITY", "64");
        let cfg = ZocketConfig::from_env();
        assert_eq!(cfg.room_channel_capacity, 64);
        env::remove_var("ZOCKET_ROOM_CHANNEL_CAPACITY");
    }

    #[test]
    fn malformed_env_var_falls_back_to_default() {
        env::set_var("ZOCKET_SEND_QUEUE_CAPACITY", "not-a-number");
        let cfg = ZocketConfig::from_env();
        assert_eq!(cfg.send_queue_capacity, ZocketConfig::default().send_queue_capacity);
        env::remove_var("ZOCKET_SEND_QUEUE_CAPACITY");
    }
}
