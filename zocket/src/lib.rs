//! Axum transport adapter for Zocket.
//!
//! Binds `zocket-core`'s transport-agnostic runtime to a real WebSocket:
//! an [`adapter::RoomBroadcastAdapter`] for `toRoom` fan-out, a
//! [`sink::WsSink`] per connection, and an [`upgrade::zocket_upgrade`]
//! route handler that ties the two together.
//!
//! ```ignore
//! let config = ZocketConfig::from_env();
//! let adapter = Arc::new(RoomBroadcastAdapter::new(config.room_channel_capacity));
//! let core = ZocketCore::builder(router).config(config).build();
//! let app = Router::new()
//!     .route("/ws", get(zocket_upgrade))
//!     .with_state(ZocketState::new(core, adapter));
//! ```

pub mod adapter;
pub mod sink;
pub mod upgrade;

pub use adapter::RoomBroadcastAdapter;
pub use sink::{WsReader, WsSink};
pub use upgrade::{zocket_upgrade, ZocketState};

pub use zocket_core;
