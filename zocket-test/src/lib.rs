//! In-process test harness for Zocket — drive a [`zocket_core::core::ZocketCore`]
//! with fake connections instead of a real socket.

mod adapter;
mod harness;

pub use adapter::TestAdapter;
pub use harness::{TestClient, TestHarness};

pub use zocket_core;
