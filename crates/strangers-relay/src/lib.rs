//! # strangers-relay
//!
//! Network host for `strangers-core`: the WebSocket endpoint, the effect
//! executor (frames, timers, directory writes, pushes), the SQLite user
//! directory and the Expo push gateway.

pub mod api;
pub mod config;
pub mod directory;
pub mod error;
pub mod push;
pub mod relay;

pub use config::RelayConfig;
pub use directory::{SqliteDirectory, UserDirectory, UserRecord};
pub use error::{RelayError, Result};
pub use push::{DisabledPush, ExpoPush, PushGateway};
pub use relay::{RelayState, Stats, handle_connection};
