//! # strangers-core
//!
//! Core state machine for anonymous two-party chat:
//! - Waiting pool and FIFO pairing matcher
//! - Sessions with grace-period timers and a mutable message log
//! - Reconnection of returning connections to their prior session
//! - Wire protocol events exchanged with clients
//!
//! This crate has no network code, no storage code and no runtime.
//! Every operation on the [`Coordinator`] returns a list of [`Effect`]s
//! that the host (the relay) carries out: frames to send, timers to arm,
//! directory updates and push notifications.

pub mod coordinator;
pub mod effect;
pub mod error;
pub mod handle;
pub mod id;
pub mod log;
pub mod matcher;
pub mod message;
pub mod pool;
pub mod protocol;
pub mod reconnect;
pub mod registry;
pub mod session;

pub use coordinator::{Coordinator, CoordinatorConfig};
pub use effect::{Effect, PushKind, PushNotification, PushTarget, UserPatch};
pub use error::{Error, Result};
pub use id::{ConnectionId, MessageId, SessionId, UserId};
pub use message::{ChatOp, Message, Reaction, ReplyRef};
pub use protocol::{ClientEvent, ServerEvent};
pub use session::{ArmedTimer, Session, SessionState, TimerKind, TimerToken};
