//! Wire protocol between clients and the relay.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.
//! Event names keep the spelling the mobile client already uses
//! (`"chat message"`, `"stop typing"`, `"appState"`, ...). Events without a
//! payload omit `data`.

use serde::{Deserialize, Serialize};

use crate::id::{SessionId, UserId};
use crate::message::{ChatOp, Message};

/// Frames sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Ask to be queued for a partner.
    #[serde(rename = "findPartner")]
    FindPartner,

    /// Re-attach to a previous session.
    #[serde(rename = "rejoin", rename_all = "camelCase")]
    Rejoin {
        #[serde(alias = "chatId")]
        session_id: SessionId,
    },

    #[serde(rename = "chat message")]
    ChatMessage(ChatOp),

    #[serde(rename = "typing")]
    Typing,

    #[serde(rename = "stop typing")]
    StopTyping,

    /// Leave the current session and go back to waiting.
    #[serde(rename = "skip")]
    Skip,

    #[serde(rename = "appState", rename_all = "camelCase")]
    AppState { is_background: bool },

    /// Bind a persistent user id (and optionally a push token) to the connection.
    #[serde(rename = "register", rename_all = "camelCase")]
    Register {
        user_id: UserId,
        #[serde(default)]
        push_token: Option<String>,
    },

    #[serde(rename = "registerPushToken")]
    RegisterPushToken(String),
}

/// Frames sent by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "waiting")]
    Waiting,

    #[serde(rename = "paired", rename_all = "camelCase")]
    Paired { session_id: SessionId },

    /// The partner dropped; the session is held for `timeout_ms`.
    #[serde(rename = "partner paused", rename_all = "camelCase")]
    PartnerPaused { timeout_ms: u64 },

    #[serde(rename = "partner rejoined")]
    PartnerRejoined,

    #[serde(rename = "rejoined", rename_all = "camelCase")]
    Rejoined { session_id: SessionId },

    #[serde(rename = "rejoin failed")]
    RejoinFailed,

    /// Full session log, oldest first.
    #[serde(rename = "chat history")]
    ChatHistory(Vec<Message>),

    #[serde(rename = "chat message")]
    ChatMessage(ChatOp),

    #[serde(rename = "typing")]
    Typing,

    #[serde(rename = "stop typing")]
    StopTyping,

    #[serde(rename = "stranger disconnected")]
    StrangerDisconnected,
}
