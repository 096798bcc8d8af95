//! Side effects requested by the coordinator.
//!
//! The coordinator never performs IO. Each operation returns the effects in
//! the order they must be carried out; the host delivers frames
//! synchronously and runs timers, directory writes and pushes off the
//! critical path.

use std::time::Duration;

use crate::id::{ConnectionId, SessionId, UserId};
use crate::protocol::ServerEvent;
use crate::session::{ArmedTimer, TimerToken};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send a frame to a connection.
    Emit { to: ConnectionId, event: ServerEvent },
    /// Arm (or re-arm) the session timer. Replaces any earlier timer.
    ArmTimer {
        session: SessionId,
        token: TimerToken,
        after: Duration,
    },
    /// Drop the session timer without firing it.
    CancelTimer { session: SessionId },
    /// Best-effort User Directory write.
    PatchUser { user: UserId, patch: UserPatch },
    /// Best-effort push notification.
    Push {
        target: PushTarget,
        notification: PushNotification,
    },
}

/// Partial update of a User Directory record. `None` fields are left as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub push_token: Option<String>,
    pub is_online: Option<bool>,
    /// `Some(None)` clears the stored session id.
    pub current_session_id: Option<Option<SessionId>>,
}

impl UserPatch {
    pub fn online(is_online: bool) -> Self {
        Self {
            is_online: Some(is_online),
            ..Default::default()
        }
    }

    pub fn current_session(session: Option<SessionId>) -> Self {
        Self {
            current_session_id: Some(session),
            ..Default::default()
        }
    }

    pub fn push_token(token: impl Into<String>) -> Self {
        Self {
            push_token: Some(token.into()),
            ..Default::default()
        }
    }
}

/// Where a push goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushTarget {
    /// A token taken from a live, backgrounded connection.
    Token(String),
    /// A user who is not connected; the token comes from the User Directory.
    User(UserId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushKind {
    Paired,
    Chat,
}

impl PushKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushKind::Paired => "paired",
            PushKind::Chat => "chat",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushNotification {
    pub title: String,
    pub body: String,
    pub kind: PushKind,
    /// Connection that caused the notification, if any.
    pub from: Option<ConnectionId>,
}

impl PushNotification {
    pub fn paired() -> Self {
        Self {
            title: "Found a Stranger!".to_string(),
            body: "A stranger is waiting. Come back to chat!".to_string(),
            kind: PushKind::Paired,
            from: None,
        }
    }

    pub fn message(text: &str, from: &ConnectionId) -> Self {
        let body = if text.trim().is_empty() {
            "You have a new message".to_string()
        } else {
            text.to_string()
        };
        Self {
            title: "New message".to_string(),
            body,
            kind: PushKind::Chat,
            from: Some(from.clone()),
        }
    }
}

/// Ordered effect buffer filled by one coordinator step.
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    effects: Vec<Effect>,
}

impl Outbox {
    pub(crate) fn emit(&mut self, to: &ConnectionId, event: ServerEvent) {
        self.effects.push(Effect::Emit {
            to: to.clone(),
            event,
        });
    }

    pub(crate) fn arm_timer(&mut self, session: &SessionId, timer: ArmedTimer) {
        self.effects.push(Effect::ArmTimer {
            session: session.clone(),
            token: timer.token,
            after: timer.after,
        });
    }

    pub(crate) fn cancel_timer(&mut self, session: &SessionId) {
        self.effects.push(Effect::CancelTimer {
            session: session.clone(),
        });
    }

    pub(crate) fn patch_user(&mut self, user: &UserId, patch: UserPatch) {
        self.effects.push(Effect::PatchUser {
            user: user.clone(),
            patch,
        });
    }

    pub(crate) fn push(&mut self, target: PushTarget, notification: PushNotification) {
        self.effects.push(Effect::Push {
            target,
            notification,
        });
    }

    pub(crate) fn into_effects(self) -> Vec<Effect> {
        self.effects
    }
}
