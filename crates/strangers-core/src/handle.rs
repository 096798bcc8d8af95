//! Per-connection state held by the coordinator.

use crate::id::{ConnectionId, SessionId, UserId};

/// Transient attributes of one live connection.
///
/// Lives only as long as the connection; sessions refer to handles by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handle {
    pub id: ConnectionId,
    pub user_id: Option<UserId>,
    pub session: Option<SessionId>,
    pub partner: Option<ConnectionId>,
    pub background: bool,
    pub push_token: Option<String>,
    /// Connection this handle just skipped away from (or was skipped by).
    /// The matcher will not pair the two again until either pairs elsewhere.
    pub avoid: Option<ConnectionId>,
}

impl Handle {
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            user_id: None,
            session: None,
            partner: None,
            background: false,
            push_token: None,
            avoid: None,
        }
    }

    pub fn in_session(&self) -> bool {
        self.session.is_some()
    }

    /// Whether a push notification should stand in for a live frame.
    pub fn push_token_if_background(&self) -> Option<&str> {
        if self.background {
            self.push_token.as_deref()
        } else {
            None
        }
    }

    pub(crate) fn join(&mut self, session: SessionId, partner: Option<ConnectionId>) {
        self.session = Some(session);
        self.partner = partner;
        self.avoid = None;
    }

    pub(crate) fn leave(&mut self) {
        self.session = None;
        self.partner = None;
    }
}
