//! One two-party conversation.
//!
//! A session is `Active` while both members are connected and `Paused`
//! while one or both are missing. A paused session always carries exactly
//! one armed timer: the grace timer when one member is still present, the
//! shorter abandon timer when nobody is. Arming replaces the previous
//! timer and mints a fresh [`TimerToken`]; a token that no longer matches
//! the armed one is stale and must be ignored when it fires.

use std::time::Duration;

use crate::id::{ConnectionId, SessionId, UserId};
use crate::log::MessageLog;

/// Maximum number of members in a session.
pub const MAX_MEMBERS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Paused,
    Ended,
}

/// Single-shot identity of one armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

/// What a timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// One member is waiting for the other to come back.
    Grace,
    /// Nobody is left; the session is only kept for a late rejoin.
    Abandon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedTimer {
    pub token: TimerToken,
    pub kind: TimerKind,
    pub after: Duration,
}

#[derive(Debug)]
pub struct Session {
    id: SessionId,
    members: Vec<ConnectionId>,
    log: MessageLog,
    state: SessionState,
    timer: Option<ArmedTimer>,
    next_token: u64,
    /// Users who dropped out and have not rejoined yet.
    departed: Vec<UserId>,
}

impl Session {
    pub(crate) fn new(id: SessionId, first: ConnectionId, second: ConnectionId) -> Self {
        Self {
            id,
            members: vec![first, second],
            log: MessageLog::new(),
            state: SessionState::Active,
            timer: None,
            next_token: 0,
            departed: Vec::new(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn members(&self) -> &[ConnectionId] {
        &self.members
    }

    pub fn is_member(&self, id: &ConnectionId) -> bool {
        self.members.contains(id)
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= MAX_MEMBERS
    }

    /// The other member, if present.
    pub fn partner_of(&self, id: &ConnectionId) -> Option<&ConnectionId> {
        if !self.is_member(id) {
            return None;
        }
        self.members.iter().find(|member| *member != id)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut MessageLog {
        &mut self.log
    }

    pub fn timer(&self) -> Option<&ArmedTimer> {
        self.timer.as_ref()
    }

    /// Users whose connection dropped out of this session.
    pub fn departed(&self) -> &[UserId] {
        &self.departed
    }

    /// Whether `token` is the currently armed timer.
    pub fn fires(&self, token: TimerToken) -> bool {
        self.timer.is_some_and(|timer| timer.token == token)
    }

    pub(crate) fn add_member(&mut self, id: ConnectionId) -> bool {
        if self.is_full() || self.is_member(&id) {
            return false;
        }
        self.members.push(id);
        true
    }

    pub(crate) fn remove_member(&mut self, id: &ConnectionId) -> bool {
        let before = self.members.len();
        self.members.retain(|member| member != id);
        self.members.len() != before
    }

    pub(crate) fn mark_departed(&mut self, user: UserId) {
        if !self.departed.contains(&user) {
            self.departed.push(user);
        }
    }

    pub(crate) fn mark_returned(&mut self, user: &UserId) {
        self.departed.retain(|departed| departed != user);
    }

    /// Arm a new timer, invalidating any previous one.
    pub(crate) fn arm(&mut self, kind: TimerKind, after: Duration) -> ArmedTimer {
        self.next_token += 1;
        let timer = ArmedTimer {
            token: TimerToken(self.next_token),
            kind,
            after,
        };
        self.timer = Some(timer);
        timer
    }

    pub(crate) fn disarm(&mut self) -> Option<ArmedTimer> {
        self.timer.take()
    }

    pub(crate) fn pause(&mut self) {
        self.state = SessionState::Paused;
    }

    pub(crate) fn resume(&mut self) {
        self.state = SessionState::Active;
    }

    pub(crate) fn end(&mut self) {
        self.state = SessionState::Ended;
    }
}
