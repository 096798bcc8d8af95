//! Session registry: the source of truth for live conversations.

use std::collections::HashMap;

use crate::id::{ConnectionId, SessionId};
use crate::session::{Session, SessionState};

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an active session for a freshly matched pair.
    pub fn create(&mut self, first: ConnectionId, second: ConnectionId) -> &mut Session {
        let mut id = SessionId::generate();
        while self.sessions.contains_key(&id) {
            id = SessionId::generate();
        }
        self.sessions
            .entry(id.clone())
            .or_insert_with(|| Session::new(id, first, second))
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    /// Take a session out of the registry, marking it ended.
    ///
    /// The armed timer (if any) is left on the returned session so the
    /// caller can cancel it. Detaching members and clearing directory
    /// references is the coordinator's job; see `Coordinator::end_session`.
    pub fn remove(&mut self, id: &SessionId) -> Option<Session> {
        let mut session = self.sessions.remove(id)?;
        session.end();
        Some(session)
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn count_in(&self, state: SessionState) -> usize {
        self.sessions.values().filter(|s| s.state() == state).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }
}
