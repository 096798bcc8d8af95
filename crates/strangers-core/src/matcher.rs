//! Pairing matcher: drains the waiting pool two at a time.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::coordinator::Coordinator;
use crate::effect::{Effect, Outbox, PushNotification, PushTarget, UserPatch};
use crate::handle::Handle;
use crate::id::ConnectionId;
use crate::protocol::ServerEvent;

/// Two waiting connections may be paired unless they are the same
/// connection or one of them just skipped away from the other.
fn compatible(handles: &HashMap<ConnectionId, Handle>, a: &ConnectionId, b: &ConnectionId) -> bool {
    if a == b {
        return false;
    }
    let (Some(first), Some(second)) = (handles.get(a), handles.get(b)) else {
        return false;
    };
    first.avoid.as_ref() != Some(b) && second.avoid.as_ref() != Some(a)
}

impl Coordinator {
    /// Pair waiting connections until no compatible pair remains.
    ///
    /// Safe to call at any time; with fewer than two waiting connections it
    /// does nothing.
    pub fn run_matcher(&mut self) -> Vec<Effect> {
        let mut out = Outbox::default();
        self.match_into(&mut out);
        out.into_effects()
    }

    pub(crate) fn match_into(&mut self, out: &mut Outbox) {
        let handles = &self.handles;
        let ghosts = self.pool.retain(|id| handles.contains_key(id));
        if ghosts > 0 {
            debug!(ghosts, "dropped closed connections from the waiting pool");
        }

        loop {
            let handles = &self.handles;
            let Some((first, second)) = self.pool.take_pair(|a, b| compatible(handles, a, b)) else {
                break;
            };
            self.pair(first, second, out);
        }
    }

    fn pair(&mut self, first: ConnectionId, second: ConnectionId, out: &mut Outbox) {
        let session_id = self
            .sessions
            .create(first.clone(), second.clone())
            .id()
            .clone();

        for (me, partner) in [(&first, &second), (&second, &first)] {
            let Some(handle) = self.handles.get_mut(me) else {
                continue;
            };
            handle.join(session_id.clone(), Some(partner.clone()));
            out.emit(me, ServerEvent::Paired { session_id: session_id.clone() });

            if let Some(user) = &handle.user_id {
                out.patch_user(user, UserPatch::current_session(Some(session_id.clone())));
            }
            if let Some(token) = handle.push_token_if_background() {
                out.push(PushTarget::Token(token.to_string()), PushNotification::paired());
            }
        }
        info!(session = %session_id, %first, %second, "paired");
    }
}
