//! Reconnection controller: re-attaches a returning connection to the
//! session it remembers.
//!
//! A rejoin succeeds when the session still exists and has a free seat,
//! including the short window after both members dropped. Anything else
//! falls back to ordinary pairing.

use tracing::info;

use crate::coordinator::Coordinator;
use crate::effect::{Effect, Outbox, UserPatch};
use crate::id::{ConnectionId, SessionId};
use crate::protocol::ServerEvent;
use crate::session::TimerKind;

impl Coordinator {
    pub fn rejoin(&mut self, id: &ConnectionId, session_id: &SessionId) -> Vec<Effect> {
        let mut out = Outbox::default();
        self.rejoin_into(id, session_id, &mut out);
        out.into_effects()
    }

    pub(crate) fn rejoin_into(&mut self, id: &ConnectionId, session_id: &SessionId, out: &mut Outbox) {
        let Some(handle) = self.handles.get(id) else {
            return;
        };
        let user = handle.user_id.clone();

        match handle.session.clone() {
            Some(current) if &current == session_id => {
                // Already seated here: replay so the client can resync.
                if let Some(session) = self.sessions.get(session_id) {
                    out.emit(id, ServerEvent::Rejoined { session_id: session_id.clone() });
                    out.emit(id, ServerEvent::ChatHistory(session.log().messages().to_vec()));
                }
                return;
            }
            Some(current) => {
                self.leave_session(id, user.as_ref(), &current, out);
                if let Some(handle) = self.handles.get_mut(id) {
                    handle.leave();
                }
            }
            None => {}
        }

        let grace_period = self.config.grace_period;
        let timeout_ms = self.config.grace_timeout_ms();
        let Some(session) = self
            .sessions
            .get_mut(session_id)
            .filter(|session| !session.is_full())
        else {
            self.reject_rejoin(id, session_id, out);
            return;
        };

        if session.disarm().is_some() {
            out.cancel_timer(session_id);
        }
        let existing = session.members().first().cloned();
        session.add_member(id.clone());
        if let Some(user) = &user {
            session.mark_returned(user);
        }
        let history = session.log().messages().to_vec();

        let lone = existing.is_none();
        if lone {
            // Nobody else is here yet: wait for the partner as if they had just dropped.
            session.pause();
            let timer = session.arm(TimerKind::Grace, grace_period);
            out.arm_timer(session_id, timer);
        } else {
            session.resume();
        }

        self.pool.remove(id);
        if let Some(handle) = self.handles.get_mut(id) {
            handle.join(session_id.clone(), existing.clone());
        }
        if let Some(partner) = &existing {
            if let Some(handle) = self.handles.get_mut(partner) {
                handle.partner = Some(id.clone());
            }
            out.emit(partner, ServerEvent::PartnerRejoined);
        }

        out.emit(id, ServerEvent::Rejoined { session_id: session_id.clone() });
        out.emit(id, ServerEvent::ChatHistory(history));
        if lone {
            out.emit(id, ServerEvent::PartnerPaused { timeout_ms });
        }
        if let Some(user) = &user {
            out.patch_user(user, UserPatch::current_session(Some(session_id.clone())));
        }
        info!(connection = %id, session = %session_id, "rejoined");
    }

    fn reject_rejoin(&mut self, id: &ConnectionId, session_id: &SessionId, out: &mut Outbox) {
        if let Some(handle) = self.handles.get_mut(id) {
            handle.leave();
            if let Some(user) = &handle.user_id {
                out.patch_user(user, UserPatch::current_session(None));
            }
        }
        out.emit(id, ServerEvent::RejoinFailed);
        info!(connection = %id, session = %session_id, "rejoin failed");
        self.queue_for_partner(id, out);
    }
}
