//! The coordinator: one owned object holding every handle, the waiting
//! pool and the session registry.
//!
//! Each public operation is one atomic step. It mutates in-memory state
//! and returns the [`Effect`]s the host must carry out, in order. The host
//! is expected to serialize calls (one lock around the coordinator) so no
//! two steps interleave on the same session.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::effect::{Effect, Outbox, PushNotification, PushTarget, UserPatch};
use crate::handle::Handle;
use crate::id::{ConnectionId, SessionId, UserId};
use crate::message::ChatOp;
use crate::pool::WaitingPool;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::registry::SessionRegistry;
use crate::session::{Session, TimerKind, TimerToken};

/// How long a session waits for a dropped member (5 minutes).
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5 * 60);

/// How long an empty session is kept before it is discarded (2 minutes).
pub const DEFAULT_ABANDON_PERIOD: Duration = Duration::from_secs(2 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub grace_period: Duration,
    pub abandon_period: Duration,
}

impl CoordinatorConfig {
    /// Grace period as announced in `partner paused`, saturating at `u64::MAX`.
    pub fn grace_timeout_ms(&self) -> u64 {
        u64::try_from(self.grace_period.as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            abandon_period: DEFAULT_ABANDON_PERIOD,
        }
    }
}

#[derive(Debug, Default)]
pub struct Coordinator {
    pub(crate) config: CoordinatorConfig,
    pub(crate) handles: HashMap<ConnectionId, Handle>,
    pub(crate) pool: WaitingPool,
    pub(crate) sessions: SessionRegistry,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn handle(&self, id: &ConnectionId) -> Option<&Handle> {
        self.handles.get(id)
    }

    pub fn session(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn pool(&self) -> &WaitingPool {
        &self.pool
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn connection_count(&self) -> usize {
        self.handles.len()
    }

    /// A new connection arrived.
    ///
    /// With `resume` the connection goes straight to the reconnection path;
    /// otherwise it is queued and the matcher runs.
    pub fn connect(&mut self, id: ConnectionId, resume: Option<SessionId>) -> Vec<Effect> {
        let mut out = Outbox::default();
        if self.handles.contains_key(&id) {
            debug!(connection = %id, "duplicate connect ignored");
            return out.into_effects();
        }
        self.handles.insert(id.clone(), Handle::new(id.clone()));
        info!(connection = %id, "connected");

        match resume {
            Some(session_id) => self.rejoin_into(&id, &session_id, &mut out),
            None => self.queue_for_partner(&id, &mut out),
        }
        out.into_effects()
    }

    /// Route one inbound client frame.
    pub fn handle_event(&mut self, id: &ConnectionId, event: ClientEvent) -> Vec<Effect> {
        let mut out = Outbox::default();
        if !self.handles.contains_key(id) {
            debug!(connection = %id, "event from unknown connection dropped");
            return out.into_effects();
        }

        match event {
            ClientEvent::FindPartner => self.find_partner_into(id, &mut out),
            ClientEvent::Rejoin { session_id } => self.rejoin_into(id, &session_id, &mut out),
            ClientEvent::ChatMessage(op) => self.chat_into(id, op, &mut out),
            ClientEvent::Typing => self.relay_to_partner(id, ServerEvent::Typing, &mut out),
            ClientEvent::StopTyping => self.relay_to_partner(id, ServerEvent::StopTyping, &mut out),
            ClientEvent::Skip => self.skip_into(id, &mut out),
            ClientEvent::AppState { is_background } => self.set_background(id, is_background),
            ClientEvent::Register { user_id, push_token } => {
                self.register_into(id, user_id, push_token, &mut out)
            }
            ClientEvent::RegisterPushToken(token) => {
                self.register_push_token_into(id, token, &mut out)
            }
        }
        out.into_effects()
    }

    pub fn find_partner(&mut self, id: &ConnectionId) -> Vec<Effect> {
        let mut out = Outbox::default();
        self.find_partner_into(id, &mut out);
        out.into_effects()
    }

    pub fn chat(&mut self, id: &ConnectionId, op: ChatOp) -> Vec<Effect> {
        let mut out = Outbox::default();
        self.chat_into(id, op, &mut out);
        out.into_effects()
    }

    pub fn skip(&mut self, id: &ConnectionId) -> Vec<Effect> {
        let mut out = Outbox::default();
        self.skip_into(id, &mut out);
        out.into_effects()
    }

    /// The connection is gone. Pauses or abandons its session.
    pub fn disconnect(&mut self, id: &ConnectionId) -> Vec<Effect> {
        let mut out = Outbox::default();
        let Some(handle) = self.handles.remove(id) else {
            return out.into_effects();
        };
        self.pool.remove(id);

        if let Some(user) = &handle.user_id {
            out.patch_user(user, UserPatch::online(false));
        }
        if let Some(session_id) = &handle.session {
            self.leave_session(id, handle.user_id.as_ref(), session_id, &mut out);
        }
        info!(connection = %id, "disconnected");
        out.into_effects()
    }

    /// A session timer fired. Stale or unknown tokens are ignored.
    pub fn expire_timer(&mut self, session_id: &SessionId, token: TimerToken) -> Vec<Effect> {
        let mut out = Outbox::default();
        let Some(session) = self.sessions.get_mut(session_id) else {
            debug!(session = %session_id, "timer fired for an ended session");
            return out.into_effects();
        };
        if !session.fires(token) {
            debug!(session = %session_id, "stale timer ignored");
            return out.into_effects();
        }
        let Some(timer) = session.disarm() else {
            return out.into_effects();
        };
        if session.is_full() {
            warn!(session = %session_id, "timer fired on a full session");
            session.resume();
            return out.into_effects();
        }

        let survivors = session.members().to_vec();
        match timer.kind {
            TimerKind::Grace => info!(session = %session_id, "grace period expired"),
            TimerKind::Abandon => info!(session = %session_id, "abandoned session expired"),
        }
        for survivor in &survivors {
            out.emit(survivor, ServerEvent::StrangerDisconnected);
        }
        self.end_session_into(session_id, &mut out);
        for survivor in &survivors {
            self.pool.enqueue(survivor.clone());
            out.emit(survivor, ServerEvent::Waiting);
        }
        self.match_into(&mut out);
        out.into_effects()
    }

    /// Destroy a session: detach members, cancel its timer, clear
    /// directory references. Returns nothing when the session is unknown.
    pub fn end_session(&mut self, session_id: &SessionId) -> Vec<Effect> {
        let mut out = Outbox::default();
        self.end_session_into(session_id, &mut out);
        out.into_effects()
    }

    pub(crate) fn end_session_into(&mut self, session_id: &SessionId, out: &mut Outbox) -> bool {
        let Some(mut session) = self.sessions.remove(session_id) else {
            return false;
        };
        if session.disarm().is_some() {
            out.cancel_timer(session_id);
        }

        for member in session.members() {
            if let Some(handle) = self.handles.get_mut(member) {
                handle.leave();
                if let Some(user) = &handle.user_id {
                    out.patch_user(user, UserPatch::current_session(None));
                }
            }
        }
        for user in session.departed() {
            out.patch_user(user, UserPatch::current_session(None));
        }
        info!(
            session = %session_id,
            messages = session.log().len(),
            "session ended"
        );
        true
    }

    /// Enqueue, announce `waiting`, and try to match.
    pub(crate) fn queue_for_partner(&mut self, id: &ConnectionId, out: &mut Outbox) {
        if !self.pool.enqueue(id.clone()) {
            debug!(connection = %id, "already waiting");
        }
        out.emit(id, ServerEvent::Waiting);
        self.match_into(out);
    }

    fn find_partner_into(&mut self, id: &ConnectionId, out: &mut Outbox) {
        let Some(handle) = self.handles.get(id) else {
            return;
        };
        if handle.in_session() {
            debug!(connection = %id, "find partner ignored while in a session");
            return;
        }
        self.queue_for_partner(id, out);
    }

    fn chat_into(&mut self, id: &ConnectionId, op: ChatOp, out: &mut Outbox) {
        let Some(handle) = self.handles.get(id) else {
            return;
        };
        let Some(session_id) = handle.session.clone() else {
            debug!(connection = %id, "chat message outside a session dropped");
            return;
        };
        let op = match op {
            ChatOp::Send(mut message) => {
                if message.user_id.is_none() {
                    message.user_id = handle.user_id.clone();
                }
                ChatOp::Send(message)
            }
            other => other,
        };

        let Some(session) = self.sessions.get_mut(&session_id) else {
            warn!(connection = %id, session = %session_id, "handle points at a missing session");
            if let Some(handle) = self.handles.get_mut(id) {
                handle.leave();
            }
            return;
        };
        match session.log_mut().apply(&op) {
            Ok(true) => {}
            Ok(false) => {
                if matches!(op, ChatOp::Send(_)) {
                    debug!(session = %session_id, message = %op.target(), "duplicate message id ignored");
                    return;
                }
                debug!(session = %session_id, message = %op.target(), "mutation of unknown message id");
            }
            Err(e) => {
                warn!(session = %session_id, "rejected chat message: {e}");
                return;
            }
        }

        let partner = session.partner_of(id).cloned();
        let sender = self.handles.get(id).and_then(|h| h.user_id.as_ref());
        let absent = session
            .departed()
            .iter()
            .find(|user| Some(*user) != sender)
            .cloned();
        match partner {
            Some(partner) => {
                if let ChatOp::Send(message) = &op {
                    if let Some(token) = self.handles.get(&partner).and_then(|h| h.push_token_if_background()) {
                        out.push(
                            PushTarget::Token(token.to_string()),
                            PushNotification::message(&message.text, id),
                        );
                    }
                }
                out.emit(&partner, ServerEvent::ChatMessage(op));
            }
            None => {
                if let (ChatOp::Send(message), Some(user)) = (&op, absent) {
                    out.push(PushTarget::User(user), PushNotification::message(&message.text, id));
                }
            }
        }
    }

    fn relay_to_partner(&mut self, id: &ConnectionId, event: ServerEvent, out: &mut Outbox) {
        if let Some(partner) = self.partner_of(id) {
            out.emit(&partner, event);
        }
    }

    fn partner_of(&self, id: &ConnectionId) -> Option<ConnectionId> {
        let session_id = self.handles.get(id)?.session.as_ref()?;
        self.sessions.get(session_id)?.partner_of(id).cloned()
    }

    fn skip_into(&mut self, id: &ConnectionId, out: &mut Outbox) {
        let Some(handle) = self.handles.get(id) else {
            return;
        };
        let Some(session_id) = handle.session.clone() else {
            debug!(connection = %id, "skip without a session");
            self.queue_for_partner(id, out);
            return;
        };

        let mut requeue: Vec<ConnectionId> = self
            .sessions
            .get(&session_id)
            .map(|s| s.members().to_vec())
            .unwrap_or_default();
        if !requeue.contains(id) {
            requeue.push(id.clone());
        }
        info!(connection = %id, session = %session_id, "skipped");

        self.end_session_into(&session_id, out);
        if let Some(handle) = self.handles.get_mut(id) {
            handle.leave();
        }

        for member in &requeue {
            if member != id {
                out.emit(member, ServerEvent::StrangerDisconnected);
            }
            if let Some(handle) = self.handles.get_mut(member) {
                handle.avoid = requeue.iter().find(|other| *other != member).cloned();
            }
            self.pool.enqueue(member.clone());
            out.emit(member, ServerEvent::Waiting);
        }
        self.match_into(out);
    }

    /// Remove `id` from its session as if its connection dropped.
    ///
    /// One member left: pause and arm the grace timer. Nobody left: arm
    /// the abandon timer.
    pub(crate) fn leave_session(
        &mut self,
        id: &ConnectionId,
        user: Option<&UserId>,
        session_id: &SessionId,
        out: &mut Outbox,
    ) {
        let CoordinatorConfig { grace_period, abandon_period } = self.config;
        let timeout_ms = self.config.grace_timeout_ms();
        let Some(session) = self.sessions.get_mut(session_id) else {
            return;
        };
        if !session.remove_member(id) {
            return;
        }
        if let Some(user) = user {
            session.mark_departed(user.clone());
        }
        session.pause();

        match session.members().first().cloned() {
            Some(remaining) => {
                let timer = session.arm(TimerKind::Grace, grace_period);
                out.arm_timer(session_id, timer);
                if let Some(handle) = self.handles.get_mut(&remaining) {
                    handle.partner = None;
                }
                out.emit(&remaining, ServerEvent::PartnerPaused { timeout_ms });
                info!(session = %session_id, connection = %id, "partner paused");
            }
            None => {
                let timer = session.arm(TimerKind::Abandon, abandon_period);
                out.arm_timer(session_id, timer);
                info!(session = %session_id, "both members gone");
            }
        }
    }

    fn set_background(&mut self, id: &ConnectionId, is_background: bool) {
        if let Some(handle) = self.handles.get_mut(id) {
            handle.background = is_background;
            debug!(
                connection = %id,
                "app state: {}",
                if is_background { "background" } else { "foreground" }
            );
        }
    }

    fn register_into(
        &mut self,
        id: &ConnectionId,
        user_id: UserId,
        push_token: Option<String>,
        out: &mut Outbox,
    ) {
        let Some(handle) = self.handles.get_mut(id) else {
            return;
        };
        if push_token.is_some() {
            handle.push_token = push_token;
        }
        handle.user_id = Some(user_id.clone());
        // A resumed connection registers after it rejoined.
        if let Some(session) = handle.session.as_ref().and_then(|sid| self.sessions.get_mut(sid)) {
            session.mark_returned(&user_id);
        }

        let patch = UserPatch {
            push_token: handle.push_token.clone(),
            is_online: Some(true),
            current_session_id: handle.session.clone().map(Some),
        };
        out.patch_user(&user_id, patch);
        info!(connection = %id, user = %user_id, "registered");
    }

    fn register_push_token_into(&mut self, id: &ConnectionId, token: String, out: &mut Outbox) {
        let Some(handle) = self.handles.get_mut(id) else {
            return;
        };
        debug!(connection = %id, "push token registered");
        handle.push_token = Some(token.clone());
        if let Some(user) = &handle.user_id {
            out.patch_user(user, UserPatch::push_token(token));
        }
    }
}
