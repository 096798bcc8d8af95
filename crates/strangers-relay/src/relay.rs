//! Connection management and effect execution.
//!
//! All coordinator steps run under one async mutex (the hub). Frames are
//! queued onto per-connection channels while the lock is held, so two
//! frames for the same session always go out in the order they were
//! produced. Directory writes and pushes are spawned and never hold the
//! lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use strangers_core::{
    ClientEvent, ConnectionId, Coordinator, CoordinatorConfig, Effect, PushTarget, ServerEvent,
    SessionId, SessionState, TimerToken,
};
use tokio::sync::{Mutex, mpsc};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::directory::UserDirectory;
use crate::push::PushGateway;

/// Everything guarded by the hub lock.
struct Hub {
    coordinator: Coordinator,
    /// Outbound frame queue per live connection.
    connections: HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>,
    /// Sleeping timer task per session, tagged with the token it will fire.
    timers: HashMap<SessionId, (TimerToken, AbortHandle)>,
}

/// Counters reported by `/api/stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub waiting: usize,
    pub sessions: usize,
    pub paused: usize,
    pub connections: usize,
}

/// Shared relay state.
pub struct RelayState {
    hub: Mutex<Hub>,
    directory: Arc<dyn UserDirectory>,
    push: Arc<dyn PushGateway>,
    /// Server start time (for uptime reporting).
    pub start_time: Instant,
}

impl RelayState {
    pub fn new(
        config: CoordinatorConfig,
        directory: Arc<dyn UserDirectory>,
        push: Arc<dyn PushGateway>,
    ) -> Arc<Self> {
        Arc::new(Self {
            hub: Mutex::new(Hub {
                coordinator: Coordinator::new(config),
                connections: HashMap::new(),
                timers: HashMap::new(),
            }),
            directory,
            push,
            start_time: Instant::now(),
        })
    }

    /// Register a new connection and queue it (or resume `resume`).
    /// Returns the receiving end of its outbound frame queue.
    pub async fn attach(
        self: &Arc<Self>,
        conn: ConnectionId,
        resume: Option<SessionId>,
    ) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut hub = self.hub.lock().await;
        hub.connections.insert(conn.clone(), tx);
        let effects = hub.coordinator.connect(conn, resume);
        self.apply(&mut hub, effects);
        rx
    }

    /// Run one inbound client frame.
    pub async fn dispatch(self: &Arc<Self>, conn: &ConnectionId, event: ClientEvent) {
        let mut hub = self.hub.lock().await;
        let effects = hub.coordinator.handle_event(conn, event);
        self.apply(&mut hub, effects);
    }

    /// The socket closed.
    pub async fn detach(self: &Arc<Self>, conn: &ConnectionId) {
        let mut hub = self.hub.lock().await;
        hub.connections.remove(conn);
        let effects = hub.coordinator.disconnect(conn);
        self.apply(&mut hub, effects);
    }

    pub async fn stats(&self) -> Stats {
        let hub = self.hub.lock().await;
        let coordinator = &hub.coordinator;
        Stats {
            waiting: coordinator.pool().len(),
            sessions: coordinator.sessions().len(),
            paused: coordinator.sessions().count_in(SessionState::Paused),
            connections: coordinator.connection_count(),
        }
    }

    async fn fire_timer(self: &Arc<Self>, session: SessionId, token: TimerToken) {
        let mut hub = self.hub.lock().await;
        if hub.timers.get(&session).is_some_and(|(armed, _)| *armed == token) {
            hub.timers.remove(&session);
        }
        let effects = hub.coordinator.expire_timer(&session, token);
        self.apply(&mut hub, effects);
    }

    /// Carry out coordinator effects, in order, while the hub is locked.
    fn apply(self: &Arc<Self>, hub: &mut Hub, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Emit { to, event } => match hub.connections.get(&to) {
                    Some(tx) => {
                        if tx.send(event).is_err() {
                            debug!(connection = %to, "frame for a closing connection dropped");
                        }
                    }
                    None => debug!(connection = %to, "frame for an unknown connection dropped"),
                },
                Effect::ArmTimer { session, token, after } => {
                    let state = Arc::clone(self);
                    let timer_session = session.clone();
                    let task = tokio::spawn(async move {
                        tokio::time::sleep(after).await;
                        state.fire_timer(timer_session, token).await;
                    });
                    if let Some((_, previous)) = hub.timers.insert(session, (token, task.abort_handle())) {
                        previous.abort();
                    }
                }
                Effect::CancelTimer { session } => {
                    if let Some((_, task)) = hub.timers.remove(&session) {
                        task.abort();
                    }
                }
                Effect::PatchUser { user, patch } => {
                    let directory = Arc::clone(&self.directory);
                    tokio::task::spawn_blocking(move || {
                        if let Err(e) = directory.upsert(&user, &patch) {
                            warn!(%user, "Failed to update user directory: {e}");
                        }
                    });
                }
                Effect::Push { target: PushTarget::Token(token), notification } => {
                    self.push.send(&token, &notification);
                }
                Effect::Push { target: PushTarget::User(user), notification } => {
                    let directory = Arc::clone(&self.directory);
                    let push = Arc::clone(&self.push);
                    tokio::task::spawn_blocking(move || {
                        match directory.find(&user) {
                            Ok(Some(record)) => match record.push_token {
                                Some(token) => push.send(&token, &notification),
                                None => debug!(%user, "no push token on record"),
                            },
                            Ok(None) => debug!(%user, "no directory record for push"),
                            Err(e) => warn!(%user, "User directory lookup failed: {e}"),
                        }
                    });
                }
            }
        }
    }
}

/// Handle a single WebSocket connection from open to close.
pub async fn handle_connection(socket: WebSocket, state: Arc<RelayState>, resume: Option<SessionId>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let conn = ConnectionId::generate();
    let mut outbound = state.attach(conn.clone(), resume).await;

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    warn!("Failed to encode frame: {e}");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let state_clone = Arc::clone(&state);
    let my_conn = conn.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                    Ok(event) => state_clone.dispatch(&my_conn, event).await,
                    Err(e) => debug!(connection = %my_conn, "Ignoring unreadable frame: {e}"),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.detach(&conn).await;
    info!(connection = %conn, "socket closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use strangers_core::{ChatOp, Message as ChatMessage, PushNotification, UserId, UserPatch};
    use tokio::sync::mpsc::error::TryRecvError;

    use crate::directory::UserRecord;
    use crate::error::Result;

    #[derive(Default)]
    struct FakeDirectory {
        writes: StdMutex<Vec<(UserId, UserPatch)>>,
        records: StdMutex<HashMap<UserId, UserRecord>>,
    }

    impl UserDirectory for FakeDirectory {
        fn upsert(&self, user: &UserId, patch: &UserPatch) -> Result<()> {
            self.writes.lock().unwrap().push((user.clone(), patch.clone()));
            Ok(())
        }

        fn find(&self, user: &UserId) -> Result<Option<UserRecord>> {
            Ok(self.records.lock().unwrap().get(user).cloned())
        }
    }

    #[derive(Default)]
    struct FakePush {
        sent: StdMutex<Vec<(String, PushNotification)>>,
    }

    impl PushGateway for FakePush {
        fn send(&self, token: &str, notification: &PushNotification) {
            self.sent.lock().unwrap().push((token.to_string(), notification.clone()));
        }
    }

    fn relay() -> (Arc<RelayState>, Arc<FakeDirectory>, Arc<FakePush>) {
        let directory = Arc::new(FakeDirectory::default());
        let push = Arc::new(FakePush::default());
        let state = RelayState::new(CoordinatorConfig::default(), directory.clone(), push.clone());
        (state, directory, push)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> ServerEvent {
        rx.recv().await.expect("connection queue closed")
    }

    /// Attach two connections and drain their pairing frames.
    async fn pair(
        state: &Arc<RelayState>,
    ) -> (
        mpsc::UnboundedReceiver<ServerEvent>,
        mpsc::UnboundedReceiver<ServerEvent>,
        SessionId,
    ) {
        let mut a = state.attach("a".into(), None).await;
        let mut b = state.attach("b".into(), None).await;
        assert_eq!(next(&mut a).await, ServerEvent::Waiting);
        let ServerEvent::Paired { session_id } = next(&mut a).await else {
            panic!("expected a pairing");
        };
        assert_eq!(next(&mut b).await, ServerEvent::Waiting);
        assert_eq!(next(&mut b).await, ServerEvent::Paired { session_id: session_id.clone() });
        (a, b, session_id)
    }

    #[tokio::test(start_paused = true)]
    async fn frames_arrive_in_send_order() {
        let (state, _, _) = relay();
        let (_a, mut b, _) = pair(&state).await;

        for id in ["1", "2", "3"] {
            let op = ChatOp::Send(ChatMessage::new(id, format!("msg {id}")));
            state.dispatch(&"a".into(), ClientEvent::ChatMessage(op)).await;
        }
        for id in ["1", "2", "3"] {
            let ServerEvent::ChatMessage(ChatOp::Send(message)) = next(&mut b).await else {
                panic!("expected a chat message");
            };
            assert_eq!(message.id.as_str(), id);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn grace_timer_requeues_the_survivor() {
        let (state, _, _) = relay();
        let (_a, mut b, session_id) = pair(&state).await;

        state.detach(&"a".into()).await;
        assert_eq!(next(&mut b).await, ServerEvent::PartnerPaused { timeout_ms: 300_000 });
        assert_eq!(state.stats().await.paused, 1);

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(next(&mut b).await, ServerEvent::StrangerDisconnected);
        assert_eq!(next(&mut b).await, ServerEvent::Waiting);

        let stats = state.stats().await;
        assert_eq!(stats.sessions, 0);
        assert_eq!(stats.waiting, 1);

        // Too late to come back.
        let mut a2 = state.attach("a2".into(), Some(session_id)).await;
        assert_eq!(next(&mut a2).await, ServerEvent::RejoinFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn rejoin_cancels_the_grace_timer() {
        let (state, _, _) = relay();
        let (_a, mut b, session_id) = pair(&state).await;
        state
            .dispatch(&"a".into(), ClientEvent::ChatMessage(ChatOp::Send(ChatMessage::new("1", "hi"))))
            .await;
        next(&mut b).await;

        state.detach(&"a".into()).await;
        next(&mut b).await;
        tokio::time::sleep(Duration::from_secs(120)).await;

        let mut a2 = state.attach("a2".into(), Some(session_id.clone())).await;
        assert_eq!(next(&mut a2).await, ServerEvent::Rejoined { session_id });
        assert_eq!(next(&mut a2).await, ServerEvent::ChatHistory(vec![ChatMessage::new("1", "hi")]));
        assert_eq!(next(&mut b).await, ServerEvent::PartnerRejoined);

        // Well past the original deadline: nothing fires.
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(b.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(state.stats().await.sessions, 1);
        assert_eq!(state.stats().await.paused, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_session_expires_after_abandon_period() {
        let (state, _, _) = relay();
        let (_a, _b, _) = pair(&state).await;
        state.detach(&"a".into()).await;
        state.detach(&"b".into()).await;

        tokio::time::sleep(Duration::from_secs(119)).await;
        assert_eq!(state.stats().await.sessions, 1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(state.stats().await.sessions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn backgrounded_partner_gets_a_push() {
        let (state, _, push) = relay();
        let (_a, _b, _) = pair(&state).await;
        state
            .dispatch(&"b".into(), ClientEvent::RegisterPushToken("tok-b".to_string()))
            .await;
        state
            .dispatch(&"b".into(), ClientEvent::AppState { is_background: true })
            .await;
        state
            .dispatch(&"a".into(), ClientEvent::ChatMessage(ChatOp::Send(ChatMessage::new("1", "yo"))))
            .await;

        let sent = push.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "tok-b");
        assert_eq!(sent[0].1.body, "yo");
    }

    #[tokio::test]
    async fn absent_partner_is_pushed_via_directory() {
        let (state, directory, push) = relay();
        directory.records.lock().unwrap().insert(
            "u-a".into(),
            UserRecord {
                user_id: "u-a".into(),
                push_token: Some("tok-a".to_string()),
                is_online: false,
                current_session_id: None,
                last_seen: 0,
            },
        );
        let (_a, _b, _) = pair(&state).await;
        state
            .dispatch(&"a".into(), ClientEvent::Register { user_id: "u-a".into(), push_token: None })
            .await;
        state.detach(&"a".into()).await;
        state
            .dispatch(&"b".into(), ClientEvent::ChatMessage(ChatOp::Send(ChatMessage::new("1", "back?"))))
            .await;

        // Directory calls run on the blocking pool.
        let went_offline = |writes: &[(UserId, UserPatch)]| {
            writes
                .iter()
                .any(|(user, patch)| user.as_str() == "u-a" && *patch == UserPatch::online(false))
        };
        for _ in 0..100 {
            let pushed = !push.sent.lock().unwrap().is_empty();
            if pushed && went_offline(&directory.writes.lock().unwrap()[..]) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let sent = push.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "tok-a");
        assert!(went_offline(&directory.writes.lock().unwrap()[..]));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_connection_events_are_ignored() {
        let (state, _, _) = relay();
        state.dispatch(&"ghost".into(), ClientEvent::Skip).await;
        assert_eq!(
            state.stats().await,
            Stats { waiting: 0, sessions: 0, paused: 0, connections: 0 }
        );
    }
}
