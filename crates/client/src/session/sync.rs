//! SessionSync - client-side room session synchronization
//!
//! Owns the cached room identifiers and projections, issues room API calls,
//! emits on the real-time channel, and merges server pushes. Views read
//! [`SessionSnapshot`]s; they never keep their own copies.
//!
//! Ordering rules:
//! - HTTP success strictly precedes the matching real-time emit.
//! - Projections change only when the server pushes; nothing is inserted
//!   optimistically, so a client's own comment shows up exactly once.
//! - Responses that arrive after the room changed are dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use agileflow_protocol::{
    ActionItem, AddCommentRequest, ClientEvent, Comment, CommentCategory, CreateActionRequest,
    Identity, JoinRoomRequest, Participant, ParticipantRole, Prediction, RoomKind, ServerEvent,
    SubmitPredictionRequest,
};

use super::listeners::{EventKind, Listener, ListenerRegistry, Subscription, SyncEvent};
use super::state::{ActiveRoom, SessionSnapshot, SessionStore};
use crate::error::{SyncError, CONNECTION_LOST};
use crate::infrastructure::websocket::TransportEvent;
use crate::ports::{ConnectionState, RealtimePort, RoomApiPort};

/// Largest estimate accepted, in days.
pub const MAX_PREDICTION: f64 = 1000.0;

struct Inner {
    identity: Identity,
    api: Arc<dyn RoomApiPort>,
    realtime: Arc<dyn RealtimePort>,
    store: RwLock<SessionStore>,
    listeners: Arc<ListenerRegistry>,
    logged_out: AtomicBool,
}

/// Handle to the room session of one signed-in identity.
///
/// Cloning is cheap and every clone shares the same state. Create exactly one
/// per authenticated session and end it with [`SessionSync::logout`].
#[derive(Clone)]
pub struct SessionSync {
    inner: Arc<Inner>,
}

/// Marks a request as in flight for as long as it lives.
struct InFlight<'a> {
    sync: &'a SessionSync,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut store = self.sync.write();
        store.in_flight = store.in_flight.saturating_sub(1);
    }
}

impl SessionSync {
    pub fn new(
        identity: Identity,
        api: Arc<dyn RoomApiPort>,
        realtime: Arc<dyn RealtimePort>,
    ) -> Self {
        let store = SessionStore {
            connection: realtime.state(),
            ..SessionStore::default()
        };

        Self {
            inner: Arc::new(Inner {
                identity,
                api,
                realtime,
                store: RwLock::new(store),
                listeners: Arc::new(ListenerRegistry::default()),
                logged_out: AtomicBool::new(false),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionStore> {
        self.inner.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionStore> {
        self.inner.store.write().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.read().snapshot()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.read().connection
    }

    pub fn room(&self) -> Option<ActiveRoom> {
        self.read().room.clone()
    }

    pub fn is_admin(&self) -> bool {
        self.read().is_admin
    }

    pub fn local_role(&self) -> Option<ParticipantRole> {
        self.read().local_role
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.read().participants.clone()
    }

    pub fn predictions(&self) -> Vec<Prediction> {
        self.read().predictions.clone()
    }

    pub fn comments(&self) -> Vec<Comment> {
        self.read().comments.clone()
    }

    pub fn actions(&self) -> Vec<ActionItem> {
        self.read().actions.clone()
    }

    pub fn loading(&self) -> bool {
        self.read().in_flight > 0
    }

    pub fn error(&self) -> Option<String> {
        self.read().error.clone()
    }

    pub fn clear_error(&self) {
        self.write().error = None;
    }

    pub fn average_prediction(&self) -> Option<f64> {
        super::state::average_prediction(&self.read().predictions)
    }

    pub fn total_estimate(&self) -> f64 {
        super::state::total_estimate(&self.read().predictions)
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Register the single listener for `kind`, replacing any previous one.
    ///
    /// Listeners run after the event has been merged, with no lock held.
    pub fn subscribe(
        &self,
        kind: impl Into<EventKind>,
        listener: impl Fn(&SyncEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let listener: Listener = Arc::new(listener);
        self.inner.listeners.subscribe(kind.into(), listener)
    }

    /// Whether a listener is currently registered for `kind`.
    pub fn has_listener(&self, kind: impl Into<EventKind>) -> bool {
        self.inner.listeners.is_subscribed(kind.into())
    }

    // =========================================================================
    // Request bookkeeping
    // =========================================================================

    fn begin_request(&self) -> InFlight<'_> {
        let mut store = self.write();
        store.in_flight += 1;
        store.error = None;
        InFlight { sync: self }
    }

    /// Start a create or join. Checks that no room is set and counts the
    /// request in one step, so a `leave_room` issued meanwhile sees it pending.
    fn begin_entry(&self) -> Result<(InFlight<'_>, u64), SyncError> {
        let mut store = self.write();
        if store.room.is_some() {
            drop(store);
            return Err(self.reject(SyncError::validation("Leave the current room first.")));
        }
        store.in_flight += 1;
        store.error = None;
        let epoch = store.epoch;
        Ok((InFlight { sync: self }, epoch))
    }

    /// Put `err` in the error slot unless the room changed since `epoch`.
    fn fail(&self, epoch: u64, err: SyncError) -> SyncError {
        let mut store = self.write();
        if store.epoch == epoch {
            store.error = Some(err.user_message());
        } else {
            tracing::debug!(error = %err, "Dropping failure for a superseded room session");
        }
        err
    }

    fn reject(&self, err: SyncError) -> SyncError {
        self.write().error = Some(err.user_message());
        err
    }

    fn ensure_active(&self) -> Result<(), SyncError> {
        if self.inner.logged_out.load(Ordering::SeqCst) {
            return Err(SyncError::validation("Signed out. Sign in again to continue."));
        }
        Ok(())
    }

    /// Room id and epoch of the current room, or `NotInRoom` in the error slot.
    fn current_room(&self) -> Result<(String, u64), SyncError> {
        let (room_id, epoch) = {
            let store = self.read();
            (store.room_id().map(str::to_string), store.epoch)
        };
        match room_id {
            Some(room_id) => Ok((room_id, epoch)),
            None => Err(self.reject(SyncError::NotInRoom)),
        }
    }

    /// Admin-only operations refuse silently: no traffic, no error slot.
    fn require_admin(&self) -> Result<(), SyncError> {
        if self.read().is_admin {
            Ok(())
        } else {
            tracing::debug!("Ignoring admin-only operation from non-admin");
            Err(SyncError::NotAdmin)
        }
    }

    fn superseded(&self, operation: &'static str) -> SyncError {
        tracing::debug!(operation, "Dropping response for a superseded room session");
        SyncError::Superseded
    }

    /// Fire-and-forget emit. A missing connection is not an error: the
    /// rejoin on the next `Connected` resynchronizes the room.
    fn emit(&self, event: ClientEvent) {
        let name = event.name();
        match self.inner.realtime.emit(event) {
            Ok(()) => tracing::debug!(event = name, "Emitted real-time event"),
            Err(SyncError::NotConnected) => {
                tracing::info!(event = name, "Real-time channel not connected, emit skipped")
            }
            Err(e) => tracing::warn!(event = name, error = %e, "Failed to emit real-time event"),
        }
    }

    fn join_event(&self, invite_code: &str) -> ClientEvent {
        ClientEvent::JoinRoom {
            invite_code: invite_code.to_string(),
            name: self.inner.identity.name.clone(),
            email: self.inner.identity.email.clone(),
        }
    }

    // =========================================================================
    // Room lifecycle
    // =========================================================================

    /// Create a room and join it as admin.
    pub async fn create_room(&self, kind: RoomKind) -> Result<ActiveRoom, SyncError> {
        self.ensure_active().map_err(|e| self.reject(e))?;
        let (_in_flight, epoch) = self.begin_entry()?;
        let created = match self.inner.api.create_room(kind).await {
            Ok(created) => created,
            Err(e) => return Err(self.fail(epoch, e.into())),
        };

        let room = ActiveRoom {
            room_id: created.room_id,
            invite_code: created.invite_code,
            kind,
        };
        {
            let mut store = self.write();
            if store.epoch != epoch {
                return Err(self.superseded("create_room"));
            }
            store.enter_room(room.clone(), true);
        }

        tracing::info!(room_id = %room.room_id, kind = %kind, "Created room");
        self.emit(self.join_event(&room.invite_code));
        Ok(room)
    }

    /// Join an existing room by invite code. Empty codes never leave the client.
    pub async fn join_room(
        &self,
        kind: RoomKind,
        invite_code: &str,
    ) -> Result<ActiveRoom, SyncError> {
        self.ensure_active().map_err(|e| self.reject(e))?;
        let invite_code = invite_code.trim();
        if invite_code.is_empty() {
            return Err(self.reject(SyncError::validation("Enter an invite code to join a room.")));
        }
        let request = JoinRoomRequest {
            name: self.inner.identity.name.clone(),
            email: self.inner.identity.email.clone(),
            invite_code: invite_code.to_string(),
        };

        let (_in_flight, epoch) = self.begin_entry()?;
        let room_id = match self.inner.api.join_room(kind, &request).await {
            Ok(room_id) => room_id,
            Err(e) => return Err(self.fail(epoch, e.into())),
        };

        let room = ActiveRoom {
            room_id,
            invite_code: request.invite_code,
            kind,
        };
        {
            let mut store = self.write();
            if store.epoch != epoch {
                return Err(self.superseded("join_room"));
            }
            store.enter_room(room.clone(), false);
        }

        tracing::info!(room_id = %room.room_id, kind = %kind, "Joined room");
        self.emit(self.join_event(&room.invite_code));
        Ok(room)
    }

    /// Leave the current room. Outside a room nothing is emitted, but a
    /// create or join still waiting on the server is abandoned.
    ///
    /// The leave event is best effort; local state is cleared regardless.
    pub fn leave_room(&self) {
        let room_id = {
            let mut store = self.write();
            let Some(room) = store.room.clone() else {
                if store.in_flight > 0 {
                    store.bump_epoch();
                    tracing::debug!("Abandoning pending room entry");
                }
                return;
            };
            store.clear_room();
            room.room_id
        };

        tracing::info!(room_id = %room_id, "Left room");
        self.emit(ClientEvent::LeaveRoom {
            room_id,
            email: self.inner.identity.email.clone(),
        });
    }

    /// End the session: leave, drop listeners and close the real-time channel
    /// for good. The handle cannot be used for another identity afterwards.
    pub fn logout(&self) {
        if self.inner.logged_out.swap(true, Ordering::SeqCst) {
            return;
        }

        self.leave_room();
        {
            let mut store = self.write();
            store.bump_epoch();
            store.error = None;
        }
        self.inner.listeners.clear();
        self.inner.realtime.disconnect();
        tracing::info!(email = %self.inner.identity.email, "Logged out");
    }

    // =========================================================================
    // Participant operations
    // =========================================================================

    /// Pick the role the local participant estimates for.
    pub fn select_role(&self, role: ParticipantRole) -> Result<(), SyncError> {
        self.current_room()?;
        let mut store = self.write();
        store.local_role = Some(role);
        store.has_submitted = store.predictions.iter().any(|p| p.role == role);
        Ok(())
    }

    /// Submit an estimate (in days) for the selected role.
    ///
    /// The local prediction list changes only once the server broadcasts
    /// `prediction_submitted`.
    pub async fn submit_prediction(&self, value: f64) -> Result<(), SyncError> {
        let (room_id, epoch) = self.current_room()?;
        let Some(role) = self.local_role() else {
            return Err(self.reject(SyncError::validation("Select a role before estimating.")));
        };
        if !value.is_finite() || value <= 0.0 || value > MAX_PREDICTION {
            return Err(self.reject(SyncError::validation(format!(
                "Enter an estimate between 0 and {MAX_PREDICTION} days."
            ))));
        }

        let request = SubmitPredictionRequest {
            room_id,
            role,
            prediction: value,
        };

        let _in_flight = self.begin_request();
        if let Err(e) = self.inner.api.submit_prediction(&request).await {
            return Err(self.fail(epoch, e.into()));
        }
        if self.read().epoch != epoch {
            return Err(self.superseded("submit_prediction"));
        }

        self.emit(ClientEvent::SubmitPrediction {
            room_id: request.room_id,
            role,
            prediction: value,
        });
        Ok(())
    }

    pub async fn add_comment(&self, category: CommentCategory, text: &str) -> Result<(), SyncError> {
        let (room_id, epoch) = self.current_room()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(self.reject(SyncError::validation("Comment cannot be empty.")));
        }

        let request = AddCommentRequest {
            room_id,
            comment: Comment {
                category,
                text: text.to_string(),
            },
        };

        let _in_flight = self.begin_request();
        if let Err(e) = self.inner.api.add_comment(&request).await {
            return Err(self.fail(epoch, e.into()));
        }
        if self.read().epoch != epoch {
            return Err(self.superseded("add_comment"));
        }

        self.emit(ClientEvent::NewComment {
            room_id: request.room_id,
            comment: request.comment,
        });
        Ok(())
    }

    // =========================================================================
    // Admin operations
    // =========================================================================

    /// Create an action item assigned to the participant with `assignee_email`.
    ///
    /// Unknown emails fall back to assigning the admin themself.
    pub async fn create_action(
        &self,
        description: &str,
        assignee_email: &str,
    ) -> Result<(), SyncError> {
        let (room_id, epoch) = self.current_room()?;
        self.require_admin()?;
        let description = description.trim();
        if description.is_empty() {
            return Err(self.reject(SyncError::validation("Describe the action first.")));
        }

        let assignee_name = self
            .read()
            .participant_name(assignee_email)
            .map(str::to_string)
            .unwrap_or_else(|| self.inner.identity.name.clone());

        let request = CreateActionRequest {
            room_id,
            user_name: self.inner.identity.name.clone(),
            description: description.to_string(),
            assignee_name,
        };

        let _in_flight = self.begin_request();
        if let Err(e) = self.inner.api.create_action(&request).await {
            return Err(self.fail(epoch, e.into()));
        }
        if self.read().epoch != epoch {
            return Err(self.superseded("create_action"));
        }

        self.emit(ClientEvent::CreateAction {
            room_id: request.room_id,
            description: request.description,
            assignee_name: request.assignee_name,
        });
        Ok(())
    }

    /// Fetch the authoritative predictions, replace the local set, then tell
    /// the room to reveal.
    pub async fn reveal_results(&self) -> Result<(), SyncError> {
        let (room_id, epoch) = self.current_room()?;
        self.require_admin()?;

        let _in_flight = self.begin_request();
        let predictions = match self.inner.api.get_predictions(&room_id).await {
            Ok(predictions) => predictions,
            Err(e) => return Err(self.fail(epoch, e.into())),
        };
        {
            let mut store = self.write();
            if store.epoch != epoch {
                return Err(self.superseded("reveal_results"));
            }
            store.predictions = predictions;
        }

        self.emit(ClientEvent::RevealResults { room_id });
        Ok(())
    }

    /// Start a new estimation round without leaving the room.
    pub fn reset_session(&self) -> Result<(), SyncError> {
        let (room_id, _) = self.current_room()?;
        self.require_admin()?;

        self.write().reset_round();
        self.emit(ClientEvent::ResetSession { room_id });
        Ok(())
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Merge one transport event and notify its listener.
    pub fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::StateChanged(state) => self.handle_state_change(state),
            TransportEvent::Event(event) => {
                {
                    let mut store = self.write();
                    if store.room.is_none()
                        && !matches!(event, ServerEvent::Error { .. })
                    {
                        tracing::debug!(
                            event = event.kind().as_str(),
                            "Ignoring room event outside a room"
                        );
                        return;
                    }
                    store.apply(&event, &self.inner.identity.email);
                }
                self.inner.listeners.dispatch(&SyncEvent::Server(event));
            }
        }
    }

    fn handle_state_change(&self, state: ConnectionState) {
        let (previous, rejoin) = {
            let mut store = self.write();
            let previous = store.connection;
            store.connection = state;
            match state {
                ConnectionState::Connected => store.connection_error = None,
                ConnectionState::Failed => {
                    store.connection_error = Some(CONNECTION_LOST.to_string())
                }
                _ => {}
            }
            let rejoin = store.room.as_ref().map(|room| room.invite_code.clone());
            (previous, rejoin)
        };

        tracing::info!(from = ?previous, to = ?state, "Real-time connection state changed");

        match state {
            ConnectionState::Connected => {
                if let Some(invite_code) = rejoin {
                    tracing::info!("Rejoining room after connect");
                    self.emit(self.join_event(&invite_code));
                }
                self.inner.listeners.dispatch(&SyncEvent::Connected);
            }
            ConnectionState::Failed => {
                self.inner.listeners.dispatch(&SyncEvent::ConnectionFailed {
                    message: CONNECTION_LOST.to_string(),
                });
            }
            ConnectionState::Disconnected | ConnectionState::Reconnecting
                if previous == ConnectionState::Connected =>
            {
                self.inner.listeners.dispatch(&SyncEvent::Disconnected);
            }
            _ => {}
        }
    }

    /// Feed transport events into this session in arrival order until the
    /// sender side goes away.
    pub fn spawn_event_pump(
        &self,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> JoinHandle<()> {
        let sync = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                sync.handle_transport_event(event);
            }
            tracing::debug!("Transport event stream closed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiError, GENERIC_FAILURE};
    use crate::infrastructure::testing::RecordingRealtime;
    use crate::ports::{CreatedRoom, MockRoomApiPort};
    use agileflow_protocol::ServerEventKind;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    const EMAIL: &str = "ada@example.com";

    fn identity() -> Identity {
        Identity::new("Ada", EMAIL)
    }

    fn session(api: MockRoomApiPort, realtime: &RecordingRealtime) -> SessionSync {
        SessionSync::new(identity(), Arc::new(api), Arc::new(realtime.clone()))
    }

    fn created() -> CreatedRoom {
        CreatedRoom {
            room_id: "room-1".into(),
            invite_code: "K3X9QZ".into(),
        }
    }

    fn participant(name: &str, email: &str, is_admin: bool) -> Participant {
        Participant {
            name: name.into(),
            email: email.into(),
            role: None,
            is_admin,
            has_submitted: false,
        }
    }

    fn comment(text: &str) -> Comment {
        Comment {
            category: CommentCategory::WentWell,
            text: text.into(),
        }
    }

    fn push(sync: &SessionSync, event: ServerEvent) {
        sync.handle_transport_event(TransportEvent::Event(event));
    }

    fn expected_join(invite_code: &str) -> ClientEvent {
        ClientEvent::JoinRoom {
            invite_code: invite_code.into(),
            name: "Ada".into(),
            email: EMAIL.into(),
        }
    }

    async fn admin_in_room(mut api: MockRoomApiPort, realtime: &RecordingRealtime) -> SessionSync {
        api.expect_create_room()
            .times(1)
            .returning(|_| Ok(created()));
        let sync = session(api, realtime);
        sync.create_room(RoomKind::Retro).await.unwrap();
        realtime.clear();
        sync
    }

    async fn member_in_room(mut api: MockRoomApiPort, realtime: &RecordingRealtime) -> SessionSync {
        api.expect_join_room()
            .times(1)
            .returning(|_, _| Ok("room-1".into()));
        let sync = session(api, realtime);
        sync.join_room(RoomKind::Refinement, "K3X9QZ").await.unwrap();
        realtime.clear();
        sync
    }

    // -------------------------------------------------------------------------
    // Room lifecycle
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn create_room_sets_ids_marks_admin_and_emits_join() {
        let realtime = RecordingRealtime::connected();
        let mut api = MockRoomApiPort::new();
        let rt = realtime.clone();
        api.expect_create_room()
            .withf(|kind| *kind == RoomKind::Retro)
            .times(1)
            .returning(move |_| {
                assert!(rt.emitted().is_empty(), "emit must follow HTTP success");
                Ok(created())
            });
        let sync = session(api, &realtime);

        let room = sync.create_room(RoomKind::Retro).await.unwrap();

        assert_eq!(room.room_id, "room-1");
        let snapshot = sync.snapshot();
        assert_eq!(snapshot.room_id(), Some("room-1"));
        assert_eq!(snapshot.invite_code(), Some("K3X9QZ"));
        assert!(snapshot.is_admin);
        assert!(!snapshot.loading);
        assert_eq!(realtime.emitted(), vec![expected_join("K3X9QZ")]);
    }

    #[tokio::test]
    async fn join_room_trims_code_and_is_not_admin() {
        let realtime = RecordingRealtime::connected();
        let mut api = MockRoomApiPort::new();
        let rt = realtime.clone();
        api.expect_join_room()
            .withf(|kind, req| {
                *kind == RoomKind::Refinement
                    && req.invite_code == "K3X9QZ"
                    && req.email == EMAIL
                    && req.name == "Ada"
            })
            .times(1)
            .returning(move |_, _| {
                assert!(rt.emitted().is_empty(), "emit must follow HTTP success");
                Ok("room-7".into())
            });
        let sync = session(api, &realtime);

        let room = sync
            .join_room(RoomKind::Refinement, "  K3X9QZ ")
            .await
            .unwrap();

        assert_eq!(room.room_id, "room-7");
        assert!(!sync.is_admin());
        assert_eq!(realtime.emitted(), vec![expected_join("K3X9QZ")]);
    }

    #[tokio::test]
    async fn empty_invite_code_fails_locally() {
        let realtime = RecordingRealtime::connected();
        let sync = session(MockRoomApiPort::new(), &realtime);

        let err = sync.join_room(RoomKind::Retro, "   ").await.unwrap_err();

        assert!(matches!(err, SyncError::Validation(_)));
        assert_eq!(sync.error(), Some(err.user_message()));
        assert!(sync.room().is_none());
        assert!(!sync.loading());
        assert!(realtime.emitted().is_empty());
    }

    #[tokio::test]
    async fn failed_join_surfaces_server_message_and_changes_nothing() {
        let realtime = RecordingRealtime::connected();
        let mut api = MockRoomApiPort::new();
        api.expect_join_room()
            .times(1)
            .returning(|_, _| Err(ApiError::Rejected("Invite code not found".into())));
        let sync = session(api, &realtime);

        let err = sync.join_room(RoomKind::Retro, "ZZZZZZ").await.unwrap_err();

        assert_eq!(
            err,
            SyncError::Request {
                message: "Invite code not found".into()
            }
        );
        let snapshot = sync.snapshot();
        assert_eq!(snapshot.error.as_deref(), Some("Invite code not found"));
        assert!(snapshot.room.is_none());
        assert!(!snapshot.is_admin);
        assert!(!snapshot.loading);
        assert!(realtime.emitted().is_empty());
    }

    #[tokio::test]
    async fn network_failure_uses_generic_message() {
        let realtime = RecordingRealtime::connected();
        let mut api = MockRoomApiPort::new();
        api.expect_create_room()
            .times(1)
            .returning(|_| Err(ApiError::Transport("connection refused".into())));
        let sync = session(api, &realtime);

        sync.create_room(RoomKind::Refinement).await.unwrap_err();

        assert_eq!(sync.error().as_deref(), Some(GENERIC_FAILURE));
    }

    #[tokio::test]
    async fn join_while_disconnected_defers_emit_to_rejoin() {
        let realtime = RecordingRealtime::default();
        let mut api = MockRoomApiPort::new();
        api.expect_join_room()
            .times(1)
            .returning(|_, _| Ok("room-1".into()));
        let sync = session(api, &realtime);

        sync.join_room(RoomKind::Retro, "K3X9QZ").await.unwrap();
        assert_eq!(sync.room().map(|r| r.room_id), Some("room-1".into()));
        assert!(realtime.emitted().is_empty());

        realtime.set_state(ConnectionState::Connected);
        sync.handle_transport_event(TransportEvent::StateChanged(ConnectionState::Connected));

        assert_eq!(realtime.emitted(), vec![expected_join("K3X9QZ")]);
    }

    #[tokio::test]
    async fn second_room_requires_leaving_first() {
        let realtime = RecordingRealtime::connected();
        let sync = admin_in_room(MockRoomApiPort::new(), &realtime).await;

        let err = sync.join_room(RoomKind::Retro, "OTHER1").await.unwrap_err();

        assert!(matches!(err, SyncError::Validation(_)));
        assert_eq!(sync.room().map(|r| r.room_id), Some("room-1".into()));
    }

    #[tokio::test]
    async fn leave_without_room_is_a_no_op() {
        let realtime = RecordingRealtime::connected();
        let sync = session(MockRoomApiPort::new(), &realtime);
        let before = sync.snapshot();

        sync.leave_room();

        assert_eq!(sync.snapshot(), before);
        assert!(realtime.emitted().is_empty());
    }

    #[tokio::test]
    async fn leave_emits_and_clears_everything() {
        let realtime = RecordingRealtime::connected();
        let sync = admin_in_room(MockRoomApiPort::new(), &realtime).await;
        push(&sync, ServerEvent::NewComment(comment("c1")));
        push(
            &sync,
            ServerEvent::UserList {
                users: vec![participant("Ada", EMAIL, true)],
            },
        );

        sync.leave_room();

        let snapshot = sync.snapshot();
        assert!(snapshot.room.is_none());
        assert!(snapshot.comments.is_empty());
        assert!(snapshot.participants.is_empty());
        assert!(!snapshot.is_admin);
        assert_eq!(
            realtime.emitted(),
            vec![ClientEvent::LeaveRoom {
                room_id: "room-1".into(),
                email: EMAIL.into()
            }]
        );
    }

    #[tokio::test]
    async fn leave_clears_state_even_when_disconnected() {
        let realtime = RecordingRealtime::connected();
        let sync = admin_in_room(MockRoomApiPort::new(), &realtime).await;
        realtime.set_state(ConnectionState::Reconnecting);

        sync.leave_room();

        assert!(sync.room().is_none());
        assert!(realtime.emitted().is_empty());
    }

    #[tokio::test]
    async fn logout_disconnects_and_blocks_further_rooms() {
        let realtime = RecordingRealtime::connected();
        let sync = admin_in_room(MockRoomApiPort::new(), &realtime).await;
        let _sub = sync.subscribe(EventKind::Connect, |_| {});

        sync.logout();
        sync.logout();

        assert!(sync.room().is_none());
        assert_eq!(sync.error(), None);
        assert_eq!(realtime.disconnects(), 1);
        assert_eq!(realtime.emitted_names(), vec!["leave_room"]);
        assert!(!sync.has_listener(EventKind::Connect));

        let err = sync.create_room(RoomKind::Retro).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    // -------------------------------------------------------------------------
    // Inbound merge
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn reconnect_rejoins_and_keeps_projections() {
        let realtime = RecordingRealtime::connected();
        let sync = member_in_room(MockRoomApiPort::new(), &realtime).await;
        sync.handle_transport_event(TransportEvent::StateChanged(ConnectionState::Connected));
        realtime.clear();

        push(
            &sync,
            ServerEvent::UserList {
                users: vec![
                    participant("Ada", EMAIL, false),
                    participant("Grace", "grace@example.com", true),
                ],
            },
        );
        push(&sync, ServerEvent::NewComment(comment("c1")));
        push(
            &sync,
            ServerEvent::ActionAdded(ActionItem {
                description: "a1".into(),
                assignee_name: "Grace".into(),
            }),
        );

        realtime.set_state(ConnectionState::Reconnecting);
        sync.handle_transport_event(TransportEvent::StateChanged(ConnectionState::Reconnecting));
        let during = sync.snapshot();
        assert_eq!(during.room_id(), Some("room-1"));
        assert_eq!(during.comments.len(), 1);

        realtime.set_state(ConnectionState::Connected);
        sync.handle_transport_event(TransportEvent::StateChanged(ConnectionState::Connected));

        assert_eq!(realtime.emitted(), vec![expected_join("K3X9QZ")]);
        let after = sync.snapshot();
        assert_eq!(after.participants.len(), 2);
        assert_eq!(after.comments, vec![comment("c1")]);
        assert_eq!(after.actions.len(), 1);
    }

    #[tokio::test]
    async fn exhausted_reconnect_exposes_persistent_error() {
        let realtime = RecordingRealtime::default();
        let sync = session(MockRoomApiPort::new(), &realtime);
        let failures = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&failures);
        let _sub = sync.subscribe(EventKind::ConnectionFailed, move |event| {
            assert!(matches!(event, SyncEvent::ConnectionFailed { .. }));
            seen.fetch_add(1, Ordering::SeqCst);
        });

        sync.handle_transport_event(TransportEvent::StateChanged(ConnectionState::Failed));

        let snapshot = sync.snapshot();
        assert_eq!(snapshot.connection, ConnectionState::Failed);
        assert_eq!(snapshot.connection_error.as_deref(), Some(CONNECTION_LOST));
        assert_eq!(failures.load(Ordering::SeqCst), 1);

        sync.handle_transport_event(TransportEvent::StateChanged(ConnectionState::Connected));
        assert_eq!(sync.snapshot().connection_error, None);
    }

    #[tokio::test]
    async fn disconnect_listener_fires_only_after_being_connected() {
        let realtime = RecordingRealtime::default();
        let sync = session(MockRoomApiPort::new(), &realtime);
        let count = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&count);
        let _sub = sync.subscribe(EventKind::Disconnect, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        sync.handle_transport_event(TransportEvent::StateChanged(ConnectionState::Connecting));
        sync.handle_transport_event(TransportEvent::StateChanged(ConnectionState::Disconnected));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        sync.handle_transport_event(TransportEvent::StateChanged(ConnectionState::Connected));
        sync.handle_transport_event(TransportEvent::StateChanged(ConnectionState::Reconnecting));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn server_truth_overrides_assumed_admin() {
        let realtime = RecordingRealtime::connected();
        let sync = admin_in_room(MockRoomApiPort::new(), &realtime).await;

        push(
            &sync,
            ServerEvent::UserList {
                users: vec![
                    participant("Grace", "grace@example.com", true),
                    participant("Ada", EMAIL, false),
                ],
            },
        );

        assert!(!sync.is_admin());
        sync.reveal_results().await.unwrap_err();
    }

    #[tokio::test]
    async fn prediction_pushes_upsert_and_flag_own_role() {
        let realtime = RecordingRealtime::connected();
        let sync = member_in_room(MockRoomApiPort::new(), &realtime).await;
        sync.select_role(ParticipantRole::Developer).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = sync.subscribe(ServerEventKind::PredictionSubmitted, move |event| {
            sink.lock().unwrap().push(event.clone());
        });

        for (role, value) in [
            (ParticipantRole::Qa, 5.0),
            (ParticipantRole::Developer, 3.0),
            (ParticipantRole::Developer, 4.0),
        ] {
            push(
                &sync,
                ServerEvent::PredictionSubmitted(Prediction { role, value }),
            );
        }

        let predictions = sync.predictions();
        assert_eq!(predictions.len(), 2);
        assert!(predictions.contains(&Prediction {
            role: ParticipantRole::Developer,
            value: 4.0
        }));
        assert!(predictions.contains(&Prediction {
            role: ParticipantRole::Qa,
            value: 5.0
        }));
        assert!(sync.snapshot().has_submitted);
        assert_eq!(seen.lock().unwrap().len(), 3);
        assert_eq!(sync.total_estimate(), 9.0);
        assert_eq!(sync.average_prediction(), Some(4.5));
    }

    #[tokio::test]
    async fn room_events_outside_a_room_are_ignored() {
        let realtime = RecordingRealtime::connected();
        let sync = session(MockRoomApiPort::new(), &realtime);

        push(&sync, ServerEvent::NewComment(comment("stray")));
        push(
            &sync,
            ServerEvent::Error {
                message: "Session expired".into(),
            },
        );

        assert!(sync.comments().is_empty());
        assert_eq!(sync.error().as_deref(), Some("Session expired"));
    }

    #[tokio::test]
    async fn session_reset_push_leaves_comments_and_actions() {
        let realtime = RecordingRealtime::connected();
        let sync = member_in_room(MockRoomApiPort::new(), &realtime).await;
        push(&sync, ServerEvent::NewComment(comment("c1")));
        push(&sync, ServerEvent::NewComment(comment("c2")));
        push(
            &sync,
            ServerEvent::ActionAdded(ActionItem {
                description: "a1".into(),
                assignee_name: "Ada".into(),
            }),
        );
        push(
            &sync,
            ServerEvent::PredictionSubmitted(Prediction {
                role: ParticipantRole::Developer,
                value: 4.0,
            }),
        );

        push(&sync, ServerEvent::SessionReset);

        let snapshot = sync.snapshot();
        assert!(snapshot.predictions.is_empty());
        assert_eq!(snapshot.comments, vec![comment("c1"), comment("c2")]);
        assert_eq!(snapshot.actions.len(), 1);
    }

    #[tokio::test]
    async fn event_pump_applies_in_order() {
        let realtime = RecordingRealtime::connected();
        let sync = member_in_room(MockRoomApiPort::new(), &realtime).await;
        let (tx, rx) = mpsc::unbounded_channel();
        let pump = sync.spawn_event_pump(rx);

        tx.send(TransportEvent::Event(ServerEvent::NewComment(comment("first"))))
            .unwrap();
        tx.send(TransportEvent::Event(ServerEvent::NewComment(comment("second"))))
            .unwrap();
        drop(tx);
        pump.await.unwrap();

        assert_eq!(sync.comments(), vec![comment("first"), comment("second")]);
    }

    // -------------------------------------------------------------------------
    // Participant operations
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn submit_prediction_posts_then_emits_without_local_insert() {
        let realtime = RecordingRealtime::connected();
        let mut api = MockRoomApiPort::new();
        api.expect_submit_prediction()
            .withf(|req| {
                req.room_id == "room-1"
                    && req.role == ParticipantRole::Qa
                    && req.prediction == 2.5
            })
            .times(1)
            .returning(|_| Ok(()));
        let sync = member_in_room(api, &realtime).await;
        sync.select_role(ParticipantRole::Qa).unwrap();

        sync.submit_prediction(2.5).await.unwrap();

        assert!(sync.predictions().is_empty());
        assert_eq!(
            realtime.emitted(),
            vec![ClientEvent::SubmitPrediction {
                room_id: "room-1".into(),
                role: ParticipantRole::Qa,
                prediction: 2.5
            }]
        );
    }

    #[tokio::test]
    async fn submit_prediction_validates_locally() {
        let realtime = RecordingRealtime::connected();
        let sync = member_in_room(MockRoomApiPort::new(), &realtime).await;

        let err = sync.submit_prediction(3.0).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));

        sync.select_role(ParticipantRole::Architect).unwrap();
        for value in [0.0, -1.0, f64::NAN, f64::INFINITY, MAX_PREDICTION + 1.0] {
            let err = sync.submit_prediction(value).await.unwrap_err();
            assert!(matches!(err, SyncError::Validation(_)), "{value}");
        }
        assert!(sync.error().is_some());
        assert!(realtime.emitted().is_empty());
    }

    #[tokio::test]
    async fn operations_outside_room_report_not_in_room() {
        let realtime = RecordingRealtime::connected();
        let sync = session(MockRoomApiPort::new(), &realtime);

        assert_eq!(
            sync.select_role(ParticipantRole::Ui),
            Err(SyncError::NotInRoom)
        );
        assert_eq!(
            sync.add_comment(CommentCategory::Improvement, "x").await,
            Err(SyncError::NotInRoom)
        );
        assert_eq!(sync.reset_session(), Err(SyncError::NotInRoom));
        assert_eq!(sync.error(), Some(SyncError::NotInRoom.user_message()));
    }

    #[tokio::test]
    async fn add_comment_trims_and_relies_on_echo() {
        let realtime = RecordingRealtime::connected();
        let mut api = MockRoomApiPort::new();
        api.expect_add_comment()
            .withf(|req| req.comment.text == "Standups were short")
            .times(1)
            .returning(|_| Ok(()));
        let sync = member_in_room(api, &realtime).await;

        sync.add_comment(CommentCategory::WentWell, "  Standups were short ")
            .await
            .unwrap();
        assert!(sync.comments().is_empty());

        push(
            &sync,
            ServerEvent::NewComment(Comment {
                category: CommentCategory::WentWell,
                text: "Standups were short".into(),
            }),
        );
        assert_eq!(sync.comments().len(), 1);
        assert_eq!(realtime.emitted_names(), vec!["new_comment"]);
    }

    #[tokio::test]
    async fn empty_comment_never_leaves_the_client() {
        let realtime = RecordingRealtime::connected();
        let sync = member_in_room(MockRoomApiPort::new(), &realtime).await;

        let err = sync
            .add_comment(CommentCategory::DidntGoWell, " \n ")
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Validation(_)));
        assert!(realtime.emitted().is_empty());
    }

    // -------------------------------------------------------------------------
    // Admin operations
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn non_admin_admin_operations_issue_no_traffic() {
        let realtime = RecordingRealtime::connected();
        let sync = member_in_room(MockRoomApiPort::new(), &realtime).await;

        assert_eq!(sync.reveal_results().await, Err(SyncError::NotAdmin));
        assert_eq!(
            sync.create_action("Fix flaky test", "grace@example.com").await,
            Err(SyncError::NotAdmin)
        );
        assert_eq!(sync.reset_session(), Err(SyncError::NotAdmin));

        assert!(realtime.emitted().is_empty());
        assert_eq!(sync.error(), None);
    }

    #[tokio::test]
    async fn admin_reveal_replaces_predictions_then_emits() {
        let realtime = RecordingRealtime::connected();
        let mut api = MockRoomApiPort::new();
        let rt = realtime.clone();
        api.expect_get_predictions()
            .withf(|room_id| room_id == "room-1")
            .times(1)
            .returning(move |_| {
                assert!(rt.emitted().is_empty());
                Ok(vec![Prediction {
                    role: ParticipantRole::Product,
                    value: 6.0,
                }])
            });
        let sync = admin_in_room(api, &realtime).await;
        push(
            &sync,
            ServerEvent::PredictionSubmitted(Prediction {
                role: ParticipantRole::Qa,
                value: 1.0,
            }),
        );

        sync.reveal_results().await.unwrap();

        assert_eq!(
            sync.predictions(),
            vec![Prediction {
                role: ParticipantRole::Product,
                value: 6.0
            }]
        );
        assert_eq!(
            realtime.emitted(),
            vec![ClientEvent::RevealResults {
                room_id: "room-1".into()
            }]
        );
    }

    #[tokio::test]
    async fn admin_create_action_resolves_assignee() {
        let realtime = RecordingRealtime::connected();
        let mut api = MockRoomApiPort::new();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&requests);
        api.expect_create_action().times(2).returning(move |req| {
            sink.lock().unwrap().push(req.clone());
            Ok(())
        });
        let sync = admin_in_room(api, &realtime).await;
        push(
            &sync,
            ServerEvent::UserList {
                users: vec![
                    participant("Ada", EMAIL, true),
                    participant("Grace", "grace@example.com", false),
                ],
            },
        );

        sync.create_action("Write release checklist", "GRACE@example.com")
            .await
            .unwrap();
        sync.create_action("Book the retro room", "nobody@example.com")
            .await
            .unwrap();

        let requests = requests.lock().unwrap();
        assert_eq!(requests[0].assignee_name, "Grace");
        assert_eq!(requests[0].user_name, "Ada");
        assert_eq!(requests[1].assignee_name, "Ada");
        assert!(sync.actions().is_empty());
        assert_eq!(realtime.emitted_names(), vec!["create_action", "create_action"]);
    }

    #[tokio::test]
    async fn admin_reset_clears_round_and_emits() {
        let realtime = RecordingRealtime::connected();
        let sync = admin_in_room(MockRoomApiPort::new(), &realtime).await;
        sync.select_role(ParticipantRole::Developer).unwrap();
        push(
            &sync,
            ServerEvent::PredictionSubmitted(Prediction {
                role: ParticipantRole::Developer,
                value: 2.0,
            }),
        );
        push(&sync, ServerEvent::NewComment(comment("keep me")));

        sync.reset_session().unwrap();

        let snapshot = sync.snapshot();
        assert!(snapshot.predictions.is_empty());
        assert!(!snapshot.has_submitted);
        assert_eq!(snapshot.comments.len(), 1);
        assert_eq!(
            realtime.emitted(),
            vec![ClientEvent::ResetSession {
                room_id: "room-1".into()
            }]
        );
    }

    // -------------------------------------------------------------------------
    // In-flight requests
    // -------------------------------------------------------------------------

    /// Room API whose `join_room` and `get_predictions` wait until released.
    #[derive(Default)]
    struct GatedApi {
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl RoomApiPort for GatedApi {
        async fn create_room(&self, _kind: RoomKind) -> Result<CreatedRoom, ApiError> {
            Ok(created())
        }

        async fn join_room(
            &self,
            _kind: RoomKind,
            _request: &JoinRoomRequest,
        ) -> Result<String, ApiError> {
            self.started.notify_one();
            self.release.notified().await;
            Ok("room-1".into())
        }

        async fn submit_prediction(
            &self,
            _request: &SubmitPredictionRequest,
        ) -> Result<(), ApiError> {
            Ok(())
        }

        async fn get_predictions(&self, _room_id: &str) -> Result<Vec<Prediction>, ApiError> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(vec![Prediction {
                role: ParticipantRole::Developer,
                value: 8.0,
            }])
        }

        async fn add_comment(&self, _request: &AddCommentRequest) -> Result<(), ApiError> {
            Ok(())
        }

        async fn create_action(&self, _request: &CreateActionRequest) -> Result<(), ApiError> {
            Ok(())
        }
    }

    async fn gated_admin() -> (SessionSync, Arc<GatedApi>, RecordingRealtime) {
        let api = Arc::new(GatedApi::default());
        let realtime = RecordingRealtime::connected();
        let sync = SessionSync::new(identity(), api.clone(), Arc::new(realtime.clone()));
        sync.create_room(RoomKind::Refinement).await.unwrap();
        realtime.clear();
        (sync, api, realtime)
    }

    #[tokio::test]
    async fn loading_is_set_while_request_in_flight() {
        let (sync, api, _realtime) = gated_admin().await;

        let task = tokio::spawn({
            let sync = sync.clone();
            async move { sync.reveal_results().await }
        });
        api.started.notified().await;
        assert!(sync.loading());

        api.release.notify_one();
        task.await.unwrap().unwrap();
        assert!(!sync.loading());
    }

    #[tokio::test]
    async fn response_after_leave_is_dropped() {
        let (sync, api, realtime) = gated_admin().await;

        let task = tokio::spawn({
            let sync = sync.clone();
            async move { sync.reveal_results().await }
        });
        api.started.notified().await;
        sync.leave_room();
        realtime.clear();
        api.release.notify_one();

        assert_eq!(task.await.unwrap(), Err(SyncError::Superseded));
        assert!(sync.predictions().is_empty());
        assert!(realtime.emitted().is_empty());
        assert!(!sync.loading());
        assert_eq!(sync.error(), None);
    }

    #[tokio::test]
    async fn leave_while_joining_abandons_the_join() {
        let api = Arc::new(GatedApi::default());
        let realtime = RecordingRealtime::connected();
        let sync = SessionSync::new(identity(), api.clone(), Arc::new(realtime.clone()));

        let task = tokio::spawn({
            let sync = sync.clone();
            async move { sync.join_room(RoomKind::Retro, "ABC123").await }
        });
        api.started.notified().await;
        assert!(sync.loading());

        sync.leave_room();
        api.release.notify_one();

        assert_eq!(task.await.unwrap(), Err(SyncError::Superseded));
        assert_eq!(sync.room(), None);
        assert!(realtime.emitted().is_empty());
        assert!(!sync.loading());
        assert_eq!(sync.error(), None);
    }

    #[tokio::test]
    async fn leave_outside_a_room_leaves_next_join_alone() {
        let api = Arc::new(GatedApi::default());
        let realtime = RecordingRealtime::connected();
        let sync = SessionSync::new(identity(), api.clone(), Arc::new(realtime.clone()));

        sync.leave_room();

        let task = tokio::spawn({
            let sync = sync.clone();
            async move { sync.join_room(RoomKind::Retro, "ABC123").await }
        });
        api.started.notified().await;
        api.release.notify_one();

        let room = task.await.unwrap().unwrap();
        assert_eq!(room.room_id, "room-1");
        assert_eq!(sync.room(), Some(room));
        assert_eq!(realtime.emitted().len(), 1);
    }
}
