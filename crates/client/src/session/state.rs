//! Local projections of server-side room state and the rules that merge
//! server pushes into them.
//!
//! Everything here is a discardable cache: the server is the source of truth
//! and every push either replaces or extends what is held locally.

use agileflow_protocol::{
    ActionItem, Comment, Participant, ParticipantRole, Prediction, RoomKind, ServerEvent,
};

use crate::ports::ConnectionState;

/// Room the session currently belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveRoom {
    pub room_id: String,
    pub invite_code: String,
    pub kind: RoomKind,
}

/// Read-only copy of everything a view needs to render a board.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub connection: ConnectionState,
    /// Persistent message once reconnection has been given up
    pub connection_error: Option<String>,
    pub room: Option<ActiveRoom>,
    pub is_admin: bool,
    pub local_role: Option<ParticipantRole>,
    /// Whether a prediction for the local role is in for this round
    pub has_submitted: bool,
    pub participants: Vec<Participant>,
    pub predictions: Vec<Prediction>,
    pub comments: Vec<Comment>,
    pub actions: Vec<ActionItem>,
    pub loading: bool,
    pub error: Option<String>,
}

impl SessionSnapshot {
    pub fn room_id(&self) -> Option<&str> {
        self.room.as_ref().map(|room| room.room_id.as_str())
    }

    pub fn invite_code(&self) -> Option<&str> {
        self.room.as_ref().map(|room| room.invite_code.as_str())
    }

    pub fn average_prediction(&self) -> Option<f64> {
        average_prediction(&self.predictions)
    }

    pub fn total_estimate(&self) -> f64 {
        total_estimate(&self.predictions)
    }
}

/// Mutable session state guarded by `SessionSync`.
#[derive(Debug, Default)]
pub(crate) struct SessionStore {
    pub connection: ConnectionState,
    pub connection_error: Option<String>,
    pub room: Option<ActiveRoom>,
    pub is_admin: bool,
    pub local_role: Option<ParticipantRole>,
    pub has_submitted: bool,
    pub participants: Vec<Participant>,
    pub predictions: Vec<Prediction>,
    pub comments: Vec<Comment>,
    pub actions: Vec<ActionItem>,
    pub in_flight: usize,
    pub error: Option<String>,
    /// Bumped on every room transition; responses tagged with an older
    /// value are dropped
    pub epoch: u64,
}

impl SessionStore {
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            connection: self.connection,
            connection_error: self.connection_error.clone(),
            room: self.room.clone(),
            is_admin: self.is_admin,
            local_role: self.local_role,
            has_submitted: self.has_submitted,
            participants: self.participants.clone(),
            predictions: self.predictions.clone(),
            comments: self.comments.clone(),
            actions: self.actions.clone(),
            loading: self.in_flight > 0,
            error: self.error.clone(),
        }
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room.as_ref().map(|room| room.room_id.as_str())
    }

    /// Start a new epoch, invalidating any response still in flight.
    pub fn bump_epoch(&mut self) -> u64 {
        self.epoch = self.epoch.wrapping_add(1);
        self.epoch
    }

    /// Switch to a freshly created or joined room.
    ///
    /// Projections from any earlier room are dropped; the local role is kept
    /// since it describes the person, not the room.
    pub fn enter_room(&mut self, room: ActiveRoom, is_admin: bool) -> u64 {
        self.clear_projections();
        self.room = Some(room);
        self.is_admin = is_admin;
        self.bump_epoch()
    }

    /// Forget the current room and everything cached about it.
    pub fn clear_room(&mut self) -> u64 {
        self.room = None;
        self.is_admin = false;
        self.clear_projections();
        self.bump_epoch()
    }

    fn clear_projections(&mut self) {
        self.has_submitted = false;
        self.participants.clear();
        self.predictions.clear();
        self.comments.clear();
        self.actions.clear();
    }

    /// Merge a server push into the projections.
    pub fn apply(&mut self, event: &ServerEvent, local_email: &str) {
        match event {
            ServerEvent::UserList { users } => self.replace_participants(users, local_email),
            ServerEvent::PredictionSubmitted(prediction) => self.record_prediction(*prediction),
            ServerEvent::ResultsRevealed { predictions } => {
                self.predictions = predictions.clone();
            }
            ServerEvent::SessionReset => self.reset_round(),
            ServerEvent::NewComment(comment) => self.comments.push(comment.clone()),
            ServerEvent::ActionAdded(action) => self.actions.push(action.clone()),
            ServerEvent::Error { message } => self.error = Some(message.clone()),
        }
    }

    /// Full replacement; the local entry's admin flag overrides any local
    /// assumption made at create/join time.
    pub fn replace_participants(&mut self, users: &[Participant], local_email: &str) {
        self.participants = users.to_vec();
        if let Some(me) = self
            .participants
            .iter()
            .find(|p| p.email.eq_ignore_ascii_case(local_email))
        {
            self.is_admin = me.is_admin;
        }
    }

    /// Upsert by role; last write wins.
    pub fn record_prediction(&mut self, prediction: Prediction) {
        upsert_prediction(&mut self.predictions, prediction);
        if self.local_role == Some(prediction.role) {
            self.has_submitted = true;
        }
    }

    /// Clear predictions and every submission flag for a new round.
    pub fn reset_round(&mut self) {
        self.predictions.clear();
        self.has_submitted = false;
        for participant in &mut self.participants {
            participant.has_submitted = false;
        }
    }

    /// Name of the participant with `email`, if they are in the room.
    pub fn participant_name(&self, email: &str) -> Option<&str> {
        self.participants
            .iter()
            .find(|p| p.email.eq_ignore_ascii_case(email))
            .map(|p| p.name.as_str())
    }
}

/// Replace the entry for `prediction.role`, or append one.
pub fn upsert_prediction(predictions: &mut Vec<Prediction>, prediction: Prediction) {
    match predictions.iter_mut().find(|p| p.role == prediction.role) {
        Some(existing) => existing.value = prediction.value,
        None => predictions.push(prediction),
    }
}

/// Mean of the submitted values; `None` while nothing is in.
pub fn average_prediction(predictions: &[Prediction]) -> Option<f64> {
    if predictions.is_empty() {
        return None;
    }
    Some(total_estimate(predictions) / predictions.len() as f64)
}

/// Sum of the per-role estimates.
pub fn total_estimate(predictions: &[Prediction]) -> f64 {
    predictions.iter().map(|p| p.value).sum()
}
