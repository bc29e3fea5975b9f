//! Recording implementation of [`RealtimePort`] for tests

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use agileflow_protocol::ClientEvent;

use crate::error::SyncError;
use crate::ports::{ConnectionState, RealtimePort};

#[derive(Default)]
struct State {
    conn_state: ConnectionState,
    emitted: Vec<ClientEvent>,
    disconnects: usize,
}

/// Real-time port fake.
///
/// Tests drive the connection state with [`RecordingRealtime::set_state`] and
/// assert on everything that was emitted. Emitting while not `Connected`
/// fails with [`SyncError::NotConnected`] like the real client.
#[derive(Clone, Default)]
pub struct RecordingRealtime {
    state: Arc<Mutex<State>>,
}

impl RecordingRealtime {
    /// A fake that starts out connected.
    pub fn connected() -> Self {
        let fake = Self::default();
        fake.set_state(ConnectionState::Connected);
        fake
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_state(&self, new_state: ConnectionState) {
        self.lock().conn_state = new_state;
    }

    pub fn emitted(&self) -> Vec<ClientEvent> {
        self.lock().emitted.clone()
    }

    /// Event names in emission order.
    pub fn emitted_names(&self) -> Vec<&'static str> {
        self.lock().emitted.iter().map(ClientEvent::name).collect()
    }

    pub fn disconnects(&self) -> usize {
        self.lock().disconnects
    }

    pub fn clear(&self) {
        self.lock().emitted.clear();
    }
}

impl RealtimePort for RecordingRealtime {
    fn state(&self) -> ConnectionState {
        self.lock().conn_state
    }

    fn emit(&self, event: ClientEvent) -> Result<(), SyncError> {
        let mut s = self.lock();
        if s.conn_state != ConnectionState::Connected {
            return Err(SyncError::NotConnected);
        }
        s.emitted.push(event);
        Ok(())
    }

    fn disconnect(&self) {
        let mut s = self.lock();
        s.conn_state = ConnectionState::Disconnected;
        s.disconnects += 1;
    }
}
