//! Room session synchronization
//!
//! [`SessionSync`] is the single source of truth for a signed-in user's room:
//! identifiers, projections, loading/error state and event listeners.

mod listeners;
mod state;
mod sync;

pub use listeners::{EventKind, Listener, Subscription, SyncEvent};
pub use state::{average_prediction, total_estimate, upsert_prediction, ActiveRoom, SessionSnapshot};
pub use sync::{SessionSync, MAX_PREDICTION};
