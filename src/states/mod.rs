//! Resource state and its storage.
//!
//! [`State`] records the last-known provider-side object for every resource
//! instance. During a walk the engine works on three [`SyncState`] views of
//! it (prior run, refreshed, working), and a [`StateStore`] persists the
//! working view between runs.

mod local;
mod lock;
mod object;
mod state;
mod store;
mod sync;

pub use local::LocalStateStore;
pub use lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
pub use object::{ObjectStatus, ResourceInstanceObject, new_deposed_key};
pub use state::{InstanceState, ResourceState, State};
pub use store::StateStore;
pub use sync::SyncState;
