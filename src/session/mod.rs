//! Session state and on-disk session persistence.

pub mod state;
pub mod store;

pub use state::SessionState;
pub use store::{SessionStore, StoredSession};
