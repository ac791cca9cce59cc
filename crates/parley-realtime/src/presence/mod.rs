//! Presence coordination for the local user.
//!
//! One `PresenceCoordinator` per process persists the local user's status
//! and fans presence-row changes out to local observers. It relays events
//! and never acts as a cache of anyone's status.

mod coordinator;
mod types;

#[cfg(test)]
mod tests;

pub use coordinator::{PresenceCoordinator, StatusCallback, StatusObserver};
pub use types::{PresenceOptions, PresenceRow, PresenceStatus, DEFAULT_PRESENCE_TABLE};
