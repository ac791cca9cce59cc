//! Error taxonomy for the realtime layer.
//!
//! Transport failures are recovered internally by the subscription
//! registry and never reach callers. Store and authentication failures
//! always do.

use crate::key::ChannelKey;

/// A channel-level transport failure. Drives the reconnect policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("channel closed")]
    Closed,
    #[error("channel error: {0}")]
    Errored(String),
    #[error("channel join timed out")]
    TimedOut,
    #[error("connection error: {0}")]
    Connection(String),
}

/// A failed read or write against the backing store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid row data: {0}")]
    Decode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("invalid subscription config: {0}")]
    Configuration(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("subscription {key} lost after {attempts} retries")]
    RetryExhausted { key: ChannelKey, attempts: u32 },
    #[error("subscription {key} is already held by another subscriber")]
    KeyInUse { key: ChannelKey },
    #[error("no authenticated user")]
    Authentication,
    #[error("store write failed: {0}")]
    Store(#[from] StoreError),
}

impl From<RealtimeError> for parley_common::ParleyError {
    fn from(err: RealtimeError) -> Self {
        match err {
            RealtimeError::Authentication => Self::Auth(err.to_string()),
            RealtimeError::Store(e) => Self::Store(e.to_string()),
            other => Self::Realtime(other.to_string()),
        }
    }
}
