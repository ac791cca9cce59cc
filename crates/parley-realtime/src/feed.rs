//! The change-feed seam between the registry and a realtime transport.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::subscription::{RowChange, SubscriptionConfig};

/// Connection status reported by a transport channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    Subscribed,
    Closed,
    Errored(String),
    TimedOut,
}

impl ChannelStatus {
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Subscribed)
    }
}

impl From<TransportError> for ChannelStatus {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Closed => Self::Closed,
            TransportError::TimedOut => Self::TimedOut,
            TransportError::Errored(msg) | TransportError::Connection(msg) => Self::Errored(msg),
        }
    }
}

pub type ChangeListener = Arc<dyn Fn(RowChange) + Send + Sync>;
pub type StatusListener = Arc<dyn Fn(ChannelStatus) + Send + Sync>;

/// A realtime transport able to open filtered change-feed channels.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open `topic`, deliver matching row changes to `listener` and status
    /// transitions to `status`.
    ///
    /// Returns once the join has been requested; `Subscribed` arrives later
    /// through `status`.
    async fn open(
        &self,
        topic: &str,
        config: &SubscriptionConfig,
        listener: ChangeListener,
        status: StatusListener,
    ) -> Result<Box<dyn FeedChannel>, TransportError>;
}

/// One open transport channel.
#[async_trait]
pub trait FeedChannel: Send + Sync {
    fn topic(&self) -> &str;

    /// Leave the channel. No further events or statuses are delivered.
    async fn close(&self);
}
