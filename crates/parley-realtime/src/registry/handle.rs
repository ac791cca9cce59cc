//! Per-key bookkeeping owned by the registry.

use crate::feed::{ChannelStatus, FeedChannel};
use crate::subscription::SubscriptionConfig;

use super::ChangeCallback;

/// Lifecycle state of an active subscription.
///
/// A removed subscription has no state: it is simply absent from the
/// registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Connecting,
    Subscribed,
    Closed,
    Errored,
    TimedOut,
}

impl SubscriptionState {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Closed | Self::Errored | Self::TimedOut)
    }
}

impl From<&ChannelStatus> for SubscriptionState {
    fn from(status: &ChannelStatus) -> Self {
        match status {
            ChannelStatus::Subscribed => Self::Subscribed,
            ChannelStatus::Closed => Self::Closed,
            ChannelStatus::Errored(_) => Self::Errored,
            ChannelStatus::TimedOut => Self::TimedOut,
        }
    }
}

/// Consecutive resubscribe attempts since the last `Subscribed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    pub attempts: u32,
}

impl RetryState {
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

/// Identity of one subscription, stable across its resubscribes.
///
/// A key can be dropped and later taken by another subscriber; the id
/// tells the two apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// Everything needed to resubscribe identically after a drop.
pub(crate) struct SubscriptionHandle {
    pub(crate) config: SubscriptionConfig,
    pub(crate) callback: ChangeCallback,
    pub(crate) channel: Option<Box<dyn FeedChannel>>,
    pub(crate) retry: RetryState,
    pub(crate) state: SubscriptionState,
    /// Bumped on every (re)open; stale statuses and timers carry an old one.
    pub(crate) generation: u64,
    pub(crate) id: SubscriptionId,
    /// Ticket of the armed retry timer, if any. Cleared when the channel
    /// recovers on its own so the timer fires into nothing.
    pub(crate) retry_ticket: Option<u64>,
    /// Short id tying together the log lines of this subscription.
    pub(crate) trace_id: String,
}
