//! Change-feed subscription and transport tuning.

use serde::{Deserialize, Serialize};

/// Retry and transport settings for realtime subscriptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeSettings {
    /// Resubscribe attempts per subscription before it is dropped (0-10).
    pub max_retries: u32,
    /// Base backoff delay in milliseconds (10-60000).
    pub base_delay_ms: u64,
    /// Phoenix heartbeat interval in seconds (5-120).
    pub heartbeat_interval_secs: u64,
    /// How long a channel join may stay unanswered (1-120).
    pub join_timeout_secs: u64,
    /// Socket reconnect base delay in seconds.
    pub reconnect_delay_secs: u64,
    /// Socket reconnect delay ceiling in seconds.
    pub max_reconnect_delay_secs: u64,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            heartbeat_interval_secs: 25,
            join_timeout_secs: 10,
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
        }
    }
}
