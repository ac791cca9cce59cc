//! Configuration, protocol envelope, and connection commands.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::feed::{ChangeListener, StatusListener};
use crate::subscription::SubscriptionConfig;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Settings for the realtime socket.
#[derive(Clone)]
pub struct SupabaseFeedConfig {
    /// Full WebSocket URL including the `apikey` and `vsn` query.
    pub url: String,
    /// User JWT sent with every join so row-level security applies.
    pub access_token: Option<String>,
    pub heartbeat_interval_secs: u64,
    /// How long a join may wait for its reply before reporting `TimedOut`.
    pub join_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Socket reconnect base delay in seconds.
    pub reconnect_delay_secs: u64,
    pub max_reconnect_delay_secs: u64,
}

impl std::fmt::Debug for SupabaseFeedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseFeedConfig")
            .field("url", &self.url.split('?').next().unwrap_or(""))
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field("join_timeout_secs", &self.join_timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("reconnect_delay_secs", &self.reconnect_delay_secs)
            .field("max_reconnect_delay_secs", &self.max_reconnect_delay_secs)
            .finish()
    }
}

impl Default for SupabaseFeedConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            access_token: None,
            heartbeat_interval_secs: 25,
            join_timeout_secs: 10,
            connect_timeout_secs: 15,
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
        }
    }
}

impl SupabaseFeedConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token;
        self
    }

    pub(crate) fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Phoenix Protocol Types
// ---------------------------------------------------------------------------

/// A Phoenix protocol message envelope (v1 JSON format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    pub payload: serde_json::Value,
    #[serde(rename = "ref")]
    pub msg_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl PhoenixMessage {
    pub(crate) fn new(
        topic: impl Into<String>,
        event: &str,
        payload: serde_json::Value,
        msg_ref: String,
    ) -> Self {
        Self {
            topic: topic.into(),
            event: event.to_string(),
            payload,
            msg_ref: Some(msg_ref),
            join_ref: None,
        }
    }

    /// The ref identifying the channel join this message belongs to.
    pub(crate) fn reply_ref(&self) -> Option<&str> {
        self.join_ref.as_deref().or(self.msg_ref.as_deref())
    }
}

/// Wire topic for a registry channel key.
pub(crate) fn phoenix_topic(topic: &str) -> String {
    format!("realtime:{topic}")
}

/// Serialize the `phx_join` payload for one `postgres_changes` binding.
pub(crate) fn join_payload(
    config: &SubscriptionConfig,
    access_token: Option<&str>,
) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "config": {
            "broadcast": { "self": false, "ack": false },
            "presence": { "key": "" },
            "postgres_changes": [config.to_postgres_changes()]
        }
    });
    if let Some(token) = access_token {
        payload["access_token"] = serde_json::Value::String(token.to_string());
    }
    payload
}

// ---------------------------------------------------------------------------
// Bindings & Commands
// ---------------------------------------------------------------------------

/// Local state of one joined (or joining) topic.
pub(crate) struct Binding {
    pub(crate) join_ref: String,
    pub(crate) config: SubscriptionConfig,
    pub(crate) listener: ChangeListener,
    pub(crate) status: StatusListener,
    pub(crate) joined: bool,
}

/// Bindings keyed by wire topic.
pub(crate) type Bindings = Arc<RwLock<HashMap<String, Binding>>>;

/// Commands sent to the connection task.
#[derive(Debug)]
pub(crate) enum RealtimeCommand {
    Join {
        topic: String,
        join_ref: String,
        payload: serde_json::Value,
    },
    Leave {
        topic: String,
    },
    Disconnect,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::RowFilter;
    use crate::subscription::ChangeEvent;

    #[test]
    fn join_payload_carries_postgres_changes_and_token() {
        let config = SubscriptionConfig::new("messages")
            .unwrap()
            .with_event(ChangeEvent::Insert)
            .with_filter(RowFilter::eq("channel_id", "C1").unwrap());
        let payload = join_payload(&config, Some("jwt"));

        let changes = &payload["config"]["postgres_changes"][0];
        assert_eq!(changes["event"], "INSERT");
        assert_eq!(changes["schema"], "public");
        assert_eq!(changes["table"], "messages");
        assert_eq!(changes["filter"], "channel_id=eq.C1");
        assert_eq!(payload["access_token"], "jwt");
    }

    #[test]
    fn join_payload_omits_filter_and_token_when_absent() {
        let config = SubscriptionConfig::new("channels").unwrap();
        let payload = join_payload(&config, None);
        let changes = &payload["config"]["postgres_changes"][0];
        assert_eq!(changes["event"], "*");
        assert!(changes.get("filter").is_none());
        assert!(payload.get("access_token").is_none());
    }

    #[test]
    fn phoenix_message_uses_ref_on_the_wire() {
        let msg = PhoenixMessage::new("realtime:x", "phx_join", serde_json::json!({}), "7".into());
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["ref"], "7");
        assert!(json.get("join_ref").is_none());

        let parsed: PhoenixMessage = serde_json::from_str(
            r#"{"topic":"realtime:x","event":"postgres_changes","payload":{},"ref":null}"#,
        )
        .unwrap();
        assert!(parsed.msg_ref.is_none());
        assert!(parsed.reply_ref().is_none());
    }

    #[test]
    fn debug_hides_credentials() {
        let config = SupabaseFeedConfig::new("wss://x.supabase.co/realtime/v1/websocket?apikey=secret")
            .with_access_token(Some("jwt-secret".into()));
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret"));
    }
}
