//! Chat tables and the subscriptions consumers open on them.
//!
//! The row payloads here ride inside change-feed events. The transport
//! envelope is handled by `supabase`.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::auth::AuthProvider;
use crate::error::RealtimeError;
use crate::filter::RowFilter;
use crate::store::RowStore;
use crate::subscription::{ChangeEvent, SubscriptionConfig};

// ---------------------------------------------------------------------------
// Table names
// ---------------------------------------------------------------------------

pub mod tables {
    pub const MESSAGES: &str = "messages";
    pub const CHANNELS: &str = "channels";
    pub const TYPING_STATUS: &str = "typing_status";
    pub const MESSAGE_REACTIONS: &str = "message_reactions";
    pub const USER_PRESENCE: &str = "user_presence";
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

/// Every change to messages in one channel.
pub fn messages_in_channel(channel_id: &str) -> Result<SubscriptionConfig, RealtimeError> {
    Ok(SubscriptionConfig::new(tables::MESSAGES)?
        .with_filter(RowFilter::eq("channel_id", channel_id)?))
}

/// Only new messages in one channel.
pub fn new_messages_in_channel(channel_id: &str) -> Result<SubscriptionConfig, RealtimeError> {
    Ok(messages_in_channel(channel_id)?.with_event(ChangeEvent::Insert))
}

pub fn typing_in_channel(channel_id: &str) -> Result<SubscriptionConfig, RealtimeError> {
    Ok(SubscriptionConfig::new(tables::TYPING_STATUS)?
        .with_filter(RowFilter::eq("channel_id", channel_id)?))
}

pub fn reactions_on_message(message_id: &str) -> Result<SubscriptionConfig, RealtimeError> {
    Ok(SubscriptionConfig::new(tables::MESSAGE_REACTIONS)?
        .with_filter(RowFilter::eq("message_id", message_id)?))
}

/// Channel creation, renames, and deletion.
pub fn channel_list() -> Result<SubscriptionConfig, RealtimeError> {
    SubscriptionConfig::new(tables::CHANNELS)
}

pub fn user_presence(user_id: &str) -> Result<SubscriptionConfig, RealtimeError> {
    Ok(SubscriptionConfig::new(tables::USER_PRESENCE)?
        .with_filter(RowFilter::eq("user_id", user_id)?))
}

// ---------------------------------------------------------------------------
// Row payloads
// ---------------------------------------------------------------------------

/// Accepts ids stored as text or as integers.
pub(crate) fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid id: {other}"))),
    }
}

/// A message row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub channel_id: String,
    pub user_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Attachment metadata; the file itself lives in object storage.
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

/// One user's typing state in one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingRow {
    pub channel_id: String,
    pub user_id: String,
    pub is_typing: bool,
    #[serde(default)]
    pub updated_at: Option<String>,
}

// ---------------------------------------------------------------------------
// Typing
// ---------------------------------------------------------------------------

/// Writes the signed-in user's typing state.
#[derive(Clone)]
pub struct TypingNotifier {
    store: Arc<dyn RowStore>,
    auth: Arc<dyn AuthProvider>,
}

impl TypingNotifier {
    pub fn new(store: Arc<dyn RowStore>, auth: Arc<dyn AuthProvider>) -> Self {
        Self { store, auth }
    }

    /// Fails with `Authentication` without writing when nobody is signed in.
    pub async fn set_typing(&self, channel_id: &str, is_typing: bool) -> Result<(), RealtimeError> {
        let user = self
            .auth
            .current_user()
            .await
            .ok_or(RealtimeError::Authentication)?;
        let row = TypingRow {
            channel_id: channel_id.to_string(),
            user_id: user.id,
            is_typing,
            updated_at: Some(chrono::Utc::now().to_rfc3339()),
        };
        let row = serde_json::to_value(&row)
            .map_err(|e| crate::error::StoreError::Decode(e.to_string()))?;
        self.store
            .upsert(tables::TYPING_STATUS, row, "channel_id,user_id")
            .await?;
        debug!(channel_id, is_typing, "Typing state written");
        Ok(())
    }
}
