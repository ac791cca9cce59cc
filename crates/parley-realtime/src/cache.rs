//! Per-channel message cache fed by change events.
//!
//! Stores messages per channel with a bounded ring buffer so memory
//! usage stays predictable. The stream has no backlog replay after a
//! resubscribe, so callers pair it with `refetch`.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, warn};

use crate::error::RealtimeError;
use crate::feeds::{tables, ChatMessage};
use crate::filter::RowFilter;
use crate::store::RowStore;
use crate::subscription::{ChangeKind, RowChange};

/// Configuration for the message cache.
#[derive(Debug, Clone)]
pub struct MessageCacheConfig {
    /// Maximum messages to retain per channel.
    pub max_messages_per_channel: usize,
}

impl Default for MessageCacheConfig {
    fn default() -> Self {
        Self {
            max_messages_per_channel: 500,
        }
    }
}

/// Messages keyed by channel id, oldest first.
pub struct MessageCache {
    config: MessageCacheConfig,
    channels: HashMap<String, VecDeque<ChatMessage>>,
}

fn row_id(row: &serde_json::Value) -> Option<String> {
    match row.get("id")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl MessageCache {
    pub fn new(config: MessageCacheConfig) -> Self {
        Self {
            config,
            channels: HashMap::new(),
        }
    }

    fn push(&mut self, msg: ChatMessage) {
        let buf = self.channels.entry(msg.channel_id.clone()).or_default();
        if let Some(existing) = buf.iter_mut().find(|m| m.id == msg.id) {
            *existing = msg;
            return;
        }
        if buf.len() >= self.config.max_messages_per_channel {
            buf.pop_front();
        }
        buf.push_back(msg);
    }

    /// Apply one change from the `messages` table. Returns whether the
    /// cache changed.
    pub fn apply(&mut self, change: &RowChange) -> bool {
        if change.table != tables::MESSAGES {
            return false;
        }
        match change.kind {
            ChangeKind::Insert | ChangeKind::Update => {
                match serde_json::from_value::<ChatMessage>(change.record.clone()) {
                    Ok(msg) => {
                        self.push(msg);
                        true
                    }
                    Err(e) => {
                        warn!(error = %e, "Unreadable message row");
                        false
                    }
                }
            }
            ChangeKind::Delete => {
                // Without full replica identity the old row carries only the key.
                let row = change.row();
                let Some(id) = row_id(row) else {
                    return false;
                };
                let channel = row.get("channel_id").and_then(|c| c.as_str());
                let mut removed = false;
                for (name, buf) in self.channels.iter_mut() {
                    if channel.is_some_and(|c| c != name) {
                        continue;
                    }
                    let before = buf.len();
                    buf.retain(|m| m.id != id);
                    removed |= buf.len() != before;
                }
                removed
            }
        }
    }

    /// Replace a channel's contents, keeping the newest messages that fit.
    pub fn replace_channel(&mut self, channel_id: &str, messages: Vec<ChatMessage>) {
        let mut buf: VecDeque<ChatMessage> = messages
            .into_iter()
            .filter(|m| m.channel_id == channel_id)
            .collect();
        let excess = buf.len().saturating_sub(self.config.max_messages_per_channel);
        buf.drain(..excess);
        self.channels.insert(channel_id.to_string(), buf);
    }

    /// Reload a channel from the store. Returns the number of messages kept.
    pub async fn refetch(
        &mut self,
        store: &dyn RowStore,
        channel_id: &str,
    ) -> Result<usize, RealtimeError> {
        let filter = RowFilter::eq("channel_id", channel_id)?;
        let rows = store.select(tables::MESSAGES, Some(&filter)).await?;
        let mut messages: Vec<ChatMessage> = rows
            .into_iter()
            .filter_map(|row| serde_json::from_value(row).ok())
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        self.replace_channel(channel_id, messages);
        let kept = self.channels.get(channel_id).map_or(0, |b| b.len());
        debug!(channel_id, kept, "Channel refetched");
        Ok(kept)
    }

    /// Get the most recent `limit` messages from a channel (oldest first).
    pub fn recent(&self, channel_id: &str, limit: usize) -> Vec<&ChatMessage> {
        match self.channels.get(channel_id) {
            Some(buf) => {
                let skip = buf.len().saturating_sub(limit);
                buf.iter().skip(skip).collect()
            }
            None => Vec::new(),
        }
    }

    pub fn all(&self, channel_id: &str) -> Vec<&ChatMessage> {
        match self.channels.get(channel_id) {
            Some(buf) => buf.iter().collect(),
            None => Vec::new(),
        }
    }

    pub fn clear_channel(&mut self, channel_id: &str) {
        self.channels.remove(channel_id);
    }

    pub fn clear_all(&mut self) {
        self.channels.clear();
    }

    /// Total number of stored messages across all channels.
    pub fn total_messages(&self) -> usize {
        self.channels.values().map(|b| b.len()).sum()
    }
}

impl Default for MessageCache {
    fn default() -> Self {
        Self::new(MessageCacheConfig::default())
    }
}
