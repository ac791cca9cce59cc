//! Presence status, row shape, and coordinator options.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RealtimeError;

pub const DEFAULT_PRESENCE_TABLE: &str = "user_presence";

/// Status stored in a presence row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    #[default]
    Online,
    Offline,
    Idle,
    Dnd,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Idle => "idle",
            Self::Dnd => "dnd",
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresenceStatus {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            "idle" | "away" => Ok(Self::Idle),
            "dnd" => Ok(Self::Dnd),
            other => Err(RealtimeError::Configuration(format!(
                "unknown presence status {other:?}"
            ))),
        }
    }
}

/// One user's presence row, as stored and as delivered to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRow {
    pub user_id: String,
    pub status: PresenceStatus,
    #[serde(default)]
    pub last_seen: Option<String>,
}

/// Where presence rows live and what `initialize` writes.
#[derive(Debug, Clone)]
pub struct PresenceOptions {
    pub table: String,
    pub initial_status: PresenceStatus,
}

impl Default for PresenceOptions {
    fn default() -> Self {
        Self {
            table: DEFAULT_PRESENCE_TABLE.to_string(),
            initial_status: PresenceStatus::Online,
        }
    }
}
