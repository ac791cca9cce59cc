use serde::{Deserialize, Serialize};

/// Presence persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceSettings {
    /// Table holding one status row per user.
    pub table: String,
    /// Status written by `initialize` (online, idle, dnd).
    pub initial_status: String,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            table: "user_presence".into(),
            initial_status: "online".into(),
        }
    }
}
