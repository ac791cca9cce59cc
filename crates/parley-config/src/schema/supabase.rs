//! Hosted backend connection settings.

use serde::{Deserialize, Serialize};

/// Connection settings for the Supabase project backing the chat.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SupabaseConfig {
    /// Project URL (e.g., "https://ojmqzagktzkualzgpcbq.supabase.co").
    pub url: String,
    /// Supabase anon key (publishable).
    pub anon_key: String,
    /// Optional access token (JWT) for authenticated requests.
    pub access_token: Option<String>,
    /// User id of the signed-in session, if any.
    pub user_id: Option<String>,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("anon_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("user_id", &self.user_id)
            .finish()
    }
}

impl SupabaseConfig {
    /// Whether enough is set to talk to a real project.
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty() && !self.anon_key.is_empty()
    }

    fn base(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// WebSocket URL for the realtime endpoint.
    pub fn realtime_url(&self) -> String {
        let base = self.base();
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!(
            "{ws_base}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            self.anon_key
        )
    }

    /// Base URL of the PostgREST endpoint.
    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.base())
    }
}
