//! Wires config into the realtime layer.

use std::sync::Arc;
use std::time::Duration;

use parley_common::ParleyError;
use parley_config::ParleyConfig;
use parley_realtime::{
    AuthUser, ChangeFeed, ChannelKey, MemoryFeed, MemoryStore, PresenceCoordinator,
    PresenceOptions, PresenceStatus, ReconnectPolicy, RestStore, RowStore, SessionAuth,
    SubscriptionRegistry, SupabaseFeed, SupabaseFeedConfig,
};
use tokio::sync::mpsc;
use tracing::{error, info};

/// User id assumed in offline mode when the config names none.
const OFFLINE_USER: &str = "local-user";

pub struct Backend {
    pub registry: SubscriptionRegistry,
    pub presence: PresenceCoordinator,
    pub store: Arc<dyn RowStore>,
    pub auth: SessionAuth,
    supabase: Option<SupabaseFeed>,
    lost: mpsc::UnboundedReceiver<ChannelKey>,
}

impl Backend {
    pub async fn build(config: &ParleyConfig, offline: bool) -> Result<Self, ParleyError> {
        let auth = SessionAuth::new();
        let feed: Arc<dyn ChangeFeed>;
        let store: Arc<dyn RowStore>;
        let mut supabase = None;
        if offline {
            let memory = MemoryFeed::new();
            store = Arc::new(MemoryStore::with_feed(memory.clone()));
            feed = Arc::new(memory);
            let user = config.supabase.user_id.as_deref().unwrap_or(OFFLINE_USER);
            auth.sign_in(AuthUser::new(user)).await;
            info!(user_id = user, "Using in-process backends");
        } else {
            if !config.supabase.is_configured() {
                return Err(ParleyError::Other(
                    "supabase.url and supabase.anon_key are not set (or pass --offline)".into(),
                ));
            }
            if let Some(user) = &config.supabase.user_id {
                let token = config.supabase.access_token.clone();
                auth.sign_in(AuthUser {
                    id: user.clone(),
                    email: None,
                    access_token: token,
                })
                .await;
            }
            let hosted = SupabaseFeed::connect(SupabaseFeedConfig {
                url: config.supabase.realtime_url(),
                access_token: config.supabase.access_token.clone(),
                heartbeat_interval_secs: config.realtime.heartbeat_interval_secs,
                join_timeout_secs: config.realtime.join_timeout_secs,
                reconnect_delay_secs: config.realtime.reconnect_delay_secs,
                max_reconnect_delay_secs: config.realtime.max_reconnect_delay_secs,
                ..SupabaseFeedConfig::default()
            });
            let rest = RestStore::new(config.supabase.rest_url(), &config.supabase.anon_key)
                .map_err(|e| ParleyError::Store(e.to_string()))?
                .with_auth(Arc::new(auth.clone()));
            info!(url = %config.supabase.url, "Using hosted backend");
            feed = Arc::new(hosted.clone());
            store = Arc::new(rest);
            supabase = Some(hosted);
        }

        let policy = ReconnectPolicy::new(
            config.realtime.max_retries,
            Duration::from_millis(config.realtime.base_delay_ms),
        );
        let registry = SubscriptionRegistry::new(feed, policy);
        let (lost_tx, lost) = mpsc::unbounded_channel();
        registry.on_lost(move |key, err| {
            error!(key = %key, error = %err, "Giving up on subscription");
            let _ = lost_tx.send(key.clone());
        });

        let options = PresenceOptions {
            table: config.presence.table.clone(),
            initial_status: config.presence.initial_status.parse::<PresenceStatus>()?,
        };
        let presence = PresenceCoordinator::new(
            registry.clone(),
            Arc::clone(&store),
            Arc::new(auth.clone()),
            options,
        );

        Ok(Self {
            registry,
            presence,
            store,
            auth,
            supabase,
            lost,
        })
    }

    /// Resolves when a subscription has exhausted its retries.
    pub async fn next_lost(&mut self) -> Option<ChannelKey> {
        self.lost.recv().await
    }

    /// Go offline if presence was started, then drop every subscription.
    pub async fn shutdown(&self) -> Result<(), ParleyError> {
        let presence = if self.presence.is_initialized() {
            self.presence.cleanup().await.map_err(ParleyError::from)
        } else {
            Ok(())
        };
        self.registry.unsubscribe_all().await;
        if let Some(feed) = &self.supabase {
            feed.disconnect().await;
        }
        info!("Shut down");
        presence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_realtime::AuthProvider;

    #[tokio::test]
    async fn offline_backend_signs_in_local_user() {
        let backend = Backend::build(&ParleyConfig::default(), true).await.unwrap();
        let user = backend.auth.current_user().await.unwrap();
        assert_eq!(user.id, OFFLINE_USER);
    }

    #[tokio::test]
    async fn online_backend_requires_project() {
        let result = Backend::build(&ParleyConfig::default(), false).await;
        assert!(matches!(result, Err(ParleyError::Other(_))));
    }

    #[tokio::test]
    async fn shutdown_after_presence_goes_offline() {
        let backend = Backend::build(&ParleyConfig::default(), true).await.unwrap();
        backend.presence.initialize(OFFLINE_USER).await.unwrap();
        backend.shutdown().await.unwrap();
        assert!(!backend.presence.is_initialized());
        assert!(backend.registry.list_active_keys().await.is_empty());
    }
}
