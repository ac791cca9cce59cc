//! Public handle implementing [`ChangeFeed`] over the realtime socket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::feed::{ChangeFeed, ChangeListener, ChannelStatus, FeedChannel, StatusListener};
use crate::subscription::SubscriptionConfig;

use super::connection::{connection_loop, next_ref};
use super::types::{
    join_payload, phoenix_topic, Binding, Bindings, RealtimeCommand, SupabaseFeedConfig,
};

/// Change feed backed by Supabase Realtime.
///
/// All methods are non-blocking and send commands to the background
/// connection task.
#[derive(Clone)]
pub struct SupabaseFeed {
    command_tx: mpsc::Sender<RealtimeCommand>,
    connected: Arc<RwLock<bool>>,
    shutdown: Arc<AtomicBool>,
    bindings: Bindings,
    config: SupabaseFeedConfig,
}

impl SupabaseFeed {
    /// Create the feed and start the background connection.
    pub fn connect(config: SupabaseFeedConfig) -> Self {
        let (feed, command_rx) = Self::detached(config);
        tokio::spawn(connection_loop(
            feed.config.clone(),
            Arc::clone(&feed.connected),
            Arc::clone(&feed.shutdown),
            Arc::clone(&feed.bindings),
            command_rx,
        ));
        feed
    }

    /// The feed without its connection task; the caller owns the command queue.
    pub(crate) fn detached(config: SupabaseFeedConfig) -> (Self, mpsc::Receiver<RealtimeCommand>) {
        let (command_tx, command_rx) = mpsc::channel(64);
        let feed = Self {
            command_tx,
            connected: Arc::new(RwLock::new(false)),
            shutdown: Arc::new(AtomicBool::new(false)),
            bindings: Arc::new(RwLock::new(Default::default())),
            config,
        };
        (feed, command_rx)
    }

    /// Check if the socket is connected.
    pub async fn is_connected(&self) -> bool {
        *self.connected.read().await
    }

    /// Leave every channel and stop reconnecting.
    pub async fn disconnect(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.command_tx.send(RealtimeCommand::Disconnect).await;
    }

    fn spawn_join_timer(&self, topic: String, join_ref: String) {
        let bindings = Arc::clone(&self.bindings);
        let command_tx = self.command_tx.clone();
        let timeout = self.config.join_timeout();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let expired = {
                let mut bindings = bindings.write().await;
                let pending = bindings
                    .get(&topic)
                    .is_some_and(|b| b.join_ref == join_ref && !b.joined);
                if pending {
                    bindings.remove(&topic)
                } else {
                    None
                }
            };
            if let Some(binding) = expired {
                warn!(topic = %topic, timeout_secs = timeout.as_secs(), "Channel join timed out");
                let _ = command_tx.send(RealtimeCommand::Leave { topic }).await;
                (binding.status)(ChannelStatus::TimedOut);
            }
        });
    }
}

#[async_trait]
impl ChangeFeed for SupabaseFeed {
    async fn open(
        &self,
        topic: &str,
        config: &SubscriptionConfig,
        listener: ChangeListener,
        status: StatusListener,
    ) -> Result<Box<dyn FeedChannel>, TransportError> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(TransportError::Connection("realtime feed disconnected".into()));
        }
        let wire_topic = phoenix_topic(topic);
        let join_ref = next_ref();
        let payload = join_payload(config, self.config.access_token.as_deref());

        self.bindings.write().await.insert(
            wire_topic.clone(),
            Binding {
                join_ref: join_ref.clone(),
                config: config.clone(),
                listener,
                status,
                joined: false,
            },
        );

        let sent = self
            .command_tx
            .send(RealtimeCommand::Join {
                topic: wire_topic.clone(),
                join_ref: join_ref.clone(),
                payload,
            })
            .await;
        if sent.is_err() {
            self.bindings.write().await.remove(&wire_topic);
            return Err(TransportError::Connection("realtime connection task stopped".into()));
        }

        self.spawn_join_timer(wire_topic.clone(), join_ref.clone());
        debug!(topic = %wire_topic, join_ref = %join_ref, "Join requested");

        Ok(Box::new(SupabaseChannel {
            topic: topic.to_string(),
            wire_topic,
            join_ref,
            bindings: Arc::clone(&self.bindings),
            command_tx: self.command_tx.clone(),
        }))
    }
}

/// One joined topic. Closing releases the binding and leaves the topic.
struct SupabaseChannel {
    topic: String,
    wire_topic: String,
    join_ref: String,
    bindings: Bindings,
    command_tx: mpsc::Sender<RealtimeCommand>,
}

#[async_trait]
impl FeedChannel for SupabaseChannel {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn close(&self) {
        let released = {
            let mut bindings = self.bindings.write().await;
            let ours = bindings
                .get(&self.wire_topic)
                .is_some_and(|b| b.join_ref == self.join_ref);
            ours && bindings.remove(&self.wire_topic).is_some()
        };
        // After a socket drop or timeout there is nothing left to leave.
        if released {
            let _ = self
                .command_tx
                .send(RealtimeCommand::Leave {
                    topic: self.wire_topic.clone(),
                })
                .await;
        }
    }
}
