//! Subscription registry: one live transport channel per channel key.
//!
//! Consumers subscribe with a `SubscriptionConfig` and a callback and get
//! back the channel key. A second subscribe for the same key is a no-op.
//! Dropped channels are reopened with bounded exponential backoff; once
//! the retries are spent the key is removed and the `on_lost` hook fires.

mod handle;
mod supervisor;


use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::backoff::ReconnectPolicy;
use crate::error::{RealtimeError, TransportError};
use crate::feed::{ChangeFeed, FeedChannel, StatusListener};
use crate::key::{channel_key, ChannelKey};
use crate::subscription::{RowChange, SubscriptionConfig};

pub use handle::{RetryState, SubscriptionId, SubscriptionState};

use handle::SubscriptionHandle;
use supervisor::{supervise, Report};

pub type ChangeCallback = Arc<dyn Fn(RowChange) + Send + Sync>;

/// Called once when a subscription is dropped for good.
pub type LostHook = Arc<dyn Fn(&ChannelKey, &RealtimeError) + Send + Sync>;

pub(crate) struct RegistryInner {
    feed: Arc<dyn ChangeFeed>,
    policy: ReconnectPolicy,
    handles: Mutex<HashMap<ChannelKey, SubscriptionHandle>>,
    reports: mpsc::UnboundedSender<Report>,
    on_lost: RwLock<Option<LostHook>>,
    generation: AtomicU64,
}

impl RegistryInner {
    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Open a transport channel whose statuses are reported under `generation`.
    ///
    /// Called without the handles lock: the feed may wait on a full queue.
    async fn open_channel(
        &self,
        key: &ChannelKey,
        config: &SubscriptionConfig,
        callback: &ChangeCallback,
        generation: u64,
    ) -> Result<Box<dyn FeedChannel>, TransportError> {
        let reports = self.reports.clone();
        let status_key = key.clone();
        let status: StatusListener = Arc::new(move |status| {
            let _ = reports.send(Report::Status {
                key: status_key.clone(),
                generation,
                status,
            });
        });
        self.feed
            .open(key.as_str(), config, Arc::clone(callback), status)
            .await
    }

    /// Open a channel for `generation` and attach it to the handle.
    ///
    /// If the handle was removed or moved to a newer generation while the
    /// open was in flight, the fresh channel is closed instead.
    async fn open_and_install(
        &self,
        key: &ChannelKey,
        config: &SubscriptionConfig,
        callback: &ChangeCallback,
        generation: u64,
    ) -> bool {
        let channel = match self.open_channel(key, config, callback, generation).await {
            Ok(channel) => channel,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to open channel, handing to retry");
                let _ = self.reports.send(Report::Status {
                    key: key.clone(),
                    generation,
                    status: e.into(),
                });
                return false;
            }
        };

        let stale = {
            let mut handles = self.handles.lock().await;
            match handles.get_mut(key) {
                Some(handle) if handle.generation == generation => {
                    handle.channel = Some(channel);
                    None
                }
                _ => Some(channel),
            }
        };
        match stale {
            Some(channel) => {
                debug!(key = %key, "subscription changed while opening, closing new channel");
                channel.close().await;
                false
            }
            None => true,
        }
    }

    fn notify_lost(&self, key: &ChannelKey, err: RealtimeError) {
        let hook = match self.on_lost.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if let Some(hook) = hook {
            hook(key, &err);
        }
    }
}

/// Handle to the registry. Cheap to clone; all clones share one map.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    inner: Arc<RegistryInner>,
}

impl SubscriptionRegistry {
    /// Create a registry over `feed` and start its supervisor task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(feed: Arc<dyn ChangeFeed>, policy: ReconnectPolicy) -> Self {
        let (reports, reports_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(RegistryInner {
            feed,
            policy,
            handles: Mutex::new(HashMap::new()),
            reports,
            on_lost: RwLock::new(None),
            generation: AtomicU64::new(0),
        });
        tokio::spawn(supervise(Arc::downgrade(&inner), reports_rx));
        Self { inner }
    }

    /// Register the hook fired when a subscription exhausts its retries.
    pub fn on_lost<F>(&self, hook: F)
    where
        F: Fn(&ChannelKey, &RealtimeError) + Send + Sync + 'static,
    {
        let hook: LostHook = Arc::new(hook);
        match self.inner.on_lost.write() {
            Ok(mut guard) => *guard = Some(hook),
            Err(poisoned) => *poisoned.into_inner() = Some(hook),
        }
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.inner.policy
    }

    /// Subscribe `callback` to the changes described by `config`.
    ///
    /// Returns the channel key. If the key is already active the existing
    /// subscription is kept and `callback` is not attached. The transport
    /// join completes asynchronously; a failure to open goes through the
    /// retry path rather than being returned.
    pub async fn subscribe<F>(&self, config: SubscriptionConfig, callback: F) -> ChannelKey
    where
        F: Fn(RowChange) + Send + Sync + 'static,
    {
        match self.start(config, Arc::new(callback)).await {
            Ok((key, _)) => key,
            Err(key) => {
                warn!(key = %key, "already subscribed, reusing existing channel");
                key
            }
        }
    }

    /// Like `subscribe`, but fails instead of sharing an active key.
    ///
    /// The returned id identifies this subscription for `holds` and
    /// `unsubscribe_held`, so the caller never touches a key someone else
    /// took over after this subscription was lost.
    pub async fn subscribe_exclusive<F>(
        &self,
        config: SubscriptionConfig,
        callback: F,
    ) -> Result<(ChannelKey, SubscriptionId), RealtimeError>
    where
        F: Fn(RowChange) + Send + Sync + 'static,
    {
        self.start(config, Arc::new(callback))
            .await
            .map_err(|key| RealtimeError::KeyInUse { key })
    }

    /// Register a handle for `config` and open its channel.
    ///
    /// The handle is inserted before the open so the lock is not held while
    /// the feed works. Returns the existing key when one is active.
    async fn start(
        &self,
        config: SubscriptionConfig,
        callback: ChangeCallback,
    ) -> Result<(ChannelKey, SubscriptionId), ChannelKey> {
        let key = channel_key(&config);
        let generation = self.inner.next_generation();
        let id = SubscriptionId(generation);
        let trace_id = parley_common::new_correlation_id();
        {
            let mut handles = self.inner.handles.lock().await;
            if handles.contains_key(&key) {
                return Err(key);
            }
            handles.insert(
                key.clone(),
                SubscriptionHandle {
                    config: config.clone(),
                    callback: Arc::clone(&callback),
                    channel: None,
                    retry: RetryState::default(),
                    state: SubscriptionState::Connecting,
                    generation,
                    id,
                    retry_ticket: None,
                    trace_id: trace_id.clone(),
                },
            );
        }

        if self
            .inner
            .open_and_install(&key, &config, &callback, generation)
            .await
        {
            info!(key = %key, trace = %trace_id, "subscription opened");
        }
        Ok((key, id))
    }

    /// Close and forget the subscription for `key`. No-op if absent.
    pub async fn unsubscribe(&self, key: &ChannelKey) {
        let removed = self.inner.handles.lock().await.remove(key);
        if let Some(handle) = removed {
            if let Some(channel) = handle.channel {
                channel.close().await;
            }
            debug!(key = %key, trace = %handle.trace_id, "unsubscribed");
        }
    }

    /// Unsubscribe every active key.
    pub async fn unsubscribe_all(&self) {
        let drained: Vec<(ChannelKey, SubscriptionHandle)> =
            self.inner.handles.lock().await.drain().collect();
        for (key, handle) in drained {
            if let Some(channel) = handle.channel {
                channel.close().await;
            }
            debug!(key = %key, "unsubscribed");
        }
    }

    /// Close `key` only if it still belongs to subscription `id`.
    pub async fn unsubscribe_held(&self, key: &ChannelKey, id: SubscriptionId) {
        let removed = {
            let mut handles = self.inner.handles.lock().await;
            match handles.get(key) {
                Some(handle) if handle.id == id => handles.remove(key),
                _ => None,
            }
        };
        if let Some(handle) = removed {
            if let Some(channel) = handle.channel {
                channel.close().await;
            }
            debug!(key = %key, trace = %handle.trace_id, "unsubscribed");
        }
    }

    /// Whether `key` is active and still owned by subscription `id`.
    pub async fn holds(&self, key: &ChannelKey, id: SubscriptionId) -> bool {
        self.inner
            .handles
            .lock()
            .await
            .get(key)
            .is_some_and(|h| h.id == id)
    }

    pub async fn list_active_keys(&self) -> HashSet<ChannelKey> {
        self.inner.handles.lock().await.keys().cloned().collect()
    }

    pub async fn is_active(&self, key: &ChannelKey) -> bool {
        self.inner.handles.lock().await.contains_key(key)
    }

    pub async fn state(&self, key: &ChannelKey) -> Option<SubscriptionState> {
        self.inner.handles.lock().await.get(key).map(|h| h.state)
    }

    pub async fn retry_state(&self, key: &ChannelKey) -> Option<RetryState> {
        self.inner.handles.lock().await.get(key).map(|h| h.retry)
    }
}
