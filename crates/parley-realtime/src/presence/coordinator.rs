use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use crate::auth::AuthProvider;
use crate::error::RealtimeError;
use crate::filter::RowFilter;
use crate::key::ChannelKey;
use crate::registry::{SubscriptionId, SubscriptionRegistry};
use crate::store::RowStore;
use crate::subscription::{ChangeKind, RowChange, SubscriptionConfig};

use super::types::{PresenceOptions, PresenceRow, PresenceStatus};

pub type StatusCallback = Arc<dyn Fn(PresenceRow) + Send + Sync>;

/// One registry subscription per watched user, shared by its observers.
struct UserWatch {
    key: ChannelKey,
    subscription: SubscriptionId,
    observers: HashMap<u64, StatusCallback>,
}

struct CoordinatorInner {
    registry: SubscriptionRegistry,
    store: Arc<dyn RowStore>,
    auth: Arc<dyn AuthProvider>,
    options: PresenceOptions,
    /// Held for the whole of `initialize` so concurrent calls write once.
    init_lock: AsyncMutex<()>,
    initialized: AtomicBool,
    /// Serializes registry subscribe/unsubscribe for watches.
    watch_lock: AsyncMutex<()>,
    watches: Mutex<HashMap<String, UserWatch>>,
    next_observer: AtomicU64,
    self_observer: Mutex<Option<StatusObserver>>,
    updates: broadcast::Sender<PresenceRow>,
}

impl CoordinatorInner {
    fn watches(&self) -> MutexGuard<'_, HashMap<String, UserWatch>> {
        self.watches.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Deliver one presence change to every observer of its user.
    fn fan_out(&self, user_id: &str, change: RowChange) {
        let mut row: PresenceRow = match serde_json::from_value(change.row().clone()) {
            Ok(row) => row,
            Err(e) => {
                warn!(user_id, error = %e, "Unreadable presence row");
                return;
            }
        };
        if change.kind == ChangeKind::Delete {
            row.status = PresenceStatus::Offline;
        }

        let callbacks: Vec<StatusCallback> = self
            .watches()
            .get(user_id)
            .map(|w| w.observers.values().cloned().collect())
            .unwrap_or_default();
        debug!(user_id, status = %row.status, observers = callbacks.len(), "Presence changed");
        for callback in &callbacks {
            callback(row.clone());
        }
        let _ = self.updates.send(row);
    }

    async fn release(&self, user_id: &str, observer: u64) {
        let _guard = self.watch_lock.lock().await;
        let emptied = {
            let mut watches = self.watches();
            let Some(watch) = watches.get_mut(user_id) else {
                return;
            };
            watch.observers.remove(&observer);
            if watch.observers.is_empty() {
                watches.remove(user_id).map(|w| (w.key, w.subscription))
            } else {
                None
            }
        };
        if let Some((key, subscription)) = emptied {
            self.registry.unsubscribe_held(&key, subscription).await;
            debug!(user_id, key = %key, "Last observer gone, presence watch closed");
        }
    }

    async fn write_status(&self, user_id: &str, status: PresenceStatus) -> Result<(), RealtimeError> {
        let row = serde_json::json!({
            "user_id": user_id,
            "status": status.as_str(),
            "last_seen": chrono::Utc::now().to_rfc3339(),
        });
        self.store.upsert(&self.options.table, row, "user_id").await?;
        info!(user_id, status = %status, "Presence status written");
        Ok(())
    }
}

/// Handle for one status observer. Disposing it is idempotent.
pub struct StatusObserver {
    id: u64,
    user_id: String,
    coordinator: Weak<CoordinatorInner>,
    disposed: AtomicBool,
}

impl StatusObserver {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Stop receiving updates. Closes the user's channel with the last observer.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(inner) = self.coordinator.upgrade() {
            inner.release(&self.user_id, self.id).await;
        }
    }
}

/// Owns the local user's presence row and multiplexes presence feeds.
///
/// Built once at startup and shared by cloning.
#[derive(Clone)]
pub struct PresenceCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl PresenceCoordinator {
    pub fn new(
        registry: SubscriptionRegistry,
        store: Arc<dyn RowStore>,
        auth: Arc<dyn AuthProvider>,
        options: PresenceOptions,
    ) -> Self {
        let (updates, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(CoordinatorInner {
                registry,
                store,
                auth,
                options,
                init_lock: AsyncMutex::new(()),
                initialized: AtomicBool::new(false),
                watch_lock: AsyncMutex::new(()),
                watches: Mutex::new(HashMap::new()),
                next_observer: AtomicU64::new(1),
                self_observer: Mutex::new(None),
                updates,
            }),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    /// Every presence change seen by any observer, including the local user's.
    pub fn updates(&self) -> broadcast::Receiver<PresenceRow> {
        self.inner.updates.subscribe()
    }

    /// Write the initial status for `user_id` and watch its own row.
    ///
    /// Idempotent: later calls return immediately once one has succeeded.
    pub async fn initialize(&self, user_id: &str) -> Result<(), RealtimeError> {
        let _guard = self.inner.init_lock.lock().await;
        if self.is_initialized() {
            debug!(user_id, "Presence already initialized");
            return Ok(());
        }

        self.inner
            .write_status(user_id, self.inner.options.initial_status)
            .await?;

        let own_id = user_id.to_string();
        let observer = self
            .subscribe_to_user_status(user_id, move |row| {
                debug!(user_id = %own_id, status = %row.status, "Own presence confirmed");
            })
            .await?;
        *self
            .inner
            .self_observer
            .lock()
            .unwrap_or_else(|p| p.into_inner()) = Some(observer);

        self.inner.initialized.store(true, Ordering::SeqCst);
        info!(user_id, "Presence initialized");
        Ok(())
    }

    /// Persist `status` for whoever is signed in right now.
    pub async fn update_status(&self, status: PresenceStatus) -> Result<(), RealtimeError> {
        let Some(user) = self.inner.auth.current_user().await else {
            warn!(status = %status, "Presence update without a signed-in user");
            return Err(RealtimeError::Authentication);
        };
        self.inner.write_status(&user.id, status).await
    }

    /// Call `callback` with every change to `user_id`'s presence row.
    pub async fn subscribe_to_user_status<F>(
        &self,
        user_id: &str,
        callback: F,
    ) -> Result<StatusObserver, RealtimeError>
    where
        F: Fn(PresenceRow) + Send + Sync + 'static,
    {
        let config = SubscriptionConfig::new(self.inner.options.table.as_str())?
            .with_filter(RowFilter::eq("user_id", user_id)?);
        let id = self.inner.next_observer.fetch_add(1, Ordering::Relaxed);
        let callback: StatusCallback = Arc::new(callback);

        let _guard = self.inner.watch_lock.lock().await;
        let current = self
            .inner
            .watches()
            .get(user_id)
            .map(|w| (w.key.clone(), w.subscription));
        let live = match &current {
            Some((key, subscription)) => self.inner.registry.holds(key, *subscription).await,
            None => false,
        };

        if !live {
            // Either the first observer, or the registry dropped the old
            // subscription after its retries ran out.
            let weak = Arc::downgrade(&self.inner);
            let watched = user_id.to_string();
            let (key, subscription) = self
                .inner
                .registry
                .subscribe_exclusive(config, move |change| {
                    if let Some(inner) = weak.upgrade() {
                        inner.fan_out(&watched, change);
                    }
                })
                .await?;
            if current.is_some() {
                info!(user_id, key = %key, "Presence watch was lost, resubscribed");
            }
            let mut watches = self.inner.watches();
            let watch = watches
                .entry(user_id.to_string())
                .or_insert_with(|| UserWatch {
                    key: key.clone(),
                    subscription,
                    observers: HashMap::new(),
                });
            watch.key = key;
            watch.subscription = subscription;
        }

        if let Some(watch) = self.inner.watches().get_mut(user_id) {
            watch.observers.insert(id, callback);
        }
        debug!(user_id, observer = id, "Presence observer added");

        Ok(StatusObserver {
            id,
            user_id: user_id.to_string(),
            coordinator: Arc::downgrade(&self.inner),
            disposed: AtomicBool::new(false),
        })
    }

    /// Go offline, drop every observer, and allow `initialize` again.
    ///
    /// Observers and state are released even when the offline write fails;
    /// the write's error is returned afterwards.
    pub async fn cleanup(&self) -> Result<(), RealtimeError> {
        let _init = self.inner.init_lock.lock().await;
        let written = self.update_status(PresenceStatus::Offline).await;

        let keys: Vec<(ChannelKey, SubscriptionId)> = {
            let _guard = self.inner.watch_lock.lock().await;
            self.inner
                .watches()
                .drain()
                .map(|(_, w)| (w.key, w.subscription))
                .collect()
        };
        for (key, subscription) in &keys {
            self.inner.registry.unsubscribe_held(key, *subscription).await;
        }
        let self_observer = self
            .inner
            .self_observer
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(observer) = self_observer {
            observer.disposed.store(true, Ordering::SeqCst);
        }
        self.inner.initialized.store(false, Ordering::SeqCst);
        info!(watches = keys.len(), "Presence cleaned up");

        written
    }
}
