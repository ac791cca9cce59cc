use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use super::*;
use crate::auth::{AuthUser, SessionAuth};
use crate::backoff::ReconnectPolicy;
use crate::error::RealtimeError;
use crate::feed::ChannelStatus;
use crate::feeds;
use crate::memory::{MemoryFeed, MemoryStore};
use crate::registry::SubscriptionRegistry;
use crate::store::RowStore;
use crate::subscription::{ChangeKind, RowChange};

struct Harness {
    feed: MemoryFeed,
    store: MemoryStore,
    auth: SessionAuth,
    registry: SubscriptionRegistry,
    presence: PresenceCoordinator,
}

fn harness(user: Option<&str>) -> Harness {
    harness_with_policy(user, ReconnectPolicy::default())
}

fn harness_with_policy(user: Option<&str>, policy: ReconnectPolicy) -> Harness {
    let feed = MemoryFeed::new();
    let store = MemoryStore::with_feed(feed.clone());
    let auth = match user {
        Some(id) => SessionAuth::with_user(AuthUser::new(id)),
        None => SessionAuth::new(),
    };
    let registry = SubscriptionRegistry::new(Arc::new(feed.clone()), policy);
    let presence = PresenceCoordinator::new(
        registry.clone(),
        Arc::new(store.clone()),
        Arc::new(auth.clone()),
        PresenceOptions::default(),
    );
    Harness {
        feed,
        store,
        auth,
        registry,
        presence,
    }
}

fn status_of(store: &MemoryStore, user_id: &str) -> Option<String> {
    store
        .rows(DEFAULT_PRESENCE_TABLE)
        .into_iter()
        .find(|r| r["user_id"] == user_id)
        .and_then(|r| r["status"].as_str().map(str::to_string))
}

fn collector() -> (
    impl Fn(PresenceRow) + Send + Sync + 'static,
    Arc<Mutex<Vec<PresenceStatus>>>,
) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (move |row: PresenceRow| sink.lock().unwrap().push(row.status), seen)
}

#[tokio::test]
async fn initialize_then_cleanup_goes_offline_without_leaks() {
    let h = harness(Some("u1"));

    h.presence.initialize("u1").await.unwrap();
    assert!(h.presence.is_initialized());
    assert_eq!(status_of(&h.store, "u1").as_deref(), Some("online"));
    assert_eq!(h.registry.list_active_keys().await.len(), 1);

    h.presence.cleanup().await.unwrap();
    assert!(!h.presence.is_initialized());
    assert_eq!(status_of(&h.store, "u1").as_deref(), Some("offline"));
    assert!(h.registry.list_active_keys().await.is_empty());
    assert_eq!(h.feed.live_channels(), 0);
}

#[tokio::test]
async fn initialize_is_idempotent() {
    let h = harness(Some("u1"));

    let (a, b) = tokio::join!(h.presence.initialize("u1"), h.presence.initialize("u1"));
    a.unwrap();
    b.unwrap();
    h.presence.initialize("u1").await.unwrap();

    assert_eq!(h.store.upsert_count(), 1);
    assert_eq!(h.feed.open_count(), 1);
}

#[tokio::test]
async fn update_status_without_user_is_rejected() {
    let h = harness(None);

    let result = h.presence.update_status(PresenceStatus::Idle).await;

    assert!(matches!(result, Err(RealtimeError::Authentication)));
    assert_eq!(h.store.upsert_count(), 0);
}

#[tokio::test]
async fn update_status_resolves_user_at_call_time() {
    let h = harness(None);
    h.auth.sign_in(AuthUser::new("u7")).await;

    h.presence.update_status(PresenceStatus::Dnd).await.unwrap();
    assert_eq!(status_of(&h.store, "u7").as_deref(), Some("dnd"));

    h.auth.sign_out().await;
    assert!(h.presence.update_status(PresenceStatus::Idle).await.is_err());
    assert_eq!(status_of(&h.store, "u7").as_deref(), Some("dnd"));
}

#[tokio::test]
async fn store_failures_surface() {
    let h = harness(Some("u1"));
    h.store.fail_writes(true);

    let result = h.presence.update_status(PresenceStatus::Idle).await;
    assert!(matches!(result, Err(RealtimeError::Store(_))));
}

#[tokio::test]
async fn cleanup_without_session_still_releases_everything() {
    let h = harness(None);
    h.presence.initialize("u1").await.unwrap();
    let (callback, _) = collector();
    let _observer = h.presence.subscribe_to_user_status("u2", callback).await.unwrap();

    let result = h.presence.cleanup().await;

    assert!(matches!(result, Err(RealtimeError::Authentication)));
    assert!(!h.presence.is_initialized());
    assert!(h.registry.list_active_keys().await.is_empty());
}

#[tokio::test]
async fn observers_share_one_channel_per_user() {
    let h = harness(Some("u1"));
    let (first, first_seen) = collector();
    let (second, second_seen) = collector();

    let a = h.presence.subscribe_to_user_status("u2", first).await.unwrap();
    let b = h.presence.subscribe_to_user_status("u2", second).await.unwrap();
    assert_eq!(h.feed.open_count(), 1);

    h.store
        .upsert(DEFAULT_PRESENCE_TABLE, json!({"user_id": "u2", "status": "idle"}), "user_id")
        .await
        .unwrap();
    h.store
        .upsert(DEFAULT_PRESENCE_TABLE, json!({"user_id": "u3", "status": "dnd"}), "user_id")
        .await
        .unwrap();
    assert_eq!(*first_seen.lock().unwrap(), vec![PresenceStatus::Idle]);
    assert_eq!(*second_seen.lock().unwrap(), vec![PresenceStatus::Idle]);

    a.dispose().await;
    a.dispose().await;
    assert_eq!(h.registry.list_active_keys().await.len(), 1);

    h.store
        .upsert(DEFAULT_PRESENCE_TABLE, json!({"user_id": "u2", "status": "online"}), "user_id")
        .await
        .unwrap();
    assert_eq!(first_seen.lock().unwrap().len(), 1);
    assert_eq!(second_seen.lock().unwrap().len(), 2);

    b.dispose().await;
    assert!(h.registry.list_active_keys().await.is_empty());
}

#[tokio::test]
async fn deleted_row_reads_as_offline() {
    let h = harness(Some("u1"));
    let (callback, seen) = collector();
    let _observer = h.presence.subscribe_to_user_status("u2", callback).await.unwrap();

    h.feed.emit(
        RowChange::new(DEFAULT_PRESENCE_TABLE, ChangeKind::Delete, serde_json::Value::Null)
            .with_old_record(json!({"user_id": "u2", "status": "online"})),
    );

    assert_eq!(*seen.lock().unwrap(), vec![PresenceStatus::Offline]);
}

#[tokio::test]
async fn updates_bus_carries_own_status() {
    let h = harness(Some("u1"));
    let mut updates = h.presence.updates();

    h.presence.initialize("u1").await.unwrap();
    h.presence.update_status(PresenceStatus::Idle).await.unwrap();

    // Initialize writes before it watches, so only the later write is seen.
    let row = updates.recv().await.unwrap();
    assert_eq!(row.user_id, "u1");
    assert_eq!(row.status, PresenceStatus::Idle);
}

async fn set_presence(store: &MemoryStore, user_id: &str, status: &str) {
    store
        .upsert(DEFAULT_PRESENCE_TABLE, json!({"user_id": user_id, "status": status}), "user_id")
        .await
        .unwrap();
}

#[tokio::test]
async fn watch_is_rebuilt_after_its_subscription_is_lost() {
    let h = harness_with_policy(Some("u1"), ReconnectPolicy::new(0, Duration::from_millis(10)));
    let (first, first_seen) = collector();
    let _a = h.presence.subscribe_to_user_status("u2", first).await.unwrap();
    let key = h.registry.list_active_keys().await.into_iter().next().unwrap();

    h.feed.set_status(key.as_str(), ChannelStatus::Closed);
    for _ in 0..100 {
        if !h.registry.is_active(&key).await {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(!h.registry.is_active(&key).await);

    let (second, second_seen) = collector();
    let _b = h.presence.subscribe_to_user_status("u2", second).await.unwrap();
    assert!(h.registry.is_active(&key).await);
    assert_eq!(h.feed.open_count(), 2);

    set_presence(&h.store, "u2", "idle").await;
    assert_eq!(*second_seen.lock().unwrap(), vec![PresenceStatus::Idle]);
    // Observers of the lost watch are carried over.
    assert_eq!(*first_seen.lock().unwrap(), vec![PresenceStatus::Idle]);
}

#[tokio::test]
async fn foreign_subscription_on_the_same_key_is_left_alone() {
    let h = harness(Some("u1"));
    let direct_seen = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&direct_seen);
    let direct = h
        .registry
        .subscribe(feeds::user_presence("u2").unwrap(), move |_| {
            *sink.lock().unwrap() += 1;
        })
        .await;

    let (callback, _) = collector();
    let result = h.presence.subscribe_to_user_status("u2", callback).await;
    assert!(matches!(result, Err(RealtimeError::KeyInUse { ref key }) if *key == direct));

    // A later cleanup does not close the other subscriber's channel.
    h.presence.cleanup().await.unwrap();
    assert!(h.registry.is_active(&direct).await);

    set_presence(&h.store, "u2", "dnd").await;
    assert_eq!(*direct_seen.lock().unwrap(), 1);
}
