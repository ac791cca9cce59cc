use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::TransportError;
use crate::feed::{ChangeFeed, ChangeListener, ChannelStatus, FeedChannel, StatusListener};
use crate::subscription::{RowChange, SubscriptionConfig};

/// Most recent opens kept by [`MemoryFeed::opens`].
pub const OPEN_LOG_LIMIT: usize = 256;

/// One `open` call, in order.
#[derive(Debug, Clone)]
pub struct OpenRecord {
    pub topic: String,
    pub at: Instant,
}

struct Binding {
    topic: String,
    config: SubscriptionConfig,
    listener: ChangeListener,
    status: StatusListener,
}

#[derive(Default)]
struct FeedState {
    bindings: HashMap<u64, Binding>,
    next_id: u64,
    open_total: usize,
    opens: VecDeque<OpenRecord>,
}

/// Change feed that filters and delivers locally.
#[derive(Clone)]
pub struct MemoryFeed {
    state: Arc<Mutex<FeedState>>,
    auto_subscribe: bool,
}

impl Default for MemoryFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFeed {
    /// A feed that reports `Subscribed` as soon as a channel opens.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FeedState::default())),
            auto_subscribe: true,
        }
    }

    /// A feed that reports nothing until told to via [`set_status`](Self::set_status).
    pub fn manual() -> Self {
        Self {
            auto_subscribe: false,
            ..Self::new()
        }
    }

    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Deliver `change` to every open channel that accepts it.
    /// Returns the number of deliveries.
    pub fn emit(&self, change: RowChange) -> usize {
        let listeners: Vec<ChangeListener> = self
            .lock()
            .bindings
            .values()
            .filter(|b| b.config.accepts(&change))
            .map(|b| Arc::clone(&b.listener))
            .collect();
        for listener in &listeners {
            listener(change.clone());
        }
        listeners.len()
    }

    /// Report `status` on every open channel named `topic`.
    pub fn set_status(&self, topic: &str, status: ChannelStatus) -> usize {
        let targets: Vec<StatusListener> = self
            .lock()
            .bindings
            .values()
            .filter(|b| b.topic == topic)
            .map(|b| Arc::clone(&b.status))
            .collect();
        for target in &targets {
            target(status.clone());
        }
        targets.len()
    }

    /// Report `Closed` on every open channel, as a dropped socket would.
    pub fn drop_all(&self) -> usize {
        let targets: Vec<StatusListener> = self
            .lock()
            .bindings
            .values()
            .map(|b| Arc::clone(&b.status))
            .collect();
        for target in &targets {
            target(ChannelStatus::Closed);
        }
        targets.len()
    }

    /// Total `open` calls so far.
    pub fn open_count(&self) -> usize {
        self.lock().open_total
    }

    /// The last [`OPEN_LOG_LIMIT`] opens, oldest first.
    pub fn opens(&self) -> Vec<OpenRecord> {
        self.lock().opens.iter().cloned().collect()
    }

    /// Channels currently open.
    pub fn live_channels(&self) -> usize {
        self.lock().bindings.len()
    }
}

#[async_trait]
impl ChangeFeed for MemoryFeed {
    async fn open(
        &self,
        topic: &str,
        config: &SubscriptionConfig,
        listener: ChangeListener,
        status: StatusListener,
    ) -> Result<Box<dyn FeedChannel>, TransportError> {
        let id = {
            let mut state = self.lock();
            state.next_id += 1;
            let id = state.next_id;
            state.bindings.insert(
                id,
                Binding {
                    topic: topic.to_string(),
                    config: config.clone(),
                    listener,
                    status: Arc::clone(&status),
                },
            );
            state.open_total += 1;
            if state.opens.len() == OPEN_LOG_LIMIT {
                state.opens.pop_front();
            }
            state.opens.push_back(OpenRecord {
                topic: topic.to_string(),
                at: Instant::now(),
            });
            id
        };
        if self.auto_subscribe {
            status(ChannelStatus::Subscribed);
        }
        Ok(Box::new(MemoryChannel {
            id,
            topic: topic.to_string(),
            state: Arc::clone(&self.state),
        }))
    }
}

struct MemoryChannel {
    id: u64,
    topic: String,
    state: Arc<Mutex<FeedState>>,
}

#[async_trait]
impl FeedChannel for MemoryChannel {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.bindings.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::RowFilter;
    use crate::subscription::{ChangeEvent, ChangeKind};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_listener() -> (ChangeListener, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (
            Arc::new(move |_: RowChange| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
            count,
        )
    }

    fn noop_status() -> StatusListener {
        Arc::new(|_: ChannelStatus| {})
    }

    #[tokio::test]
    async fn delivers_only_matching_changes() {
        let feed = MemoryFeed::new();
        let config = SubscriptionConfig::new("messages")
            .unwrap()
            .with_event(ChangeEvent::Insert)
            .with_filter(RowFilter::eq("channel_id", "C1").unwrap());
        let (listener, count) = counting_listener();
        let _channel = feed.open("t", &config, listener, noop_status()).await.unwrap();

        feed.emit(RowChange::new("messages", ChangeKind::Insert, json!({"channel_id": "C1"})));
        feed.emit(RowChange::new("messages", ChangeKind::Insert, json!({"channel_id": "C2"})));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn closed_channel_stops_delivery() {
        let feed = MemoryFeed::new();
        let config = SubscriptionConfig::new("messages").unwrap();
        let (listener, count) = counting_listener();
        let channel = feed.open("t", &config, listener, noop_status()).await.unwrap();
        assert_eq!(feed.live_channels(), 1);

        channel.close().await;
        assert_eq!(feed.live_channels(), 0);
        assert_eq!(
            feed.emit(RowChange::new("messages", ChangeKind::Insert, json!({}))),
            0
        );
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn auto_subscribe_reports_on_open() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let status: StatusListener = Arc::new(move |s: ChannelStatus| sink.lock().unwrap().push(s));
        let (listener, _) = counting_listener();
        let config = SubscriptionConfig::new("messages").unwrap();

        let feed = MemoryFeed::new();
        let _a = feed.open("a", &config, Arc::clone(&listener), Arc::clone(&status)).await.unwrap();
        let manual = MemoryFeed::manual();
        let _b = manual.open("b", &config, listener, Arc::clone(&status)).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![ChannelStatus::Subscribed]);
        assert_eq!(manual.set_status("b", ChannelStatus::TimedOut), 1);
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(manual.open_count(), 1);
    }

    #[tokio::test]
    async fn open_log_is_bounded() {
        let feed = MemoryFeed::new();
        let config = SubscriptionConfig::new("messages").unwrap();
        for i in 0..OPEN_LOG_LIMIT + 10 {
            let (listener, _) = counting_listener();
            let channel = feed
                .open(&format!("t{i}"), &config, listener, noop_status())
                .await
                .unwrap();
            channel.close().await;
        }

        assert_eq!(feed.open_count(), OPEN_LOG_LIMIT + 10);
        let opens = feed.opens();
        assert_eq!(opens.len(), OPEN_LOG_LIMIT);
        assert_eq!(opens[0].topic, "t10");
        assert_eq!(feed.live_channels(), 0);
    }
}
