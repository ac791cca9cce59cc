//! Realtime subscription and presence layer for Parley.
//!
//! Turns a row-level change feed into deduplicated, reconnect-safe
//! subscriptions keyed by channel, and coordinates the local user's
//! presence on top of them. The hosted backend is reached through the
//! [`ChangeFeed`], [`RowStore`], and [`AuthProvider`] seams; `supabase`
//! and `rest` implement them for Supabase, `memory` in process.

pub mod auth;
pub mod backoff;
pub mod cache;
pub mod error;
pub mod feed;
pub mod feeds;
pub mod filter;
pub mod key;
pub mod memory;
pub mod presence;
pub mod registry;
pub mod rest;
pub mod store;
pub mod subscription;
pub mod supabase;

pub use auth::{AuthProvider, AuthUser, SessionAuth};
pub use backoff::{delay_for, should_retry, ReconnectPolicy};
pub use cache::{MessageCache, MessageCacheConfig};
pub use error::{RealtimeError, StoreError, TransportError};
pub use feed::{ChangeFeed, ChannelStatus, FeedChannel};
pub use feeds::{ChatMessage, TypingNotifier, TypingRow};
pub use filter::{FilterOp, RowFilter};
pub use key::{channel_key, ChannelKey};
pub use memory::{MemoryFeed, MemoryStore};
pub use presence::{PresenceCoordinator, PresenceOptions, PresenceRow, PresenceStatus, StatusObserver};
pub use registry::{RetryState, SubscriptionId, SubscriptionRegistry, SubscriptionState};
pub use rest::RestStore;
pub use store::RowStore;
pub use subscription::{ChangeEvent, ChangeKind, RowChange, SubscriptionConfig};
pub use supabase::{SupabaseFeed, SupabaseFeedConfig};
