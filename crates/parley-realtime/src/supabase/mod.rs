//! Supabase Realtime change feed over the Phoenix Channels v1 protocol.
//!
//! One WebSocket carries every channel. Each registry key becomes a
//! `realtime:<key>` topic joined with a single `postgres_changes` binding.
//! The socket reconnects on its own; channels do not. A dropped socket
//! reports `Closed` on every bound channel and the registry decides
//! whether to rejoin.

mod client;
mod connection;
mod handler;
mod types;

pub use client::SupabaseFeed;
pub use types::{PhoenixMessage, SupabaseFeedConfig};
