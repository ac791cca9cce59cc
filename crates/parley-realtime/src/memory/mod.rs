//! In-process backends.
//!
//! `MemoryFeed` and `MemoryStore` behave like the hosted change feed and
//! row store, including change publication on upsert when linked. They
//! back the app's offline mode and the test suites.

mod feed;
mod store;

pub use feed::{MemoryFeed, OpenRecord, OPEN_LOG_LIMIT};
pub use store::MemoryStore;
