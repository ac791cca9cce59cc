//! Row store seam used for presence, typing, and refetches.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::filter::RowFilter;

/// Row mutation and query access to the backing store.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Insert `row`, or merge it into the row whose `on_conflict` columns
    /// (comma separated) match.
    async fn upsert(
        &self,
        table: &str,
        row: serde_json::Value,
        on_conflict: &str,
    ) -> Result<(), StoreError>;

    /// All rows of `table` matching `filter`.
    async fn select(
        &self,
        table: &str,
        filter: Option<&RowFilter>,
    ) -> Result<Vec<serde_json::Value>, StoreError>;
}
