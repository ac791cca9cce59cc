use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::filter::RowFilter;
use crate::store::RowStore;
use crate::subscription::{ChangeKind, RowChange};

use super::MemoryFeed;

/// Row store held in memory, keyed by table.
///
/// When linked to a [`MemoryFeed`], every successful upsert is published
/// as an INSERT or UPDATE change.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<HashMap<String, Vec<Value>>>>,
    feed: Option<MemoryFeed>,
    upserts: Arc<AtomicUsize>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed(feed: MemoryFeed) -> Self {
        Self {
            feed: Some(feed),
            ..Self::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Value>>> {
        self.tables.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Snapshot of every row in `table`.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.lock().get(table).cloned().unwrap_or_default()
    }

    /// Number of upserts attempted, failed ones included.
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    /// Make every following write fail until switched back.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

fn same_key(existing: &Value, row: &Value, columns: &[&str]) -> bool {
    !columns.is_empty()
        && columns
            .iter()
            .all(|c| existing.get(c).is_some() && existing.get(c) == row.get(c))
}

#[async_trait]
impl RowStore for MemoryStore {
    async fn upsert(&self, table: &str, row: Value, on_conflict: &str) -> Result<(), StoreError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Request(format!("write to {table} rejected")));
        }
        let Value::Object(fields) = &row else {
            return Err(StoreError::Decode(format!(
                "row for {table} must be a JSON object"
            )));
        };

        let columns: Vec<&str> = on_conflict
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect();

        let change = {
            let mut tables = self.lock();
            let rows = tables.entry(table.to_string()).or_default();
            match rows.iter_mut().find(|r| same_key(r, &row, &columns)) {
                Some(existing) => {
                    let old = existing.clone();
                    if let Value::Object(target) = &mut *existing {
                        for (k, v) in fields {
                            target.insert(k.clone(), v.clone());
                        }
                    }
                    RowChange::new(table, ChangeKind::Update, existing.clone()).with_old_record(old)
                }
                None => {
                    rows.push(row.clone());
                    RowChange::new(table, ChangeKind::Insert, row.clone())
                }
            }
        };

        if let Some(feed) = &self.feed {
            feed.emit(change);
        }
        Ok(())
    }

    async fn select(&self, table: &str, filter: Option<&RowFilter>) -> Result<Vec<Value>, StoreError> {
        let rows = self.rows(table);
        Ok(match filter {
            Some(filter) => rows.into_iter().filter(|r| filter.matches(r)).collect(),
            None => rows,
        })
    }
}
