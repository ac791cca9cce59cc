//! Subscription coordinates and the change payload delivered to consumers.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RealtimeError;
use crate::filter::{is_identifier, RowFilter};

/// Schema used when a subscription does not name one.
pub const DEFAULT_SCHEMA: &str = "public";

/// Which row events a subscription listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeEvent {
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
    #[serde(rename = "*")]
    All,
}

impl ChangeEvent {
    /// Event name as the change feed expects it.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::All => "*",
        }
    }

    pub fn accepts(&self, kind: ChangeKind) -> bool {
        matches!(
            (*self, kind),
            (Self::All, _)
                | (Self::Insert, ChangeKind::Insert)
                | (Self::Update, ChangeKind::Update)
                | (Self::Delete, ChangeKind::Delete)
        )
    }
}

impl FromStr for ChangeEvent {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "insert" => Ok(Self::Insert),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "*" | "all" | "any" => Ok(Self::All),
            other => Err(RealtimeError::Configuration(format!(
                "unknown change event {other:?}"
            ))),
        }
    }
}

/// The kind of a single delivered row change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Logical coordinates of one change-feed subscription.
///
/// Immutable once built; the registry derives the channel key from it and
/// reuses it verbatim on every resubscribe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionConfig {
    event: ChangeEvent,
    schema: String,
    table: String,
    filter: Option<RowFilter>,
}

impl SubscriptionConfig {
    /// All events on `public.<table>`.
    pub fn new(table: impl Into<String>) -> Result<Self, RealtimeError> {
        let table = table.into();
        if !is_identifier(&table) {
            return Err(RealtimeError::Configuration(format!(
                "table {table:?} is not a valid identifier"
            )));
        }
        Ok(Self {
            event: ChangeEvent::All,
            schema: DEFAULT_SCHEMA.to_string(),
            table,
            filter: None,
        })
    }

    pub fn with_event(mut self, event: ChangeEvent) -> Self {
        self.event = event;
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Result<Self, RealtimeError> {
        let schema = schema.into();
        if !is_identifier(&schema) {
            return Err(RealtimeError::Configuration(format!(
                "schema {schema:?} is not a valid identifier"
            )));
        }
        self.schema = schema;
        Ok(self)
    }

    pub fn with_filter(mut self, filter: RowFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn event(&self) -> ChangeEvent {
        self.event
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn filter(&self) -> Option<&RowFilter> {
        self.filter.as_ref()
    }

    /// Whether a delivered change falls inside this subscription.
    ///
    /// Deletes are matched against the old row, everything else against
    /// the new one.
    pub fn accepts(&self, change: &RowChange) -> bool {
        if change.schema != self.schema || change.table != self.table {
            return false;
        }
        if !self.event.accepts(change.kind) {
            return false;
        }
        match &self.filter {
            Some(filter) => filter.matches(change.row()),
            None => true,
        }
    }

    /// One entry of the `postgres_changes` join payload.
    pub(crate) fn to_postgres_changes(&self) -> serde_json::Value {
        let mut entry = serde_json::json!({
            "event": self.event.as_wire(),
            "schema": self.schema,
            "table": self.table,
        });
        if let Some(filter) = &self.filter {
            entry["filter"] = serde_json::Value::String(filter.to_string());
        }
        entry
    }
}

/// A row-level change delivered by the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    pub schema: String,
    pub table: String,
    #[serde(rename = "type", alias = "eventType")]
    pub kind: ChangeKind,
    #[serde(default)]
    pub record: serde_json::Value,
    #[serde(default)]
    pub old_record: serde_json::Value,
    #[serde(default)]
    pub commit_timestamp: Option<String>,
}

impl RowChange {
    pub fn new(table: impl Into<String>, kind: ChangeKind, record: serde_json::Value) -> Self {
        Self {
            schema: DEFAULT_SCHEMA.to_string(),
            table: table.into(),
            kind,
            record,
            old_record: serde_json::Value::Null,
            commit_timestamp: None,
        }
    }

    pub fn with_old_record(mut self, old: serde_json::Value) -> Self {
        self.old_record = old;
        self
    }

    /// The row the change is about: the old row for deletes.
    pub fn row(&self) -> &serde_json::Value {
        match self.kind {
            ChangeKind::Delete if !self.old_record.is_null() => &self.old_record,
            _ => &self.record,
        }
    }
}
