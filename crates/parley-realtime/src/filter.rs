//! Structured row filters.
//!
//! A filter is validated when it is built and only turned into the
//! transport's `column=op.value` string at the wire boundary.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::RealtimeError;

fn identifier_regex() -> &'static Regex {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"))
}

fn filter_regex() -> &'static Regex {
    static FILTER: OnceLock<Regex> = OnceLock::new();
    FILTER.get_or_init(|| {
        Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)=(eq|neq|lt|lte|gt|gte|in)\.(.+)$")
            .expect("static regex")
    })
}

/// Whether `value` is a plain SQL identifier (schema, table, column).
pub(crate) fn is_identifier(value: &str) -> bool {
    identifier_regex().is_match(value)
}

/// Comparison operator supported by the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::In => "in",
        }
    }
}

impl FromStr for FilterOp {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" => Ok(Self::Eq),
            "neq" => Ok(Self::Neq),
            "lt" => Ok(Self::Lt),
            "lte" => Ok(Self::Lte),
            "gt" => Ok(Self::Gt),
            "gte" => Ok(Self::Gte),
            "in" => Ok(Self::In),
            other => Err(RealtimeError::Configuration(format!(
                "unknown filter operator {other:?}"
            ))),
        }
    }
}

/// A `(column, operator, value)` row filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowFilter {
    column: String,
    op: FilterOp,
    value: String,
}

impl RowFilter {
    pub fn new(
        column: impl Into<String>,
        op: FilterOp,
        value: impl Into<String>,
    ) -> Result<Self, RealtimeError> {
        let column = column.into();
        let value = value.into();
        if !is_identifier(&column) {
            return Err(RealtimeError::Configuration(format!(
                "filter column {column:?} is not a valid identifier"
            )));
        }
        if value.is_empty() {
            return Err(RealtimeError::Configuration(format!(
                "filter on {column:?} has an empty value"
            )));
        }
        Ok(Self { column, op, value })
    }

    /// `column = value`.
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Result<Self, RealtimeError> {
        Self::new(column, FilterOp::Eq, value)
    }

    /// `column in (values...)`.
    ///
    /// Members holding list syntax (`,`, `(`, `)`, `"`, `\`) or edge
    /// whitespace are double-quoted the way PostgREST reads them.
    pub fn one_of<I, S>(column: impl Into<String>, values: I) -> Result<Self, RealtimeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let items: Vec<String> = values.into_iter().map(|v| quote_member(v.as_ref())).collect();
        if items.is_empty() {
            return Err(RealtimeError::Configuration(
                "`in` filter needs at least one value".into(),
            ));
        }
        Self::new(column, FilterOp::In, format!("({})", items.join(",")))
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn op(&self) -> FilterOp {
        self.op
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// The `op.value` half of the wire form, as used in REST query strings.
    pub fn wire_value(&self) -> String {
        format!("{}.{}", self.op.as_str(), self.value)
    }

    /// Evaluate the filter against a JSON row. Missing columns never match.
    pub fn matches(&self, record: &serde_json::Value) -> bool {
        let Some(field) = record.get(&self.column).and_then(scalar_text) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => field == self.value,
            FilterOp::Neq => field != self.value,
            FilterOp::Lt => compare(&field, &self.value) == Ordering::Less,
            FilterOp::Lte => compare(&field, &self.value) != Ordering::Greater,
            FilterOp::Gt => compare(&field, &self.value) == Ordering::Greater,
            FilterOp::Gte => compare(&field, &self.value) != Ordering::Less,
            FilterOp::In => in_list(&self.value).iter().any(|item| *item == field),
        }
    }
}

impl fmt::Display for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}.{}", self.column, self.op.as_str(), self.value)
    }
}

impl FromStr for RowFilter {
    type Err = RealtimeError;

    /// Parse the wire form `column=op.value`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = filter_regex().captures(s).ok_or_else(|| {
            RealtimeError::Configuration(format!("filter {s:?} is not of the form column=op.value"))
        })?;
        Self::new(&caps[1], caps[2].parse()?, &caps[3])
    }
}

fn scalar_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Null => Some("null".to_string()),
        _ => None,
    }
}

/// Numeric comparison when both sides parse as numbers, text otherwise.
fn compare(left: &str, right: &str) -> Ordering {
    match (left.parse::<f64>(), right.parse::<f64>()) {
        (Ok(l), Ok(r)) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
        _ => left.cmp(right),
    }
}

fn quote_member(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value != value.trim()
        || value.contains([',', '(', ')', '"', '\\']);
    if !needs_quotes {
        return value.to_string();
    }
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Split an `(a,"b,c",d)` list into its members, undoing quoting.
fn in_list(raw: &str) -> Vec<String> {
    let inner = raw.trim();
    let inner = inner.strip_prefix('(').unwrap_or(inner);
    let inner = inner.strip_suffix(')').unwrap_or(inner);

    let mut members = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' if in_quotes => current.extend(chars.next()),
            '"' => {
                in_quotes = !in_quotes;
                quoted = true;
            }
            ',' if !in_quotes => {
                members.push(finish_member(&mut current, quoted));
                quoted = false;
            }
            c => current.push(c),
        }
    }
    members.push(finish_member(&mut current, quoted));
    members
}

fn finish_member(current: &mut String, quoted: bool) -> String {
    let member = std::mem::take(current);
    if quoted {
        member
    } else {
        member.trim().to_string()
    }
}
