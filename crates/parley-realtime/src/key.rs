//! Canonical channel keys.
//!
//! A key is a fixed-arity, `:`-delimited encoding of
//! `(schema, table, event, filter-or-"all")`. Backslashes and colons inside
//! a field are escaped, so distinct configs can never encode to the same
//! string. A structured filter always contains `=`, so it can never be
//! confused with the literal `all`.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::subscription::SubscriptionConfig;

const DELIMITER: char = ':';
const NO_FILTER: &str = "all";

/// Stable identifier of one logical subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelKey(String);

impl ChannelKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChannelKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive the channel key for a subscription config.
pub fn channel_key(config: &SubscriptionConfig) -> ChannelKey {
    let filter = config
        .filter()
        .map(|f| f.to_string())
        .unwrap_or_else(|| NO_FILTER.to_string());
    let fields = [
        escape(config.schema()),
        escape(config.table()),
        escape(config.event().as_wire()),
        escape(&filter),
    ];
    ChannelKey(fields.join(&DELIMITER.to_string()))
}

fn escape(field: &str) -> Cow<'_, str> {
    if !field.contains(['\\', DELIMITER]) {
        return Cow::Borrowed(field);
    }
    let mut out = String::with_capacity(field.len() + 4);
    for c in field.chars() {
        if c == '\\' || c == DELIMITER {
            out.push('\\');
        }
        out.push(c);
    }
    Cow::Owned(out)
}
