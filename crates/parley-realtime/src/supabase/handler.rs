//! Incoming Phoenix message routing.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::feed::{ChangeListener, ChannelStatus, StatusListener};
use crate::subscription::RowChange;

use super::types::{Bindings, PhoenixMessage};

enum Dispatch {
    Change(ChangeListener, RowChange),
    Status(StatusListener, ChannelStatus),
}

fn reason(payload: &serde_json::Value, fallback: &str) -> String {
    payload
        .get("response")
        .and_then(|r| r.get("reason"))
        .or_else(|| payload.get("reason"))
        .or_else(|| payload.get("message"))
        .and_then(|r| r.as_str())
        .unwrap_or(fallback)
        .to_string()
}

/// Handle a single incoming Phoenix message.
///
/// Replies, closes, and errors are matched against the binding's join ref
/// so that messages for an earlier join of the same topic are dropped.
/// Listeners run after the bindings lock is released.
pub(crate) async fn handle_phoenix_message(msg: &PhoenixMessage, bindings: &Bindings) {
    let dispatch = {
        let mut bindings = bindings.write().await;
        let Some(binding) = bindings.get_mut(&msg.topic) else {
            debug!(topic = %msg.topic, event = %msg.event, "Message for unknown topic");
            return;
        };
        let current = msg.reply_ref() == Some(binding.join_ref.as_str());

        match msg.event.as_str() {
            "phx_reply" => {
                if !current {
                    // Leave acks and replies to an older join.
                    return;
                }
                let status = msg.payload.get("status").and_then(|s| s.as_str());
                if status == Some("ok") {
                    binding.joined = true;
                    info!(topic = %msg.topic, "Channel joined");
                    Dispatch::Status(Arc::clone(&binding.status), ChannelStatus::Subscribed)
                } else {
                    let message = reason(&msg.payload, "join rejected");
                    warn!(topic = %msg.topic, reason = %message, "Channel join rejected");
                    Dispatch::Status(Arc::clone(&binding.status), ChannelStatus::Errored(message))
                }
            }
            "phx_close" | "phx_error" if msg.reply_ref().is_some() && !current => {
                debug!(topic = %msg.topic, event = %msg.event, "Stale channel event ignored");
                return;
            }
            "phx_close" => {
                info!(topic = %msg.topic, "Channel closed by server");
                Dispatch::Status(Arc::clone(&binding.status), ChannelStatus::Closed)
            }
            "phx_error" => {
                let message = reason(&msg.payload, "channel error");
                warn!(topic = %msg.topic, reason = %message, "Channel error");
                Dispatch::Status(Arc::clone(&binding.status), ChannelStatus::Errored(message))
            }
            "system" => {
                if msg.payload.get("status").and_then(|s| s.as_str()) != Some("error") {
                    debug!(topic = %msg.topic, payload = %msg.payload, "System message");
                    return;
                }
                let message = reason(&msg.payload, "subscription error");
                warn!(topic = %msg.topic, reason = %message, "Change feed rejected subscription");
                Dispatch::Status(Arc::clone(&binding.status), ChannelStatus::Errored(message))
            }
            "postgres_changes" => {
                let data = msg.payload.get("data").unwrap_or(&msg.payload);
                let change: RowChange = match serde_json::from_value(data.clone()) {
                    Ok(change) => change,
                    Err(e) => {
                        warn!(topic = %msg.topic, error = %e, "Failed to parse postgres change");
                        return;
                    }
                };
                if !binding.config.accepts(&change) {
                    debug!(topic = %msg.topic, "Change outside subscription filter dropped");
                    return;
                }
                Dispatch::Change(Arc::clone(&binding.listener), change)
            }
            _ => {
                debug!(topic = %msg.topic, event = %msg.event, "Unhandled Phoenix event");
                return;
            }
        }
    };

    match dispatch {
        Dispatch::Change(listener, change) => listener(change),
        Dispatch::Status(status, value) => status(value),
    }
}

/// Report `Closed` on every binding and forget them all.
pub(crate) async fn close_all(bindings: &Bindings) {
    let drained: Vec<(String, StatusListener)> = bindings
        .write()
        .await
        .drain()
        .map(|(topic, b)| (topic, b.status))
        .collect();
    for (topic, status) in drained {
        debug!(topic = %topic, "Socket dropped, channel closed");
        status(ChannelStatus::Closed);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use serde_json::json;
    use tokio::sync::RwLock;

    use super::*;
    use crate::filter::RowFilter;
    use crate::subscription::{ChangeEvent, ChangeKind, SubscriptionConfig};
    use crate::supabase::types::Binding;

    const TOPIC: &str = "realtime:public:messages:INSERT:channel_id=eq.C1";

    struct Recorded {
        changes: Arc<Mutex<Vec<RowChange>>>,
        statuses: Arc<Mutex<Vec<ChannelStatus>>>,
    }

    fn bound(join_ref: &str) -> (Bindings, Recorded) {
        let changes = Arc::new(Mutex::new(Vec::new()));
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let change_sink = Arc::clone(&changes);
        let status_sink = Arc::clone(&statuses);
        let config = SubscriptionConfig::new("messages")
            .unwrap()
            .with_event(ChangeEvent::Insert)
            .with_filter(RowFilter::eq("channel_id", "C1").unwrap());

        let mut map = HashMap::new();
        map.insert(
            TOPIC.to_string(),
            Binding {
                join_ref: join_ref.to_string(),
                config,
                listener: Arc::new(move |c: RowChange| change_sink.lock().unwrap().push(c)),
                status: Arc::new(move |s: ChannelStatus| status_sink.lock().unwrap().push(s)),
                joined: false,
            },
        );
        (Arc::new(RwLock::new(map)), Recorded { changes, statuses })
    }

    fn message(event: &str, payload: serde_json::Value, msg_ref: Option<&str>) -> PhoenixMessage {
        PhoenixMessage {
            topic: TOPIC.to_string(),
            event: event.to_string(),
            payload,
            msg_ref: msg_ref.map(str::to_string),
            join_ref: None,
        }
    }

    fn insert(channel: &str) -> serde_json::Value {
        json!({
            "ids": [1],
            "data": {
                "schema": "public",
                "table": "messages",
                "type": "INSERT",
                "commit_timestamp": "2024-01-01T00:00:00Z",
                "columns": [],
                "record": {"id": 9, "channel_id": channel},
                "old_record": null,
                "errors": null
            }
        })
    }

    #[tokio::test]
    async fn join_reply_ok_reports_subscribed() {
        let (bindings, recorded) = bound("5");
        handle_phoenix_message(
            &message("phx_reply", json!({"status": "ok", "response": {}}), Some("5")),
            &bindings,
        )
        .await;
        assert_eq!(*recorded.statuses.lock().unwrap(), vec![ChannelStatus::Subscribed]);
        assert!(bindings.read().await[TOPIC].joined);
    }

    #[tokio::test]
    async fn join_reply_error_reports_reason() {
        let (bindings, recorded) = bound("5");
        let payload = json!({"status": "error", "response": {"reason": "unauthorized"}});
        handle_phoenix_message(&message("phx_reply", payload, Some("5")), &bindings).await;
        assert_eq!(
            *recorded.statuses.lock().unwrap(),
            vec![ChannelStatus::Errored("unauthorized".into())]
        );
    }

    #[tokio::test]
    async fn replies_for_other_refs_are_ignored() {
        let (bindings, recorded) = bound("5");
        handle_phoenix_message(&message("phx_reply", json!({"status": "ok"}), Some("4")), &bindings).await;
        handle_phoenix_message(&message("phx_close", json!({}), Some("4")), &bindings).await;
        assert!(recorded.statuses.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn close_and_error_report_failures() {
        let (bindings, recorded) = bound("5");
        handle_phoenix_message(&message("phx_error", json!({}), Some("5")), &bindings).await;
        handle_phoenix_message(&message("phx_close", json!({}), None), &bindings).await;
        assert_eq!(
            *recorded.statuses.lock().unwrap(),
            vec![ChannelStatus::Errored("channel error".into()), ChannelStatus::Closed]
        );
    }

    #[tokio::test]
    async fn postgres_changes_are_decoded_and_filtered() {
        let (bindings, recorded) = bound("5");
        handle_phoenix_message(&message("postgres_changes", insert("C1"), None), &bindings).await;
        handle_phoenix_message(&message("postgres_changes", insert("C2"), None), &bindings).await;

        let changes = recorded.changes.lock().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Insert);
        assert_eq!(changes[0].record["id"], 9);
        assert_eq!(changes[0].commit_timestamp.as_deref(), Some("2024-01-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn system_error_reports_errored() {
        let (bindings, recorded) = bound("5");
        let ok = json!({"status": "ok", "message": "Subscribed to PostgreSQL"});
        handle_phoenix_message(&message("system", ok, None), &bindings).await;
        let err = json!({"status": "error", "message": "invalid filter"});
        handle_phoenix_message(&message("system", err, None), &bindings).await;
        assert_eq!(
            *recorded.statuses.lock().unwrap(),
            vec![ChannelStatus::Errored("invalid filter".into())]
        );
    }

    #[tokio::test]
    async fn close_all_reports_and_clears() {
        let (bindings, recorded) = bound("5");
        close_all(&bindings).await;
        assert_eq!(*recorded.statuses.lock().unwrap(), vec![ChannelStatus::Closed]);
        assert!(bindings.read().await.is_empty());
    }
}
