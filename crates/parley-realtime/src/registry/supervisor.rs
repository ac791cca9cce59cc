//! Serialized handling of channel statuses and retry timers.
//!
//! Transport callbacks and backoff timers never touch handles directly.
//! They post a `Report` to the supervisor task, which applies it under the
//! registry lock. Every report carries the generation of the channel it
//! concerns, so a report for a disposed or replaced channel is dropped.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::RealtimeError;
use crate::feed::ChannelStatus;
use crate::key::ChannelKey;

use super::handle::SubscriptionState;
use super::RegistryInner;

#[derive(Debug)]
pub(crate) enum Report {
    Status {
        key: ChannelKey,
        generation: u64,
        status: ChannelStatus,
    },
    RetryDue {
        key: ChannelKey,
        generation: u64,
        ticket: u64,
    },
}

/// Background task applying reports until the registry is dropped.
pub(crate) async fn supervise(
    inner: Weak<RegistryInner>,
    mut reports: mpsc::UnboundedReceiver<Report>,
) {
    while let Some(report) = reports.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        match report {
            Report::Status {
                key,
                generation,
                status,
            } => on_status(&inner, key, generation, status).await,
            Report::RetryDue {
                key,
                generation,
                ticket,
            } => on_retry_due(&inner, key, generation, ticket).await,
        }
    }
    debug!("subscription supervisor stopped");
}

async fn on_status(
    inner: &Arc<RegistryInner>,
    key: ChannelKey,
    generation: u64,
    status: ChannelStatus,
) {
    let mut handles = inner.handles.lock().await;
    let Some(handle) = handles.get_mut(&key) else {
        debug!(key = %key, ?status, "status for inactive subscription ignored");
        return;
    };
    if handle.generation != generation {
        debug!(key = %key, ?status, "status from a replaced channel ignored");
        return;
    }

    if !status.is_failure() {
        if handle.retry_ticket.take().is_some() {
            debug!(key = %key, "channel recovered, pending resubscribe cancelled");
        }
        handle.retry.reset();
        handle.state = SubscriptionState::Subscribed;
        info!(key = %key, trace = %handle.trace_id, "subscribed");
        return;
    }

    // One channel may report both an error and a close; act on the first.
    if handle.state.is_failed() {
        debug!(key = %key, ?status, "already handling a failure for this channel");
        return;
    }
    handle.state = SubscriptionState::from(&status);

    let attempts = handle.retry.attempts;
    match inner.policy.next_delay(attempts) {
        Some(delay) => {
            handle.retry.attempts += 1;
            warn!(
                key = %key,
                trace = %handle.trace_id,
                ?status,
                attempt = handle.retry.attempts,
                max_retries = inner.policy.max_retries,
                delay_ms = delay.as_millis() as u64,
                "channel dropped, scheduling resubscribe"
            );
            let ticket = inner.next_generation();
            handle.retry_ticket = Some(ticket);
            schedule_retry(inner, key, generation, ticket, delay);
        }
        None => {
            let Some(handle) = handles.remove(&key) else {
                return;
            };
            drop(handles);
            error!(
                key = %key,
                trace = %handle.trace_id,
                ?status,
                attempts,
                "retries exhausted, subscription removed"
            );
            if let Some(channel) = handle.channel {
                channel.close().await;
            }
            inner.notify_lost(&key, RealtimeError::RetryExhausted {
                key: key.clone(),
                attempts,
            });
        }
    }
}

fn schedule_retry(
    inner: &Arc<RegistryInner>,
    key: ChannelKey,
    generation: u64,
    ticket: u64,
    delay: Duration,
) {
    let reports = inner.reports.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = reports.send(Report::RetryDue {
            key,
            generation,
            ticket,
        });
    });
}

async fn on_retry_due(inner: &Arc<RegistryInner>, key: ChannelKey, generation: u64, ticket: u64) {
    let (old, config, callback, next) = {
        let mut handles = inner.handles.lock().await;
        // A disposed key must never go back to Connecting.
        let Some(handle) = handles.get_mut(&key) else {
            debug!(key = %key, "retry for unsubscribed key skipped");
            return;
        };
        if handle.generation != generation {
            debug!(key = %key, "retry for a replaced channel skipped");
            return;
        }
        if handle.retry_ticket != Some(ticket) {
            debug!(key = %key, "retry cancelled by recovery");
            return;
        }

        let next = inner.next_generation();
        handle.generation = next;
        handle.retry_ticket = None;
        handle.state = SubscriptionState::Connecting;
        info!(
            key = %key,
            trace = %handle.trace_id,
            attempt = handle.retry.attempts,
            "resubscribing"
        );
        (
            handle.channel.take(),
            handle.config.clone(),
            Arc::clone(&handle.callback),
            next,
        )
    };

    if let Some(old) = old {
        old.close().await;
    }
    inner.open_and_install(&key, &config, &callback, next).await;
}
