//! Subcommand bodies. Each runs until Ctrl-C or until its subscription
//! is lost for good.

use parley_common::ParleyError;
use parley_realtime::feeds::{self, ChatMessage};
use parley_realtime::{
    AuthProvider, ChangeEvent, ChangeKind, MessageCache, PresenceStatus, RowChange, RowFilter,
    SubscriptionConfig,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::backend::Backend;
use crate::cli::Command;

pub async fn run(command: Command, backend: &mut Backend) -> Result<(), ParleyError> {
    match command {
        Command::Watch {
            table,
            event,
            filter,
            schema,
        } => {
            let config = watch_config(&table, &event, filter.as_deref(), schema.as_deref())?;
            watch(config, backend).await
        }
        Command::Presence { status, watch } => presence(status.as_deref(), &watch, backend).await,
        Command::Tail { channel, limit } => tail(&channel, limit, backend).await,
    }
}

fn watch_config(
    table: &str,
    event: &str,
    filter: Option<&str>,
    schema: Option<&str>,
) -> Result<SubscriptionConfig, ParleyError> {
    let mut config = SubscriptionConfig::new(table)?.with_event(event.parse::<ChangeEvent>()?);
    if let Some(schema) = schema {
        config = config.with_schema(schema)?;
    }
    if let Some(filter) = filter {
        config = config.with_filter(filter.parse::<RowFilter>()?);
    }
    Ok(config)
}

/// Wait for Ctrl-C or a lost subscription.
async fn wait_for_exit(backend: &mut Backend) -> Result<(), ParleyError> {
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Interrupted, cleaning up");
            Ok(())
        }
        Some(key) = backend.next_lost() => {
            Err(ParleyError::Realtime(format!("subscription {key} lost")))
        }
    }
}

async fn watch(config: SubscriptionConfig, backend: &mut Backend) -> Result<(), ParleyError> {
    let key = backend
        .registry
        .subscribe(config, |change: RowChange| match serde_json::to_string(&change) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "Unprintable change"),
        })
        .await;
    info!(key = %key, "Watching");
    wait_for_exit(backend).await
}

async fn presence(
    status: Option<&str>,
    watch: &[String],
    backend: &mut Backend,
) -> Result<(), ParleyError> {
    let user = backend
        .auth
        .current_user()
        .await
        .ok_or_else(|| ParleyError::Auth("set supabase.user_id to go online".into()))?;

    backend.presence.initialize(&user.id).await?;
    if let Some(status) = status {
        backend
            .presence
            .update_status(status.parse::<PresenceStatus>()?)
            .await?;
    }
    let mut observers = Vec::with_capacity(watch.len());
    for user_id in watch {
        let observer = backend
            .presence
            .subscribe_to_user_status(user_id, |row| {
                println!("{} {}", row.user_id, row.status);
            })
            .await?;
        observers.push(observer);
    }
    info!(user_id = %user.id, watching = observers.len(), "Presence running");
    let exit = wait_for_exit(backend).await;
    for observer in &observers {
        observer.dispose().await;
    }
    exit
}

fn message_line(msg: &ChatMessage) -> String {
    let at = msg.created_at.as_deref().unwrap_or("-");
    format!("[{at}] {}: {}", msg.user_id, msg.content)
}

/// The line `tail` prints for a change: the row that changed, not the newest.
fn change_line(change: &RowChange) -> Option<String> {
    match change.kind {
        ChangeKind::Delete => {
            let id = change.row().get("id")?;
            let id = id.as_str().map(str::to_string).unwrap_or_else(|| id.to_string());
            Some(format!("(message {id} deleted)"))
        }
        kind => {
            let msg: ChatMessage = serde_json::from_value(change.record.clone()).ok()?;
            let edited = if kind == ChangeKind::Update { " (edited)" } else { "" };
            Some(format!("{}{edited}", message_line(&msg)))
        }
    }
}

async fn tail(channel: &str, limit: usize, backend: &mut Backend) -> Result<(), ParleyError> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let key = backend
        .registry
        .subscribe(feeds::messages_in_channel(channel)?, move |change| {
            let _ = tx.send(change);
        })
        .await;

    // The stream carries no backlog, so start from a full fetch.
    let mut cache = MessageCache::default();
    cache.refetch(backend.store.as_ref(), channel).await?;
    for msg in cache.recent(channel, limit) {
        println!("{}", message_line(msg));
    }
    info!(key = %key, channel, "Tailing");

    loop {
        tokio::select! {
            Some(change) = rx.recv() => {
                if cache.apply(&change) {
                    if let Some(line) = change_line(&change) {
                        println!("{line}");
                    }
                }
            }
            exit = wait_for_exit(backend) => return exit,
        }
    }
}
