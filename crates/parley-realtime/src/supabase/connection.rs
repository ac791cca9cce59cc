//! Background WebSocket connection loop with auto-reconnect.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use super::handler::{close_all, handle_phoenix_message};
use super::types::{Bindings, PhoenixMessage, RealtimeCommand, SupabaseFeedConfig};

// ---------------------------------------------------------------------------
// Ref Counter
// ---------------------------------------------------------------------------

/// Monotonically increasing ref counter for Phoenix messages.
static REF_COUNTER: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_ref() -> String {
    REF_COUNTER.fetch_add(1, Ordering::Relaxed).to_string()
}

async fn send_message<S>(writer: &Mutex<S>, msg: &PhoenixMessage) -> bool
where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let Ok(json) = serde_json::to_string(msg) else {
        return false;
    };
    writer
        .lock()
        .await
        .send(WsMessage::Text(json.into()))
        .await
        .is_ok()
}

// ---------------------------------------------------------------------------
// Connection Loop
// ---------------------------------------------------------------------------

/// Background task owning the socket until `shutdown` is set.
pub(crate) async fn connection_loop(
    config: SupabaseFeedConfig,
    connected: Arc<RwLock<bool>>,
    shutdown: Arc<AtomicBool>,
    bindings: Bindings,
    command_rx: mpsc::Receiver<RealtimeCommand>,
) {
    let command_rx = Arc::new(Mutex::new(command_rx));
    let mut reconnect_delay = config.reconnect_delay_secs;
    let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
    let endpoint = config.url.split('?').next().unwrap_or("").to_string();

    while !shutdown.load(Ordering::SeqCst) {
        info!(url = %endpoint, "Connecting to Supabase Realtime");

        match tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(&config.url))
            .await
        {
            Ok(Ok((ws_stream, _))) => {
                reconnect_delay = config.reconnect_delay_secs;
                *connected.write().await = true;
                info!(url = %endpoint, "Connected to Supabase Realtime");

                let (ws_write, ws_read) = ws_stream.split();
                let ws_write = Arc::new(Mutex::new(ws_write));

                let heartbeat_handle = tokio::spawn(heartbeat_task(
                    Arc::clone(&ws_write),
                    config.heartbeat_interval_secs,
                ));
                let cmd_handle = tokio::spawn(command_forwarder(
                    Arc::clone(&command_rx),
                    Arc::clone(&ws_write),
                    Arc::clone(&bindings),
                    Arc::clone(&shutdown),
                ));

                let mut read_stream = ws_read;
                while let Some(msg_result) = read_stream.next().await {
                    match msg_result {
                        Ok(WsMessage::Text(text)) => {
                            match serde_json::from_str::<PhoenixMessage>(&text) {
                                Ok(msg) => handle_phoenix_message(&msg, &bindings).await,
                                Err(_) => debug!(text = %text, "Unrecognized message from Supabase"),
                            }
                        }
                        Ok(WsMessage::Close(_)) => {
                            info!("Supabase Realtime closed connection");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "WebSocket error");
                            break;
                        }
                        _ => {}
                    }
                }

                heartbeat_handle.abort();
                cmd_handle.abort();
                *connected.write().await = false;
                close_all(&bindings).await;
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect to Supabase Realtime");
                close_all(&bindings).await;
            }
            Err(_elapsed) => {
                error!(
                    timeout_secs = config.connect_timeout_secs,
                    "WebSocket connection timed out"
                );
                close_all(&bindings).await;
            }
        }

        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        info!(delay_secs = reconnect_delay, "Reconnecting to Supabase Realtime");
        tokio::time::sleep(Duration::from_secs(reconnect_delay)).await;
        reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay_secs);
    }
    info!("Supabase Realtime connection stopped");
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

async fn heartbeat_task<S>(ws_write: Arc<Mutex<S>>, interval_secs: u64)
where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    loop {
        interval.tick().await;
        let msg = PhoenixMessage::new("phoenix", "heartbeat", serde_json::json!({}), next_ref());
        if !send_message(&ws_write, &msg).await {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Command Forwarder
// ---------------------------------------------------------------------------

async fn command_forwarder<S>(
    cmd_rx: Arc<Mutex<mpsc::Receiver<RealtimeCommand>>>,
    cmd_write: Arc<Mutex<S>>,
    bindings: Bindings,
    shutdown: Arc<AtomicBool>,
) where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let mut rx = cmd_rx.lock().await;
    while let Some(cmd) = rx.recv().await {
        match cmd {
            RealtimeCommand::Join {
                topic,
                join_ref,
                payload,
            } => {
                // Joins queued while offline may belong to bindings that
                // have since timed out or been closed.
                let live = bindings
                    .read()
                    .await
                    .get(&topic)
                    .is_some_and(|b| b.join_ref == join_ref);
                if !live {
                    debug!(topic = %topic, "Skipping join for released binding");
                    continue;
                }
                let msg = PhoenixMessage::new(topic.as_str(), "phx_join", payload, join_ref);
                debug!(topic = %topic, "Joining channel");
                send_message(&cmd_write, &msg).await;
            }
            RealtimeCommand::Leave { topic } => {
                let msg = PhoenixMessage::new(topic.as_str(), "phx_leave", serde_json::json!({}), next_ref());
                debug!(topic = %topic, "Leaving channel");
                send_message(&cmd_write, &msg).await;
            }
            RealtimeCommand::Disconnect => {
                shutdown.store(true, Ordering::SeqCst);
                let topics: Vec<String> = bindings.write().await.drain().map(|(t, _)| t).collect();
                for topic in topics {
                    let msg = PhoenixMessage::new(topic, "phx_leave", serde_json::json!({}), next_ref());
                    send_message(&cmd_write, &msg).await;
                }
                let _ = cmd_write.lock().await.send(WsMessage::Close(None)).await;
                return;
            }
        }
    }
}
