//! Wallet feed over JSON-RPC `logsSubscribe`.
//!
//! One subscription per wallet under any subscriber's tracking set. A
//! `currentSubscriptions` map keeps request-id and subscription-id bookkeeping
//! so `refresh()` sends only deltas; the provider has no reliable per-mention
//! unsubscribe, so removed wallets are merely dropped from the map and their
//! notifications are filtered by the fan-out predicate downstream. On open
//! the subscription state is fully reinitialized.

use super::sleep_with_backoff;
use crate::config::FeedConfig;
use crate::pipeline::EventPipeline;
use crate::subscribers::SubscriberStore;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct SubscriptionState {
    /// Wallets currently subscribed (or subscription in flight).
    current: HashSet<String>,
    /// Outstanding request id -> wallet, until the ack arrives.
    pending_requests: HashMap<u64, String>,
    /// Subscription id -> wallet, for routing notifications.
    subscriptions: HashMap<u64, String>,
    next_request_id: u64,
}

pub struct WalletFeed {
    store: Arc<SubscriberStore>,
    pipeline: Arc<EventPipeline>,
    ws_url: String,
    config: FeedConfig,
    state: Mutex<SubscriptionState>,
    /// Signaled by the command API when wallet subscriptions change.
    refresh_signal: Arc<Notify>,
}

impl WalletFeed {
    pub fn new(
        store: Arc<SubscriberStore>,
        pipeline: Arc<EventPipeline>,
        ws_url: String,
        config: FeedConfig,
        refresh_signal: Arc<Notify>,
    ) -> Self {
        Self {
            store,
            pipeline,
            ws_url,
            config,
            state: Mutex::new(SubscriptionState::default()),
            refresh_signal,
        }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        let mut attempts = 0u32;
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let mut ws = match connect_async(&self.ws_url).await {
                Ok((ws, _)) => ws,
                Err(e) => {
                    tracing::warn!(error = %e, "Wallet WS connect failed");
                    sleep_with_backoff(&mut attempts, self.config.ws_reconnect_base_ms).await;
                    continue;
                }
            };

            attempts = 0;
            tracing::info!("Wallet feed connected");

            // Full reinitialization on open.
            {
                let mut state = self.state.lock();
                state.current.clear();
                state.pending_requests.clear();
                state.subscriptions.clear();
            }
            let wallets = self.store.all_tracked_wallets();
            for wallet in &wallets {
                if let Err(e) = self.send_subscribe(&mut ws, wallet).await {
                    tracing::debug!(wallet, error = %e, "logsSubscribe send failed");
                }
            }
            tracing::info!(wallet_count = wallets.len(), "Wallet subscriptions sent");

            let mut keepalive =
                tokio::time::interval(Duration::from_secs(self.config.keepalive_secs));
            keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            keepalive.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        let _ = ws.close(None).await;
                        tracing::info!("Wallet feed shut down");
                        return;
                    }
                    _ = keepalive.tick() => {
                        if let Err(e) = ws.send(Message::Ping(Vec::new())).await {
                            tracing::warn!(error = %e, "Wallet WS ping failed");
                            break;
                        }
                    }
                    _ = self.refresh_signal.notified() => {
                        if let Err(e) = self.refresh(&mut ws).await {
                            tracing::warn!(error = %e, "Subscription refresh failed, reconnecting");
                            break;
                        }
                    }
                    frame = ws.next() => {
                        match frame {
                            Some(Ok(Message::Text(text))) => {
                                if let Ok(msg) = serde_json::from_str::<Value>(&text) {
                                    self.handle_frame(&msg).await;
                                }
                            }
                            Some(Ok(Message::Ping(payload))) => {
                                let _ = ws.send(Message::Pong(payload)).await;
                            }
                            Some(Ok(Message::Close(frame))) => {
                                tracing::warn!(?frame, "Wallet WS closed by server");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "Wallet WS stream error");
                                break;
                            }
                            None => {
                                tracing::warn!("Wallet WS stream ended");
                                break;
                            }
                        }
                    }
                }
            }

            sleep_with_backoff(&mut attempts, self.config.ws_reconnect_base_ms).await;
        }
    }

    /// Send only the delta against the current subscription set. Removed
    /// wallets are dropped from the map; their notifications no longer route.
    async fn refresh<S>(&self, ws: &mut S) -> Result<(), S::Error>
    where
        S: SinkExt<Message> + Unpin,
    {
        let desired = self.store.all_tracked_wallets();
        let (added, removed): (Vec<String>, Vec<String>) = {
            let state = self.state.lock();
            let added = desired
                .iter()
                .filter(|w| !state.current.contains(*w))
                .cloned()
                .collect();
            let removed = state
                .current
                .iter()
                .filter(|w| !desired.contains(*w))
                .cloned()
                .collect();
            (added, removed)
        };

        for wallet in &added {
            self.send_subscribe(ws, wallet).await?;
        }
        if !removed.is_empty() {
            let mut state = self.state.lock();
            for wallet in &removed {
                state.current.remove(wallet);
                state.subscriptions.retain(|_, w| w != wallet);
                state.pending_requests.retain(|_, w| w != wallet);
            }
        }
        if !added.is_empty() || !removed.is_empty() {
            tracing::info!(
                added = added.len(),
                removed = removed.len(),
                "Wallet subscriptions refreshed"
            );
        }
        Ok(())
    }

    async fn send_subscribe<S>(&self, ws: &mut S, wallet: &str) -> Result<(), S::Error>
    where
        S: SinkExt<Message> + Unpin,
    {
        let request_id = {
            let mut state = self.state.lock();
            state.next_request_id += 1;
            let id = state.next_request_id;
            state.pending_requests.insert(id, wallet.to_string());
            state.current.insert(wallet.to_string());
            id
        };
        let msg = json!({
            "jsonrpc": "2.0",
            "id": request_id,
            "method": "logsSubscribe",
            "params": [
                {"mentions": [wallet]},
                {"commitment": "confirmed"},
            ],
        });
        ws.send(Message::Text(msg.to_string())).await
    }

    async fn handle_frame(&self, msg: &Value) {
        // Subscription ack: {"id": N, "result": <sub_id>}
        if let (Some(request_id), Some(sub_id)) = (
            msg.get("id").and_then(|v| v.as_u64()),
            msg.get("result").and_then(|v| v.as_u64()),
        ) {
            let mut state = self.state.lock();
            if let Some(wallet) = state.pending_requests.remove(&request_id) {
                state.subscriptions.insert(sub_id, wallet);
            }
            return;
        }

        // Log notification routed by subscription id.
        if msg.get("method").and_then(|m| m.as_str()) == Some("logsNotification") {
            let Some(params) = msg.get("params") else {
                return;
            };
            let Some(sub_id) = params.get("subscription").and_then(|s| s.as_u64()) else {
                return;
            };
            let wallet = {
                let state = self.state.lock();
                state.subscriptions.get(&sub_id).cloned()
            };
            let Some(wallet) = wallet else {
                // Dropped subscription; the provider keeps sending, we filter.
                return;
            };
            let value = params
                .get("result")
                .and_then(|r| r.get("value"))
                .cloned()
                .unwrap_or(Value::Null);
            if value.is_object() {
                self.pipeline.handle_wallet_message(&wallet, &value).await;
            }
        }
    }
}
