//! DEX WebSocket feed.
//!
//! Fetches a short-lived ticket, connects with it as a query parameter, and
//! subscribes to every pool in the registry snapshot. Keepalive ping every
//! 30 s; reconnect with exponential backoff capped at 5 min. A successful
//! open resets the attempt counter. Subscribe failures are dropped silently;
//! the next reconnect re-subscribes everything.

use super::sleep_with_backoff;
use crate::config::FeedConfig;
use crate::pipeline::EventPipeline;
use crate::pools::PoolRegistry;
use crate::providers::DexApiClient;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

pub struct DexFeed {
    dex_api: Arc<DexApiClient>,
    registry: Arc<PoolRegistry>,
    pipeline: Arc<EventPipeline>,
    ws_url: String,
    config: FeedConfig,
    open: Arc<AtomicBool>,
}

impl DexFeed {
    pub fn new(
        dex_api: Arc<DexApiClient>,
        registry: Arc<PoolRegistry>,
        pipeline: Arc<EventPipeline>,
        ws_url: String,
        config: FeedConfig,
    ) -> Self {
        Self {
            dex_api,
            registry,
            pipeline,
            ws_url,
            config,
            open: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared open flag; the backup poller runs only while this is false.
    pub fn open_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.open)
    }

    pub async fn run(&self, cancel: CancellationToken) {
        let mut attempts = 0u32;
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let ticket = match self.dex_api.ws_ticket().await {
                Ok(ticket) => ticket,
                Err(e) => {
                    tracing::warn!(error = %e, "WS ticket fetch failed");
                    sleep_with_backoff(&mut attempts, self.config.ws_reconnect_base_ms).await;
                    continue;
                }
            };
            let url = format!("{}?ticket={}", self.ws_url, ticket);

            let mut ws = match connect_async(&url).await {
                Ok((ws, _)) => ws,
                Err(e) => {
                    tracing::warn!(error = %e, "DEX WS connect failed");
                    sleep_with_backoff(&mut attempts, self.config.ws_reconnect_base_ms).await;
                    continue;
                }
            };

            attempts = 0;
            self.open.store(true, Ordering::SeqCst);
            tracing::info!("DEX feed connected");

            self.subscribe_all(&mut ws).await;

            let mut keepalive =
                tokio::time::interval(Duration::from_secs(self.config.keepalive_secs));
            keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            keepalive.tick().await; // first tick fires immediately

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        let _ = ws.close(None).await;
                        self.open.store(false, Ordering::SeqCst);
                        tracing::info!("DEX feed shut down");
                        return;
                    }
                    _ = keepalive.tick() => {
                        if let Err(e) = ws.send(Message::Ping(Vec::new())).await {
                            tracing::warn!(error = %e, "DEX WS ping failed");
                            break;
                        }
                    }
                    frame = ws.next() => {
                        match frame {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str(&text) {
                                    Ok(msg) => {
                                        self.pipeline.handle_dex_message(&msg).await;
                                    }
                                    Err(e) => {
                                        tracing::debug!(error = %e, "Unparseable DEX frame");
                                    }
                                }
                            }
                            Some(Ok(Message::Ping(payload))) => {
                                let _ = ws.send(Message::Pong(payload)).await;
                            }
                            Some(Ok(Message::Close(frame))) => {
                                tracing::warn!(?frame, "DEX WS closed by server");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "DEX WS stream error");
                                break;
                            }
                            None => {
                                tracing::warn!("DEX WS stream ended");
                                break;
                            }
                        }
                    }
                }
            }

            self.open.store(false, Ordering::SeqCst);
            sleep_with_backoff(&mut attempts, self.config.ws_reconnect_base_ms).await;
        }
    }

    /// One subscribe message per pool in the current snapshot. A failed send
    /// drops that subscription; the next reconnect re-subscribes all pools.
    async fn subscribe_all<S>(&self, ws: &mut S)
    where
        S: SinkExt<Message> + Unpin,
        S::Error: std::fmt::Display,
    {
        let snapshot = self.registry.snapshot();
        let mut subscribed = 0usize;
        for pool in snapshot.iter() {
            let msg = json!({
                "type": "subscribe",
                "pool": pool.id,
                "limit": self.config.subscribe_limit,
            });
            match ws.send(Message::Text(msg.to_string())).await {
                Ok(()) => subscribed += 1,
                Err(e) => {
                    tracing::debug!(pool = %pool.id, error = %e, "Subscribe send failed");
                }
            }
        }
        tracing::info!(subscribed, total = snapshot.len(), "Subscribed to pools");
    }
}
