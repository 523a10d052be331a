//! Polling fallback for the DEX feed.
//!
//! While the DEX WebSocket is closed, recent trades for the top pools by
//! 24h volume are fetched over HTTP and injected into the same ingestion
//! path. The seen-transaction set keeps a later WS re-open from producing
//! duplicates.

use crate::config::FeedConfig;
use crate::pipeline::EventPipeline;
use crate::pools::VolumeTable;
use crate::providers::DexApiClient;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct BackupPoller {
    dex_api: Arc<DexApiClient>,
    volumes: Arc<VolumeTable>,
    pipeline: Arc<EventPipeline>,
    feed_open: Arc<AtomicBool>,
    config: FeedConfig,
}

impl BackupPoller {
    pub fn new(
        dex_api: Arc<DexApiClient>,
        volumes: Arc<VolumeTable>,
        pipeline: Arc<EventPipeline>,
        feed_open: Arc<AtomicBool>,
        config: FeedConfig,
    ) -> Self {
        Self {
            dex_api,
            volumes,
            pipeline,
            feed_open,
            config,
        }
    }

    /// One poll cycle. No-op while the DEX feed is open.
    pub async fn poll(&self) -> usize {
        if self.feed_open.load(Ordering::SeqCst) {
            return 0;
        }

        let top = self.volumes.top_pools(self.config.backup_pool_count);
        if top.is_empty() {
            tracing::debug!("Backup poll skipped, no volume data yet");
            return 0;
        }

        let mut injected = 0;
        for (pool_id, _) in top {
            let trades = match self
                .dex_api
                .fetch_trades(&pool_id, self.config.subscribe_limit)
                .await
            {
                Ok(trades) => trades,
                Err(e) => {
                    tracing::debug!(pool = %pool_id, error = %e, "Backup trade fetch failed");
                    continue;
                }
            };

            for trade in trades {
                // Trade rows from the HTTP API may omit the pool id.
                let msg = with_pool_id(trade, &pool_id);
                injected += self.pipeline.handle_dex_message(&msg).await;
            }
        }

        if injected > 0 {
            tracing::info!(injected, "Backup poller injected trades");
        }
        injected
    }
}

fn with_pool_id(mut trade: Value, pool_id: &str) -> Value {
    if let Value::Object(map) = &mut trade {
        if !map.contains_key("pool") && !map.contains_key("poolId") && !map.contains_key("pool_id")
        {
            map.insert("pool".to_string(), Value::String(pool_id.to_string()));
        }
    }
    trade
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_with_pool_id_injects_when_missing() {
        let trade = json!({"signature": "s", "side": "buy"});
        let result = with_pool_id(trade, "P1");
        assert_eq!(result.get("pool").and_then(|p| p.as_str()), Some("P1"));
    }

    #[test]
    fn test_with_pool_id_keeps_existing() {
        let trade = json!({"signature": "s", "poolId": "EXISTING"});
        let result = with_pool_id(trade, "P1");
        assert!(result.get("pool").is_none());
        assert_eq!(result.get("poolId").and_then(|p| p.as_str()), Some("EXISTING"));
    }
}
