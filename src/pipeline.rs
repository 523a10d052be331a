//! Ingestion pipeline: raw feed message to delivered notifications.
//!
//! Both live feeds and the backup poller inject messages here. Dedup is
//! strictly happens-before fan-out: the seen-set insertion for a signature
//! precedes the enqueue, so a concurrent second arrival observes the
//! signature and short-circuits.

use crate::decoder::{EventDecoder, EventKind};
use crate::dedup::{AlertSource, SeenTxStore};
use crate::fanout::FanOut;
use crate::pools::PoolRegistry;
use crate::valuation::UsdValuator;
use serde_json::Value;
use std::sync::Arc;

pub struct EventPipeline {
    decoder: EventDecoder,
    registry: Arc<PoolRegistry>,
    dedup: Arc<SeenTxStore>,
    valuator: UsdValuator,
    fanout: Arc<FanOut>,
}

impl EventPipeline {
    pub fn new(
        decoder: EventDecoder,
        registry: Arc<PoolRegistry>,
        dedup: Arc<SeenTxStore>,
        valuator: UsdValuator,
        fanout: Arc<FanOut>,
    ) -> Self {
        Self {
            decoder,
            registry,
            dedup,
            valuator,
            fanout,
        }
    }

    /// Handle one raw message from the DEX feed (or the backup poller).
    /// Returns the number of notifications delivered.
    pub async fn handle_dex_message(&self, msg: &Value) -> usize {
        if is_heartbeat(msg) {
            return 0;
        }

        if let Some(sig) = crate::decoder::extract_sig(msg) {
            if !self.dedup.check_and_insert(AlertSource::Dex, &sig).await {
                return 0;
            }
        }

        let pools = self.registry.snapshot();
        let mut event = self.decoder.decode(msg, &pools);
        if event.is_unknown() {
            tracing::trace!("Dropping undecodable message");
            return 0;
        }

        let pool = event.kind.pool_id().and_then(|id| pools.get(id)).cloned();
        let usd = match &event.kind {
            EventKind::Swap { amounts, .. } => {
                self.valuator.trade_usd(msg, amounts, pool.as_ref())
            }
            EventKind::LpAdd { .. } | EventKind::LpRemove { .. } => {
                self.valuator.lp_usd(msg, pool.as_ref())
            }
            _ => None,
        };
        event.kind.set_usd(usd);

        self.fanout.notify_event(&event, pool.as_ref()).await
    }

    /// Handle one raw message from the wallet feed. The feed resolves which
    /// tracked wallet the subscription belongs to; recipients whose
    /// subscription was since removed are filtered by the fan-out predicate.
    pub async fn handle_wallet_message(&self, wallet: &str, msg: &Value) -> usize {
        if is_heartbeat(msg) {
            return 0;
        }

        let Some(sig) = crate::decoder::extract_sig(msg) else {
            return 0;
        };
        if !self.dedup.check_and_insert(AlertSource::Wallet, &sig).await {
            return 0;
        }

        let usd = self.valuator.wallet_tx_usd(msg, wallet);
        self.fanout.notify_wallet_alert(wallet, usd, &sig).await
    }
}

/// Heartbeat frames carry no payload and are dropped before dedup.
pub fn is_heartbeat(msg: &Value) -> bool {
    match msg {
        Value::String(s) => matches!(s.as_str(), "ping" | "pong" | "heartbeat"),
        Value::Object(_) => msg
            .get("type")
            .and_then(|t| t.as_str())
            .map(|t| matches!(t, "ping" | "pong" | "heartbeat"))
            .unwrap_or(false),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_heartbeat() {
        assert!(is_heartbeat(&json!("ping")));
        assert!(is_heartbeat(&json!({"type": "heartbeat"})));
        assert!(!is_heartbeat(&json!({"type": "swap"})));
        assert!(!is_heartbeat(&json!(42)));
    }
}
