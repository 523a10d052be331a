//! DEX trade history for a wallet.
//!
//! Recent signatures are resolved to parsed transactions; a transaction is a
//! DEX trade when its account keys touch the DEX program or a registered
//! pool. Direction and USD come from the wallet's token balance deltas
//! against the pool's base and quote mints.

use super::snapshot::TradeRecord;
use crate::decoder::Direction;
use crate::pools::{Pool, PoolSnapshot};
use crate::providers::RpcAggregatorClient;
use crate::valuation::PriceView;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;

const SIGNATURE_FETCH_LIMIT: u32 = 50;
const MAX_TX_LOOKUPS: usize = 25;

pub struct TradeFetcher {
    rpc: Arc<RpcAggregatorClient>,
    view: Arc<dyn PriceView>,
    dex_program_id: String,
}

impl TradeFetcher {
    pub fn new(
        rpc: Arc<RpcAggregatorClient>,
        view: Arc<dyn PriceView>,
        dex_program_id: String,
    ) -> Self {
        Self {
            rpc,
            view,
            dex_program_id,
        }
    }

    /// Classified DEX trades for one wallet, newest first.
    pub async fn fetch(&self, wallet: &str, pools: &PoolSnapshot) -> Vec<TradeRecord> {
        let signatures = match self
            .rpc
            .get_signatures_for_address(wallet, SIGNATURE_FETCH_LIMIT)
            .await
        {
            Ok(sigs) => sigs,
            Err(e) => {
                tracing::warn!(wallet, error = %e, "Signature history fetch failed");
                return Vec::new();
            }
        };

        let mut trades = Vec::new();
        for entry in signatures.iter().take(MAX_TX_LOOKUPS) {
            let Some(sig) = entry.get("signature").and_then(|s| s.as_str()) else {
                continue;
            };
            // Failed transactions are not trades.
            if entry.get("err").map(|e| !e.is_null()).unwrap_or(false) {
                continue;
            }
            let tx = match self.rpc.get_transaction(sig).await {
                Ok(tx) => tx,
                Err(e) => {
                    tracing::debug!(sig, error = %e, "Transaction lookup failed");
                    continue;
                }
            };
            if let Some(trade) = self.classify(sig, wallet, &tx, pools) {
                trades.push(trade);
            }
        }

        trades.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        trades
    }

    fn classify(
        &self,
        sig: &str,
        wallet: &str,
        tx: &Value,
        pools: &PoolSnapshot,
    ) -> Option<TradeRecord> {
        let accounts = account_keys(tx);
        if accounts.is_empty() {
            return None;
        }
        let touches_program = accounts.iter().any(|a| a == &self.dex_program_id);
        let pool = accounts.iter().find_map(|a| pools.get(a));
        if !touches_program && pool.is_none() {
            return None;
        }
        let pool = pool?;

        let base_delta = wallet_mint_delta(tx, wallet, &pool.base);
        let quote_delta = wallet_mint_delta(tx, wallet, &pool.quote);

        let direction = match base_delta {
            Some(d) if d > Decimal::ZERO => Some(Direction::Buy),
            Some(d) if d < Decimal::ZERO => Some(Direction::Sell),
            _ => None,
        };

        let usd = quote_delta
            .map(|d| d.abs())
            .and_then(|amount| self.view.price(&pool.quote).map(|p| amount * p))
            .or_else(|| {
                base_delta
                    .map(|d| d.abs())
                    .and_then(|amount| self.view.price(&pool.base).map(|p| amount * p))
            })
            .unwrap_or(Decimal::ZERO);

        let timestamp = tx
            .get("blockTime")
            .and_then(|t| t.as_i64())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_else(Utc::now);

        Some(TradeRecord {
            sig: sig.to_string(),
            wallet: wallet.to_string(),
            pool_id: pool.id.clone(),
            direction,
            usd,
            timestamp,
        })
    }
}

/// Account keys: strings or `{pubkey}` objects, static plus loaded.
pub fn account_keys(tx: &Value) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(raw) = tx
        .get("transaction")
        .and_then(|t| t.get("message"))
        .and_then(|m| m.get("accountKeys"))
        .and_then(|k| k.as_array())
    {
        for key in raw {
            match key {
                Value::String(s) => keys.push(s.clone()),
                Value::Object(_) => {
                    if let Some(s) = key.get("pubkey").and_then(|p| p.as_str()) {
                        keys.push(s.to_string());
                    }
                }
                _ => {}
            }
        }
    }
    for side in ["writable", "readonly"] {
        if let Some(loaded) = tx
            .get("meta")
            .and_then(|m| m.get("loadedAddresses"))
            .and_then(|l| l.get(side))
            .and_then(|a| a.as_array())
        {
            keys.extend(loaded.iter().filter_map(|k| k.as_str().map(String::from)));
        }
    }
    keys
}

/// UI-amount delta of `mint` for accounts owned by `wallet`, from the
/// pre/post token balances in the transaction meta.
fn wallet_mint_delta(tx: &Value, wallet: &str, mint: &str) -> Option<Decimal> {
    let meta = tx.get("meta")?;
    let sum = |key: &str| -> Decimal {
        meta.get(key)
            .and_then(|b| b.as_array())
            .map(|balances| {
                balances
                    .iter()
                    .filter(|b| {
                        b.get("owner").and_then(|o| o.as_str()) == Some(wallet)
                            && b.get("mint").and_then(|m| m.as_str()) == Some(mint)
                    })
                    .filter_map(|b| {
                        b.get("uiTokenAmount")
                            .and_then(|a| a.get("uiAmountString"))
                            .and_then(|s| s.as_str())
                            .and_then(|s| Decimal::from_str(s).ok())
                    })
                    .sum()
            })
            .unwrap_or(Decimal::ZERO)
    };

    let pre = sum("preTokenBalances");
    let post = sum("postTokenBalances");
    if pre == Decimal::ZERO && post == Decimal::ZERO {
        return None;
    }
    Some(post - pre)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_account_keys_both_shapes() {
        let tx = json!({
            "transaction": {"message": {"accountKeys": [
                "PlainKey",
                {"pubkey": "ObjectKey", "signer": true},
            ]}},
            "meta": {"loadedAddresses": {"writable": ["LoadedKey"], "readonly": []}},
        });
        let keys = account_keys(&tx);
        assert_eq!(keys, vec!["PlainKey", "ObjectKey", "LoadedKey"]);
    }

    #[test]
    fn test_wallet_mint_delta() {
        let tx = json!({
            "meta": {
                "preTokenBalances": [
                    {"owner": "W", "mint": "M", "uiTokenAmount": {"uiAmountString": "10"}},
                ],
                "postTokenBalances": [
                    {"owner": "W", "mint": "M", "uiTokenAmount": {"uiAmountString": "15"}},
                    {"owner": "X", "mint": "M", "uiTokenAmount": {"uiAmountString": "99"}},
                ],
            }
        });
        assert_eq!(wallet_mint_delta(&tx, "W", "M"), Some(Decimal::from(5)));
        assert_eq!(wallet_mint_delta(&tx, "W", "OTHER"), None);
    }
}
