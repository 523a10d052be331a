//! Pool registry: periodic refresh, atomic snapshot publish, lookups.
//!
//! A refresh builds a complete snapshot and swaps it in behind a lock; on
//! fetch failure the previous snapshot stays. Readers clone the `Arc` and
//! never observe a half-built index.

use crate::providers::dex_api::DexApiClient;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A DEX pool. Created on refresh, never mutated in place.
#[derive(Debug, Clone)]
pub struct Pool {
    pub id: String,
    pub base: String,
    pub quote: String,
    pub pair_name: String,
    /// True iff base or quote is the protocol's primary token.
    pub is_primary: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub tvl: Option<Decimal>,
    pub fee_bps: Option<u32>,
    pub protocol_fee_bps: Option<u32>,
    /// Listed spot price of the base token in quote terms, when the API
    /// exposes it. Last-resort input for trade valuation.
    pub spot_price: Option<Decimal>,
    /// The pool's LP mint when the API exposes it; used to identify LP
    /// token balances in portfolios.
    pub lp_mint: Option<String>,
}

/// Immutable pool set published by the registry.
#[derive(Debug, Default)]
pub struct PoolSnapshot {
    pools: Vec<Pool>,
    by_id: HashMap<String, usize>,
    lp_mints: HashMap<String, usize>,
}

impl PoolSnapshot {
    pub fn from_pools(pools: Vec<Pool>) -> Self {
        let by_id = pools
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.clone(), i))
            .collect();
        let lp_mints = pools
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.lp_mint.clone().map(|m| (m, i)))
            .collect();
        Self {
            pools,
            by_id,
            lp_mints,
        }
    }

    pub fn get(&self, pool_id: &str) -> Option<&Pool> {
        self.by_id.get(pool_id).map(|&i| &self.pools[i])
    }

    pub fn contains(&self, pool_id: &str) -> bool {
        self.by_id.contains_key(pool_id)
    }

    /// All pools where base or quote equals `mint`.
    pub fn find_by_token(&self, mint: &str) -> Vec<&Pool> {
        self.pools
            .iter()
            .filter(|p| p.base == mint || p.quote == mint)
            .collect()
    }

    /// Pool owning this LP mint, if any.
    pub fn find_by_lp_mint(&self, mint: &str) -> Option<&Pool> {
        self.lp_mints.get(mint).map(|&i| &self.pools[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pool> {
        self.pools.iter()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

/// Registry holding the current snapshot and driving refresh.
pub struct PoolRegistry {
    snapshot: RwLock<Arc<PoolSnapshot>>,
    dex_api: Arc<DexApiClient>,
    dex_program_id: String,
    primary_token_mint: String,
}

impl PoolRegistry {
    pub fn new(
        dex_api: Arc<DexApiClient>,
        dex_program_id: String,
        primary_token_mint: String,
    ) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(PoolSnapshot::default())),
            dex_api,
            dex_program_id,
            primary_token_mint,
        }
    }

    /// Current snapshot. Cheap to call; the snapshot is shared.
    pub fn snapshot(&self) -> Arc<PoolSnapshot> {
        self.snapshot.read().clone()
    }

    /// True iff any account is the DEX program id or a known pool.
    pub fn is_dex_transaction(&self, accounts: &[String]) -> bool {
        let snapshot = self.snapshot();
        accounts
            .iter()
            .any(|a| a == &self.dex_program_id || snapshot.contains(a))
    }

    /// Fetch the pool list and publish a replacement snapshot. On failure the
    /// previous snapshot remains.
    pub async fn refresh(&self) -> bool {
        let raw = match self.dex_api.fetch_pools().await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Pool refresh failed, keeping previous snapshot");
                return false;
            }
        };

        let pools: Vec<Pool> = raw
            .iter()
            .filter_map(|v| parse_pool(v, &self.primary_token_mint))
            .collect();

        if pools.is_empty() && !raw.is_empty() {
            tracing::warn!(
                raw_count = raw.len(),
                "Pool list parsed to zero pools, keeping previous snapshot"
            );
            return false;
        }

        let snapshot = Arc::new(PoolSnapshot::from_pools(pools));
        tracing::info!(pool_count = snapshot.len(), "Published pool snapshot");
        *self.snapshot.write() = snapshot;
        true
    }

    /// Replace the snapshot directly. Test hook and warm-start path.
    pub fn publish(&self, pools: Vec<Pool>) {
        *self.snapshot.write() = Arc::new(PoolSnapshot::from_pools(pools));
    }
}

/// 24h volume per pool, refreshed by the scheduler. Drives
/// `top_pools_by_volume` and the backup poller's top-N selection.
pub struct VolumeTable {
    volumes: RwLock<HashMap<String, Decimal>>,
    dex_api: Arc<DexApiClient>,
}

impl VolumeTable {
    pub fn new(dex_api: Arc<DexApiClient>) -> Self {
        Self {
            volumes: RwLock::new(HashMap::new()),
            dex_api,
        }
    }

    pub async fn refresh(&self) {
        let raw = match self.dex_api.fetch_volumes().await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Volume refresh failed");
                return;
            }
        };
        let mut volumes = HashMap::with_capacity(raw.len());
        for entry in &raw {
            let Some(pool_id) = pick_str(entry, POOL_ID_KEYS) else {
                continue;
            };
            let Some(volume) = pick_decimal(entry, &["volume", "volumeUsd", "volume24h", "v24h"])
            else {
                continue;
            };
            volumes.insert(pool_id, volume);
        }
        tracing::debug!(pool_count = volumes.len(), "Volume table refreshed");
        *self.volumes.write() = volumes;
    }

    pub fn get(&self, pool_id: &str) -> Option<Decimal> {
        self.volumes.read().get(pool_id).copied()
    }

    /// Pool ids ordered by 24h volume, highest first.
    pub fn top_pools(&self, n: usize) -> Vec<(String, Decimal)> {
        let volumes = self.volumes.read();
        let mut entries: Vec<(String, Decimal)> =
            volumes.iter().map(|(k, v)| (k.clone(), *v)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries.truncate(n);
        entries
    }

    /// Direct insert, for warm starts and tests.
    pub fn set(&self, pool_id: &str, volume: Decimal) {
        self.volumes.write().insert(pool_id.to_string(), volume);
    }
}

const POOL_ID_KEYS: &[&str] = &["id", "address", "pool", "poolAddress", "pairAddress"];
const BASE_KEYS: &[&str] = &["base", "baseMint", "base_mint", "tokenX", "token_x", "baseToken"];
const QUOTE_KEYS: &[&str] = &["quote", "quoteMint", "quote_mint", "tokenY", "token_y", "quoteToken"];
const BASE_SYMBOL_KEYS: &[&str] = &["baseSymbol", "base_symbol"];
const QUOTE_SYMBOL_KEYS: &[&str] = &["quoteSymbol", "quote_symbol"];
const LP_MINT_KEYS: &[&str] = &["lpMint", "lp_mint", "lpToken", "lp_token"];

fn pick_str(v: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(s) = v.get(*key).and_then(|x| x.as_str()) {
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
        // Nested token object: {"baseToken": {"address": "..", "symbol": ".."}}
        if let Some(obj) = v.get(*key).filter(|x| x.is_object()) {
            if let Some(s) = obj.get("address").and_then(|x| x.as_str()) {
                return Some(s.to_string());
            }
        }
    }
    None
}

fn pick_u32(v: &Value, keys: &[&str]) -> Option<u32> {
    for key in keys {
        if let Some(n) = v.get(*key).and_then(|x| x.as_u64()) {
            return u32::try_from(n).ok();
        }
    }
    None
}

fn pick_decimal(v: &Value, keys: &[&str]) -> Option<Decimal> {
    use std::str::FromStr;
    for key in keys {
        match v.get(*key) {
            Some(Value::Number(n)) => {
                if let Some(d) = Decimal::from_str(&n.to_string()).ok() {
                    return Some(d);
                }
            }
            Some(Value::String(s)) => {
                if let Ok(d) = Decimal::from_str(s) {
                    return Some(d);
                }
            }
            _ => {}
        }
    }
    None
}

fn short_mint(mint: &str) -> String {
    if mint.len() > 8 {
        format!("{}\u{2026}{}", &mint[..4], &mint[mint.len() - 4..])
    } else {
        mint.to_string()
    }
}

/// Parse one pool object from the lenient upstream shape. Pools with
/// identical base and quote are rejected.
fn parse_pool(v: &Value, primary_token_mint: &str) -> Option<Pool> {
    let id = pick_str(v, POOL_ID_KEYS)?;
    let base = pick_str(v, BASE_KEYS)?;
    let quote = pick_str(v, QUOTE_KEYS)?;
    if base == quote {
        tracing::debug!(pool = %id, "Skipping pool with identical base and quote");
        return None;
    }

    let base_symbol = pick_str(v, BASE_SYMBOL_KEYS).unwrap_or_else(|| short_mint(&base));
    let quote_symbol = pick_str(v, QUOTE_SYMBOL_KEYS).unwrap_or_else(|| short_mint(&quote));

    let created_at = v
        .get("createdAt")
        .or_else(|| v.get("created_at"))
        .and_then(|x| x.as_i64())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

    Some(Pool {
        is_primary: base == primary_token_mint || quote == primary_token_mint,
        pair_name: format!("{}/{}", base_symbol, quote_symbol),
        created_at,
        tvl: pick_decimal(v, &["tvl", "tvlUsd", "liquidity"]),
        fee_bps: pick_u32(v, &["feeBps", "fee_bps"]),
        protocol_fee_bps: pick_u32(v, &["protocolFeeBps", "protocol_fee_bps"]),
        spot_price: pick_decimal(v, &["price", "spotPrice", "currentPrice"]),
        lp_mint: pick_str(v, LP_MINT_KEYS),
        id,
        base,
        quote,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_pool_camel_case() {
        let raw = json!({
            "address": "P1",
            "baseMint": "BASE",
            "quoteMint": "QUOTE",
            "baseSymbol": "PRIME",
            "quoteSymbol": "USDC",
            "feeBps": 25,
            "tvl": "1234.5",
        });
        let pool = parse_pool(&raw, "BASE").unwrap();
        assert_eq!(pool.id, "P1");
        assert_eq!(pool.pair_name, "PRIME/USDC");
        assert!(pool.is_primary);
        assert_eq!(pool.fee_bps, Some(25));
    }

    #[test]
    fn test_parse_pool_rejects_same_base_quote() {
        let raw = json!({"id": "P1", "base": "M", "quote": "M"});
        assert!(parse_pool(&raw, "X").is_none());
    }

    #[test]
    fn test_snapshot_lookups() {
        let pools = vec![
            Pool {
                id: "P1".into(),
                base: "A".into(),
                quote: "B".into(),
                pair_name: "A/B".into(),
                is_primary: false,
                created_at: None,
                tvl: None,
                fee_bps: None,
                protocol_fee_bps: None,
                spot_price: None,
                lp_mint: Some("LP1".into()),
            },
            Pool {
                id: "P2".into(),
                base: "A".into(),
                quote: "C".into(),
                pair_name: "A/C".into(),
                is_primary: false,
                created_at: None,
                tvl: None,
                fee_bps: None,
                protocol_fee_bps: None,
                spot_price: None,
                lp_mint: None,
            },
        ];
        let snapshot = PoolSnapshot::from_pools(pools);
        assert!(snapshot.get("P1").is_some());
        assert!(snapshot.get("P3").is_none());
        assert_eq!(snapshot.find_by_token("A").len(), 2);
        assert_eq!(snapshot.find_by_token("C").len(), 1);
        assert_eq!(snapshot.find_by_lp_mint("LP1").unwrap().id, "P1");
    }

    #[test]
    fn test_is_dex_transaction() {
        use crate::net::{ApiHealthRegistry, RateLimiters};
        use crate::providers::ProviderShared;

        let shared = ProviderShared::new(
            Arc::new(RateLimiters::new()),
            Arc::new(ApiHealthRegistry::new()),
        );
        let dex_api = Arc::new(DexApiClient::new(shared, "http://localhost:0".into()));
        let registry = PoolRegistry::new(dex_api, "PROGRAM".into(), "PRIMARY".into());
        registry.publish(vec![Pool {
            id: "P1".into(),
            base: "A".into(),
            quote: "B".into(),
            pair_name: "A/B".into(),
            is_primary: false,
            created_at: None,
            tvl: None,
            fee_bps: None,
            protocol_fee_bps: None,
            spot_price: None,
            lp_mint: None,
        }]);

        let hit_program = vec!["X".to_string(), "PROGRAM".to_string()];
        let hit_pool = vec!["P1".to_string()];
        let miss = vec!["X".to_string(), "Y".to_string()];
        assert!(registry.is_dex_transaction(&hit_program));
        assert!(registry.is_dex_transaction(&hit_pool));
        assert!(!registry.is_dex_transaction(&miss));
    }

    #[test]
    fn test_nested_token_object() {
        let raw = json!({
            "pairAddress": "P9",
            "baseToken": {"address": "BASE", "symbol": "X"},
            "quoteToken": {"address": "QUOTE", "symbol": "Y"},
        });
        let pool = parse_pool(&raw, "other").unwrap();
        assert_eq!(pool.base, "BASE");
        assert_eq!(pool.quote, "QUOTE");
        assert!(!pool.is_primary);
    }
}
