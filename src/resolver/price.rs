//! USD price resolution.
//!
//! A configured stablecoin set resolves to 1.0 without lookup. Everything
//! else is served from cache while the entry is younger than twice the
//! refresh interval; the bulk refresh cycle walks the provider chain in a
//! fixed order and stops once the network token has a price.

use crate::pools::PoolSnapshot;
use crate::providers::{BirdeyeClient, CoinGeckoClient, DexScreenerClient, RpcAggregatorClient};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Where a cached price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    Stable,
    RpcAggregator,
    DexScreener,
    Birdeye,
    CoinGecko,
}

impl std::fmt::Display for PriceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceSource::Stable => write!(f, "stable"),
            PriceSource::RpcAggregator => write!(f, "rpc_aggregator"),
            PriceSource::DexScreener => write!(f, "dexscreener"),
            PriceSource::Birdeye => write!(f, "birdeye"),
            PriceSource::CoinGecko => write!(f, "coingecko"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PriceEntry {
    pub mint: String,
    pub price_usd: Decimal,
    pub updated_at: DateTime<Utc>,
    pub source: PriceSource,
}

pub struct PriceResolver {
    prices: RwLock<HashMap<String, PriceEntry>>,
    stable_mints: HashSet<String>,
    primary_token_mint: String,
    network_token_mint: String,
    /// A price is usable while younger than twice this.
    refresh_interval: Duration,
    rpc: Arc<RpcAggregatorClient>,
    dexscreener: Arc<DexScreenerClient>,
    birdeye: Arc<BirdeyeClient>,
    coingecko: Arc<CoinGeckoClient>,
}

impl PriceResolver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stable_mints: Vec<String>,
        primary_token_mint: String,
        network_token_mint: String,
        refresh_interval_ms: u64,
        rpc: Arc<RpcAggregatorClient>,
        dexscreener: Arc<DexScreenerClient>,
        birdeye: Arc<BirdeyeClient>,
        coingecko: Arc<CoinGeckoClient>,
    ) -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
            stable_mints: stable_mints.into_iter().collect(),
            primary_token_mint,
            network_token_mint,
            refresh_interval: Duration::milliseconds(refresh_interval_ms as i64),
            rpc,
            dexscreener,
            birdeye,
            coingecko,
        }
    }

    /// USD price for a mint; `None` if unknown and not stable.
    pub fn get_price(&self, mint: &str) -> Option<Decimal> {
        if self.stable_mints.contains(mint) {
            return Some(Decimal::ONE);
        }
        let prices = self.prices.read();
        let entry = prices.get(mint)?;
        if self.is_usable(entry) {
            Some(entry.price_usd)
        } else {
            None
        }
    }

    pub fn get_entry(&self, mint: &str) -> Option<PriceEntry> {
        self.prices.read().get(mint).cloned()
    }

    pub fn get_primary_token_price(&self) -> Option<Decimal> {
        self.get_price(&self.primary_token_mint)
    }

    pub fn get_network_token_price(&self) -> Option<Decimal> {
        self.get_price(&self.network_token_mint)
    }

    pub fn set_price(&self, mint: &str, price_usd: Decimal, source: PriceSource) {
        let mut prices = self.prices.write();
        prices.insert(
            mint.to_string(),
            PriceEntry {
                mint: mint.to_string(),
                price_usd,
                updated_at: Utc::now(),
                source,
            },
        );
    }

    fn is_usable(&self, entry: &PriceEntry) -> bool {
        Utc::now() - entry.updated_at < self.refresh_interval * 2
    }

    /// Drop entries past the usable window.
    pub fn prune(&self) -> usize {
        let mut prices = self.prices.write();
        let before = prices.len();
        let cutoff = Utc::now() - self.refresh_interval * 2;
        prices.retain(|_, e| e.updated_at >= cutoff);
        before - prices.len()
    }

    /// Bulk refresh. Providers are tried in order until the network token has
    /// a fresh price; the batched first provider also opportunistically
    /// populates non-stable pool tokens.
    pub async fn refresh(&self, pools: &PoolSnapshot) {
        // 1. RPC aggregator, batched.
        let mut mints: Vec<String> = vec![
            self.network_token_mint.clone(),
            self.primary_token_mint.clone(),
        ];
        let mut seen: HashSet<&str> = HashSet::new();
        for pool in pools.iter() {
            for mint in [&pool.base, &pool.quote] {
                if !self.stable_mints.contains(mint)
                    && mint != &self.network_token_mint
                    && mint != &self.primary_token_mint
                    && seen.insert(mint.as_str())
                {
                    mints.push(mint.clone());
                }
            }
        }

        match self.rpc.get_asset_batch(&mints).await {
            Ok(assets) => {
                let mut populated = 0usize;
                for asset in &assets {
                    let Some(mint) = asset.get("id").and_then(|v| v.as_str()) else {
                        continue;
                    };
                    let price = asset
                        .get("token_info")
                        .and_then(|t| t.get("price_info"))
                        .and_then(|p| p.get("price_per_token"))
                        .and_then(crate::providers::birdeye::value_to_decimal);
                    if let Some(price) = price {
                        self.set_price(mint, price, PriceSource::RpcAggregator);
                        populated += 1;
                    }
                }
                tracing::debug!(populated, requested = mints.len(), "Bulk price refresh");
                if self.has_fresh_network_price() {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Batched price refresh failed");
            }
        }

        // 2. Pair aggregator, single token.
        match self.dexscreener.token_pair(&self.network_token_mint).await {
            Ok(info) => {
                if let Some(price) = info.price_usd {
                    self.set_price(&self.network_token_mint, price, PriceSource::DexScreener);
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Pair aggregator price lookup failed");
            }
        }

        // 3. Aggregator B.
        match self.birdeye.price(&self.network_token_mint).await {
            Ok(Some(price)) => {
                self.set_price(&self.network_token_mint, price, PriceSource::Birdeye);
                return;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Aggregator B price lookup failed");
            }
        }

        // 4. Simple-price API, network token only.
        match self.coingecko.network_token_price().await {
            Ok(Some(price)) => {
                self.set_price(&self.network_token_mint, price, PriceSource::CoinGecko);
            }
            Ok(None) => {
                tracing::warn!("No provider returned a network token price this cycle");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Simple-price lookup failed");
            }
        }
    }

    fn has_fresh_network_price(&self) -> bool {
        self.prices
            .read()
            .get(&self.network_token_mint)
            .map(|e| self.is_usable(e))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.prices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{ApiHealthRegistry, RateLimiters};
    use crate::providers::ProviderShared;
    use std::str::FromStr;

    fn resolver(refresh_ms: u64) -> PriceResolver {
        let shared = ProviderShared::new(
            Arc::new(RateLimiters::new()),
            Arc::new(ApiHealthRegistry::new()),
        );
        PriceResolver::new(
            vec!["USDC".to_string()],
            "PRIME".to_string(),
            "WSOL".to_string(),
            refresh_ms,
            Arc::new(RpcAggregatorClient::new(
                shared.clone(),
                "http://localhost:0".to_string(),
                None,
            )),
            Arc::new(DexScreenerClient::new(
                shared.clone(),
                "http://localhost:0".to_string(),
            )),
            Arc::new(BirdeyeClient::new(
                shared.clone(),
                "http://localhost:0".to_string(),
                None,
            )),
            Arc::new(CoinGeckoClient::new(shared, "http://localhost:0".to_string())),
        )
    }

    #[test]
    fn test_stable_is_one_without_lookup() {
        let resolver = resolver(300_000);
        assert_eq!(resolver.get_price("USDC"), Some(Decimal::ONE));
    }

    #[test]
    fn test_unknown_mint_is_none() {
        let resolver = resolver(300_000);
        assert_eq!(resolver.get_price("UNKNOWN"), None);
    }

    #[test]
    fn test_set_then_get() {
        let resolver = resolver(300_000);
        resolver.set_price("M", Decimal::from_str("3.5").unwrap(), PriceSource::Birdeye);
        assert_eq!(resolver.get_price("M"), Some(Decimal::from_str("3.5").unwrap()));
    }

    #[test]
    fn test_stale_price_treated_as_missing() {
        // Zero refresh interval: everything is stale immediately.
        let resolver = resolver(0);
        resolver.set_price("M", Decimal::ONE, PriceSource::Birdeye);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(resolver.get_price("M"), None);
        // The raw entry is still there until pruned.
        assert!(resolver.get_entry("M").is_some());
        resolver.prune();
        assert!(resolver.get_entry("M").is_none());
    }
}
