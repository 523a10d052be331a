//! Pair-style price aggregator client (DexScreener shape).
//!
//! One token per call; the response carries the pair's priceUsd and the
//! base token's symbol/name, which doubles as a metadata fallback.

use super::birdeye::value_to_decimal;
use super::ProviderShared;
use crate::error::UpstreamError;
use crate::net::{fetch_with_retry, FetchOptions, Provider};
use rust_decimal::Decimal;
use serde_json::Value;

pub struct DexScreenerClient {
    shared: ProviderShared,
    base_url: String,
}

/// What a pair lookup yields for one token.
#[derive(Debug, Clone, Default)]
pub struct PairInfo {
    pub price_usd: Option<Decimal>,
    pub symbol: Option<String>,
    pub name: Option<String>,
}

impl DexScreenerClient {
    pub fn new(shared: ProviderShared, base_url: String) -> Self {
        Self {
            shared,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn token_pair(&self, mint: &str) -> Result<PairInfo, UpstreamError> {
        self.shared.limiters.acquire(Provider::DexScreener).await;
        let url = format!("{}/latest/dex/tokens/{}", self.base_url, mint);
        let opts = FetchOptions::new("dexscreener");
        let result = fetch_with_retry(&self.shared.http, &url, &opts).await;
        let body = self.shared.observe(Provider::DexScreener, result)?;
        Ok(parse_pair(&body, mint))
    }
}

/// Pick the first pair whose base token is the requested mint; fall back to
/// the first pair at all.
fn parse_pair(body: &Value, mint: &str) -> PairInfo {
    let Some(pairs) = body.get("pairs").and_then(|p| p.as_array()) else {
        return PairInfo::default();
    };
    let pair = pairs
        .iter()
        .find(|p| {
            p.get("baseToken")
                .and_then(|t| t.get("address"))
                .and_then(|a| a.as_str())
                == Some(mint)
        })
        .or_else(|| pairs.first());
    let Some(pair) = pair else {
        return PairInfo::default();
    };

    let base = pair.get("baseToken");
    PairInfo {
        price_usd: pair.get("priceUsd").and_then(value_to_decimal),
        symbol: base
            .and_then(|t| t.get("symbol"))
            .and_then(|s| s.as_str())
            .map(|s| s.to_string()),
        name: base
            .and_then(|t| t.get("name"))
            .and_then(|s| s.as_str())
            .map(|s| s.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn test_parse_pair_prefers_matching_base() {
        let body = json!({
            "pairs": [
                {"baseToken": {"address": "OTHER", "symbol": "OTH"}, "priceUsd": "9.9"},
                {"baseToken": {"address": "MINT", "symbol": "TGT", "name": "Target"}, "priceUsd": "1.5"},
            ]
        });
        let info = parse_pair(&body, "MINT");
        assert_eq!(info.price_usd, Some(Decimal::from_str("1.5").unwrap()));
        assert_eq!(info.symbol.as_deref(), Some("TGT"));
        assert_eq!(info.name.as_deref(), Some("Target"));
    }

    #[test]
    fn test_parse_pair_empty() {
        let info = parse_pair(&json!({"pairs": []}), "MINT");
        assert!(info.price_usd.is_none());
        assert!(info.symbol.is_none());
    }
}
