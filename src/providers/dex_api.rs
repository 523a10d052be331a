//! DEX HTTP API client.
//!
//! The pool list endpoint is lenient about shape: the array may sit at the
//! root or under `pools` / `pairs`.

use super::ProviderShared;
use crate::error::UpstreamError;
use crate::net::{fetch_with_retry, FetchOptions, Provider};
use serde_json::Value;

pub struct DexApiClient {
    shared: ProviderShared,
    base_url: String,
}

/// Candle timeframes the DEX API serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    M15,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "15m" => Some(Timeframe::M15),
            "1h" => Some(Timeframe::H1),
            "4h" => Some(Timeframe::H4),
            "1d" => Some(Timeframe::D1),
            _ => None,
        }
    }
}

impl DexApiClient {
    pub fn new(shared: ProviderShared, base_url: String) -> Self {
        Self {
            shared,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get(&self, path: &str) -> Result<Value, UpstreamError> {
        self.shared.limiters.acquire(Provider::DexApi).await;
        let url = format!("{}{}", self.base_url, path);
        let opts = FetchOptions::new("dex_api");
        let result = fetch_with_retry(&self.shared.http, &url, &opts).await;
        self.shared.observe(Provider::DexApi, result)
    }

    /// Full pool list, whatever shape the API chose today.
    pub async fn fetch_pools(&self) -> Result<Vec<Value>, UpstreamError> {
        let body = self.get("/pools").await?;
        Ok(extract_array(&body, &["pools", "pairs"]))
    }

    pub async fn fetch_pool(&self, pool_id: &str) -> Result<Value, UpstreamError> {
        self.get(&format!("/pool/{}", pool_id)).await
    }

    pub async fn fetch_trades(
        &self,
        pool_id: &str,
        limit: u32,
    ) -> Result<Vec<Value>, UpstreamError> {
        let body = self
            .get(&format!("/trades/{}?limit={}", pool_id, limit))
            .await?;
        Ok(extract_array(&body, &["trades", "data"]))
    }

    pub async fn fetch_candles(
        &self,
        pool_id: &str,
        tf: Timeframe,
        limit: u32,
    ) -> Result<Vec<Value>, UpstreamError> {
        let body = self
            .get(&format!(
                "/candles/{}?tf={}&limit={}",
                pool_id,
                tf.as_str(),
                limit
            ))
            .await?;
        Ok(extract_array(&body, &["candles", "data"]))
    }

    /// 24h volume per pool.
    pub async fn fetch_volumes(&self) -> Result<Vec<Value>, UpstreamError> {
        let body = self.get("/volumes?tf=24h").await?;
        Ok(extract_array(&body, &["volumes", "data"]))
    }

    pub async fn fetch_asset(&self, mint: &str) -> Result<Value, UpstreamError> {
        self.get(&format!("/asset?id={}", mint)).await
    }

    pub async fn fetch_leaderboard(
        &self,
        id: &str,
        limit: u32,
    ) -> Result<Vec<Value>, UpstreamError> {
        let body = self
            .get(&format!("/leaderboard/{}?limit={}", id, limit))
            .await?;
        Ok(extract_array(&body, &["leaderboard", "data"]))
    }

    pub async fn fetch_liquidity_history(
        &self,
        pool_id: &str,
        limit: u32,
    ) -> Result<Vec<Value>, UpstreamError> {
        let body = self
            .get(&format!("/liquidity/{}?limit={}", pool_id, limit))
            .await?;
        Ok(extract_array(&body, &["liquidity", "data"]))
    }

    pub async fn health(&self) -> Result<Value, UpstreamError> {
        self.get("/health").await
    }

    /// Short-lived WebSocket auth ticket.
    pub async fn ws_ticket(&self) -> Result<String, UpstreamError> {
        let body = self.get("/ws-ticket").await?;
        body.get("ticket")
            .or_else(|| body.get("token"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or(UpstreamError::Parse {
                provider: "dex_api",
                detail: "missing ticket field".to_string(),
            })
    }
}

/// Array at the root or under one of `keys`.
fn extract_array(body: &Value, keys: &[&str]) -> Vec<Value> {
    if let Some(arr) = body.as_array() {
        return arr.clone();
    }
    for key in keys {
        if let Some(arr) = body.get(*key).and_then(|v| v.as_array()) {
            return arr.clone();
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_array_root() {
        let body = json!([{"id": 1}]);
        assert_eq!(extract_array(&body, &["pools"]).len(), 1);
    }

    #[test]
    fn test_extract_array_nested() {
        let body = json!({"pairs": [{"id": 1}, {"id": 2}]});
        assert_eq!(extract_array(&body, &["pools", "pairs"]).len(), 2);
    }

    #[test]
    fn test_extract_array_missing() {
        let body = json!({"something": 1});
        assert!(extract_array(&body, &["pools"]).is_empty());
    }

    #[test]
    fn test_timeframe_parse() {
        assert_eq!(Timeframe::parse("15m"), Some(Timeframe::M15));
        assert_eq!(Timeframe::parse("1d"), Some(Timeframe::D1));
        assert_eq!(Timeframe::parse("2h"), None);
    }
}
