//! Token-meta fallback client (Solscan shape).

use super::ProviderShared;
use crate::error::UpstreamError;
use crate::net::{fetch_with_retry, FetchOptions, Provider};
use serde_json::Value;

pub struct SolscanClient {
    shared: ProviderShared,
    base_url: String,
}

#[derive(Debug, Clone, Default)]
pub struct TokenMetaInfo {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub decimals: Option<u8>,
}

impl SolscanClient {
    pub fn new(shared: ProviderShared, base_url: String) -> Self {
        Self {
            shared,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn token_meta(&self, mint: &str) -> Result<TokenMetaInfo, UpstreamError> {
        self.shared.limiters.acquire(Provider::Solscan).await;
        let url = format!("{}/token/meta?tokenAddress={}", self.base_url, mint);
        let opts = FetchOptions::new("solscan");
        let result = fetch_with_retry(&self.shared.http, &url, &opts).await;
        let body = self.shared.observe(Provider::Solscan, result)?;
        Ok(parse_meta(&body))
    }

    /// Parsed transaction detail, used when a feed message carries only a
    /// signature.
    pub async fn transaction(&self, sig: &str) -> Result<Value, UpstreamError> {
        self.shared.limiters.acquire(Provider::Solscan).await;
        let url = format!("{}/transaction/{}", self.base_url, sig);
        let opts = FetchOptions::new("solscan");
        let result = fetch_with_retry(&self.shared.http, &url, &opts).await;
        self.shared.observe(Provider::Solscan, result)
    }
}

fn parse_meta(body: &Value) -> TokenMetaInfo {
    let data = body.get("data").unwrap_or(body);
    TokenMetaInfo {
        symbol: data
            .get("symbol")
            .and_then(|s| s.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string()),
        name: data
            .get("name")
            .and_then(|s| s.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string()),
        decimals: data
            .get("decimals")
            .and_then(|d| d.as_u64())
            .and_then(|d| u8::try_from(d).ok()),
    }
}
