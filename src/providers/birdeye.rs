//! Aggregator B client: single-token price, token overview, wallet PnL.

use super::ProviderShared;
use crate::error::UpstreamError;
use crate::net::{fetch_with_retry, FetchOptions, Provider};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

pub struct BirdeyeClient {
    shared: ProviderShared,
    base_url: String,
    api_key: Option<String>,
}

impl BirdeyeClient {
    pub fn new(shared: ProviderShared, base_url: String, api_key: Option<String>) -> Self {
        Self {
            shared,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn get(&self, path: &str) -> Result<Value, UpstreamError> {
        self.shared.limiters.acquire(Provider::Birdeye).await;
        let url = format!("{}{}", self.base_url, path);
        let mut opts = FetchOptions::new("birdeye");
        if let Some(key) = &self.api_key {
            opts = opts.with_header("X-API-KEY", key.clone());
        }
        let result = fetch_with_retry(&self.shared.http, &url, &opts).await;
        self.shared.observe(Provider::Birdeye, result)
    }

    pub async fn price(&self, mint: &str) -> Result<Option<Decimal>, UpstreamError> {
        let body = self.get(&format!("/defi/price?address={}", mint)).await?;
        Ok(body
            .get("data")
            .and_then(|d| d.get("value"))
            .and_then(value_to_decimal))
    }

    pub async fn token_overview(&self, mint: &str) -> Result<Value, UpstreamError> {
        let body = self
            .get(&format!("/defi/token_overview?address={}", mint))
            .await?;
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }

    /// Wallet-level net worth and PnL where the aggregator has it.
    pub async fn wallet_portfolio(&self, wallet: &str) -> Result<Value, UpstreamError> {
        let body = self
            .get(&format!("/v1/wallet/token_list?wallet={}", wallet))
            .await?;
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }
}

pub(crate) fn value_to_decimal(v: &Value) -> Option<Decimal> {
    match v {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => Decimal::from_str(s).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_to_decimal() {
        assert_eq!(
            value_to_decimal(&json!(1.5)),
            Some(Decimal::from_str("1.5").unwrap())
        );
        assert_eq!(
            value_to_decimal(&json!("2.25")),
            Some(Decimal::from_str("2.25").unwrap())
        );
        assert_eq!(value_to_decimal(&json!(null)), None);
    }
}
