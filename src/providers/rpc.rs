//! RPC aggregator client (aggregator A).
//!
//! JSON-RPC over HTTP with an optional API key, plus the aggregator's
//! asset-batch extension for token metadata. Batched price lookups go
//! through the asset endpoint with up to 50 mints per request.

use super::ProviderShared;
use crate::error::UpstreamError;
use crate::net::http::post_with_retry;
use crate::net::{FetchOptions, Provider};
use serde_json::{json, Value};

pub const ASSET_BATCH_LIMIT: usize = 50;

pub struct RpcAggregatorClient {
    shared: ProviderShared,
    url: String,
}

impl RpcAggregatorClient {
    pub fn new(shared: ProviderShared, url: String, api_key: Option<String>) -> Self {
        let url = match api_key {
            Some(key) if !key.is_empty() => format!("{}?api-key={}", url.trim_end_matches('/'), key),
            _ => url,
        };
        Self { shared, url }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, UpstreamError> {
        self.shared.limiters.acquire(Provider::RpcAggregator).await;
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let opts = FetchOptions::new("rpc_aggregator");
        let result = post_with_retry(&self.shared.http, &self.url, &body, &opts).await;
        let response = self.shared.observe(Provider::RpcAggregator, result)?;
        if let Some(err) = response.get("error") {
            return Err(UpstreamError::Parse {
                provider: "rpc_aggregator",
                detail: err.to_string(),
            });
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Native balance in lamports.
    pub async fn get_balance(&self, wallet: &str) -> Result<u64, UpstreamError> {
        let result = self.call("getBalance", json!([wallet])).await?;
        Ok(result
            .get("value")
            .and_then(|v| v.as_u64())
            .unwrap_or_default())
    }

    pub async fn get_token_supply(&self, mint: &str) -> Result<Value, UpstreamError> {
        self.call("getTokenSupply", json!([mint])).await
    }

    pub async fn get_token_account_balance(&self, account: &str) -> Result<Value, UpstreamError> {
        self.call("getTokenAccountBalance", json!([account])).await
    }

    pub async fn get_signatures_for_address(
        &self,
        address: &str,
        limit: u32,
    ) -> Result<Vec<Value>, UpstreamError> {
        let result = self
            .call(
                "getSignaturesForAddress",
                json!([address, {"limit": limit}]),
            )
            .await?;
        Ok(result.as_array().cloned().unwrap_or_default())
    }

    /// Fungible token accounts owned by a wallet, parsed encoding.
    pub async fn get_parsed_token_accounts_by_owner(
        &self,
        owner: &str,
    ) -> Result<Vec<Value>, UpstreamError> {
        let result = self
            .call(
                "getParsedTokenAccountsByOwner",
                json!([
                    owner,
                    {"programId": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"},
                    {"encoding": "jsonParsed"},
                ]),
            )
            .await?;
        Ok(result
            .get("value")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default())
    }

    /// Aggregator extension: all assets (fungible + NFT) owned by a wallet.
    pub async fn get_assets_by_owner(&self, owner: &str) -> Result<Vec<Value>, UpstreamError> {
        let result = self
            .call(
                "getAssetsByOwner",
                json!({"ownerAddress": owner, "page": 1, "limit": 1000}),
            )
            .await?;
        Ok(result
            .get("items")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default())
    }

    pub async fn get_transaction(&self, sig: &str) -> Result<Value, UpstreamError> {
        self.call(
            "getTransaction",
            json!([sig, {"encoding": "jsonParsed", "maxSupportedTransactionVersion": 0}]),
        )
        .await
    }

    pub async fn get_account_info(&self, address: &str) -> Result<Value, UpstreamError> {
        self.call("getAccountInfo", json!([address, {"encoding": "jsonParsed"}]))
            .await
    }

    pub async fn get_token_largest_accounts(&self, mint: &str) -> Result<Vec<Value>, UpstreamError> {
        let result = self.call("getTokenLargestAccounts", json!([mint])).await?;
        Ok(result
            .get("value")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default())
    }

    /// Asset batch: metadata (and token-info price where available) for up to
    /// 50 mints per request.
    pub async fn get_asset_batch(&self, mints: &[String]) -> Result<Vec<Value>, UpstreamError> {
        let mut all = Vec::with_capacity(mints.len());
        for chunk in mints.chunks(ASSET_BATCH_LIMIT) {
            let result = self.call("getAssetBatch", json!({"ids": chunk})).await?;
            if let Some(items) = result.as_array() {
                all.extend(items.iter().cloned());
            }
        }
        Ok(all)
    }
}
