//! Simple-price aggregator client. Network token only.

use super::birdeye::value_to_decimal;
use super::ProviderShared;
use crate::error::UpstreamError;
use crate::net::{fetch_with_retry, FetchOptions, Provider};
use rust_decimal::Decimal;

pub struct CoinGeckoClient {
    shared: ProviderShared,
    base_url: String,
}

impl CoinGeckoClient {
    pub fn new(shared: ProviderShared, base_url: String) -> Self {
        Self {
            shared,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// USD price of the network token (the `solana` id in this API's terms).
    pub async fn network_token_price(&self) -> Result<Option<Decimal>, UpstreamError> {
        self.shared.limiters.acquire(Provider::CoinGecko).await;
        let url = format!(
            "{}/simple/price?ids=solana&vs_currencies=usd",
            self.base_url
        );
        let opts = FetchOptions::new("coingecko");
        let result = fetch_with_retry(&self.shared.http, &url, &opts).await;
        let body = self.shared.observe(Provider::CoinGecko, result)?;
        Ok(body
            .get("solana")
            .and_then(|s| s.get("usd"))
            .and_then(value_to_decimal))
    }
}
