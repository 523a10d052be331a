//! Upstream HTTP clients.
//!
//! Each client owns its base URL and optional API key, shares the
//! process-wide rate limiters and the health registry, and exposes the small
//! typed surface the core needs. Payloads stay `serde_json::Value` at the
//! edges; normalization happens in the consumers.

pub mod birdeye;
pub mod coingecko;
pub mod dex_api;
pub mod dexscreener;
pub mod rpc;
pub mod solscan;

pub use birdeye::BirdeyeClient;
pub use coingecko::CoinGeckoClient;
pub use dex_api::DexApiClient;
pub use dexscreener::DexScreenerClient;
pub use rpc::RpcAggregatorClient;
pub use solscan::SolscanClient;

use crate::net::{ApiHealthRegistry, Provider, RateLimiters};
use std::sync::Arc;

/// Shared plumbing every provider client carries.
#[derive(Clone)]
pub struct ProviderShared {
    pub http: reqwest::Client,
    pub limiters: Arc<RateLimiters>,
    pub health: Arc<ApiHealthRegistry>,
}

impl ProviderShared {
    pub fn new(limiters: Arc<RateLimiters>, health: Arc<ApiHealthRegistry>) -> Self {
        Self {
            http: reqwest::Client::new(),
            limiters,
            health,
        }
    }

    /// Record call outcome in the health registry and pass the result through.
    pub fn observe<T, E>(&self, provider: Provider, result: Result<T, E>) -> Result<T, E> {
        match &result {
            Ok(_) => self.health.record_success(provider),
            Err(_) => self.health.record_failure(provider),
        }
        result
    }
}
