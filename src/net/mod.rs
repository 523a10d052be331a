//! Upstream plumbing: rate limiting, retrying HTTP fetch, provider health.

pub mod health;
pub mod http;
pub mod rate_limiter;

pub use health::{ApiHealthRegistry, HealthStatus};
pub use http::{fetch_with_retry, FetchOptions};
pub use rate_limiter::{RateLimiter, RateLimiters};

/// Identifiers for the upstream providers the core talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    DexApi,
    RpcAggregator,
    Birdeye,
    DexScreener,
    CoinGecko,
    Solscan,
}

impl Provider {
    pub fn name(&self) -> &'static str {
        match self {
            Provider::DexApi => "dex_api",
            Provider::RpcAggregator => "rpc_aggregator",
            Provider::Birdeye => "birdeye",
            Provider::DexScreener => "dexscreener",
            Provider::CoinGecko => "coingecko",
            Provider::Solscan => "solscan",
        }
    }

    /// Default sliding-window budget, requests per second.
    pub fn default_rate(&self) -> u32 {
        match self {
            Provider::RpcAggregator => 50,
            Provider::Birdeye => 30,
            Provider::DexScreener => 10,
            Provider::DexApi => 30,
            Provider::CoinGecko => 10,
            Provider::Solscan => 10,
        }
    }

    pub fn all() -> [Provider; 6] {
        [
            Provider::DexApi,
            Provider::RpcAggregator,
            Provider::Birdeye,
            Provider::DexScreener,
            Provider::CoinGecko,
            Provider::Solscan,
        ]
    }
}
