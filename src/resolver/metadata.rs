//! Token symbol/decimals resolution.
//!
//! `get_symbol` is synchronous: it returns the cached symbol or a short-form
//! placeholder and schedules an async lookup. Lookups walk the provider
//! chain in authority order and the first non-empty symbol wins; concurrent
//! lookups for the same mint coalesce through an in-flight set.

use crate::cache::BoundedCache;
use crate::providers::{DexApiClient, DexScreenerClient, RpcAggregatorClient, SolscanClient};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Where a token's metadata came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaSource {
    ProtocolApi,
    Aggregator,
    DexScreener,
    OnchainMetadata,
    Default,
}

#[derive(Debug, Clone)]
pub struct TokenMeta {
    pub symbol: String,
    pub decimals: u8,
    pub name: Option<String>,
    pub source: MetaSource,
}

/// Metadata entries live until process restart or a deliberate cap sweep, so
/// the cache TTL is effectively unbounded.
const META_TTL_SECS: i64 = 10 * 365 * 24 * 3600;
const DEFAULT_DECIMALS: u8 = 9;

struct MetaInner {
    cache: BoundedCache<TokenMeta>,
    in_flight: Mutex<HashSet<String>>,
    dex_api: Arc<DexApiClient>,
    solscan: Arc<SolscanClient>,
    dexscreener: Arc<DexScreenerClient>,
    rpc: Arc<RpcAggregatorClient>,
}

#[derive(Clone)]
pub struct TokenMetaResolver {
    inner: Arc<MetaInner>,
}

impl TokenMetaResolver {
    pub fn new(
        capacity: usize,
        dex_api: Arc<DexApiClient>,
        solscan: Arc<SolscanClient>,
        dexscreener: Arc<DexScreenerClient>,
        rpc: Arc<RpcAggregatorClient>,
    ) -> Self {
        Self {
            inner: Arc::new(MetaInner {
                cache: BoundedCache::new(capacity, META_TTL_SECS),
                in_flight: Mutex::new(HashSet::new()),
                dex_api,
                solscan,
                dexscreener,
                rpc,
            }),
        }
    }

    /// Cached symbol, or a `xxxx…yyyy` placeholder while an async lookup is
    /// scheduled.
    pub fn get_symbol(&self, mint: &str) -> String {
        if let Some(meta) = self.inner.cache.get(mint) {
            return meta.symbol;
        }
        self.schedule_lookup(mint);
        short_form(mint)
    }

    pub fn get_meta(&self, mint: &str) -> Option<TokenMeta> {
        self.inner.cache.get(mint)
    }

    /// Decimals if known; decoders should prefer message-embedded decimals.
    pub fn get_decimals(&self, mint: &str) -> Option<u8> {
        self.inner.cache.get(mint).map(|m| m.decimals)
    }

    pub fn insert(&self, mint: &str, meta: TokenMeta) {
        self.inner.cache.insert(mint, meta);
    }

    /// Hard cap enforced by the scheduler's prune job.
    pub fn cap_to(&self, cap: usize) -> usize {
        self.inner.cache.cap_to(cap)
    }

    pub fn len(&self) -> usize {
        self.inner.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.cache.is_empty()
    }

    fn schedule_lookup(&self, mint: &str) {
        {
            let mut in_flight = self.inner.in_flight.lock();
            if !in_flight.insert(mint.to_string()) {
                return;
            }
        }
        let inner = Arc::clone(&self.inner);
        let mint = mint.to_string();
        tokio::spawn(async move {
            inner.lookup(&mint).await;
            inner.in_flight.lock().remove(&mint);
        });
    }
}

impl MetaInner {
    /// Provider chain in authority order; first non-empty symbol wins and is
    /// cached until restart.
    async fn lookup(&self, mint: &str) {
        if self.cache.get(mint).is_some() {
            return;
        }

        // Protocol API is authoritative for tokens in protocol pools.
        if let Ok(asset) = self.dex_api.fetch_asset(mint).await {
            let symbol = asset
                .get("symbol")
                .and_then(|s| s.as_str())
                .filter(|s| !s.is_empty());
            if let Some(symbol) = symbol {
                let decimals = asset
                    .get("decimals")
                    .and_then(|d| d.as_u64())
                    .and_then(|d| u8::try_from(d).ok())
                    .unwrap_or(DEFAULT_DECIMALS);
                self.cache.insert(
                    mint,
                    TokenMeta {
                        symbol: symbol.to_string(),
                        decimals,
                        name: asset
                            .get("name")
                            .and_then(|s| s.as_str())
                            .map(|s| s.to_string()),
                        source: MetaSource::ProtocolApi,
                    },
                );
                return;
            }
        }

        if let Ok(meta) = self.solscan.token_meta(mint).await {
            if let Some(symbol) = meta.symbol {
                self.cache.insert(
                    mint,
                    TokenMeta {
                        symbol,
                        decimals: meta.decimals.unwrap_or(DEFAULT_DECIMALS),
                        name: meta.name,
                        source: MetaSource::Aggregator,
                    },
                );
                return;
            }
        }

        if let Ok(info) = self.dexscreener.token_pair(mint).await {
            if let Some(symbol) = info.symbol {
                self.cache.insert(
                    mint,
                    TokenMeta {
                        symbol,
                        decimals: DEFAULT_DECIMALS,
                        name: info.name,
                        source: MetaSource::DexScreener,
                    },
                );
                return;
            }
        }

        if let Ok(assets) = self.rpc.get_asset_batch(&[mint.to_string()]).await {
            if let Some(asset) = assets.first() {
                let symbol = asset
                    .get("content")
                    .and_then(|c| c.get("metadata"))
                    .and_then(|m| m.get("symbol"))
                    .and_then(|s| s.as_str())
                    .filter(|s| !s.is_empty());
                if let Some(symbol) = symbol {
                    let decimals = asset
                        .get("token_info")
                        .and_then(|t| t.get("decimals"))
                        .and_then(|d| d.as_u64())
                        .and_then(|d| u8::try_from(d).ok())
                        .unwrap_or(DEFAULT_DECIMALS);
                    self.cache.insert(
                        mint,
                        TokenMeta {
                            symbol: symbol.to_string(),
                            decimals,
                            name: None,
                            source: MetaSource::OnchainMetadata,
                        },
                    );
                    return;
                }
            }
        }

        tracing::debug!(mint, "No provider returned a symbol");
    }
}

/// `xxxx…yyyy` short form of a mint.
pub fn short_form(mint: &str) -> String {
    if mint.len() > 8 {
        format!("{}\u{2026}{}", &mint[..4], &mint[mint.len() - 4..])
    } else {
        mint.to_string()
    }
}

/// Escape a symbol for the chat platform's limited markdown dialect.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '>' | '#' | '+' | '-' | '='
                | '|' | '{' | '}' | '.' | '!'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{ApiHealthRegistry, RateLimiters};
    use crate::providers::ProviderShared;

    fn resolver() -> TokenMetaResolver {
        let shared = ProviderShared::new(
            Arc::new(RateLimiters::new()),
            Arc::new(ApiHealthRegistry::new()),
        );
        TokenMetaResolver::new(
            100,
            Arc::new(DexApiClient::new(
                shared.clone(),
                "http://localhost:0".to_string(),
            )),
            Arc::new(SolscanClient::new(
                shared.clone(),
                "http://localhost:0".to_string(),
            )),
            Arc::new(DexScreenerClient::new(
                shared.clone(),
                "http://localhost:0".to_string(),
            )),
            Arc::new(RpcAggregatorClient::new(
                shared,
                "http://localhost:0".to_string(),
                None,
            )),
        )
    }

    #[test]
    fn test_short_form() {
        assert_eq!(
            short_form("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"),
            "EPjF\u{2026}Dt1v"
        );
        assert_eq!(short_form("short"), "short");
    }

    #[tokio::test]
    async fn test_cached_symbol_returned() {
        let resolver = resolver();
        resolver.insert(
            "MINT",
            TokenMeta {
                symbol: "ABC".to_string(),
                decimals: 6,
                name: None,
                source: MetaSource::ProtocolApi,
            },
        );
        assert_eq!(resolver.get_symbol("MINT"), "ABC");
        assert_eq!(resolver.get_decimals("MINT"), Some(6));
    }

    #[tokio::test]
    async fn test_uncached_symbol_is_placeholder() {
        let resolver = resolver();
        let symbol = resolver.get_symbol("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v");
        assert_eq!(symbol, "EPjF\u{2026}Dt1v");
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("AB_C"), "AB\\_C");
        assert_eq!(escape_markdown("A*B[C]"), "A\\*B\\[C\\]");
        assert_eq!(escape_markdown("plain"), "plain");
    }
}
