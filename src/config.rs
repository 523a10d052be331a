//! Configuration management for DLMM Sentinel
//!
//! Loads configuration from YAML files and environment variables.
//! Environment variables override YAML values.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Chain-level identifiers (program id, primary token, stables)
    pub chain: ChainConfig,
    /// Upstream endpoint configuration
    pub upstream: UpstreamConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Feed reconnect and polling intervals
    #[serde(default)]
    pub feeds: FeedConfig,
    /// Refresh intervals for scheduled jobs
    #[serde(default)]
    pub refresh: RefreshConfig,
    /// Per-subscriber caps and fan-out limits
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Daily digest schedule
    #[serde(default)]
    pub digest: DigestConfig,
    /// Debug logging toggle
    #[serde(default)]
    pub debug: bool,
}

/// Chain-level identifiers
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// The DEX program id (base58)
    pub dex_program_id: String,
    /// The protocol's focal asset mint
    pub primary_token_mint: String,
    /// Wrapped network token mint (SOL)
    #[serde(default = "default_network_token_mint")]
    pub network_token_mint: String,
    /// Mints that always resolve to $1.00
    #[serde(default = "default_stable_mints")]
    pub stable_mints: Vec<String>,
    /// Stake vaults whose receipt tokens count as staked positions
    #[serde(default)]
    pub stake_vaults: Vec<StakeVaultConfig>,
}

/// A stake vault: receipt-token supply is the total claims, the vault's
/// underlying balance is the total stake.
#[derive(Debug, Clone, Deserialize)]
pub struct StakeVaultConfig {
    pub receipt_mint: String,
    pub underlying_mint: String,
    pub vault_address: String,
}

fn default_network_token_mint() -> String {
    "So11111111111111111111111111111111111111112".to_string()
}

fn default_stable_mints() -> Vec<String> {
    vec![
        // USDC, USDT mainnet
        "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string(),
        "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB".to_string(),
    ]
}

/// Upstream endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// DEX HTTP API base URL
    pub dex_api_url: String,
    /// DEX WebSocket URL (ticket appended as query parameter)
    pub dex_ws_url: String,
    /// RPC aggregator HTTP endpoint (aggregator A)
    pub rpc_url: String,
    /// RPC aggregator WebSocket endpoint (wallet feed)
    pub rpc_ws_url: String,
    /// Aggregator A API key
    #[serde(default)]
    pub rpc_api_key: Option<String>,
    /// Aggregator B base URL (price / overview / wallet PnL)
    #[serde(default = "default_birdeye_url")]
    pub birdeye_url: String,
    /// Aggregator B API key
    #[serde(default)]
    pub birdeye_api_key: Option<String>,
    /// Pair-style price aggregator base URL
    #[serde(default = "default_dexscreener_url")]
    pub dexscreener_url: String,
    /// Simple-price aggregator base URL (network token only)
    #[serde(default = "default_coingecko_url")]
    pub coingecko_url: String,
    /// Token meta / transaction parse fallback base URL
    #[serde(default = "default_solscan_url")]
    pub solscan_url: String,
    /// Default per-request deadline in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

fn default_birdeye_url() -> String {
    "https://public-api.birdeye.so".to_string()
}

fn default_dexscreener_url() -> String {
    "https://api.dexscreener.com".to_string()
}

fn default_coingecko_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_solscan_url() -> String {
    "https://public-api.solscan.io".to_string()
}

fn default_http_timeout() -> u64 {
    15
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/sentinel.db")
}

fn default_max_connections() -> u32 {
    5
}

/// Feed reconnect and polling configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Base reconnect delay in milliseconds (doubles per attempt, capped at 5 min)
    #[serde(default = "default_ws_reconnect_base")]
    pub ws_reconnect_base_ms: u64,
    /// Keepalive ping interval in seconds
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,
    /// Backup trade polling interval in milliseconds
    #[serde(default = "default_trades_poll")]
    pub trades_poll_ms: u64,
    /// Number of top pools covered by the backup poller
    #[serde(default = "default_backup_pool_count")]
    pub backup_pool_count: usize,
    /// Trades requested per pool subscription
    #[serde(default = "default_subscribe_limit")]
    pub subscribe_limit: u32,
}

fn default_ws_reconnect_base() -> u64 {
    15_000
}

fn default_keepalive() -> u64 {
    30
}

fn default_trades_poll() -> u64 {
    60_000
}

fn default_backup_pool_count() -> usize {
    20
}

fn default_subscribe_limit() -> u32 {
    10
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ws_reconnect_base_ms: default_ws_reconnect_base(),
            keepalive_secs: default_keepalive(),
            trades_poll_ms: default_trades_poll(),
            backup_pool_count: default_backup_pool_count(),
            subscribe_limit: default_subscribe_limit(),
        }
    }
}

/// Scheduled refresh intervals
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    /// Pool snapshot refresh interval in milliseconds
    #[serde(default = "default_pool_refresh")]
    pub pool_refresh_ms: u64,
    /// Price refresh interval in milliseconds
    #[serde(default = "default_price_refresh")]
    pub price_refresh_ms: u64,
    /// 24h volume table refresh interval in milliseconds
    #[serde(default = "default_volume_refresh")]
    pub volume_refresh_ms: u64,
    /// Upstream health check interval in milliseconds
    #[serde(default = "default_health_check")]
    pub health_check_ms: u64,
    /// Cache pruning interval in milliseconds
    #[serde(default = "default_cache_prune")]
    pub cache_prune_ms: u64,
    /// Debounced persistence flush interval in milliseconds
    #[serde(default = "default_persist_flush")]
    pub persist_flush_ms: u64,
    /// Portfolio auto-sync interval in milliseconds
    #[serde(default = "default_portfolio_auto_sync")]
    pub portfolio_auto_sync_ms: u64,
    /// Debounce window for subscriber saves in milliseconds
    #[serde(default = "default_save_debounce")]
    pub save_debounce_ms: u64,
}

fn default_pool_refresh() -> u64 {
    300_000
}

fn default_price_refresh() -> u64 {
    300_000
}

fn default_volume_refresh() -> u64 {
    300_000
}

fn default_health_check() -> u64 {
    60_000
}

fn default_cache_prune() -> u64 {
    900_000
}

fn default_persist_flush() -> u64 {
    300_000
}

fn default_portfolio_auto_sync() -> u64 {
    300_000
}

fn default_save_debounce() -> u64 {
    2_000
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            pool_refresh_ms: default_pool_refresh(),
            price_refresh_ms: default_price_refresh(),
            volume_refresh_ms: default_volume_refresh(),
            health_check_ms: default_health_check(),
            cache_prune_ms: default_cache_prune(),
            persist_flush_ms: default_persist_flush(),
            portfolio_auto_sync_ms: default_portfolio_auto_sync(),
            save_debounce_ms: default_save_debounce(),
        }
    }
}

/// Per-subscriber caps and cache bounds
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Max tracked wallets per subscriber
    #[serde(default = "default_max_wallets")]
    pub max_wallets_per_user: usize,
    /// Max watchlist entries (pools + tracked tokens) per subscriber
    #[serde(default = "default_max_watchlist")]
    pub max_watchlist_items: usize,
    /// Recent-alerts ring length
    #[serde(default = "default_max_recent_alerts")]
    pub max_recent_alerts: usize,
    /// Default bounded-cache capacity
    #[serde(default = "default_max_cache_size")]
    pub max_cache_size: usize,
    /// Token metadata cache hard cap (enforced at prune time)
    #[serde(default = "default_meta_cache_cap")]
    pub token_meta_cache_cap: usize,
    /// In-memory seen-tx set capacity per source
    #[serde(default = "default_seen_tx_cap")]
    pub seen_tx_capacity: usize,
}

fn default_max_wallets() -> usize {
    10
}

fn default_max_watchlist() -> usize {
    25
}

fn default_max_recent_alerts() -> usize {
    50
}

fn default_max_cache_size() -> usize {
    10_000
}

fn default_meta_cache_cap() -> usize {
    50_000
}

fn default_seen_tx_cap() -> usize {
    20_000
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_wallets_per_user: default_max_wallets(),
            max_watchlist_items: default_max_watchlist(),
            max_recent_alerts: default_max_recent_alerts(),
            max_cache_size: default_max_cache_size(),
            token_meta_cache_cap: default_meta_cache_cap(),
            seen_tx_capacity: default_seen_tx_cap(),
        }
    }
}

/// Daily digest schedule (UTC)
#[derive(Debug, Clone, Deserialize)]
pub struct DigestConfig {
    #[serde(default = "default_digest_hour")]
    pub daily_digest_hour: u32,
    #[serde(default)]
    pub daily_digest_minute: u32,
    /// Seen-tx prune hour (UTC)
    #[serde(default = "default_prune_hour")]
    pub seen_tx_prune_hour: u32,
}

fn default_digest_hour() -> u32 {
    9
}

fn default_prune_hour() -> u32 {
    3
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            daily_digest_hour: default_digest_hour(),
            daily_digest_minute: 0,
            seen_tx_prune_hour: default_prune_hour(),
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    ///
    /// Order of precedence (highest wins):
    /// 1. Environment variables (SENTINEL_ prefix, __ separator)
    /// 2. config/local.yaml (gitignored)
    /// 3. config/default.yaml
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("SENTINEL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate the loaded configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.chain.dex_program_id.is_empty() {
            return Err("chain.dex_program_id must be set".to_string());
        }
        if self.chain.primary_token_mint.is_empty() {
            return Err("chain.primary_token_mint must be set".to_string());
        }
        if self.upstream.dex_api_url.is_empty() {
            return Err("upstream.dex_api_url must be set".to_string());
        }
        if self.digest.daily_digest_hour > 23 {
            return Err("digest.daily_digest_hour must be in 0..24".to_string());
        }
        if self.digest.daily_digest_minute > 59 {
            return Err("digest.daily_digest_minute must be in 0..60".to_string());
        }
        if self.limits.max_wallets_per_user == 0 {
            return Err("limits.max_wallets_per_user must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> AppConfig {
        AppConfig {
            chain: ChainConfig {
                dex_program_id: "DLMMqvbkdFmiqYtZeDgAdqGSt2hGnPPWjQ3o8Gq8aSSE".to_string(),
                primary_token_mint: "PRiME1111111111111111111111111111111111111".to_string(),
                network_token_mint: default_network_token_mint(),
                stable_mints: default_stable_mints(),
                stake_vaults: Vec::new(),
            },
            upstream: UpstreamConfig {
                dex_api_url: "https://api.dex.example".to_string(),
                dex_ws_url: "wss://ws.dex.example".to_string(),
                rpc_url: "https://rpc.example".to_string(),
                rpc_ws_url: "wss://rpc.example".to_string(),
                rpc_api_key: None,
                birdeye_url: default_birdeye_url(),
                birdeye_api_key: None,
                dexscreener_url: default_dexscreener_url(),
                coingecko_url: default_coingecko_url(),
                solscan_url: default_solscan_url(),
                http_timeout_secs: default_http_timeout(),
            },
            database: DatabaseConfig {
                path: default_db_path(),
                max_connections: default_max_connections(),
            },
            feeds: FeedConfig::default(),
            refresh: RefreshConfig::default(),
            limits: LimitsConfig::default(),
            digest: DigestConfig::default(),
            debug: false,
        }
    }

    #[test]
    fn test_validate_ok() {
        assert!(minimal().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_digest_hour() {
        let mut cfg = minimal();
        cfg.digest.daily_digest_hour = 24;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_defaults() {
        let cfg = minimal();
        assert_eq!(cfg.refresh.price_refresh_ms, 300_000);
        assert_eq!(cfg.refresh.save_debounce_ms, 2_000);
        assert_eq!(cfg.feeds.ws_reconnect_base_ms, 15_000);
        assert_eq!(cfg.digest.daily_digest_hour, 9);
    }
}
