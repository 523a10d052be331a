//! Command API: the typed surface the chat front end drives.
//!
//! Invalid input is rejected with an enumerated reason and no state change.
//! Mutations touch the in-memory subscriber map and schedule a debounced
//! save; wallet subscription changes additionally nudge the wallet feed to
//! refresh its deltas.

use crate::error::CommandReject;
use crate::pools::{Pool, PoolRegistry, VolumeTable};
use crate::portfolio::{PortfolioEngine, PortfolioSnapshot, MAX_PORTFOLIO_WALLETS};
use crate::providers::dex_api::{DexApiClient, Timeframe};
use crate::subscribers::{FilterField, Subscriber, SubscriberStore, ThresholdKind};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Notify;

pub struct CommandApi {
    store: Arc<SubscriberStore>,
    registry: Arc<PoolRegistry>,
    volumes: Arc<VolumeTable>,
    portfolio: Arc<PortfolioEngine>,
    dex_api: Arc<DexApiClient>,
    /// Signaled whenever any subscriber's wallet subscriptions change.
    pub subscriptions_changed: Arc<Notify>,
    max_wallets: usize,
    max_watchlist: usize,
}

impl CommandApi {
    pub fn new(
        store: Arc<SubscriberStore>,
        registry: Arc<PoolRegistry>,
        volumes: Arc<VolumeTable>,
        portfolio: Arc<PortfolioEngine>,
        dex_api: Arc<DexApiClient>,
        max_wallets: usize,
        max_watchlist: usize,
    ) -> Self {
        Self {
            store,
            registry,
            volumes,
            portfolio,
            dex_api,
            subscriptions_changed: Arc::new(Notify::new()),
            max_wallets,
            max_watchlist,
        }
    }

    fn touch(&self, chat_id: i64) {
        self.store.ensure(chat_id);
        self.store.update(chat_id, |s| s.last_active = Utc::now());
    }

    fn save(&self) {
        Arc::clone(&self.store).request_flush();
    }

    /// Flip a toggle from the closed field set. Returns the new value.
    pub fn toggle(&self, chat_id: i64, field: &str) -> Result<bool, CommandReject> {
        let field = FilterField::parse(field).ok_or(CommandReject::UnknownToggle)?;
        self.touch(chat_id);
        let new_value = self
            .store
            .update(chat_id, |s| {
                let value = !s.get_toggle(field);
                s.set_toggle(field, value);
                value
            })
            .ok_or(CommandReject::UnknownSubscriber)?;
        self.save();
        Ok(new_value)
    }

    pub fn set_threshold(
        &self,
        chat_id: i64,
        which: ThresholdKind,
        amount_usd: Decimal,
    ) -> Result<(), CommandReject> {
        if amount_usd < Decimal::ZERO {
            return Err(CommandReject::InvalidThreshold);
        }
        self.touch(chat_id);
        self.store.update(chat_id, |s| match which {
            ThresholdKind::Primary => s.primary_trade_min = amount_usd,
            ThresholdKind::OtherTrade => s.other_trade_min = amount_usd,
            ThresholdKind::OtherLp => s.other_lp_min = amount_usd,
        });
        self.save();
        Ok(())
    }

    /// Snooze for `minutes`; 0 clears.
    pub fn set_snooze(&self, chat_id: i64, minutes: u64) -> Result<(), CommandReject> {
        self.touch(chat_id);
        let until = if minutes == 0 {
            0
        } else {
            Utc::now().timestamp() + (minutes as i64) * 60
        };
        self.store.update(chat_id, |s| s.snoozed_until = until);
        self.save();
        Ok(())
    }

    /// Both hours set (0..23, may wrap midnight) or both null to clear.
    pub fn set_quiet_hours(
        &self,
        chat_id: i64,
        start_utc: Option<u32>,
        end_utc: Option<u32>,
    ) -> Result<(), CommandReject> {
        let (start, end) = match (start_utc, end_utc) {
            (None, None) => (None, None),
            (Some(s), Some(e)) if s <= 23 && e <= 23 => (Some(s), Some(e)),
            _ => return Err(CommandReject::InvalidHour),
        };
        self.touch(chat_id);
        self.store.update(chat_id, |s| {
            s.quiet_start = start;
            s.quiet_end = end;
        });
        self.save();
        Ok(())
    }

    pub fn add_wallet(&self, chat_id: i64, address: &str) -> Result<(), CommandReject> {
        if !is_valid_address(address) {
            return Err(CommandReject::InvalidAddress);
        }
        self.touch(chat_id);
        let max = self.max_wallets;
        let result = self
            .store
            .update(chat_id, |s| {
                if s.wallet_subscriptions.contains(address) {
                    return Err(CommandReject::AlreadyPresent);
                }
                if s.wallet_subscriptions.len() >= max {
                    return Err(CommandReject::WalletCapReached);
                }
                s.wallet_subscriptions.insert(address.to_string());
                Ok(())
            })
            .ok_or(CommandReject::UnknownSubscriber)?;
        if result.is_ok() {
            self.save();
            self.subscriptions_changed.notify_waiters();
        }
        result
    }

    pub fn remove_wallet(&self, chat_id: i64, address: &str) -> Result<(), CommandReject> {
        self.touch(chat_id);
        let result = self
            .store
            .update(chat_id, |s| {
                if s.wallet_subscriptions.remove(address) {
                    Ok(())
                } else {
                    Err(CommandReject::NotPresent)
                }
            })
            .ok_or(CommandReject::UnknownSubscriber)?;
        if result.is_ok() {
            self.save();
            self.subscriptions_changed.notify_waiters();
        }
        result
    }

    pub fn add_portfolio_wallet(&self, chat_id: i64, address: &str) -> Result<(), CommandReject> {
        if !is_valid_address(address) {
            return Err(CommandReject::InvalidAddress);
        }
        self.touch(chat_id);
        let result = self
            .store
            .update(chat_id, |s| {
                if s.portfolio_wallets.iter().any(|w| w == address) {
                    return Err(CommandReject::AlreadyPresent);
                }
                if s.portfolio_wallets.len() >= MAX_PORTFOLIO_WALLETS {
                    return Err(CommandReject::PortfolioCapReached);
                }
                s.portfolio_wallets.push(address.to_string());
                Ok(())
            })
            .ok_or(CommandReject::UnknownSubscriber)?;
        if result.is_ok() {
            self.save();
        }
        result
    }

    pub fn remove_portfolio_wallet(
        &self,
        chat_id: i64,
        address: &str,
    ) -> Result<(), CommandReject> {
        self.touch(chat_id);
        let result = self
            .store
            .update(chat_id, |s| {
                let before = s.portfolio_wallets.len();
                s.portfolio_wallets.retain(|w| w != address);
                if s.portfolio_wallets.len() < before {
                    Ok(())
                } else {
                    Err(CommandReject::NotPresent)
                }
            })
            .ok_or(CommandReject::UnknownSubscriber)?;
        if result.is_ok() {
            self.save();
        }
        result
    }

    pub fn add_watchlist_pool(&self, chat_id: i64, pool_id: &str) -> Result<(), CommandReject> {
        if !is_valid_address(pool_id) {
            return Err(CommandReject::InvalidAddress);
        }
        self.touch(chat_id);
        let max = self.max_watchlist;
        let result = self
            .store
            .update(chat_id, |s| {
                if s.watchlist.contains(pool_id) {
                    return Err(CommandReject::AlreadyPresent);
                }
                if s.watchlist_size() >= max {
                    return Err(CommandReject::WatchlistCapReached);
                }
                s.watchlist.insert(pool_id.to_string());
                Ok(())
            })
            .ok_or(CommandReject::UnknownSubscriber)?;
        if result.is_ok() {
            self.save();
        }
        result
    }

    pub fn remove_watchlist_pool(&self, chat_id: i64, pool_id: &str) -> Result<(), CommandReject> {
        self.touch(chat_id);
        let result = self
            .store
            .update(chat_id, |s| {
                if s.watchlist.remove(pool_id) {
                    Ok(())
                } else {
                    Err(CommandReject::NotPresent)
                }
            })
            .ok_or(CommandReject::UnknownSubscriber)?;
        if result.is_ok() {
            self.save();
        }
        result
    }

    /// Tracked tokens share the watchlist budget.
    pub fn add_watchlist_token(&self, chat_id: i64, mint: &str) -> Result<(), CommandReject> {
        if !is_valid_address(mint) {
            return Err(CommandReject::InvalidAddress);
        }
        self.touch(chat_id);
        let max = self.max_watchlist;
        let result = self
            .store
            .update(chat_id, |s| {
                if s.tracked_tokens.contains(mint) {
                    return Err(CommandReject::AlreadyPresent);
                }
                if s.watchlist_size() >= max {
                    return Err(CommandReject::WatchlistCapReached);
                }
                s.tracked_tokens.insert(mint.to_string());
                Ok(())
            })
            .ok_or(CommandReject::UnknownSubscriber)?;
        if result.is_ok() {
            self.save();
        }
        result
    }

    pub fn remove_watchlist_token(&self, chat_id: i64, mint: &str) -> Result<(), CommandReject> {
        self.touch(chat_id);
        let result = self
            .store
            .update(chat_id, |s| {
                if s.tracked_tokens.remove(mint) {
                    Ok(())
                } else {
                    Err(CommandReject::NotPresent)
                }
            })
            .ok_or(CommandReject::UnknownSubscriber)?;
        if result.is_ok() {
            self.save();
        }
        result
    }

    pub async fn sync_portfolio(&self, chat_id: i64) -> Option<PortfolioSnapshot> {
        self.touch(chat_id);
        Arc::clone(&self.portfolio).sync(chat_id).await
    }

    // Read-only queries.

    pub fn get_subscriber(&self, chat_id: i64) -> Option<Subscriber> {
        self.store.get(chat_id)
    }

    pub fn get_pool(&self, pool_id: &str) -> Option<Pool> {
        self.registry.snapshot().get(pool_id).cloned()
    }

    /// Case-insensitive substring search over pair names and pool ids.
    pub fn search_pools(&self, query: &str) -> Vec<Pool> {
        let needle = query.to_ascii_lowercase();
        self.registry
            .snapshot()
            .iter()
            .filter(|p| {
                p.pair_name.to_ascii_lowercase().contains(&needle)
                    || p.id.to_ascii_lowercase().contains(&needle)
            })
            .cloned()
            .collect()
    }

    pub fn top_pools_by_volume(&self, n: usize) -> Vec<(Pool, Decimal)> {
        let snapshot = self.registry.snapshot();
        self.volumes
            .top_pools(n)
            .into_iter()
            .filter_map(|(pool_id, volume)| snapshot.get(&pool_id).cloned().map(|p| (p, volume)))
            .collect()
    }

    pub async fn leaderboard(&self, id: &str, limit: u32) -> Vec<Value> {
        self.dex_api
            .fetch_leaderboard(id, limit)
            .await
            .unwrap_or_default()
    }

    pub async fn candles(&self, pool_id: &str, tf: Timeframe, limit: u32) -> Vec<Value> {
        self.dex_api
            .fetch_candles(pool_id, tf, limit)
            .await
            .unwrap_or_default()
    }

    pub async fn liquidity_history(&self, pool_id: &str, limit: u32) -> Vec<Value> {
        self.dex_api
            .fetch_liquidity_history(pool_id, limit)
            .await
            .unwrap_or_default()
    }
}

/// Base58 string of length 32..=44 that decodes to 32 bytes.
pub fn is_valid_address(s: &str) -> bool {
    if s.len() < 32 || s.len() > 44 {
        return false;
    }
    match bs58::decode(s).into_vec() {
        Ok(bytes) => bytes.len() == 32,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WALLET_A: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";
    const WALLET_B: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

    #[test]
    fn test_is_valid_address() {
        assert!(is_valid_address(WALLET_A));
        assert!(!is_valid_address("tooshort"));
        assert!(!is_valid_address("0OIl+/invalid-base58-chars-yet-long-enough"));
    }

    #[test]
    fn test_address_length_bounds() {
        // 31 chars decodes fine but is below the minimum length.
        assert!(!is_valid_address(&WALLET_A[..31]));
    }

    #[test]
    fn test_wallet_b_valid() {
        assert!(is_valid_address(WALLET_B));
    }
}
