//! Portfolio engine: multi-wallet aggregation with request coalescing.
//!
//! `sync` assembles a subscriber's snapshot across at most five wallets.
//! Concurrent syncs for the same chat id join the in-progress future instead
//! of fanning out duplicate upstream traffic.

pub mod balances;
pub mod pnl;
pub mod snapshot;
pub mod staking;
pub mod trades;

pub use snapshot::PortfolioSnapshot;

use crate::pools::PoolRegistry;
use crate::providers::BirdeyeClient;
use crate::resolver::TokenMetaResolver;
use crate::subscribers::SubscriberStore;
use balances::{BalanceFetcher, WalletBalances};
use chrono::Utc;
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use snapshot::{
    LpPosition, StakedPosition, TokenHolding, TradeRecord, WalletBreakdown, MAX_SNAPSHOT_TOKENS,
    MAX_SNAPSHOT_TRADES,
};
use staking::StakingFetcher;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use trades::TradeFetcher;

/// Heuristic LP positions above this are treated as misidentified.
fn lp_heuristic_cap() -> Decimal {
    Decimal::from(5_000_000u64)
}

/// Wallets per subscriber portfolio.
pub const MAX_PORTFOLIO_WALLETS: usize = 5;

type SyncFuture = Shared<BoxFuture<'static, Option<PortfolioSnapshot>>>;

pub struct PortfolioEngine {
    store: Arc<SubscriberStore>,
    registry: Arc<PoolRegistry>,
    balances: BalanceFetcher,
    trades: TradeFetcher,
    staking: StakingFetcher,
    birdeye: Arc<BirdeyeClient>,
    meta: TokenMetaResolver,
    in_flight: Mutex<HashMap<i64, SyncFuture>>,
}

impl PortfolioEngine {
    pub fn new(
        store: Arc<SubscriberStore>,
        registry: Arc<PoolRegistry>,
        balances: BalanceFetcher,
        trades: TradeFetcher,
        staking: StakingFetcher,
        birdeye: Arc<BirdeyeClient>,
        meta: TokenMetaResolver,
    ) -> Self {
        Self {
            store,
            registry,
            balances,
            trades,
            staking,
            birdeye,
            meta,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Assemble (or join an in-progress assembly of) a subscriber's snapshot.
    pub async fn sync(self: Arc<Self>, chat_id: i64) -> Option<PortfolioSnapshot> {
        let future = {
            let mut in_flight = self.in_flight.lock();
            if let Some(existing) = in_flight.get(&chat_id) {
                tracing::debug!(chat_id, "Joining in-flight portfolio sync");
                existing.clone()
            } else {
                let engine = Arc::clone(&self);
                let future: SyncFuture =
                    async move { engine.do_sync(chat_id).await }.boxed().shared();
                in_flight.insert(chat_id, future.clone());
                future
            }
        };
        let result = future.await;
        self.in_flight.lock().remove(&chat_id);
        result
    }

    async fn do_sync(&self, chat_id: i64) -> Option<PortfolioSnapshot> {
        let subscriber = self.store.get(chat_id)?;
        let wallets: Vec<String> = subscriber
            .portfolio_wallets
            .iter()
            .take(MAX_PORTFOLIO_WALLETS)
            .cloned()
            .collect();
        if wallets.is_empty() {
            return None;
        }

        let pools = self.registry.snapshot();

        // Per wallet, run the sub-fetches concurrently.
        let fetches = wallets.iter().map(|wallet| {
            let pools = Arc::clone(&pools);
            async move {
                let (balances, trade_history, aggregator) = futures_util::join!(
                    self.balances.fetch(wallet),
                    self.trades.fetch(wallet, &pools),
                    self.fetch_aggregator_pnl(wallet),
                );
                (wallet.clone(), balances, trade_history, aggregator)
            }
        });
        let results = futures_util::future::join_all(fetches).await;

        let mut all_tokens: HashMap<String, TokenHolding> = HashMap::new();
        let mut all_lp: Vec<LpPosition> = Vec::new();
        let mut all_staked: Vec<StakedPosition> = Vec::new();
        let mut all_trades: Vec<TradeRecord> = Vec::new();
        let mut per_wallet: HashMap<String, WalletBreakdown> = HashMap::new();
        let mut sol_total = Decimal::ZERO;
        let mut sol_usd_total = Decimal::ZERO;

        for (wallet, balances, trade_history, aggregator) in results {
            let mut breakdown = WalletBreakdown::default();

            let (tokens, lp_positions, receipt_balances) = match &balances {
                Some(b) => self.split_balances(b),
                None => (Vec::new(), Vec::new(), Vec::new()),
            };

            if let Some(b) = &balances {
                breakdown.sol_balance = b.sol;
                breakdown.sol_value_usd = b.sol_usd.unwrap_or(Decimal::ZERO);
                sol_total += b.sol;
                sol_usd_total += breakdown.sol_value_usd;
            }

            for token in tokens {
                breakdown.token_value_usd += token.usd;
                match all_tokens.get_mut(&token.mint) {
                    Some(existing) => {
                        existing.balance += token.balance;
                        existing.usd += token.usd;
                    }
                    None => {
                        all_tokens.insert(token.mint.clone(), token);
                    }
                }
            }

            for lp in lp_positions {
                breakdown.lp_value_usd += lp.usd;
                all_lp.push(lp);
            }

            // Staked positions per wallet, cached for 10 minutes.
            let staked = self.staking.fetch(&wallet, &receipt_balances).await;
            for position in staked {
                breakdown.staked_value_usd += position.usd;
                all_staked.push(position);
            }

            let (buys, sells) = pnl::trade_counts(&trade_history);
            breakdown.buy_count = buys;
            breakdown.sell_count = sells;

            let computed_realized = pnl::realized_pnl(&trade_history);
            let (agg_realized, agg_unrealized) = aggregator;
            breakdown.realized_pnl_usd = agg_realized.unwrap_or(computed_realized);
            breakdown.unrealized_pnl_usd = agg_unrealized.unwrap_or(Decimal::ZERO);

            breakdown.wallet_value_usd = breakdown.sol_value_usd
                + breakdown.token_value_usd
                + breakdown.lp_value_usd
                + breakdown.staked_value_usd;

            all_trades.extend(trade_history);
            per_wallet.insert(wallet, breakdown);
        }

        all_trades.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let trade_count = all_trades.len();
        let total_volume_usd: Decimal = all_trades.iter().map(|t| t.usd).sum();
        all_trades.truncate(MAX_SNAPSHOT_TRADES);

        let mut tokens: Vec<TokenHolding> = all_tokens.into_values().collect();
        tokens.sort_by(|a, b| b.usd.cmp(&a.usd));
        tokens.truncate(MAX_SNAPSHOT_TOKENS);

        let token_value_usd: Decimal = per_wallet.values().map(|w| w.token_value_usd).sum();
        let lp_value_usd: Decimal = per_wallet.values().map(|w| w.lp_value_usd).sum();
        let staked_value_usd: Decimal = per_wallet.values().map(|w| w.staked_value_usd).sum();
        let realized_pnl_usd: Decimal = per_wallet.values().map(|w| w.realized_pnl_usd).sum();
        let unrealized_pnl_usd: Decimal = per_wallet.values().map(|w| w.unrealized_pnl_usd).sum();
        let buy_count: u32 = per_wallet.values().map(|w| w.buy_count).sum();
        let sell_count: u32 = per_wallet.values().map(|w| w.sell_count).sum();

        // last_sync never decreases, even against a clock step.
        let previous_sync = subscriber.portfolio.as_ref().map(|p| p.last_sync);
        let last_sync = match previous_sync {
            Some(previous) => previous.max(Utc::now()),
            None => Utc::now(),
        };

        let snapshot = PortfolioSnapshot {
            wallet_count: wallets.len(),
            sol_balance: sol_total,
            sol_value_usd: sol_usd_total,
            token_value_usd,
            lp_value_usd,
            staked_value_usd,
            total_value_usd: sol_usd_total + token_value_usd + lp_value_usd + staked_value_usd,
            tokens,
            lp_positions: all_lp,
            staked_positions: all_staked,
            trades: all_trades,
            trade_count,
            buy_count,
            sell_count,
            total_volume_usd,
            realized_pnl_usd,
            unrealized_pnl_usd,
            per_wallet,
            last_sync,
        };

        self.store.update(chat_id, |s| {
            s.portfolio = Some(snapshot.clone());
        });
        Arc::clone(&self.store).request_flush();

        tracing::info!(
            chat_id,
            wallets = snapshot.wallet_count,
            total_usd = %snapshot.total_value_usd,
            "Portfolio sync complete"
        );
        Some(snapshot)
    }

    /// Split raw balances into plain holdings, LP positions, and staking
    /// receipt balances. LP identification cross-checks the registry's LP
    /// mints first and falls back to the symbol/name heuristic with a sanity
    /// cap.
    fn split_balances(
        &self,
        balances: &WalletBalances,
    ) -> (Vec<TokenHolding>, Vec<LpPosition>, Vec<(String, Decimal)>) {
        let pools = self.registry.snapshot();
        let mut holdings = Vec::new();
        let mut lp_positions = Vec::new();
        let mut receipts = Vec::new();

        for token in &balances.tokens {
            if let Some(pool) = pools.find_by_lp_mint(&token.mint) {
                lp_positions.push(LpPosition {
                    mint: token.mint.clone(),
                    pool_id: Some(pool.id.clone()),
                    pair_name: pool.pair_name.clone(),
                    balance: token.amount,
                    usd: token.usd.unwrap_or(Decimal::ZERO),
                });
                continue;
            }

            if self.staking_receipt(&token.mint) {
                receipts.push((token.mint.clone(), token.amount));
                continue;
            }

            if let Some(meta) = self.meta.get_meta(&token.mint) {
                let symbol_says_lp = meta.symbol.to_ascii_uppercase().contains("LP");
                let name_says_lp = meta
                    .name
                    .as_deref()
                    .map(|n| n.to_ascii_lowercase().contains("liquidity"))
                    .unwrap_or(false);
                if symbol_says_lp || name_says_lp {
                    let usd = token.usd.unwrap_or(Decimal::ZERO);
                    if usd < lp_heuristic_cap() {
                        lp_positions.push(LpPosition {
                            mint: token.mint.clone(),
                            pool_id: None,
                            pair_name: meta.symbol.clone(),
                            balance: token.amount,
                            usd,
                        });
                        continue;
                    }
                }
            }

            holdings.push(TokenHolding {
                mint: token.mint.clone(),
                symbol: self.meta.get_symbol(&token.mint),
                balance: token.amount,
                usd: token.usd.unwrap_or(Decimal::ZERO),
            });
        }

        (holdings, lp_positions, receipts)
    }

    fn staking_receipt(&self, mint: &str) -> bool {
        self.staking.is_receipt_mint(mint)
    }

    /// Aggregator-derived realized/unrealized PnL, if the wallet is indexed.
    async fn fetch_aggregator_pnl(&self, wallet: &str) -> (Option<Decimal>, Option<Decimal>) {
        match self.birdeye.wallet_portfolio(wallet).await {
            Ok(data) => {
                let realized = data
                    .get("realizedPnl")
                    .or_else(|| data.get("realized_pnl"))
                    .and_then(json_decimal);
                let unrealized = data
                    .get("unrealizedPnl")
                    .or_else(|| data.get("unrealized_pnl"))
                    .and_then(json_decimal);
                (realized, unrealized)
            }
            Err(e) => {
                tracing::debug!(wallet, error = %e, "Aggregator PnL unavailable");
                (None, None)
            }
        }
    }
}

fn json_decimal(v: &serde_json::Value) -> Option<Decimal> {
    match v {
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        serde_json::Value::String(s) => Decimal::from_str(s).ok(),
        _ => None,
    }
}
