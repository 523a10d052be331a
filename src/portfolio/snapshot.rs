//! Aggregated portfolio snapshot types.

use crate::decoder::Direction;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// A fungible token position, aggregated across wallets.
#[derive(Debug, Clone)]
pub struct TokenHolding {
    pub mint: String,
    pub symbol: String,
    pub balance: Decimal,
    pub usd: Decimal,
}

/// An LP token position attributed to a pool.
#[derive(Debug, Clone)]
pub struct LpPosition {
    pub mint: String,
    pub pool_id: Option<String>,
    pub pair_name: String,
    pub balance: Decimal,
    pub usd: Decimal,
}

/// A staked position in a vault, held as a receipt token.
#[derive(Debug, Clone)]
pub struct StakedPosition {
    pub receipt_mint: String,
    pub underlying_mint: String,
    pub vault_address: String,
    /// Underlying tokens the receipt currently claims.
    pub underlying_amount: Decimal,
    pub usd: Decimal,
    pub original_stake_usd: Option<Decimal>,
}

/// One classified DEX trade from a wallet's history.
#[derive(Debug, Clone)]
pub struct TradeRecord {
    pub sig: String,
    pub wallet: String,
    pub pool_id: String,
    pub direction: Option<Direction>,
    pub usd: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Per-wallet value breakdown inside a snapshot.
#[derive(Debug, Clone, Default)]
pub struct WalletBreakdown {
    pub sol_balance: Decimal,
    pub sol_value_usd: Decimal,
    pub token_value_usd: Decimal,
    pub lp_value_usd: Decimal,
    pub staked_value_usd: Decimal,
    pub wallet_value_usd: Decimal,
    pub realized_pnl_usd: Decimal,
    pub unrealized_pnl_usd: Decimal,
    pub buy_count: u32,
    pub sell_count: u32,
}

/// The aggregate across a subscriber's wallets.
#[derive(Debug, Clone)]
pub struct PortfolioSnapshot {
    pub wallet_count: usize,
    pub sol_balance: Decimal,
    pub sol_value_usd: Decimal,
    pub token_value_usd: Decimal,
    pub lp_value_usd: Decimal,
    pub staked_value_usd: Decimal,
    pub total_value_usd: Decimal,
    /// Top 20 by USD.
    pub tokens: Vec<TokenHolding>,
    pub lp_positions: Vec<LpPosition>,
    pub staked_positions: Vec<StakedPosition>,
    /// Top 100 most recent, newest first.
    pub trades: Vec<TradeRecord>,
    pub trade_count: usize,
    pub buy_count: u32,
    pub sell_count: u32,
    pub total_volume_usd: Decimal,
    pub realized_pnl_usd: Decimal,
    pub unrealized_pnl_usd: Decimal,
    pub per_wallet: HashMap<String, WalletBreakdown>,
    pub last_sync: DateTime<Utc>,
}

pub const MAX_SNAPSHOT_TOKENS: usize = 20;
pub const MAX_SNAPSHOT_TRADES: usize = 100;
