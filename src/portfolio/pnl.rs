//! Cost-basis realized PnL over a wallet's trade history.
//!
//! Trades are walked in ascending time order, maintaining per-pool
//! `{bought_usd, sold_usd, cost_basis}`. A sell consumes basis
//! proportionally: `p = min(usd / cost_basis, 1)`, realized gains
//! `usd - cost_basis * p`, and the basis shrinks by the consumed share.
//! Realized profit therefore only appears once cumulative sells exceed the
//! remaining basis of the pool.

use super::snapshot::TradeRecord;
use crate::decoder::Direction;
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
struct PoolBook {
    bought_usd: Decimal,
    sold_usd: Decimal,
    cost_basis: Decimal,
}

/// Total realized PnL across pools.
pub fn realized_pnl(trades: &[TradeRecord]) -> Decimal {
    let mut sorted: Vec<&TradeRecord> = trades.iter().collect();
    sorted.sort_by_key(|t| t.timestamp);

    let mut books: HashMap<&str, PoolBook> = HashMap::new();
    let mut realized = Decimal::ZERO;

    for trade in sorted {
        let book = books.entry(trade.pool_id.as_str()).or_default();
        match trade.direction {
            Some(Direction::Buy) => {
                book.bought_usd += trade.usd;
                book.cost_basis += trade.usd;
            }
            Some(Direction::Sell) => {
                book.sold_usd += trade.usd;
                if book.cost_basis > Decimal::ZERO {
                    let p = (trade.usd / book.cost_basis).min(Decimal::ONE);
                    let consumed = book.cost_basis * p;
                    realized += trade.usd - consumed;
                    book.cost_basis -= consumed;
                } else {
                    // Sells with no recorded basis are pure proceeds.
                    realized += trade.usd;
                }
            }
            None => {}
        }
    }

    realized
}

/// Buy/sell counts over a trade list.
pub fn trade_counts(trades: &[TradeRecord]) -> (u32, u32) {
    let mut buys = 0;
    let mut sells = 0;
    for trade in trades {
        match trade.direction {
            Some(Direction::Buy) => buys += 1,
            Some(Direction::Sell) => sells += 1,
            None => {}
        }
    }
    (buys, sells)
}
