//! USD valuation for trades, LP events, and wallet transactions.
//!
//! Fallback order for trades: explicit value field, quote-side computation,
//! base-side computation, pool spot price. Any computed value above the
//! $100M sanity cap fails over to the next rung.

use crate::decoder::SwapAmounts;
use crate::pools::Pool;
use crate::resolver::{PriceResolver, TokenMetaResolver};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;

const USD_VALUE_KEYS: &[&str] = &["usdValue", "usd_value", "valueUsd", "value_usd", "value"];
const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Values above this are treated as computation failures.
pub fn max_sane_usd() -> Decimal {
    Decimal::from(100_000_000u64)
}

/// Price and decimals view, split out so tests can stub it.
pub trait PriceView: Send + Sync {
    fn price(&self, mint: &str) -> Option<Decimal>;
    fn decimals(&self, mint: &str) -> Option<u8>;
}

/// The production view backed by the resolvers.
pub struct ResolverPriceView {
    pub prices: Arc<PriceResolver>,
    pub meta: TokenMetaResolver,
}

impl PriceView for ResolverPriceView {
    fn price(&self, mint: &str) -> Option<Decimal> {
        self.prices.get_price(mint)
    }

    fn decimals(&self, mint: &str) -> Option<u8> {
        self.meta.get_decimals(mint)
    }
}

pub struct UsdValuator {
    view: Arc<dyn PriceView>,
    network_token_mint: String,
}

impl UsdValuator {
    pub fn new(view: Arc<dyn PriceView>, network_token_mint: String) -> Self {
        Self {
            view,
            network_token_mint,
        }
    }

    /// Trade USD per the fallback chain.
    pub fn trade_usd(
        &self,
        msg: &Value,
        amounts: &SwapAmounts,
        pool: Option<&Pool>,
    ) -> Option<Decimal> {
        // (a) Explicit value field, sanity-capped.
        if let Some(v) = explicit_usd(msg) {
            if v <= max_sane_usd() {
                return Some(v);
            }
        }

        // (b) Quote-side leg.
        if let Some(pool) = pool {
            if let Some(v) = self.leg_usd(amounts, &pool.quote) {
                if v <= max_sane_usd() {
                    return Some(v);
                }
            }
            // (c) Base-side fallback.
            if let Some(v) = self.leg_usd(amounts, &pool.base) {
                if v <= max_sane_usd() {
                    return Some(v);
                }
            }
            // (d) Pool's listed spot price times the base amount.
            if let (Some(spot), Some(v)) = (pool.spot_price, self.base_amount_ui(amounts, pool)) {
                let quote_price = self.view.price(&pool.quote)?;
                let usd = v * spot * quote_price;
                if usd <= max_sane_usd() {
                    return Some(usd);
                }
            }
        } else {
            // No pool context: value whichever leg has a known price.
            for mint in [&amounts.mint_in, &amounts.mint_out].into_iter().flatten() {
                if let Some(v) = self.leg_usd(amounts, mint) {
                    if v <= max_sane_usd() {
                        return Some(v);
                    }
                }
            }
        }

        None
    }

    /// LP event USD: explicit value, else the sum of the known sides. A
    /// single-sided deposit values just that side.
    pub fn lp_usd(&self, msg: &Value, pool: Option<&Pool>) -> Option<Decimal> {
        if let Some(v) = explicit_usd(msg) {
            if v <= max_sane_usd() {
                return Some(v);
            }
        }
        let pool = pool?;

        let base_amount = raw_u64(msg, &["baseAmount", "base_amount", "amountBase"]);
        let quote_amount = raw_u64(msg, &["quoteAmount", "quote_amount", "amountQuote"]);

        let base_usd = base_amount.and_then(|a| self.amount_usd(a, &pool.base, None));
        let quote_usd = quote_amount.and_then(|a| self.amount_usd(a, &pool.quote, None));

        let total = match (base_usd, quote_usd) {
            (Some(b), Some(q)) => b + q,
            (Some(b), None) => b,
            (None, Some(q)) => q,
            (None, None) => return None,
        };
        (total <= max_sane_usd()).then_some(total)
    }

    /// Wallet transaction USD: native transfers plus token transfers. The
    /// total is halved only when the transfer set is swap-shaped (both an
    /// inflow and an outflow leg); one-sided transfers attribute the full sum.
    pub fn wallet_tx_usd(&self, msg: &Value, wallet: &str) -> Option<Decimal> {
        let mut total = Decimal::ZERO;
        let mut inflow = false;
        let mut outflow = false;
        let mut any = false;

        if let Some(native) = msg
            .get("nativeTransfers")
            .or_else(|| msg.get("native_transfers"))
            .and_then(|v| v.as_array())
        {
            let sol_price = self.view.price(&self.network_token_mint);
            for transfer in native {
                let Some(lamports) = raw_u64(transfer, &["amount", "lamports"]) else {
                    continue;
                };
                let from = transfer
                    .get("fromUserAccount")
                    .or_else(|| transfer.get("from"))
                    .and_then(|v| v.as_str());
                let to = transfer
                    .get("toUserAccount")
                    .or_else(|| transfer.get("to"))
                    .and_then(|v| v.as_str());
                if from == Some(wallet) {
                    outflow = true;
                } else if to == Some(wallet) {
                    inflow = true;
                } else {
                    continue;
                }
                if let Some(price) = sol_price {
                    total += Decimal::from(lamports) / Decimal::from(LAMPORTS_PER_SOL) * price;
                    any = true;
                }
            }
        }

        if let Some(tokens) = msg
            .get("tokenTransfers")
            .or_else(|| msg.get("token_transfers"))
            .and_then(|v| v.as_array())
        {
            for transfer in tokens {
                let Some(mint) = transfer.get("mint").and_then(|v| v.as_str()) else {
                    continue;
                };
                let Some(amount) = raw_u64(transfer, &["amount", "tokenAmount", "token_amount"])
                else {
                    continue;
                };
                let from = transfer
                    .get("fromUserAccount")
                    .or_else(|| transfer.get("from"))
                    .and_then(|v| v.as_str());
                let to = transfer
                    .get("toUserAccount")
                    .or_else(|| transfer.get("to"))
                    .and_then(|v| v.as_str());
                if from == Some(wallet) {
                    outflow = true;
                } else if to == Some(wallet) {
                    inflow = true;
                } else {
                    continue;
                }
                let decimals = transfer
                    .get("decimals")
                    .and_then(|v| v.as_u64())
                    .and_then(|d| u8::try_from(d).ok());
                if let Some(usd) = self.amount_usd(amount, mint, decimals) {
                    total += usd;
                    any = true;
                }
            }
        }

        if !any {
            return None;
        }
        // A swap moves value out and back in; count one side.
        if inflow && outflow {
            total /= Decimal::TWO;
        }
        (total <= max_sane_usd()).then_some(total)
    }

    /// Value of the leg of a swap that is denominated in `mint`.
    fn leg_usd(&self, amounts: &SwapAmounts, mint: &str) -> Option<Decimal> {
        if amounts.mint_in.as_deref() == Some(mint) {
            let amount = amounts.amount_in?;
            return self.amount_usd(amount, mint, amounts.decimals_in);
        }
        if amounts.mint_out.as_deref() == Some(mint) {
            let amount = amounts.amount_out?;
            return self.amount_usd(amount, mint, amounts.decimals_out);
        }
        None
    }

    fn base_amount_ui(&self, amounts: &SwapAmounts, pool: &Pool) -> Option<Decimal> {
        let (amount, embedded) = if amounts.mint_in.as_deref() == Some(pool.base.as_str()) {
            (amounts.amount_in?, amounts.decimals_in)
        } else if amounts.mint_out.as_deref() == Some(pool.base.as_str()) {
            (amounts.amount_out?, amounts.decimals_out)
        } else {
            return None;
        };
        let decimals = embedded.or_else(|| self.view.decimals(&pool.base))?;
        Some(Decimal::from(amount) / pow10(decimals))
    }

    /// `raw / 10^decimals * price(mint)`. Message-embedded decimals win over
    /// cached metadata.
    fn amount_usd(&self, raw: u64, mint: &str, embedded_decimals: Option<u8>) -> Option<Decimal> {
        let decimals = embedded_decimals.or_else(|| self.view.decimals(mint))?;
        let price = self.view.price(mint)?;
        Some(Decimal::from(raw) / pow10(decimals) * price)
    }
}

fn pow10(decimals: u8) -> Decimal {
    Decimal::from(10u64.pow(decimals.min(18) as u32))
}

fn explicit_usd(msg: &Value) -> Option<Decimal> {
    for key in USD_VALUE_KEYS {
        match msg.get(*key) {
            Some(Value::Number(n)) => {
                if let Ok(d) = Decimal::from_str(&n.to_string()) {
                    return Some(d);
                }
            }
            Some(Value::String(s)) => {
                if let Ok(d) = Decimal::from_str(s) {
                    return Some(d);
                }
            }
            _ => {}
        }
    }
    None
}

fn raw_u64(msg: &Value, keys: &[&str]) -> Option<u64> {
    for key in keys {
        match msg.get(*key) {
            Some(Value::Number(n)) => {
                if let Some(v) = n.as_u64() {
                    return Some(v);
                }
            }
            Some(Value::String(s)) => {
                if let Ok(v) = s.parse::<u64>() {
                    return Some(v);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    struct StubView {
        prices: HashMap<String, Decimal>,
        decimals: HashMap<String, u8>,
    }

    impl PriceView for StubView {
        fn price(&self, mint: &str) -> Option<Decimal> {
            self.prices.get(mint).copied()
        }

        fn decimals(&self, mint: &str) -> Option<u8> {
            self.decimals.get(mint).copied()
        }
    }

    fn pool() -> Pool {
        Pool {
            id: "P1".into(),
            base: "BASE".into(),
            quote: "USDC".into(),
            pair_name: "PRIME/USDC".into(),
            is_primary: true,
            created_at: None,
            tvl: None,
            fee_bps: None,
            protocol_fee_bps: None,
            spot_price: None,
            lp_mint: None,
        }
    }

    fn valuator() -> UsdValuator {
        let mut prices = HashMap::new();
        prices.insert("USDC".to_string(), Decimal::ONE);
        prices.insert("BASE".to_string(), Decimal::from_str("0.2").unwrap());
        prices.insert("WSOL".to_string(), Decimal::from(100));
        let mut decimals = HashMap::new();
        decimals.insert("USDC".to_string(), 6);
        decimals.insert("BASE".to_string(), 9);
        UsdValuator::new(
            Arc::new(StubView { prices, decimals }),
            "WSOL".to_string(),
        )
    }

    #[test]
    fn test_explicit_value_wins() {
        let v = valuator();
        let msg = json!({"usdValue": 42.5});
        let usd = v.trade_usd(&msg, &SwapAmounts::default(), Some(&pool()));
        assert_eq!(usd, Some(Decimal::from_str("42.5").unwrap()));
    }

    #[test]
    fn test_insane_explicit_falls_through_to_quote_side() {
        let v = valuator();
        let msg = json!({"usdValue": 200_000_000u64});
        let amounts = SwapAmounts {
            amount_in: Some(1_000_000),
            amount_out: Some(5_000_000_000),
            mint_in: Some("USDC".into()),
            mint_out: Some("BASE".into()),
            decimals_in: Some(6),
            decimals_out: Some(9),
        };
        let usd = v.trade_usd(&msg, &amounts, Some(&pool()));
        assert_eq!(usd, Some(Decimal::ONE));
    }

    #[test]
    fn test_quote_side_computation() {
        // 1_000_000 raw USDC at 6 decimals = $1.00
        let v = valuator();
        let amounts = SwapAmounts {
            amount_in: Some(1_000_000),
            amount_out: Some(5_000_000_000),
            mint_in: Some("USDC".into()),
            mint_out: Some("BASE".into()),
            decimals_in: Some(6),
            decimals_out: Some(9),
        };
        let usd = v.trade_usd(&json!({}), &amounts, Some(&pool()));
        assert_eq!(usd, Some(Decimal::ONE));
    }

    #[test]
    fn test_base_side_fallback_when_quote_leg_absent() {
        let v = valuator();
        let amounts = SwapAmounts {
            amount_in: Some(5_000_000_000),
            amount_out: None,
            mint_in: Some("BASE".into()),
            mint_out: None,
            decimals_in: Some(9),
            decimals_out: None,
        };
        // 5 BASE at $0.2 = $1.00
        let usd = v.trade_usd(&json!({}), &amounts, Some(&pool()));
        assert_eq!(usd, Some(Decimal::ONE));
    }

    #[test]
    fn test_lp_both_sides_summed_not_doubled() {
        let v = valuator();
        let msg = json!({
            "baseAmount": 5_000_000_000u64,  // 5 BASE = $1.00
            "quoteAmount": 3_000_000u64,     // 3 USDC = $3.00
        });
        let usd = v.lp_usd(&msg, Some(&pool()));
        assert_eq!(usd, Some(Decimal::from(4)));
    }

    #[test]
    fn test_lp_single_sided() {
        let v = valuator();
        let msg = json!({"quoteAmount": 3_000_000u64});
        let usd = v.lp_usd(&msg, Some(&pool()));
        assert_eq!(usd, Some(Decimal::from(3)));
    }

    #[test]
    fn test_wallet_swap_shape_halved() {
        let v = valuator();
        // Wallet sends 1 SOL out and receives 100 USDC: swap shape.
        let msg = json!({
            "nativeTransfers": [
                {"amount": 1_000_000_000u64, "fromUserAccount": "W", "toUserAccount": "X"},
            ],
            "tokenTransfers": [
                {"mint": "USDC", "amount": 100_000_000u64, "decimals": 6,
                 "fromUserAccount": "X", "toUserAccount": "W"},
            ],
        });
        // (100 + 100) / 2 = 100
        let usd = v.wallet_tx_usd(&msg, "W");
        assert_eq!(usd, Some(Decimal::from(100)));
    }

    #[test]
    fn test_wallet_one_sided_transfer_not_halved() {
        let v = valuator();
        let msg = json!({
            "nativeTransfers": [
                {"amount": 2_000_000_000u64, "fromUserAccount": "W", "toUserAccount": "X"},
            ],
        });
        let usd = v.wallet_tx_usd(&msg, "W");
        assert_eq!(usd, Some(Decimal::from(200)));
    }

    #[test]
    fn test_wallet_unrelated_transfers_ignored() {
        let v = valuator();
        let msg = json!({
            "nativeTransfers": [
                {"amount": 1_000_000_000u64, "fromUserAccount": "A", "toUserAccount": "B"},
            ],
        });
        assert_eq!(v.wallet_tx_usd(&msg, "W"), None);
    }
}
