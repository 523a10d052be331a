//! Wallet balance fetching with a short cache.
//!
//! Native balance plus parsed fungible token accounts, valued in USD where a
//! price is known. Lookups are cached per wallet for 30 seconds.

use crate::cache::BoundedCache;
use crate::providers::RpcAggregatorClient;
use crate::valuation::PriceView;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;

pub const BALANCE_CACHE_TTL_SECS: i64 = 30;
const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// One token account balance in UI units.
#[derive(Debug, Clone)]
pub struct TokenBalance {
    pub mint: String,
    pub amount: Decimal,
    pub decimals: u8,
    pub usd: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct WalletBalances {
    pub wallet: String,
    pub sol: Decimal,
    pub sol_usd: Option<Decimal>,
    pub tokens: Vec<TokenBalance>,
}

pub struct BalanceFetcher {
    rpc: Arc<RpcAggregatorClient>,
    view: Arc<dyn PriceView>,
    network_token_mint: String,
    cache: BoundedCache<WalletBalances>,
}

impl BalanceFetcher {
    pub fn new(
        rpc: Arc<RpcAggregatorClient>,
        view: Arc<dyn PriceView>,
        network_token_mint: String,
        cache_capacity: usize,
    ) -> Self {
        Self {
            rpc,
            view,
            network_token_mint,
            cache: BoundedCache::new(cache_capacity, BALANCE_CACHE_TTL_SECS),
        }
    }

    pub async fn fetch(&self, wallet: &str) -> Option<WalletBalances> {
        if let Some(cached) = self.cache.get(wallet) {
            return Some(cached);
        }

        let lamports = match self.rpc.get_balance(wallet).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(wallet, error = %e, "Native balance fetch failed");
                return None;
            }
        };
        let sol = Decimal::from(lamports) / Decimal::from(LAMPORTS_PER_SOL);
        let sol_usd = self
            .view
            .price(&self.network_token_mint)
            .map(|price| sol * price);

        let accounts = match self.rpc.get_parsed_token_accounts_by_owner(wallet).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(wallet, error = %e, "Token accounts fetch failed");
                Vec::new()
            }
        };

        let mut tokens = Vec::new();
        for account in &accounts {
            if let Some(balance) = parse_token_account(account) {
                if balance.amount > Decimal::ZERO {
                    let usd = self.view.price(&balance.mint).map(|p| balance.amount * p);
                    tokens.push(TokenBalance { usd, ..balance });
                }
            }
        }

        let balances = WalletBalances {
            wallet: wallet.to_string(),
            sol,
            sol_usd,
            tokens,
        };
        self.cache.insert(wallet, balances.clone());
        Some(balances)
    }
}

/// Parsed token-account shape:
/// `account.data.parsed.info.{mint, tokenAmount.{uiAmountString, decimals}}`.
fn parse_token_account(account: &Value) -> Option<TokenBalance> {
    let info = account
        .get("account")
        .and_then(|a| a.get("data"))
        .and_then(|d| d.get("parsed"))
        .and_then(|p| p.get("info"))?;
    let mint = info.get("mint").and_then(|m| m.as_str())?.to_string();
    let token_amount = info.get("tokenAmount")?;
    let decimals = token_amount
        .get("decimals")
        .and_then(|d| d.as_u64())
        .and_then(|d| u8::try_from(d).ok())?;
    let amount = token_amount
        .get("uiAmountString")
        .and_then(|a| a.as_str())
        .and_then(|a| Decimal::from_str(a).ok())
        .or_else(|| {
            token_amount
                .get("amount")
                .and_then(|a| a.as_str())
                .and_then(|a| Decimal::from_str(a).ok())
                .map(|raw| raw / Decimal::from(10u64.pow(decimals as u32)))
        })?;

    Some(TokenBalance {
        mint,
        amount,
        decimals,
        usd: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_token_account() {
        let account = json!({
            "account": {"data": {"parsed": {"info": {
                "mint": "MINT",
                "tokenAmount": {"uiAmountString": "12.5", "decimals": 6, "amount": "12500000"},
            }}}}
        });
        let balance = parse_token_account(&account).unwrap();
        assert_eq!(balance.mint, "MINT");
        assert_eq!(balance.amount, Decimal::from_str("12.5").unwrap());
        assert_eq!(balance.decimals, 6);
    }

    #[test]
    fn test_parse_token_account_raw_fallback() {
        let account = json!({
            "account": {"data": {"parsed": {"info": {
                "mint": "MINT",
                "tokenAmount": {"decimals": 9, "amount": "2000000000"},
            }}}}
        });
        let balance = parse_token_account(&account).unwrap();
        assert_eq!(balance.amount, Decimal::from(2));
    }

    #[test]
    fn test_parse_garbage_is_none() {
        assert!(parse_token_account(&json!({"nope": 1})).is_none());
    }
}
