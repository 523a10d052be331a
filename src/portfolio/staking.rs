//! Staked-position lookup.
//!
//! A wallet's receipt-token balance claims a share of the vault's underlying
//! balance: `claimed = receipt_held / receipt_supply * vault_balance`.
//! The original stake is derived by scanning recent history for a paired
//! outflow of the underlying token and inflow of the receipt token; when no
//! such pair is found the current claimed value stands in. Both the staked
//! lookup and the derived original stake are cached per wallet for 10
//! minutes.

use super::snapshot::StakedPosition;
use crate::cache::BoundedCache;
use crate::config::StakeVaultConfig;
use crate::providers::RpcAggregatorClient;
use crate::valuation::PriceView;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;

pub const STAKING_CACHE_TTL_SECS: i64 = 600;
const HISTORY_FETCH_LIMIT: u32 = 20;
const MAX_HISTORY_LOOKUPS: usize = 10;

pub struct StakingFetcher {
    vaults: Vec<StakeVaultConfig>,
    rpc: Arc<RpcAggregatorClient>,
    view: Arc<dyn PriceView>,
    positions: BoundedCache<Vec<StakedPosition>>,
    original_stakes: BoundedCache<Decimal>,
}

impl StakingFetcher {
    pub fn new(
        vaults: Vec<StakeVaultConfig>,
        rpc: Arc<RpcAggregatorClient>,
        view: Arc<dyn PriceView>,
        cache_capacity: usize,
    ) -> Self {
        Self {
            vaults,
            rpc,
            view,
            positions: BoundedCache::new(cache_capacity, STAKING_CACHE_TTL_SECS),
            original_stakes: BoundedCache::new(cache_capacity, STAKING_CACHE_TTL_SECS),
        }
    }

    pub fn is_receipt_mint(&self, mint: &str) -> bool {
        self.vaults.iter().any(|v| v.receipt_mint == mint)
    }

    /// Staked positions for the receipt tokens this wallet holds.
    /// `receipt_balances` maps receipt mint to held UI amount.
    pub async fn fetch(
        &self,
        wallet: &str,
        receipt_balances: &[(String, Decimal)],
    ) -> Vec<StakedPosition> {
        if self.vaults.is_empty() {
            return Vec::new();
        }
        if let Some(cached) = self.positions.get(wallet) {
            return cached;
        }

        let mut positions = Vec::new();
        for vault in &self.vaults {
            let Some((_, held)) = receipt_balances
                .iter()
                .find(|(mint, _)| mint == &vault.receipt_mint)
            else {
                continue;
            };
            if *held <= Decimal::ZERO {
                continue;
            }

            let Some(supply) = self.token_supply(&vault.receipt_mint).await else {
                continue;
            };
            if supply <= Decimal::ZERO {
                continue;
            }
            let Some(vault_balance) = self.vault_balance(&vault.vault_address).await else {
                continue;
            };

            let claimed = *held / supply * vault_balance;
            let usd = self
                .view
                .price(&vault.underlying_mint)
                .map(|p| claimed * p)
                .unwrap_or(Decimal::ZERO);

            let original_stake_usd = self.original_stake(wallet, vault, usd).await;

            positions.push(StakedPosition {
                receipt_mint: vault.receipt_mint.clone(),
                underlying_mint: vault.underlying_mint.clone(),
                vault_address: vault.vault_address.clone(),
                underlying_amount: claimed,
                usd,
                original_stake_usd: Some(original_stake_usd),
            });
        }

        self.positions.insert(wallet, positions.clone());
        positions
    }

    /// Original stake: paired underlying-out / receipt-in in recent history,
    /// valued at the current underlying price. Falls back to the current
    /// claimed value.
    async fn original_stake(
        &self,
        wallet: &str,
        vault: &StakeVaultConfig,
        current_value: Decimal,
    ) -> Decimal {
        let cache_key = format!("{}:{}", wallet, vault.receipt_mint);
        if let Some(cached) = self.original_stakes.get(&cache_key) {
            return cached;
        }

        let derived = self.scan_history_for_stake(wallet, vault).await;
        let value = derived.unwrap_or(current_value);
        self.original_stakes.insert(&cache_key, value);
        value
    }

    async fn scan_history_for_stake(
        &self,
        wallet: &str,
        vault: &StakeVaultConfig,
    ) -> Option<Decimal> {
        let signatures = self
            .rpc
            .get_signatures_for_address(wallet, HISTORY_FETCH_LIMIT)
            .await
            .ok()?;

        for entry in signatures.iter().take(MAX_HISTORY_LOOKUPS) {
            let sig = entry.get("signature").and_then(|s| s.as_str())?;
            let Ok(tx) = self.rpc.get_transaction(sig).await else {
                continue;
            };
            let underlying_delta = wallet_delta(&tx, wallet, &vault.underlying_mint);
            let receipt_delta = wallet_delta(&tx, wallet, &vault.receipt_mint);

            // A stake pairs an outflow of the underlying with an inflow of
            // the receipt.
            if let (Some(under), Some(receipt)) = (underlying_delta, receipt_delta) {
                if under < Decimal::ZERO && receipt > Decimal::ZERO {
                    let staked_amount = under.abs();
                    return self
                        .view
                        .price(&vault.underlying_mint)
                        .map(|p| staked_amount * p);
                }
            }
        }
        None
    }

    async fn token_supply(&self, mint: &str) -> Option<Decimal> {
        let result = self.rpc.get_token_supply(mint).await.ok()?;
        ui_amount(result.get("value")?)
    }

    async fn vault_balance(&self, vault_address: &str) -> Option<Decimal> {
        let result = self
            .rpc
            .get_token_account_balance(vault_address)
            .await
            .ok()?;
        ui_amount(result.get("value")?)
    }
}

fn ui_amount(value: &Value) -> Option<Decimal> {
    value
        .get("uiAmountString")
        .and_then(|s| s.as_str())
        .and_then(|s| Decimal::from_str(s).ok())
}

fn wallet_delta(tx: &Value, wallet: &str, mint: &str) -> Option<Decimal> {
    let meta = tx.get("meta")?;
    let sum = |key: &str| -> Option<Decimal> {
        let balances = meta.get(key)?.as_array()?;
        let total = balances
            .iter()
            .filter(|b| {
                b.get("owner").and_then(|o| o.as_str()) == Some(wallet)
                    && b.get("mint").and_then(|m| m.as_str()) == Some(mint)
            })
            .filter_map(|b| {
                b.get("uiTokenAmount")
                    .and_then(|a| a.get("uiAmountString"))
                    .and_then(|s| s.as_str())
                    .and_then(|s| Decimal::from_str(s).ok())
            })
            .sum();
        Some(total)
    };
    let pre = sum("preTokenBalances").unwrap_or(Decimal::ZERO);
    let post = sum("postTokenBalances").unwrap_or(Decimal::ZERO);
    if pre == Decimal::ZERO && post == Decimal::ZERO {
        return None;
    }
    Some(post - pre)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ui_amount() {
        let value = json!({"uiAmountString": "123.456", "decimals": 6});
        assert_eq!(
            ui_amount(&value),
            Some(Decimal::from_str("123.456").unwrap())
        );
        assert_eq!(ui_amount(&json!({})), None);
    }

    #[test]
    fn test_wallet_delta_detects_outflow() {
        let tx = json!({
            "meta": {
                "preTokenBalances": [
                    {"owner": "W", "mint": "UNDER", "uiTokenAmount": {"uiAmountString": "100"}},
                ],
                "postTokenBalances": [
                    {"owner": "W", "mint": "UNDER", "uiTokenAmount": {"uiAmountString": "40"}},
                ],
            }
        });
        assert_eq!(wallet_delta(&tx, "W", "UNDER"), Some(Decimal::from(-60)));
    }
}
