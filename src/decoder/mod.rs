//! Event decoder: raw feed messages to semantic events.
//!
//! Accepts structured message objects, base64/hex instruction blobs, and
//! program-log lines from parsed transactions. Classification cascade, in
//! order: explicit fields, instruction discriminator, event log
//! discriminator, shape heuristics, trade-side tag. The first stage that
//! matches wins.

pub mod discriminators;
pub mod event;

pub use discriminators::{DiscriminatorTables, Tag};
pub use event::{Confidence, Direction, EventKind, SemanticEvent, SwapAmounts};

use crate::pools::{Pool, PoolSnapshot};
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::collections::HashMap;

const PROGRAM_DATA_MARKER: &str = "Program data: ";

const SIG_KEYS: &[&str] = &["signature", "sig", "txHash", "tx_hash", "txId", "tx_id", "hash"];
const POOL_KEYS: &[&str] = &["pool", "pool_id", "poolId", "pair", "pairAddress", "pair_address", "poolAddress"];
const WALLET_KEYS: &[&str] = &["wallet", "owner", "trader", "user", "maker", "account", "feePayer", "fee_payer"];
const SIDE_KEYS: &[&str] = &["side", "tradeType", "trade_type"];
const LABEL_KEYS: &[&str] = &["type", "event_name", "eventName", "action", "instruction_name", "instructionName"];
const IX_DATA_KEYS: &[&str] = &["instructionData", "instruction_data", "ixData", "data"];
const AMOUNT_IN_KEYS: &[&str] = &["amountIn", "amount_in", "inAmount", "in_amount"];
const AMOUNT_OUT_KEYS: &[&str] = &["amountOut", "amount_out", "outAmount", "out_amount"];
const MINT_IN_KEYS: &[&str] = &["mintIn", "mint_in", "inputMint", "input_mint", "tokenIn", "token_in"];
const MINT_OUT_KEYS: &[&str] = &["mintOut", "mint_out", "outputMint", "output_mint", "tokenOut", "token_out"];
const DECIMALS_IN_KEYS: &[&str] = &["decimalsIn", "decimals_in", "inDecimals"];
const DECIMALS_OUT_KEYS: &[&str] = &["decimalsOut", "decimals_out", "outDecimals"];
const TIMESTAMP_KEYS: &[&str] = &["timestamp", "blockTime", "block_time", "time", "ts"];
const BASE_AMOUNT_KEYS: &[&str] = &["baseAmount", "base_amount", "amountBase"];
const QUOTE_AMOUNT_KEYS: &[&str] = &["quoteAmount", "quote_amount", "amountQuote"];

/// Chain identifiers the direction rule compares mints against.
#[derive(Debug, Clone)]
pub struct ChainIds {
    pub primary_token_mint: String,
    pub network_token_mint: String,
}

/// Decoder with the immutable discriminator tables and the explicit-label map.
pub struct EventDecoder {
    tables: DiscriminatorTables,
    labels: HashMap<&'static str, LabelMatch>,
    chain: ChainIds,
}

#[derive(Debug, Clone)]
enum LabelMatch {
    Tagged(Tag),
    SwapSide(Direction),
}

impl EventDecoder {
    pub fn new(chain: ChainIds) -> Self {
        Self {
            tables: DiscriminatorTables::new(),
            labels: explicit_label_table(),
            chain,
        }
    }

    /// Classify a raw message. `pools` is the current registry snapshot, used
    /// for swap-direction inference against the pool's base/quote mints.
    pub fn decode(&self, msg: &Value, pools: &PoolSnapshot) -> SemanticEvent {
        let sig = extract_sig(msg).unwrap_or_default();
        let timestamp = extract_timestamp(msg);
        let pool_id = get_str(msg, POOL_KEYS);
        let wallet = get_str(msg, WALLET_KEYS);
        let pool = pool_id.as_deref().and_then(|id| pools.get(id));

        // 1. Explicit fields
        if let Some(kind) = self.match_explicit(msg, &pool_id, &wallet, pool) {
            return SemanticEvent {
                kind,
                sig,
                timestamp,
                confidence: Confidence::High,
            };
        }

        // 2. Instruction discriminator
        if let Some(data) = extract_instruction_data(msg) {
            if let Some((_, tag)) = self.tables.match_instruction(&data) {
                let kind = self.kind_from_tag(tag, msg, &pool_id, &wallet, pool);
                return SemanticEvent {
                    kind,
                    sig,
                    timestamp,
                    confidence: Confidence::High,
                };
            }
        }

        // 3. Event log discriminator
        if let Some(logs) = msg.get("logs").and_then(|l| l.as_array()) {
            for line in logs.iter().filter_map(|l| l.as_str()) {
                let Some(encoded) = line.strip_prefix(PROGRAM_DATA_MARKER).or_else(|| {
                    line.find(PROGRAM_DATA_MARKER)
                        .map(|i| &line[i + PROGRAM_DATA_MARKER.len()..])
                }) else {
                    continue;
                };
                let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded.trim())
                else {
                    continue;
                };
                if let Some((_, tag)) = self.tables.match_event(&decoded) {
                    let kind = self.kind_from_tag(tag, msg, &pool_id, &wallet, pool);
                    return SemanticEvent {
                        kind,
                        sig,
                        timestamp,
                        confidence: Confidence::High,
                    };
                }
            }
        }

        // 4. Shape heuristics
        if let Some(kind) = self.match_heuristics(msg, &pool_id, &wallet, pool) {
            return SemanticEvent {
                kind,
                sig,
                timestamp,
                confidence: Confidence::Medium,
            };
        }

        // 5. Trade-side tag alone
        if let Some(direction) = get_str(msg, SIDE_KEYS).as_deref().and_then(Direction::parse) {
            return SemanticEvent {
                kind: EventKind::Swap {
                    direction: Some(direction),
                    pool_id,
                    usd: None,
                    wallet,
                    amounts: extract_amounts(msg),
                },
                sig,
                timestamp,
                confidence: Confidence::Low,
            };
        }

        SemanticEvent {
            kind: EventKind::Unknown,
            sig,
            timestamp,
            confidence: Confidence::Low,
        }
    }

    fn match_explicit(
        &self,
        msg: &Value,
        pool_id: &Option<String>,
        wallet: &Option<String>,
        pool: Option<&Pool>,
    ) -> Option<EventKind> {
        for key in LABEL_KEYS {
            let Some(raw) = msg.get(*key).and_then(|v| v.as_str()) else {
                continue;
            };
            // Exact match on the normalized label; substring matching would
            // let "unlock_liquidity" collide with "lock_liquidity".
            let normalized = normalize_label(raw);
            match self.labels.get(normalized.as_str()) {
                Some(LabelMatch::Tagged(tag)) => {
                    return Some(self.kind_from_tag(tag.clone(), msg, pool_id, wallet, pool));
                }
                Some(LabelMatch::SwapSide(direction)) => {
                    return Some(EventKind::Swap {
                        direction: Some(*direction),
                        pool_id: pool_id.clone(),
                        usd: None,
                        wallet: wallet.clone(),
                        amounts: extract_amounts(msg),
                    });
                }
                None => {}
            }
        }
        None
    }

    fn match_heuristics(
        &self,
        msg: &Value,
        pool_id: &Option<String>,
        wallet: &Option<String>,
        pool: Option<&Pool>,
    ) -> Option<EventKind> {
        if get_u64(msg, &["sharesMinted", "shares_minted"]).is_some() {
            return Some(EventKind::LpAdd {
                pool_id: pool_id.clone(),
                usd: None,
                wallet: wallet.clone(),
            });
        }
        if get_u64(msg, &["sharesBurned", "shares_burned"]).is_some() {
            return Some(EventKind::LpRemove {
                pool_id: pool_id.clone(),
                usd: None,
                wallet: wallet.clone(),
            });
        }

        let amounts = extract_amounts(msg);
        if amounts.amount_in.is_some()
            && amounts.amount_out.is_some()
            && amounts.mint_in.is_some()
            && amounts.mint_out.is_some()
            && amounts.mint_in != amounts.mint_out
        {
            let direction = self.infer_direction(msg, &amounts, pool);
            return Some(EventKind::Swap {
                direction,
                pool_id: pool_id.clone(),
                usd: None,
                wallet: wallet.clone(),
                amounts,
            });
        }

        let has_base = get_u64(msg, BASE_AMOUNT_KEYS).is_some();
        let has_quote = get_u64(msg, QUOTE_AMOUNT_KEYS).is_some();
        if has_base && has_quote {
            let outflow = msg
                .get("isWithdrawal")
                .or_else(|| msg.get("is_withdrawal"))
                .or_else(|| msg.get("outflow"))
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            return Some(if outflow {
                EventKind::LpRemove {
                    pool_id: pool_id.clone(),
                    usd: None,
                    wallet: wallet.clone(),
                }
            } else {
                EventKind::LpAdd {
                    pool_id: pool_id.clone(),
                    usd: None,
                    wallet: wallet.clone(),
                }
            });
        }

        None
    }

    fn kind_from_tag(
        &self,
        tag: Tag,
        msg: &Value,
        pool_id: &Option<String>,
        wallet: &Option<String>,
        pool: Option<&Pool>,
    ) -> EventKind {
        match tag {
            Tag::Swap => {
                let amounts = extract_amounts(msg);
                let direction = self.infer_direction(msg, &amounts, pool);
                EventKind::Swap {
                    direction,
                    pool_id: pool_id.clone(),
                    usd: None,
                    wallet: wallet.clone(),
                    amounts,
                }
            }
            Tag::LpAdd => EventKind::LpAdd {
                pool_id: pool_id.clone(),
                usd: None,
                wallet: wallet.clone(),
            },
            Tag::LpRemove => EventKind::LpRemove {
                pool_id: pool_id.clone(),
                usd: None,
                wallet: wallet.clone(),
            },
            Tag::PoolInit => EventKind::PoolInit {
                pool_id: pool_id.clone(),
            },
            Tag::FeesDistributed => EventKind::FeesDistributed {
                pool_id: pool_id.clone(),
            },
            Tag::ClaimRewards => EventKind::ClaimRewards {
                pool_id: pool_id.clone(),
                wallet: wallet.clone(),
            },
            Tag::LockLiquidity => EventKind::LockLiquidity {
                pool_id: pool_id.clone(),
                wallet: wallet.clone(),
            },
            Tag::UnlockLiquidity => EventKind::UnlockLiquidity {
                pool_id: pool_id.clone(),
                wallet: wallet.clone(),
            },
            Tag::SyncStake => EventKind::SyncStake,
            Tag::ClosePool => EventKind::ClosePool {
                pool_id: pool_id.clone(),
            },
            Tag::ProtocolFees => EventKind::ProtocolFees {
                pool_id: pool_id.clone(),
            },
            Tag::Admin(name) => EventKind::Admin {
                pool_id: pool_id.clone(),
                event_name: name.to_string(),
            },
            Tag::Setup => EventKind::Setup,
        }
    }

    /// Direction of a swap. An explicit side wins; otherwise the in/out mints
    /// are compared against the pool's base/quote and the primary token, in
    /// that precedence. A swap with no resolvable direction still emits.
    fn infer_direction(
        &self,
        msg: &Value,
        amounts: &SwapAmounts,
        pool: Option<&Pool>,
    ) -> Option<Direction> {
        if let Some(direction) = get_str(msg, SIDE_KEYS).as_deref().and_then(Direction::parse) {
            return Some(direction);
        }

        let mint_in = amounts.mint_in.as_deref()?;
        let mint_out = amounts.mint_out.as_deref();

        if let (Some(pool), Some(mint_out)) = (pool, mint_out) {
            if mint_in == pool.quote && mint_out == pool.base {
                return Some(Direction::Buy);
            }
            if mint_in == pool.base && mint_out == pool.quote {
                return Some(Direction::Sell);
            }
        }
        if mint_out == Some(self.chain.primary_token_mint.as_str()) {
            return Some(Direction::Buy);
        }
        if mint_in == self.chain.primary_token_mint {
            return Some(Direction::Sell);
        }
        None
    }
}

fn explicit_label_table() -> HashMap<&'static str, LabelMatch> {
    let mut labels: HashMap<&'static str, LabelMatch> = HashMap::new();
    for (label, tag) in [
        ("swap", Tag::Swap),
        ("trade", Tag::Swap),
        ("add_liquidity", Tag::LpAdd),
        ("deposit", Tag::LpAdd),
        ("liquidity_deposited", Tag::LpAdd),
        ("remove_liquidity", Tag::LpRemove),
        ("withdraw", Tag::LpRemove),
        ("liquidity_withdrawn", Tag::LpRemove),
        ("initialize_pool", Tag::PoolInit),
        ("pool_initialized", Tag::PoolInit),
        ("new_pool", Tag::PoolInit),
        ("fees_distributed", Tag::FeesDistributed),
        ("claim_rewards", Tag::ClaimRewards),
        ("claim_holder_rewards", Tag::ClaimRewards),
        ("claim_nft_rewards", Tag::ClaimRewards),
        ("lock_liquidity", Tag::LockLiquidity),
        ("liquidity_locked", Tag::LockLiquidity),
        ("unlock_liquidity", Tag::UnlockLiquidity),
        ("sync_stake", Tag::SyncStake),
        ("sync_holder_stake", Tag::SyncStake),
        ("close_pool", Tag::ClosePool),
        ("protocol_fees", Tag::ProtocolFees),
        ("claim_protocol_fees", Tag::ProtocolFees),
        ("transfer_protocol_fees", Tag::ProtocolFees),
        ("update_admin", Tag::Admin("update_admin")),
        ("update_authorities", Tag::Admin("update_authorities")),
        ("update_fee_config", Tag::Admin("update_fee_config")),
        ("set_pause", Tag::Admin("set_pause")),
        ("set_pause_bits", Tag::Admin("set_pause_bits")),
        ("unpause_override", Tag::Admin("unpause_override")),
        ("create_bin_array", Tag::Setup),
        ("init_oracle", Tag::Setup),
        ("init_position_bin", Tag::Setup),
    ] {
        labels.insert(label, LabelMatch::Tagged(tag));
    }
    labels.insert("buy", LabelMatch::SwapSide(Direction::Buy));
    labels.insert("sell", LabelMatch::SwapSide(Direction::Sell));
    labels
}

/// Lowercase and fold `-`/space to `_` so camelCase vendors and snake_case
/// vendors land on the same key.
fn normalize_label(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 4);
    let mut prev_lower = false;
    for c in raw.chars() {
        if c == '-' || c == ' ' {
            out.push('_');
            prev_lower = false;
        } else if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else {
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
            out.push(c);
        }
    }
    out
}

fn get_str(msg: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(s) = msg.get(*key).and_then(|v| v.as_str()) {
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
    }
    None
}

/// Numeric field that may arrive as a JSON number or a decimal string.
fn get_u64(msg: &Value, keys: &[&str]) -> Option<u64> {
    for key in keys {
        match msg.get(*key) {
            Some(Value::Number(n)) => {
                if let Some(v) = n.as_u64() {
                    return Some(v);
                }
                if let Some(f) = n.as_f64() {
                    if f >= 0.0 {
                        return Some(f as u64);
                    }
                }
            }
            Some(Value::String(s)) => {
                if let Ok(v) = s.parse::<u64>() {
                    return Some(v);
                }
                if let Ok(f) = s.parse::<f64>() {
                    if f >= 0.0 {
                        return Some(f as u64);
                    }
                }
            }
            _ => {}
        }
    }
    None
}

fn get_u8(msg: &Value, keys: &[&str]) -> Option<u8> {
    get_u64(msg, keys).and_then(|v| u8::try_from(v).ok())
}

fn extract_amounts(msg: &Value) -> SwapAmounts {
    SwapAmounts {
        amount_in: get_u64(msg, AMOUNT_IN_KEYS),
        amount_out: get_u64(msg, AMOUNT_OUT_KEYS),
        mint_in: get_str(msg, MINT_IN_KEYS),
        mint_out: get_str(msg, MINT_OUT_KEYS),
        decimals_in: get_u8(msg, DECIMALS_IN_KEYS),
        decimals_out: get_u8(msg, DECIMALS_OUT_KEYS),
    }
}

/// Signature at the top level or nested under a trade/transaction object.
pub fn extract_sig(msg: &Value) -> Option<String> {
    if let Some(sig) = get_str(msg, SIG_KEYS) {
        return Some(sig);
    }
    for nested in ["trade", "transaction", "tx"] {
        if let Some(inner) = msg.get(nested) {
            if let Some(sig) = get_str(inner, SIG_KEYS) {
                return Some(sig);
            }
        }
    }
    None
}

fn extract_timestamp(msg: &Value) -> DateTime<Utc> {
    for key in TIMESTAMP_KEYS {
        if let Some(raw) = get_u64(msg, &[key]) {
            // Values above ~Nov 2286 in seconds are millisecond stamps.
            let secs = if raw > 10_000_000_000 { raw / 1000 } else { raw };
            if let Some(ts) = Utc.timestamp_opt(secs as i64, 0).single() {
                return ts;
            }
        }
    }
    Utc::now()
}

fn extract_instruction_data(msg: &Value) -> Option<Vec<u8>> {
    for key in IX_DATA_KEYS {
        let Some(raw) = msg.get(*key).and_then(|v| v.as_str()) else {
            continue;
        };
        if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(raw) {
            if bytes.len() >= 8 {
                return Some(bytes);
            }
        }
        if raw.len() >= 16 && raw.chars().all(|c| c.is_ascii_hexdigit()) {
            let hex = raw.strip_prefix("0x").unwrap_or(raw);
            if hex.len() % 2 == 0 {
                let bytes: Option<Vec<u8>> = (0..hex.len())
                    .step_by(2)
                    .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
                    .collect();
                if let Some(bytes) = bytes {
                    if bytes.len() >= 8 {
                        return Some(bytes);
                    }
                }
            }
        }
    }
    None
}
