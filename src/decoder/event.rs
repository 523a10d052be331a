//! Semantic event types produced by the decoder.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Trade direction relative to the pool's base token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Some(Direction::Buy),
            "sell" => Some(Direction::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Buy => write!(f, "buy"),
            Direction::Sell => write!(f, "sell"),
        }
    }
}

/// How certain the decoder is about the classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Raw swap legs as observed on the wire.
#[derive(Debug, Clone, Default)]
pub struct SwapAmounts {
    pub amount_in: Option<u64>,
    pub amount_out: Option<u64>,
    pub mint_in: Option<String>,
    pub mint_out: Option<String>,
    pub decimals_in: Option<u8>,
    pub decimals_out: Option<u8>,
}

/// Semantic classification of a raw on-chain message.
#[derive(Debug, Clone)]
pub enum EventKind {
    Swap {
        direction: Option<Direction>,
        pool_id: Option<String>,
        usd: Option<Decimal>,
        wallet: Option<String>,
        amounts: SwapAmounts,
    },
    LpAdd {
        pool_id: Option<String>,
        usd: Option<Decimal>,
        wallet: Option<String>,
    },
    LpRemove {
        pool_id: Option<String>,
        usd: Option<Decimal>,
        wallet: Option<String>,
    },
    PoolInit {
        pool_id: Option<String>,
    },
    FeesDistributed {
        pool_id: Option<String>,
    },
    ClaimRewards {
        pool_id: Option<String>,
        wallet: Option<String>,
    },
    LockLiquidity {
        pool_id: Option<String>,
        wallet: Option<String>,
    },
    UnlockLiquidity {
        pool_id: Option<String>,
        wallet: Option<String>,
    },
    SyncStake,
    ClosePool {
        pool_id: Option<String>,
    },
    ProtocolFees {
        pool_id: Option<String>,
    },
    Admin {
        pool_id: Option<String>,
        event_name: String,
    },
    Setup,
    Unknown,
}

impl EventKind {
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Swap { .. } => "swap",
            EventKind::LpAdd { .. } => "lp_add",
            EventKind::LpRemove { .. } => "lp_remove",
            EventKind::PoolInit { .. } => "pool_init",
            EventKind::FeesDistributed { .. } => "fees_distributed",
            EventKind::ClaimRewards { .. } => "claim_rewards",
            EventKind::LockLiquidity { .. } => "lock_liquidity",
            EventKind::UnlockLiquidity { .. } => "unlock_liquidity",
            EventKind::SyncStake => "sync_stake",
            EventKind::ClosePool { .. } => "close_pool",
            EventKind::ProtocolFees { .. } => "protocol_fees",
            EventKind::Admin { .. } => "admin",
            EventKind::Setup => "setup",
            EventKind::Unknown => "unknown",
        }
    }

    pub fn pool_id(&self) -> Option<&str> {
        match self {
            EventKind::Swap { pool_id, .. }
            | EventKind::LpAdd { pool_id, .. }
            | EventKind::LpRemove { pool_id, .. }
            | EventKind::PoolInit { pool_id }
            | EventKind::FeesDistributed { pool_id }
            | EventKind::ClaimRewards { pool_id, .. }
            | EventKind::LockLiquidity { pool_id, .. }
            | EventKind::UnlockLiquidity { pool_id, .. }
            | EventKind::ClosePool { pool_id }
            | EventKind::ProtocolFees { pool_id }
            | EventKind::Admin { pool_id, .. } => pool_id.as_deref(),
            EventKind::SyncStake | EventKind::Setup | EventKind::Unknown => None,
        }
    }

    pub fn wallet(&self) -> Option<&str> {
        match self {
            EventKind::Swap { wallet, .. }
            | EventKind::LpAdd { wallet, .. }
            | EventKind::LpRemove { wallet, .. }
            | EventKind::ClaimRewards { wallet, .. }
            | EventKind::LockLiquidity { wallet, .. }
            | EventKind::UnlockLiquidity { wallet, .. } => wallet.as_deref(),
            _ => None,
        }
    }

    pub fn usd(&self) -> Option<Decimal> {
        match self {
            EventKind::Swap { usd, .. }
            | EventKind::LpAdd { usd, .. }
            | EventKind::LpRemove { usd, .. } => *usd,
            _ => None,
        }
    }

    pub fn set_usd(&mut self, value: Option<Decimal>) {
        match self {
            EventKind::Swap { usd, .. }
            | EventKind::LpAdd { usd, .. }
            | EventKind::LpRemove { usd, .. } => *usd = value,
            _ => {}
        }
    }
}

/// A classified event together with its provenance.
#[derive(Debug, Clone)]
pub struct SemanticEvent {
    pub kind: EventKind,
    pub sig: String,
    pub timestamp: DateTime<Utc>,
    pub confidence: Confidence,
}

impl SemanticEvent {
    pub fn is_unknown(&self) -> bool {
        matches!(self.kind, EventKind::Unknown)
    }
}
