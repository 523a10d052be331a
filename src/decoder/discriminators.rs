//! Anchor-style discriminator tables for the DEX program.
//!
//! An instruction discriminator is `sha256("global:<name>")[..8]`; an event
//! discriminator is `sha256("event:<Name>")[..8]`. The tables are built once
//! at startup from the known name lists, so the mapping round-trips by
//! construction.

use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Classification tag an 8-byte prefix maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    Swap,
    LpAdd,
    LpRemove,
    PoolInit,
    FeesDistributed,
    ClaimRewards,
    LockLiquidity,
    UnlockLiquidity,
    SyncStake,
    ClosePool,
    ProtocolFees,
    Admin(&'static str),
    Setup,
}

/// Instruction names understood by the decoder, with the tag each maps to.
pub const INSTRUCTIONS: &[(&str, Tag)] = &[
    ("swap", Tag::Swap),
    ("add_liquidity", Tag::LpAdd),
    ("add_liquidity2", Tag::LpAdd),
    ("add_liquidity_batch", Tag::LpAdd),
    ("withdraw", Tag::LpRemove),
    ("close_position", Tag::LpRemove),
    ("lock_liquidity", Tag::LockLiquidity),
    ("unlock_liquidity", Tag::UnlockLiquidity),
    ("initialize_pool", Tag::PoolInit),
    ("close_pool", Tag::ClosePool),
    // Opening a position is an add from the pool's perspective.
    ("initialize_position", Tag::LpAdd),
    ("claim_protocol_fees", Tag::ProtocolFees),
    ("transfer_protocol_fees", Tag::ProtocolFees),
    ("claim_holder_rewards", Tag::ClaimRewards),
    ("claim_nft_rewards", Tag::ClaimRewards),
    ("sync_holder_stake", Tag::SyncStake),
    ("update_admin", Tag::Admin("update_admin")),
    ("update_authorities", Tag::Admin("update_authorities")),
    ("update_fee_config", Tag::Admin("update_fee_config")),
    ("set_pause", Tag::Admin("set_pause")),
    ("set_pause_bits", Tag::Admin("set_pause_bits")),
    ("unpause_override", Tag::Admin("unpause_override")),
    ("create_bin_array", Tag::Setup),
    ("init_oracle", Tag::Setup),
    ("init_position_bin", Tag::Setup),
    ("init_farming_global_state", Tag::Setup),
    ("init_staking_global_state", Tag::Setup),
    ("init_user_farming_state", Tag::Setup),
    ("init_user_staking_state", Tag::Setup),
    ("view_farming_position", Tag::Setup),
];

/// Event names emitted in program-data log lines.
pub const EVENTS: &[(&str, Tag)] = &[
    ("SwapExecuted", Tag::Swap),
    ("LiquidityDeposited", Tag::LpAdd),
    ("LiquidityWithdrawnUser", Tag::LpRemove),
    ("LiquidityWithdrawnAdmin", Tag::LpRemove),
    ("PoolInitialized", Tag::PoolInit),
    ("FeesDistributed", Tag::FeesDistributed),
    ("LiquidityLocked", Tag::LockLiquidity),
    ("ClaimHolderRewardsEvent", Tag::ClaimRewards),
    ("SyncHolderStakeEvent", Tag::SyncStake),
    ("AdminUpdated", Tag::Admin("admin_updated")),
    ("AuthoritiesUpdated", Tag::Admin("authorities_updated")),
    ("FeeConfigUpdated", Tag::Admin("fee_config_updated")),
    ("PauseUpdated", Tag::Admin("pause_updated")),
    ("BinArrayCreated", Tag::Setup),
    ("LiquidityBinCreated", Tag::Setup),
    ("PairRegistered", Tag::Setup),
];

pub fn instruction_discriminator(name: &str) -> [u8; 8] {
    anchor_discriminator("global", name)
}

pub fn event_discriminator(name: &str) -> [u8; 8] {
    anchor_discriminator("event", name)
}

fn anchor_discriminator(prefix: &str, name: &str) -> [u8; 8] {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}", prefix, name).as_bytes());
    let digest = hasher.finalize();
    let mut disc = [0u8; 8];
    disc.copy_from_slice(&digest[..8]);
    disc
}

/// Lookup tables keyed by 8-byte prefix.
pub struct DiscriminatorTables {
    instructions: HashMap<[u8; 8], (&'static str, Tag)>,
    events: HashMap<[u8; 8], (&'static str, Tag)>,
}

impl DiscriminatorTables {
    pub fn new() -> Self {
        let instructions = INSTRUCTIONS
            .iter()
            .map(|(name, tag)| (instruction_discriminator(name), (*name, tag.clone())))
            .collect();
        let events = EVENTS
            .iter()
            .map(|(name, tag)| (event_discriminator(name), (*name, tag.clone())))
            .collect();
        Self {
            instructions,
            events,
        }
    }

    pub fn match_instruction(&self, data: &[u8]) -> Option<(&'static str, Tag)> {
        if data.len() < 8 {
            return None;
        }
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&data[..8]);
        self.instructions.get(&prefix).cloned()
    }

    pub fn match_event(&self, data: &[u8]) -> Option<(&'static str, Tag)> {
        if data.len() < 8 {
            return None;
        }
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&data[..8]);
        self.events.get(&prefix).cloned()
    }
}

impl Default for DiscriminatorTables {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_instruction_discriminator_pinned() {
        // sha256("global:swap")[..8]
        assert_eq!(
            instruction_discriminator("swap"),
            [248, 198, 158, 145, 225, 117, 135, 200]
        );
    }

    #[test]
    fn test_every_instruction_round_trips() {
        let tables = DiscriminatorTables::new();
        for (name, tag) in INSTRUCTIONS {
            let disc = instruction_discriminator(name);
            let (matched_name, matched_tag) = tables
                .match_instruction(&disc)
                .unwrap_or_else(|| panic!("no match for instruction {}", name));
            assert_eq!(matched_name, *name);
            assert_eq!(&matched_tag, tag);
        }
    }

    #[test]
    fn test_every_event_round_trips() {
        let tables = DiscriminatorTables::new();
        for (name, tag) in EVENTS {
            let disc = event_discriminator(name);
            let (matched_name, matched_tag) = tables
                .match_event(&disc)
                .unwrap_or_else(|| panic!("no match for event {}", name));
            assert_eq!(matched_name, *name);
            assert_eq!(&matched_tag, tag);
        }
    }

    #[test]
    fn test_lock_and_unlock_are_distinct() {
        let lock = instruction_discriminator("lock_liquidity");
        let unlock = instruction_discriminator("unlock_liquidity");
        assert_ne!(lock, unlock);

        let tables = DiscriminatorTables::new();
        assert_eq!(tables.match_instruction(&lock).unwrap().1, Tag::LockLiquidity);
        assert_eq!(
            tables.match_instruction(&unlock).unwrap().1,
            Tag::UnlockLiquidity
        );
    }

    #[test]
    fn test_short_data_is_no_match() {
        let tables = DiscriminatorTables::new();
        assert!(tables.match_instruction(&[1, 2, 3]).is_none());
        assert!(tables.match_event(&[]).is_none());
    }
}
