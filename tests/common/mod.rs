#![allow(dead_code)]

//! Shared test harness: a full `Core` against an in-memory store and a
//! recording notification sink. Upstream URLs point at an unroutable local
//! port, so provider calls fail fast and the code paths under test are the
//! in-process ones.

use async_trait::async_trait;
use dlmm_sentinel::config::*;
use dlmm_sentinel::core::Core;
use dlmm_sentinel::db;
use dlmm_sentinel::pools::Pool;
use dlmm_sentinel::sink::{ActionHint, NotificationSink, SendOutcome};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

pub const PRIMARY_MINT: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
pub const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const POOL_ID: &str = "58oQChx4yWmvKdwLLZzBi4ChoCc2fqCUWBkwMihLYQo2";
pub const WALLET_A: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";
pub const WALLET_B: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

/// Records every send; outcomes can be scripted per call.
pub struct RecordingSink {
    pub sent: Mutex<Vec<(i64, String)>>,
    outcomes: Mutex<VecDeque<SendOutcome>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            outcomes: Mutex::new(VecDeque::new()),
        })
    }

    /// Queue an outcome for an upcoming send; defaults to `SentOk`.
    pub fn push_outcome(&self, outcome: SendOutcome) {
        self.outcomes.lock().push_back(outcome);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn sent_to(&self, chat_id: i64) -> usize {
        self.sent.lock().iter().filter(|(id, _)| *id == chat_id).count()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, chat_id: i64, message: &str, _hints: &[ActionHint]) -> SendOutcome {
        let outcome = self
            .outcomes
            .lock()
            .pop_front()
            .unwrap_or(SendOutcome::SentOk);
        if outcome == SendOutcome::SentOk {
            self.sent.lock().push((chat_id, message.to_string()));
        }
        outcome
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        chain: ChainConfig {
            dex_program_id: "LBUZKhRxPF3XUpBCjp4YzTKgLccjZhTSDM9YuVaPwxo".to_string(),
            primary_token_mint: PRIMARY_MINT.to_string(),
            network_token_mint: WSOL_MINT.to_string(),
            stable_mints: vec![USDC_MINT.to_string()],
            stake_vaults: Vec::new(),
        },
        upstream: UpstreamConfig {
            dex_api_url: "http://127.0.0.1:9".to_string(),
            dex_ws_url: "ws://127.0.0.1:9".to_string(),
            rpc_url: "http://127.0.0.1:9".to_string(),
            rpc_ws_url: "ws://127.0.0.1:9".to_string(),
            rpc_api_key: None,
            birdeye_url: "http://127.0.0.1:9".to_string(),
            birdeye_api_key: None,
            dexscreener_url: "http://127.0.0.1:9".to_string(),
            coingecko_url: "http://127.0.0.1:9".to_string(),
            solscan_url: "http://127.0.0.1:9".to_string(),
            http_timeout_secs: 1,
        },
        database: DatabaseConfig {
            path: PathBuf::from(":memory:"),
            max_connections: 1,
        },
        feeds: FeedConfig::default(),
        refresh: RefreshConfig::default(),
        limits: LimitsConfig::default(),
        digest: DigestConfig::default(),
        debug: false,
    }
}

pub fn primary_pool() -> Pool {
    Pool {
        id: POOL_ID.to_string(),
        base: PRIMARY_MINT.to_string(),
        quote: USDC_MINT.to_string(),
        pair_name: "PRIME/USDC".to_string(),
        is_primary: true,
        created_at: None,
        tvl: None,
        fee_bps: Some(25),
        protocol_fee_bps: None,
        spot_price: None,
        lp_mint: None,
    }
}

/// A fully wired `Core` with a published pool snapshot and no network
/// activity (feeds and scheduler are not started).
pub async fn build_core() -> (Arc<Core>, Arc<RecordingSink>) {
    let pool = db::init_memory_pool().await.expect("memory db");
    db::run_migrations(&pool).await.expect("migrations");

    let sink = RecordingSink::new();
    let core = Core::new(test_config(), pool, sink.clone())
        .await
        .expect("core");
    core.registry.publish(vec![primary_pool()]);
    (core, sink)
}
