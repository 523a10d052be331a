//! End-to-end pipeline scenarios: raw feed message through decode, dedup,
//! valuation, and fan-out to the sink.

mod common;

use base64::Engine;
use common::*;
use dlmm_sentinel::decoder::discriminators;
use dlmm_sentinel::sink::SendOutcome;
use rust_decimal::Decimal;
use serde_json::json;

fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn swap_message(sig: &str) -> serde_json::Value {
    let mut data = discriminators::instruction_discriminator("swap").to_vec();
    data.extend_from_slice(&[0u8; 24]);
    json!({
        "instructionData": b64(&data),
        "signature": sig,
        "pool": POOL_ID,
        "amountIn": 1_000_000u64,
        "amountOut": 5_000_000_000u64,
        "mintIn": USDC_MINT,
        "mintOut": PRIMARY_MINT,
        "decimalsIn": 6,
        "decimalsOut": 9,
        "side": "buy",
    })
}

#[tokio::test]
async fn swap_via_discriminator_respects_thresholds() {
    let (core, sink) = build_core().await;

    // Subscriber 1 wants buys of at least $1; subscriber 2 needs more than
    // this trade is worth.
    core.store.ensure(1);
    core.store.update(1, |s| {
        s.primary_buys = true;
        s.primary_trade_min = Decimal::ONE;
    });
    core.store.ensure(2);
    core.store.update(2, |s| {
        s.primary_buys = true;
        s.primary_trade_min = Decimal::from(2);
    });

    let delivered = core.pipeline.handle_dex_message(&swap_message("sig-e2e-1")).await;

    // 1_000_000 raw USDC at 6 decimals is exactly $1.00.
    assert_eq!(delivered, 1);
    assert_eq!(sink.sent_to(1), 1);
    assert_eq!(sink.sent_to(2), 0);
    let sent = sink.sent.lock();
    assert!(sent[0].1.contains("Buy"));
}

#[tokio::test]
async fn event_log_fallback_classifies_lp_add() {
    let (core, sink) = build_core().await;
    core.store.ensure(1);
    core.store.update(1, |s| s.primary_lp_add = true);

    let mut payload = discriminators::event_discriminator("LiquidityDeposited").to_vec();
    payload.extend_from_slice(&[1u8; 16]);
    let msg = json!({
        "signature": "sig-lp-log",
        "pool": POOL_ID,
        "logs": [
            "Program log: Instruction: AddLiquidity",
            format!("Program data: {}", b64(&payload)),
        ],
    });

    let delivered = core.pipeline.handle_dex_message(&msg).await;
    assert_eq!(delivered, 1);
    assert!(sink.sent.lock()[0].1.contains("Liquidity added"));
}

#[tokio::test]
async fn same_signature_dedups_within_a_feed() {
    let (core, sink) = build_core().await;
    core.store.ensure(1);

    let msg = swap_message("sig-dup");
    assert_eq!(core.pipeline.handle_dex_message(&msg).await, 1);
    assert_eq!(core.pipeline.handle_dex_message(&msg).await, 0);
    assert_eq!(sink.sent_count(), 1);
}

#[tokio::test]
async fn wallet_and_pool_dedup_are_isolated() {
    let (core, sink) = build_core().await;

    core.store.ensure(1);
    core.store.update(1, |s| {
        s.wallet_subscriptions.insert(WALLET_A.to_string());
    });

    let sig = "sig-both-feeds";
    let dex_delivered = core.pipeline.handle_dex_message(&swap_message(sig)).await;

    // Same signature arrives on the wallet feed: the wallet alert still goes
    // out because the seen sets are disjoint.
    let wallet_msg = json!({
        "signature": sig,
        "nativeTransfers": [
            {"amount": 1_000_000_000u64, "fromUserAccount": WALLET_A, "toUserAccount": WALLET_B},
        ],
    });
    let wallet_delivered = core
        .pipeline
        .handle_wallet_message(WALLET_A, &wallet_msg)
        .await;

    assert_eq!(dex_delivered, 1);
    assert_eq!(wallet_delivered, 1);
    assert_eq!(sink.sent_to(1), 2);

    // Re-arrival on either feed is suppressed.
    assert_eq!(core.pipeline.handle_dex_message(&swap_message(sig)).await, 0);
    assert_eq!(
        core.pipeline.handle_wallet_message(WALLET_A, &wallet_msg).await,
        0
    );
}

#[tokio::test]
async fn heartbeats_are_dropped() {
    let (core, sink) = build_core().await;
    core.store.ensure(1);

    assert_eq!(core.pipeline.handle_dex_message(&json!("ping")).await, 0);
    assert_eq!(
        core.pipeline.handle_dex_message(&json!({"type": "heartbeat"})).await,
        0
    );
    assert_eq!(sink.sent_count(), 0);
}

#[tokio::test]
async fn unknown_events_match_no_subscriber() {
    let (core, sink) = build_core().await;
    core.store.ensure(1);
    core.store.update(1, |s| {
        s.track_other_pools = true;
        s.new_pool_alerts = true;
        s.admin_alerts = true;
    });

    let msg = json!({"signature": "sig-mystery", "unrelated": {"blob": true}});
    assert_eq!(core.pipeline.handle_dex_message(&msg).await, 0);
    assert_eq!(sink.sent_count(), 0);
}

#[tokio::test]
async fn blocked_user_is_demoted_on_sink_signal() {
    let (core, sink) = build_core().await;
    core.store.ensure(1);
    sink.push_outcome(SendOutcome::BlockedUser);

    let delivered = core.pipeline.handle_dex_message(&swap_message("sig-blocked")).await;
    assert_eq!(delivered, 0);

    let subscriber = core.store.get(1).unwrap();
    assert!(subscriber.blocked);
    assert!(!subscriber.enabled);

    // Blocked subscribers are skipped entirely on the next event.
    let delivered = core.pipeline.handle_dex_message(&swap_message("sig-after-block")).await;
    assert_eq!(delivered, 0);
    assert_eq!(sink.sent_count(), 0);
}

#[tokio::test]
async fn rate_limited_recipient_is_retried() {
    let (core, sink) = build_core().await;
    core.store.ensure(1);
    sink.push_outcome(SendOutcome::RateLimited { retry_after_s: 0 });

    let delivered = core.pipeline.handle_dex_message(&swap_message("sig-rl")).await;
    assert_eq!(delivered, 1);
    assert_eq!(sink.sent_to(1), 1);
}

#[tokio::test]
async fn successful_send_updates_ring_and_stats() {
    let (core, sink) = build_core().await;
    core.store.ensure(1);

    core.pipeline.handle_dex_message(&swap_message("sig-stats")).await;

    assert_eq!(sink.sent_to(1), 1);
    let subscriber = core.store.get(1).unwrap();
    assert_eq!(subscriber.recent_alerts.len(), 1);
    assert_eq!(subscriber.daily_stats.alerts, 1);
    assert_eq!(subscriber.lifetime_stats.alerts, 1);
    assert_eq!(subscriber.daily_stats.volume_usd, Decimal::ONE);
}

#[tokio::test]
async fn large_fanout_paces_sends() {
    let (core, sink) = build_core().await;
    tokio::time::pause();
    for chat_id in 0..1000 {
        core.store.ensure(chat_id);
    }

    let started = tokio::time::Instant::now();
    let delivered = core.pipeline.handle_dex_message(&swap_message("sig-pace")).await;
    let elapsed = started.elapsed();

    assert_eq!(delivered, 1000);
    assert_eq!(sink.sent_count(), 1000);
    // 1000 recipients in batches of 20 is at least 50 pauses of 100 ms.
    assert!(elapsed >= std::time::Duration::from_millis(50 * 100));
}

#[tokio::test]
async fn backup_poller_is_noop_while_feed_open() {
    let (core, _sink) = build_core().await;
    core.dex_feed
        .open_flag()
        .store(true, std::sync::atomic::Ordering::SeqCst);
    assert_eq!(core.backup_poller.poll().await, 0);
}

#[tokio::test]
async fn backup_poller_skips_without_volume_data() {
    let (core, _sink) = build_core().await;
    // Feed closed but the volume table is empty: nothing to poll.
    assert_eq!(core.backup_poller.poll().await, 0);
}
