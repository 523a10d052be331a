//! Portfolio engine behavior against unreachable upstreams: the snapshot
//! skeleton, last_sync monotonicity, and request coalescing.

mod common;

use common::*;
use rust_decimal::Decimal;

#[tokio::test]
async fn sync_without_wallets_returns_none() {
    let (core, _sink) = build_core().await;
    core.store.ensure(1);
    assert!(core.portfolio.clone().sync(1).await.is_none());
}

#[tokio::test]
async fn sync_unknown_subscriber_returns_none() {
    let (core, _sink) = build_core().await;
    assert!(core.portfolio.clone().sync(404).await.is_none());
}

#[tokio::test]
async fn sync_builds_snapshot_with_consistent_totals() {
    let (core, _sink) = build_core().await;
    tokio::time::pause();
    core.commands.add_portfolio_wallet(1, WALLET_A).unwrap();

    let snapshot = core.portfolio.clone().sync(1).await.expect("snapshot");
    assert_eq!(snapshot.wallet_count, 1);
    assert!(snapshot.per_wallet.contains_key(WALLET_A));

    // Upstreams are unreachable, so every component is zero; the total must
    // still be the sum of its parts.
    let expected = snapshot.sol_value_usd
        + snapshot.token_value_usd
        + snapshot.lp_value_usd
        + snapshot.staked_value_usd;
    assert_eq!(snapshot.total_value_usd, expected);
    assert_eq!(snapshot.total_value_usd, Decimal::ZERO);

    // The snapshot is persisted onto the subscriber.
    let stored = core.store.get(1).unwrap();
    assert!(stored.portfolio.is_some());
}

#[tokio::test]
async fn last_sync_never_decreases() {
    let (core, _sink) = build_core().await;
    tokio::time::pause();
    core.commands.add_portfolio_wallet(1, WALLET_A).unwrap();

    let first = core.portfolio.clone().sync(1).await.expect("first");
    let second = core.portfolio.clone().sync(1).await.expect("second");
    assert!(second.last_sync >= first.last_sync);
}

#[tokio::test]
async fn concurrent_syncs_coalesce() {
    let (core, _sink) = build_core().await;
    tokio::time::pause();
    core.commands.add_portfolio_wallet(1, WALLET_A).unwrap();

    let engine_a = core.portfolio.clone();
    let engine_b = core.portfolio.clone();
    let (a, b) = tokio::join!(engine_a.sync(1), engine_b.sync(1));

    let a = a.expect("a");
    let b = b.expect("b");
    // Joined callers observe the same assembly.
    assert_eq!(a.last_sync, b.last_sync);
    assert_eq!(a.total_value_usd, b.total_value_usd);
}
