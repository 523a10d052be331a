//! Live WebSocket feeds and the polling fallback.

pub mod backup_poll;
pub mod dex_ws;
pub mod wallet_ws;

pub use backup_poll::BackupPoller;
pub use dex_ws::DexFeed;
pub use wallet_ws::WalletFeed;

use std::time::Duration;

/// Reconnect ceiling.
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// `min(base * 2^attempts, 5 min)`, incrementing the attempt counter.
pub(crate) async fn sleep_with_backoff(attempts: &mut u32, base_ms: u64) {
    let factor = 2u64.saturating_pow((*attempts).min(16));
    let delay = Duration::from_millis(base_ms.saturating_mul(factor)).min(MAX_BACKOFF);
    *attempts = attempts.saturating_add(1);
    tracing::debug!(attempt = *attempts, delay_ms = delay.as_millis() as u64, "Reconnect backoff");
    tokio::time::sleep(delay).await;
}
