//! Subscriber filter and fan-out.
//!
//! For each classified event the recipient set is built by a linear scan of
//! the subscriber map, evaluating enabled/blocked/snooze plus the per-event
//! predicate. Sends are paced (100 ms per 20 sends) against the chat
//! platform's per-second ceiling; RateLimited outcomes honor the advertised
//! retry-after, and BlockedUser outcomes demote the subscriber.

use crate::decoder::{Direction, EventKind, SemanticEvent};
use crate::pools::Pool;
use crate::resolver::{escape_markdown, TokenMetaResolver};
use crate::sink::{ActionHint, NotificationSink, SendOutcome};
use crate::subscribers::{Subscriber, SubscriberStore};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

const SEND_BATCH: usize = 20;
const SEND_PAUSE: Duration = Duration::from_millis(100);
const RATE_LIMIT_MAX_RETRIES: u32 = 3;

pub struct FanOut {
    store: Arc<SubscriberStore>,
    sink: Arc<dyn NotificationSink>,
    meta: TokenMetaResolver,
}

impl FanOut {
    pub fn new(
        store: Arc<SubscriberStore>,
        sink: Arc<dyn NotificationSink>,
        meta: TokenMetaResolver,
    ) -> Self {
        Self { store, sink, meta }
    }

    /// Fan a classified DEX event out to every matching subscriber.
    /// Returns the number of successful sends.
    pub async fn notify_event(&self, event: &SemanticEvent, pool: Option<&Pool>) -> usize {
        if event.is_unknown() {
            return 0;
        }
        let now = Utc::now();
        let recipients: Vec<Subscriber> = self
            .store
            .all()
            .into_iter()
            .filter(|u| u.enabled && !u.blocked && !u.is_snoozed(now))
            .filter(|u| event_predicate(u, &event.kind, pool))
            .collect();
        if recipients.is_empty() {
            return 0;
        }

        let message = render_event(event, pool, &self.meta);
        let hints = event_hints(event, pool);
        self.send_to_all(&recipients, &message, &hints, event.kind.usd())
            .await
    }

    /// Wallet-scoped alert: the sending wallet must be in the recipient's
    /// subscriptions.
    pub async fn notify_wallet_alert(
        &self,
        wallet: &str,
        usd: Option<Decimal>,
        sig: &str,
    ) -> usize {
        let now = Utc::now();
        let recipients: Vec<Subscriber> = self
            .store
            .all()
            .into_iter()
            .filter(|u| u.enabled && !u.blocked && !u.is_snoozed(now))
            .filter(|u| u.wallet_alerts && u.wallet_subscriptions.contains(wallet))
            .collect();
        if recipients.is_empty() {
            return 0;
        }

        let short = crate::resolver::metadata::short_form(wallet);
        let message = match usd {
            Some(usd) => format!("\u{1F440} Wallet {} moved \u{2248}${:.2}", short, usd),
            None => format!("\u{1F440} Wallet {} had on-chain activity", short),
        };
        let hints = vec![ActionHint::ViewTx(sig.to_string()), ActionHint::Snooze1h];
        self.send_to_all(&recipients, &message, &hints, usd).await
    }

    /// Daily digest broadcast for digest-enabled subscribers. Daily counters
    /// reset after a successful send.
    pub async fn broadcast_digest(&self) -> usize {
        let now = Utc::now();
        let recipients: Vec<Subscriber> = self
            .store
            .all()
            .into_iter()
            .filter(|u| u.enabled && !u.blocked && u.daily_digest && !u.is_snoozed(now))
            .collect();

        let mut sent = 0;
        for (index, recipient) in recipients.iter().enumerate() {
            let message = format!(
                "\u{1F4C5} Daily digest: {} alerts, \u{2248}${:.2} volume seen",
                recipient.daily_stats.alerts, recipient.daily_stats.volume_usd
            );
            if self.send_one(recipient.chat_id, &message, &[]).await {
                sent += 1;
                self.store.update(recipient.chat_id, |s| {
                    s.daily_stats = Default::default();
                });
            }
            self.pace(index).await;
        }
        if sent > 0 {
            Arc::clone(&self.store).request_flush();
        }
        sent
    }

    async fn send_to_all(
        &self,
        recipients: &[Subscriber],
        message: &str,
        hints: &[ActionHint],
        usd: Option<Decimal>,
    ) -> usize {
        let mut sent = 0;
        for (index, recipient) in recipients.iter().enumerate() {
            if self.send_one(recipient.chat_id, message, hints).await {
                sent += 1;
                self.record_success(recipient.chat_id, message, usd);
            }
            self.pace(index).await;
        }
        if sent > 0 {
            Arc::clone(&self.store).request_flush();
        }
        tracing::debug!(recipients = recipients.len(), sent, "Fan-out complete");
        sent
    }

    /// One recipient, honoring rate-limit retry and demoting blocked users.
    async fn send_one(&self, chat_id: i64, message: &str, hints: &[ActionHint]) -> bool {
        let mut attempts = 0;
        loop {
            match self.sink.send(chat_id, message, hints).await {
                SendOutcome::SentOk => return true,
                SendOutcome::RateLimited { retry_after_s } => {
                    attempts += 1;
                    if attempts > RATE_LIMIT_MAX_RETRIES {
                        tracing::warn!(chat_id, "Giving up on rate-limited recipient");
                        return false;
                    }
                    tracing::debug!(chat_id, retry_after_s, "Sink rate limited, waiting");
                    tokio::time::sleep(Duration::from_secs(retry_after_s)).await;
                }
                SendOutcome::BlockedUser => {
                    tracing::info!(chat_id, "Subscriber blocked the bot, disabling");
                    self.store.update(chat_id, |s| {
                        s.enabled = false;
                        s.blocked = true;
                    });
                    Arc::clone(&self.store).request_flush();
                    return false;
                }
                SendOutcome::TransientError => {
                    tracing::warn!(chat_id, "Transient sink error, dropping send");
                    return false;
                }
            }
        }
    }

    fn record_success(&self, chat_id: i64, message: &str, usd: Option<Decimal>) {
        self.store.push_recent_alert(chat_id, message.to_string());
        self.store.update(chat_id, |s| {
            s.daily_stats.alerts += 1;
            s.lifetime_stats.alerts += 1;
            if let Some(usd) = usd {
                s.daily_stats.volume_usd += usd;
                s.lifetime_stats.volume_usd += usd;
            }
        });
    }

    async fn pace(&self, index: usize) {
        if (index + 1) % SEND_BATCH == 0 {
            tokio::time::sleep(SEND_PAUSE).await;
        }
    }
}

/// Per-event-type predicate, after the enabled/blocked/snooze gate.
pub fn event_predicate(u: &Subscriber, kind: &EventKind, pool: Option<&Pool>) -> bool {
    let is_primary = pool.map(|p| p.is_primary).unwrap_or(false);
    let usd_of = |usd: &Option<Decimal>| usd.unwrap_or(Decimal::ZERO);

    match kind {
        EventKind::Swap {
            direction, usd, wallet, ..
        } => {
            if is_primary {
                let side_ok = match direction {
                    Some(Direction::Buy) => u.primary_buys,
                    Some(Direction::Sell) => u.primary_sells,
                    None => u.primary_buys || u.primary_sells,
                };
                side_ok && usd_of(usd) >= u.primary_trade_min
            } else {
                if !u.track_other_pools {
                    return false;
                }
                let interested = wallet
                    .as_deref()
                    .map(|w| u.wallet_subscriptions.contains(w))
                    .unwrap_or(false)
                    || pool.map(|p| u.watchlist.contains(&p.id)).unwrap_or(false)
                    || pool
                        .map(|p| {
                            u.tracked_tokens.contains(&p.base) || u.tracked_tokens.contains(&p.quote)
                        })
                        .unwrap_or(false);
                let side_ok = match direction {
                    Some(Direction::Buy) => u.other_buys,
                    Some(Direction::Sell) => u.other_sells,
                    None => u.other_buys || u.other_sells,
                };
                interested && side_ok && usd_of(usd) >= u.other_trade_min
            }
        }
        EventKind::LpAdd { usd, .. } => {
            if is_primary {
                u.primary_lp_add && usd_of(usd) >= u.primary_trade_min
            } else {
                u.track_other_pools && u.other_lp_add && usd_of(usd) >= u.other_lp_min
            }
        }
        EventKind::LpRemove { usd, .. } => {
            if is_primary {
                u.primary_lp_remove && usd_of(usd) >= u.primary_trade_min
            } else {
                u.track_other_pools && u.other_lp_remove && usd_of(usd) >= u.other_lp_min
            }
        }
        EventKind::PoolInit { .. } => u.new_pool_alerts,
        EventKind::LockLiquidity { .. } | EventKind::UnlockLiquidity { .. } => u.lock_alerts,
        EventKind::ClaimRewards { .. } | EventKind::FeesDistributed { .. } => u.reward_alerts,
        EventKind::ClosePool { .. } => u.close_pool_alerts,
        EventKind::ProtocolFees { .. } => u.protocol_fee_alerts,
        EventKind::Admin { .. } => u.admin_alerts,
        EventKind::SyncStake | EventKind::Setup | EventKind::Unknown => false,
    }
}

fn pair_label(pool: Option<&Pool>, meta: &TokenMetaResolver, kind: &EventKind) -> String {
    if let Some(pool) = pool {
        return escape_markdown(&pool.pair_name);
    }
    if let EventKind::Swap { amounts, .. } = kind {
        if let Some(mint) = amounts.mint_out.as_deref().or(amounts.mint_in.as_deref()) {
            return escape_markdown(&meta.get_symbol(mint));
        }
    }
    "?".to_string()
}

fn render_event(event: &SemanticEvent, pool: Option<&Pool>, meta: &TokenMetaResolver) -> String {
    let pair = pair_label(pool, meta, &event.kind);
    let usd = event
        .kind
        .usd()
        .map(|v| format!(" \u{2248}${:.2}", v))
        .unwrap_or_default();

    match &event.kind {
        EventKind::Swap { direction, .. } => match direction {
            Some(Direction::Buy) => format!("\u{1F7E2} Buy{} on {}", usd, pair),
            Some(Direction::Sell) => format!("\u{1F534} Sell{} on {}", usd, pair),
            None => format!("\u{1F501} Swap{} on {}", usd, pair),
        },
        EventKind::LpAdd { .. } => format!("\u{1F4A7} Liquidity added{} to {}", usd, pair),
        EventKind::LpRemove { .. } => format!("\u{1F4A8} Liquidity removed{} from {}", usd, pair),
        EventKind::PoolInit { .. } => format!("\u{1F195} New pool {}", pair),
        EventKind::FeesDistributed { .. } => format!("\u{1F4B8} Fees distributed on {}", pair),
        EventKind::ClaimRewards { .. } => format!("\u{1F381} Rewards claimed on {}", pair),
        EventKind::LockLiquidity { .. } => format!("\u{1F512} Liquidity locked on {}", pair),
        EventKind::UnlockLiquidity { .. } => format!("\u{1F513} Liquidity unlocked on {}", pair),
        EventKind::SyncStake => "\u{1F504} Stake synced".to_string(),
        EventKind::ClosePool { .. } => format!("\u{26D4} Pool closed: {}", pair),
        EventKind::ProtocolFees { .. } => format!("\u{1F3E6} Protocol fees on {}", pair),
        EventKind::Admin { event_name, .. } => {
            format!("\u{1F527} Admin action `{}` on {}", event_name, pair)
        }
        EventKind::Setup => "\u{2699} Setup instruction".to_string(),
        EventKind::Unknown => String::new(),
    }
}

fn event_hints(event: &SemanticEvent, pool: Option<&Pool>) -> Vec<ActionHint> {
    let mut hints = Vec::with_capacity(3);
    if !event.sig.is_empty() {
        hints.push(ActionHint::ViewTx(event.sig.clone()));
    }
    if let Some(pool) = pool {
        hints.push(ActionHint::AddToWatchlist(pool.id.clone()));
    }
    hints.push(ActionHint::Snooze1h);
    hints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{Confidence, SwapAmounts};
    use crate::subscribers::Subscriber;
    use std::str::FromStr;

    fn primary_pool() -> Pool {
        Pool {
            id: "P1".into(),
            base: "PRIME".into(),
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

    fn other_pool() -> Pool {
        Pool {
            is_primary: false,
            id: "P2".into(),
            base: "OTHER".into(),
            quote: "USDC".into(),
            pair_name: "OTHER/USDC".into(),
            ..primary_pool()
        }
    }

    fn swap(direction: Option<Direction>, usd: &str, wallet: Option<&str>) -> EventKind {
        EventKind::Swap {
            direction,
            pool_id: Some("P1".into()),
            usd: Some(Decimal::from_str(usd).unwrap()),
            wallet: wallet.map(|w| w.to_string()),
            amounts: SwapAmounts::default(),
        }
    }

    #[test]
    fn test_primary_buy_threshold() {
        let mut u = Subscriber::new(1);
        u.primary_buys = true;
        u.primary_trade_min = Decimal::from(100);

        let small = swap(Some(Direction::Buy), "50", None);
        let large = swap(Some(Direction::Buy), "150", None);
        assert!(!event_predicate(&u, &small, Some(&primary_pool())));
        assert!(event_predicate(&u, &large, Some(&primary_pool())));
    }

    #[test]
    fn test_primary_sell_uses_sell_toggle() {
        let mut u = Subscriber::new(1);
        u.primary_buys = false;
        u.primary_sells = true;
        let sell = swap(Some(Direction::Sell), "10", None);
        let buy = swap(Some(Direction::Buy), "10", None);
        assert!(event_predicate(&u, &sell, Some(&primary_pool())));
        assert!(!event_predicate(&u, &buy, Some(&primary_pool())));
    }

    #[test]
    fn test_other_pool_requires_interest() {
        let mut u = Subscriber::new(1);
        u.track_other_pools = true;
        u.other_buys = true;

        let event = swap(Some(Direction::Buy), "10", None);
        // Not tracked, not watched: no alert.
        assert!(!event_predicate(&u, &event, Some(&other_pool())));

        u.watchlist.insert("P2".into());
        assert!(event_predicate(&u, &event, Some(&other_pool())));
    }

    #[test]
    fn test_other_pool_tracked_wallet_qualifies() {
        let mut u = Subscriber::new(1);
        u.track_other_pools = true;
        u.other_buys = true;
        u.wallet_subscriptions.insert("W".into());

        let event = swap(Some(Direction::Buy), "10", Some("W"));
        assert!(event_predicate(&u, &event, Some(&other_pool())));
    }

    #[test]
    fn test_other_pool_tracked_token_qualifies() {
        let mut u = Subscriber::new(1);
        u.track_other_pools = true;
        u.other_sells = true;
        u.tracked_tokens.insert("OTHER".into());

        let event = swap(Some(Direction::Sell), "10", None);
        assert!(event_predicate(&u, &event, Some(&other_pool())));
    }

    #[test]
    fn test_lp_predicates() {
        let mut u = Subscriber::new(1);
        u.primary_lp_add = true;
        u.primary_trade_min = Decimal::from(5);
        let lp = EventKind::LpAdd {
            pool_id: Some("P1".into()),
            usd: Some(Decimal::from(10)),
            wallet: None,
        };
        assert!(event_predicate(&u, &lp, Some(&primary_pool())));

        // Other pool LP needs track_other_pools plus its own toggle.
        let mut v = Subscriber::new(2);
        v.other_lp_remove = true;
        let lp_remove = EventKind::LpRemove {
            pool_id: Some("P2".into()),
            usd: Some(Decimal::from(10)),
            wallet: None,
        };
        assert!(!event_predicate(&v, &lp_remove, Some(&other_pool())));
        v.track_other_pools = true;
        assert!(event_predicate(&v, &lp_remove, Some(&other_pool())));
    }

    #[test]
    fn test_toggle_only_events() {
        let mut u = Subscriber::new(1);
        assert!(!event_predicate(&u, &EventKind::PoolInit { pool_id: None }, None));
        u.new_pool_alerts = true;
        assert!(event_predicate(&u, &EventKind::PoolInit { pool_id: None }, None));

        u.admin_alerts = true;
        let admin = EventKind::Admin {
            pool_id: None,
            event_name: "set_pause".into(),
        };
        assert!(event_predicate(&u, &admin, None));
    }

    #[test]
    fn test_unknown_matches_no_one() {
        let mut u = Subscriber::new(1);
        // Even with everything on, Unknown is dropped.
        u.new_pool_alerts = true;
        u.admin_alerts = true;
        u.track_other_pools = true;
        assert!(!event_predicate(&u, &EventKind::Unknown, None));
    }

    #[test]
    fn test_render_swap_message() {
        let event = SemanticEvent {
            kind: swap(Some(Direction::Buy), "123.45", None),
            sig: "sig".into(),
            timestamp: Utc::now(),
            confidence: Confidence::High,
        };
        let meta = test_meta();
        let text = render_event(&event, Some(&primary_pool()), &meta);
        assert!(text.contains("Buy"));
        assert!(text.contains("123.45"));
        assert!(text.contains("PRIME/USDC"));
    }

    fn test_meta() -> TokenMetaResolver {
        use crate::net::{ApiHealthRegistry, RateLimiters};
        use crate::providers::*;
        let shared = ProviderShared::new(
            Arc::new(RateLimiters::new()),
            Arc::new(ApiHealthRegistry::new()),
        );
        TokenMetaResolver::new(
            10,
            Arc::new(DexApiClient::new(shared.clone(), "http://localhost:0".into())),
            Arc::new(SolscanClient::new(shared.clone(), "http://localhost:0".into())),
            Arc::new(DexScreenerClient::new(shared.clone(), "http://localhost:0".into())),
            Arc::new(RpcAggregatorClient::new(shared, "http://localhost:0".into(), None)),
        )
    }
}
