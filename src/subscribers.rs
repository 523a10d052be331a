//! Subscriber model and store.
//!
//! The store keeps every subscriber in memory and mirrors changes to SQLite
//! through a debounced dirty set: mutations mark the subscriber dirty and a
//! short-delay flush batches the writes per subscriber transactionally.

use crate::db::DbPool;
use crate::error::AppResult;
use crate::portfolio::snapshot::PortfolioSnapshot;
use chrono::{DateTime, TimeZone, Timelike, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use sqlx::Row;
use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The closed set of per-subscriber boolean toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Enabled,
    PrimaryBuys,
    PrimarySells,
    PrimaryLpAdd,
    PrimaryLpRemove,
    TrackOtherPools,
    OtherLpAdd,
    OtherLpRemove,
    OtherBuys,
    OtherSells,
    WalletAlerts,
    DailyDigest,
    NewPoolAlerts,
    LockAlerts,
    RewardAlerts,
    ClosePoolAlerts,
    ProtocolFeeAlerts,
    AdminAlerts,
}

impl FilterField {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "enabled" => FilterField::Enabled,
            "primary_buys" => FilterField::PrimaryBuys,
            "primary_sells" => FilterField::PrimarySells,
            "primary_lp_add" => FilterField::PrimaryLpAdd,
            "primary_lp_remove" => FilterField::PrimaryLpRemove,
            "track_other_pools" => FilterField::TrackOtherPools,
            "other_lp_add" => FilterField::OtherLpAdd,
            "other_lp_remove" => FilterField::OtherLpRemove,
            "other_buys" => FilterField::OtherBuys,
            "other_sells" => FilterField::OtherSells,
            "wallet_alerts" => FilterField::WalletAlerts,
            "daily_digest" => FilterField::DailyDigest,
            "new_pool_alerts" => FilterField::NewPoolAlerts,
            "lock_alerts" => FilterField::LockAlerts,
            "reward_alerts" => FilterField::RewardAlerts,
            "close_pool_alerts" => FilterField::ClosePoolAlerts,
            "protocol_fee_alerts" => FilterField::ProtocolFeeAlerts,
            "admin_alerts" => FilterField::AdminAlerts,
            _ => return None,
        })
    }
}

/// Which threshold `set_threshold` addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdKind {
    Primary,
    OtherTrade,
    OtherLp,
}

/// Alert counters, kept per day and per lifetime.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub alerts: u64,
    pub volume_usd: Decimal,
}

#[derive(Debug, Clone)]
pub struct RecentAlert {
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Subscriber {
    pub chat_id: i64,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub enabled: bool,
    pub blocked: bool,
    pub onboarded: bool,
    /// 0 = not snoozed, otherwise epoch seconds.
    pub snoozed_until: i64,
    pub quiet_start: Option<u32>,
    pub quiet_end: Option<u32>,

    pub primary_buys: bool,
    pub primary_sells: bool,
    pub primary_lp_add: bool,
    pub primary_lp_remove: bool,
    pub track_other_pools: bool,
    pub other_buys: bool,
    pub other_sells: bool,
    pub other_lp_add: bool,
    pub other_lp_remove: bool,
    pub wallet_alerts: bool,
    pub daily_digest: bool,
    pub new_pool_alerts: bool,
    pub lock_alerts: bool,
    pub reward_alerts: bool,
    pub close_pool_alerts: bool,
    pub protocol_fee_alerts: bool,
    pub admin_alerts: bool,

    pub primary_trade_min: Decimal,
    pub other_trade_min: Decimal,
    pub other_lp_min: Decimal,

    pub wallet_subscriptions: HashSet<String>,
    pub watchlist: HashSet<String>,
    pub tracked_tokens: HashSet<String>,
    /// Ordered; the first entry is the display-primary wallet.
    pub portfolio_wallets: Vec<String>,

    pub recent_alerts: VecDeque<RecentAlert>,
    pub portfolio: Option<PortfolioSnapshot>,
    pub daily_stats: Stats,
    pub lifetime_stats: Stats,
}

impl Subscriber {
    pub fn new(chat_id: i64) -> Self {
        let now = Utc::now();
        Self {
            chat_id,
            created_at: now,
            last_active: now,
            enabled: true,
            blocked: false,
            onboarded: false,
            snoozed_until: 0,
            quiet_start: None,
            quiet_end: None,
            primary_buys: true,
            primary_sells: true,
            primary_lp_add: false,
            primary_lp_remove: false,
            track_other_pools: false,
            other_buys: false,
            other_sells: false,
            other_lp_add: false,
            other_lp_remove: false,
            wallet_alerts: true,
            daily_digest: false,
            new_pool_alerts: false,
            lock_alerts: false,
            reward_alerts: false,
            close_pool_alerts: false,
            protocol_fee_alerts: false,
            admin_alerts: false,
            primary_trade_min: Decimal::ZERO,
            other_trade_min: Decimal::ZERO,
            other_lp_min: Decimal::ZERO,
            wallet_subscriptions: HashSet::new(),
            watchlist: HashSet::new(),
            tracked_tokens: HashSet::new(),
            portfolio_wallets: Vec::new(),
            recent_alerts: VecDeque::new(),
            portfolio: None,
            daily_stats: Stats::default(),
            lifetime_stats: Stats::default(),
        }
    }

    pub fn get_toggle(&self, field: FilterField) -> bool {
        match field {
            FilterField::Enabled => self.enabled,
            FilterField::PrimaryBuys => self.primary_buys,
            FilterField::PrimarySells => self.primary_sells,
            FilterField::PrimaryLpAdd => self.primary_lp_add,
            FilterField::PrimaryLpRemove => self.primary_lp_remove,
            FilterField::TrackOtherPools => self.track_other_pools,
            FilterField::OtherLpAdd => self.other_lp_add,
            FilterField::OtherLpRemove => self.other_lp_remove,
            FilterField::OtherBuys => self.other_buys,
            FilterField::OtherSells => self.other_sells,
            FilterField::WalletAlerts => self.wallet_alerts,
            FilterField::DailyDigest => self.daily_digest,
            FilterField::NewPoolAlerts => self.new_pool_alerts,
            FilterField::LockAlerts => self.lock_alerts,
            FilterField::RewardAlerts => self.reward_alerts,
            FilterField::ClosePoolAlerts => self.close_pool_alerts,
            FilterField::ProtocolFeeAlerts => self.protocol_fee_alerts,
            FilterField::AdminAlerts => self.admin_alerts,
        }
    }

    pub fn set_toggle(&mut self, field: FilterField, value: bool) {
        match field {
            FilterField::Enabled => self.enabled = value,
            FilterField::PrimaryBuys => self.primary_buys = value,
            FilterField::PrimarySells => self.primary_sells = value,
            FilterField::PrimaryLpAdd => self.primary_lp_add = value,
            FilterField::PrimaryLpRemove => self.primary_lp_remove = value,
            FilterField::TrackOtherPools => self.track_other_pools = value,
            FilterField::OtherLpAdd => self.other_lp_add = value,
            FilterField::OtherLpRemove => self.other_lp_remove = value,
            FilterField::OtherBuys => self.other_buys = value,
            FilterField::OtherSells => self.other_sells = value,
            FilterField::WalletAlerts => self.wallet_alerts = value,
            FilterField::DailyDigest => self.daily_digest = value,
            FilterField::NewPoolAlerts => self.new_pool_alerts = value,
            FilterField::LockAlerts => self.lock_alerts = value,
            FilterField::RewardAlerts => self.reward_alerts = value,
            FilterField::ClosePoolAlerts => self.close_pool_alerts = value,
            FilterField::ProtocolFeeAlerts => self.protocol_fee_alerts = value,
            FilterField::AdminAlerts => self.admin_alerts = value,
        }
    }

    /// True while an explicit snooze is active or the current UTC hour falls
    /// inside the quiet interval. The interval may wrap midnight:
    /// start=22, end=6 covers [22..24) and [0..6).
    pub fn is_snoozed(&self, now: DateTime<Utc>) -> bool {
        if self.snoozed_until > 0 && now.timestamp() < self.snoozed_until {
            return true;
        }
        if let (Some(start), Some(end)) = (self.quiet_start, self.quiet_end) {
            let hour = now.hour();
            if start <= end {
                if hour >= start && hour < end {
                    return true;
                }
            } else if hour >= start || hour < end {
                return true;
            }
        }
        false
    }

    /// Watchlist budget counts pools and tracked tokens together.
    pub fn watchlist_size(&self) -> usize {
        self.watchlist.len() + self.tracked_tokens.len()
    }
}

/// In-memory subscriber map with debounced SQLite persistence.
pub struct SubscriberStore {
    inner: RwLock<HashMap<i64, Subscriber>>,
    dirty: Mutex<HashSet<i64>>,
    flush_pending: AtomicBool,
    db: DbPool,
    max_recent_alerts: usize,
    save_debounce_ms: u64,
}

impl SubscriberStore {
    pub fn new(db: DbPool, max_recent_alerts: usize, save_debounce_ms: u64) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            dirty: Mutex::new(HashSet::new()),
            flush_pending: AtomicBool::new(false),
            db,
            max_recent_alerts,
            save_debounce_ms,
        }
    }

    pub fn get(&self, chat_id: i64) -> Option<Subscriber> {
        self.inner.read().get(&chat_id).cloned()
    }

    pub fn contains(&self, chat_id: i64) -> bool {
        self.inner.read().contains_key(&chat_id)
    }

    /// All subscribers, cloned. Fan-out scans this linearly.
    pub fn all(&self) -> Vec<Subscriber> {
        self.inner.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// All wallets any subscriber tracks, for the wallet feed subscriptions.
    pub fn all_tracked_wallets(&self) -> HashSet<String> {
        let inner = self.inner.read();
        inner
            .values()
            .flat_map(|s| s.wallet_subscriptions.iter().cloned())
            .collect()
    }

    /// Get or create, marking the subscriber dirty when created.
    pub fn ensure(&self, chat_id: i64) -> Subscriber {
        {
            let inner = self.inner.read();
            if let Some(existing) = inner.get(&chat_id) {
                return existing.clone();
            }
        }
        let subscriber = Subscriber::new(chat_id);
        self.inner.write().insert(chat_id, subscriber.clone());
        self.dirty.lock().insert(chat_id);
        subscriber
    }

    /// Apply a mutation under the write lock and mark dirty. Returns `None`
    /// if the subscriber does not exist.
    pub fn update<R>(&self, chat_id: i64, f: impl FnOnce(&mut Subscriber) -> R) -> Option<R> {
        let result = {
            let mut inner = self.inner.write();
            let subscriber = inner.get_mut(&chat_id)?;
            Some(f(subscriber))
        };
        if result.is_some() {
            self.dirty.lock().insert(chat_id);
        }
        result
    }

    /// Append to the recent-alerts ring, evicting the tail at capacity.
    pub fn push_recent_alert(&self, chat_id: i64, message: String) {
        let cap = self.max_recent_alerts;
        self.update(chat_id, |s| {
            s.recent_alerts.push_back(RecentAlert {
                message,
                at: Utc::now(),
            });
            while s.recent_alerts.len() > cap {
                s.recent_alerts.pop_front();
            }
        });
    }

    /// Debounced save: the first request within a window schedules one flush
    /// after the debounce delay; later requests piggyback on it.
    pub fn request_flush(self: Arc<Self>) {
        if self.flush_pending.swap(true, Ordering::SeqCst) {
            return;
        }
        let delay = std::time::Duration::from_millis(self.save_debounce_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            self.flush_pending.store(false, Ordering::SeqCst);
            if let Err(e) = self.flush_dirty().await {
                tracing::warn!(error = %e, "Debounced subscriber flush failed");
            }
        });
    }

    /// Persist every dirty subscriber, one transaction each.
    pub async fn flush_dirty(&self) -> AppResult<usize> {
        let dirty: Vec<i64> = {
            let mut guard = self.dirty.lock();
            guard.drain().collect()
        };
        let mut flushed = 0;
        for chat_id in dirty {
            let Some(subscriber) = self.get(chat_id) else {
                continue;
            };
            match self.persist(&subscriber).await {
                Ok(()) => flushed += 1,
                Err(e) => {
                    // State stays in memory; a later flush retries.
                    tracing::warn!(chat_id, error = %e, "Subscriber persist failed");
                    self.dirty.lock().insert(chat_id);
                }
            }
        }
        if flushed > 0 {
            tracing::debug!(flushed, "Flushed subscribers");
        }
        Ok(flushed)
    }

    async fn persist(&self, s: &Subscriber) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"INSERT INTO subscribers (
                chat_id, created_at, last_active, enabled, blocked, onboarded,
                snoozed_until, quiet_start, quiet_end,
                primary_buys, primary_sells, primary_lp_add, primary_lp_remove,
                track_other_pools, other_buys, other_sells, other_lp_add, other_lp_remove,
                wallet_alerts, daily_digest, new_pool_alerts, lock_alerts,
                reward_alerts, close_pool_alerts, protocol_fee_alerts, admin_alerts,
                primary_trade_min, other_trade_min, other_lp_min,
                daily_alerts, daily_volume_usd, lifetime_alerts, lifetime_volume_usd,
                portfolio_last_sync
            ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)
            ON CONFLICT (chat_id) DO UPDATE SET
                last_active = excluded.last_active,
                enabled = excluded.enabled,
                blocked = excluded.blocked,
                onboarded = excluded.onboarded,
                snoozed_until = excluded.snoozed_until,
                quiet_start = excluded.quiet_start,
                quiet_end = excluded.quiet_end,
                primary_buys = excluded.primary_buys,
                primary_sells = excluded.primary_sells,
                primary_lp_add = excluded.primary_lp_add,
                primary_lp_remove = excluded.primary_lp_remove,
                track_other_pools = excluded.track_other_pools,
                other_buys = excluded.other_buys,
                other_sells = excluded.other_sells,
                other_lp_add = excluded.other_lp_add,
                other_lp_remove = excluded.other_lp_remove,
                wallet_alerts = excluded.wallet_alerts,
                daily_digest = excluded.daily_digest,
                new_pool_alerts = excluded.new_pool_alerts,
                lock_alerts = excluded.lock_alerts,
                reward_alerts = excluded.reward_alerts,
                close_pool_alerts = excluded.close_pool_alerts,
                protocol_fee_alerts = excluded.protocol_fee_alerts,
                admin_alerts = excluded.admin_alerts,
                primary_trade_min = excluded.primary_trade_min,
                other_trade_min = excluded.other_trade_min,
                other_lp_min = excluded.other_lp_min,
                daily_alerts = excluded.daily_alerts,
                daily_volume_usd = excluded.daily_volume_usd,
                lifetime_alerts = excluded.lifetime_alerts,
                lifetime_volume_usd = excluded.lifetime_volume_usd,
                portfolio_last_sync = excluded.portfolio_last_sync
            "#,
        )
        .bind(s.chat_id)
        .bind(s.created_at.timestamp())
        .bind(s.last_active.timestamp())
        .bind(s.enabled)
        .bind(s.blocked)
        .bind(s.onboarded)
        .bind(s.snoozed_until)
        .bind(s.quiet_start.map(|h| h as i64))
        .bind(s.quiet_end.map(|h| h as i64))
        .bind(s.primary_buys)
        .bind(s.primary_sells)
        .bind(s.primary_lp_add)
        .bind(s.primary_lp_remove)
        .bind(s.track_other_pools)
        .bind(s.other_buys)
        .bind(s.other_sells)
        .bind(s.other_lp_add)
        .bind(s.other_lp_remove)
        .bind(s.wallet_alerts)
        .bind(s.daily_digest)
        .bind(s.new_pool_alerts)
        .bind(s.lock_alerts)
        .bind(s.reward_alerts)
        .bind(s.close_pool_alerts)
        .bind(s.protocol_fee_alerts)
        .bind(s.admin_alerts)
        .bind(s.primary_trade_min.to_string())
        .bind(s.other_trade_min.to_string())
        .bind(s.other_lp_min.to_string())
        .bind(s.daily_stats.alerts as i64)
        .bind(s.daily_stats.volume_usd.to_string())
        .bind(s.lifetime_stats.alerts as i64)
        .bind(s.lifetime_stats.volume_usd.to_string())
        .bind(s.portfolio.as_ref().map(|p| p.last_sync.timestamp()).unwrap_or(0))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM whale_wallets WHERE chat_id = ?")
            .bind(s.chat_id)
            .execute(&mut *tx)
            .await?;
        for wallet in &s.wallet_subscriptions {
            sqlx::query("INSERT INTO whale_wallets (chat_id, wallet) VALUES (?, ?)")
                .bind(s.chat_id)
                .bind(wallet)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM watchlist WHERE chat_id = ?")
            .bind(s.chat_id)
            .execute(&mut *tx)
            .await?;
        for pool_id in &s.watchlist {
            sqlx::query("INSERT INTO watchlist (chat_id, pool_id) VALUES (?, ?)")
                .bind(s.chat_id)
                .bind(pool_id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM tracked_tokens WHERE chat_id = ?")
            .bind(s.chat_id)
            .execute(&mut *tx)
            .await?;
        for mint in &s.tracked_tokens {
            sqlx::query("INSERT INTO tracked_tokens (chat_id, mint) VALUES (?, ?)")
                .bind(s.chat_id)
                .bind(mint)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM portfolio_wallets WHERE chat_id = ?")
            .bind(s.chat_id)
            .execute(&mut *tx)
            .await?;
        for (position, wallet) in s.portfolio_wallets.iter().enumerate() {
            sqlx::query(
                "INSERT INTO portfolio_wallets (chat_id, wallet, position) VALUES (?, ?, ?)",
            )
            .bind(s.chat_id)
            .bind(wallet)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        // Ring re-write plus trim keeps the table capped per subscriber.
        sqlx::query("DELETE FROM recent_alerts WHERE chat_id = ?")
            .bind(s.chat_id)
            .execute(&mut *tx)
            .await?;
        for alert in s.recent_alerts.iter().rev().take(self.max_recent_alerts) {
            sqlx::query(
                "INSERT INTO recent_alerts (chat_id, message, created_at) VALUES (?, ?, ?)",
            )
            .bind(s.chat_id)
            .bind(&alert.message)
            .bind(alert.at.timestamp())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Load every subscriber and its relations from the database.
    pub async fn load_all(&self) -> AppResult<usize> {
        let rows = sqlx::query("SELECT * FROM subscribers").fetch_all(&self.db).await?;
        let mut loaded = HashMap::with_capacity(rows.len());
        for row in &rows {
            let subscriber = row_to_subscriber(row);
            loaded.insert(subscriber.chat_id, subscriber);
        }

        let wallets = sqlx::query("SELECT chat_id, wallet FROM whale_wallets")
            .fetch_all(&self.db)
            .await?;
        for row in &wallets {
            let chat_id: i64 = row.get("chat_id");
            if let Some(s) = loaded.get_mut(&chat_id) {
                s.wallet_subscriptions.insert(row.get("wallet"));
            }
        }

        let watchlist = sqlx::query("SELECT chat_id, pool_id FROM watchlist")
            .fetch_all(&self.db)
            .await?;
        for row in &watchlist {
            let chat_id: i64 = row.get("chat_id");
            if let Some(s) = loaded.get_mut(&chat_id) {
                s.watchlist.insert(row.get("pool_id"));
            }
        }

        let tokens = sqlx::query("SELECT chat_id, mint FROM tracked_tokens")
            .fetch_all(&self.db)
            .await?;
        for row in &tokens {
            let chat_id: i64 = row.get("chat_id");
            if let Some(s) = loaded.get_mut(&chat_id) {
                s.tracked_tokens.insert(row.get("mint"));
            }
        }

        let pw = sqlx::query(
            "SELECT chat_id, wallet FROM portfolio_wallets ORDER BY chat_id, position",
        )
        .fetch_all(&self.db)
        .await?;
        for row in &pw {
            let chat_id: i64 = row.get("chat_id");
            if let Some(s) = loaded.get_mut(&chat_id) {
                s.portfolio_wallets.push(row.get("wallet"));
            }
        }

        let alerts = sqlx::query(
            "SELECT chat_id, message, created_at FROM recent_alerts ORDER BY chat_id, id",
        )
        .fetch_all(&self.db)
        .await?;
        for row in &alerts {
            let chat_id: i64 = row.get("chat_id");
            if let Some(s) = loaded.get_mut(&chat_id) {
                let at = Utc
                    .timestamp_opt(row.get::<i64, _>("created_at"), 0)
                    .single()
                    .unwrap_or_else(Utc::now);
                s.recent_alerts.push_back(RecentAlert {
                    message: row.get("message"),
                    at,
                });
            }
        }

        let count = loaded.len();
        *self.inner.write() = loaded;
        tracing::info!(count, "Loaded subscribers");
        Ok(count)
    }
}

fn row_to_subscriber(row: &sqlx::sqlite::SqliteRow) -> Subscriber {
    let ts = |col: &str| {
        Utc.timestamp_opt(row.get::<i64, _>(col), 0)
            .single()
            .unwrap_or_else(Utc::now)
    };
    let dec = |col: &str| Decimal::from_str(&row.get::<String, _>(col)).unwrap_or(Decimal::ZERO);

    let mut subscriber = Subscriber::new(row.get("chat_id"));
    subscriber.created_at = ts("created_at");
    subscriber.last_active = ts("last_active");
    subscriber.enabled = row.get("enabled");
    subscriber.blocked = row.get("blocked");
    subscriber.onboarded = row.get("onboarded");
    subscriber.snoozed_until = row.get("snoozed_until");
    subscriber.quiet_start = row.get::<Option<i64>, _>("quiet_start").map(|h| h as u32);
    subscriber.quiet_end = row.get::<Option<i64>, _>("quiet_end").map(|h| h as u32);
    subscriber.primary_buys = row.get("primary_buys");
    subscriber.primary_sells = row.get("primary_sells");
    subscriber.primary_lp_add = row.get("primary_lp_add");
    subscriber.primary_lp_remove = row.get("primary_lp_remove");
    subscriber.track_other_pools = row.get("track_other_pools");
    subscriber.other_buys = row.get("other_buys");
    subscriber.other_sells = row.get("other_sells");
    subscriber.other_lp_add = row.get("other_lp_add");
    subscriber.other_lp_remove = row.get("other_lp_remove");
    subscriber.wallet_alerts = row.get("wallet_alerts");
    subscriber.daily_digest = row.get("daily_digest");
    subscriber.new_pool_alerts = row.get("new_pool_alerts");
    subscriber.lock_alerts = row.get("lock_alerts");
    subscriber.reward_alerts = row.get("reward_alerts");
    subscriber.close_pool_alerts = row.get("close_pool_alerts");
    subscriber.protocol_fee_alerts = row.get("protocol_fee_alerts");
    subscriber.admin_alerts = row.get("admin_alerts");
    subscriber.primary_trade_min = dec("primary_trade_min");
    subscriber.other_trade_min = dec("other_trade_min");
    subscriber.other_lp_min = dec("other_lp_min");
    subscriber.daily_stats = Stats {
        alerts: row.get::<i64, _>("daily_alerts") as u64,
        volume_usd: dec("daily_volume_usd"),
    };
    subscriber.lifetime_stats = Stats {
        alerts: row.get::<i64, _>("lifetime_alerts") as u64,
        volume_usd: dec("lifetime_volume_usd"),
    };
    subscriber
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_memory_pool, run_migrations};
    use chrono::TimeZone;

    async fn store() -> SubscriberStore {
        let pool = init_memory_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        SubscriberStore::new(pool, 50, 2000)
    }

    #[test]
    fn test_filter_field_parse_closed_set() {
        assert_eq!(FilterField::parse("primary_buys"), Some(FilterField::PrimaryBuys));
        assert_eq!(FilterField::parse("admin_alerts"), Some(FilterField::AdminAlerts));
        assert_eq!(FilterField::parse("bogus"), None);
    }

    #[test]
    fn test_quiet_hours_wrap_midnight() {
        let mut s = Subscriber::new(1);
        s.quiet_start = Some(22);
        s.quiet_end = Some(6);

        let at = |hour: u32| Utc.with_ymd_and_hms(2025, 6, 1, hour, 30, 0).unwrap();
        assert!(s.is_snoozed(at(23)));
        assert!(s.is_snoozed(at(5)));
        assert!(!s.is_snoozed(at(7)));
        assert!(s.is_snoozed(at(22)));
        assert!(!s.is_snoozed(at(6)));
    }

    #[test]
    fn test_quiet_hours_non_wrapping() {
        let mut s = Subscriber::new(1);
        s.quiet_start = Some(9);
        s.quiet_end = Some(17);
        let at = |hour: u32| Utc.with_ymd_and_hms(2025, 6, 1, hour, 0, 0).unwrap();
        assert!(s.is_snoozed(at(12)));
        assert!(!s.is_snoozed(at(8)));
        assert!(!s.is_snoozed(at(17)));
    }

    #[test]
    fn test_snooze_timestamp() {
        let mut s = Subscriber::new(1);
        let now = Utc::now();
        s.snoozed_until = now.timestamp() + 600;
        assert!(s.is_snoozed(now));
        s.snoozed_until = 0;
        assert!(!s.is_snoozed(now));
    }

    #[tokio::test]
    async fn test_ensure_and_update() {
        let store = store().await;
        store.ensure(42);
        assert!(store.contains(42));
        store.update(42, |s| s.primary_buys = false);
        assert!(!store.get(42).unwrap().primary_buys);
    }

    #[tokio::test]
    async fn test_recent_alert_ring_caps() {
        let pool = init_memory_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let store = SubscriberStore::new(pool, 3, 2000);
        store.ensure(1);
        for i in 0..5 {
            store.push_recent_alert(1, format!("alert {}", i));
        }
        let s = store.get(1).unwrap();
        assert_eq!(s.recent_alerts.len(), 3);
        assert_eq!(s.recent_alerts.front().unwrap().message, "alert 2");
        assert_eq!(s.recent_alerts.back().unwrap().message, "alert 4");
    }

    #[tokio::test]
    async fn test_persist_and_reload() {
        let pool = init_memory_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();

        let store = SubscriberStore::new(pool.clone(), 50, 2000);
        store.ensure(7);
        store.update(7, |s| {
            s.track_other_pools = true;
            s.primary_trade_min = Decimal::from_str("250").unwrap();
            s.wallet_subscriptions.insert("WalletA".to_string());
            s.portfolio_wallets.push("WalletA".to_string());
            s.portfolio_wallets.push("WalletB".to_string());
            s.watchlist.insert("PoolX".to_string());
        });
        store.flush_dirty().await.unwrap();

        let fresh = SubscriberStore::new(pool, 50, 2000);
        fresh.load_all().await.unwrap();
        let s = fresh.get(7).unwrap();
        assert!(s.track_other_pools);
        assert_eq!(s.primary_trade_min, Decimal::from_str("250").unwrap());
        assert!(s.wallet_subscriptions.contains("WalletA"));
        assert_eq!(s.portfolio_wallets, vec!["WalletA", "WalletB"]);
        assert!(s.watchlist.contains("PoolX"));
    }

    #[tokio::test]
    async fn test_all_tracked_wallets_union() {
        let store = store().await;
        store.ensure(1);
        store.ensure(2);
        store.update(1, |s| {
            s.wallet_subscriptions.insert("W1".to_string());
        });
        store.update(2, |s| {
            s.wallet_subscriptions.insert("W1".to_string());
            s.wallet_subscriptions.insert("W2".to_string());
        });
        let wallets = store.all_tracked_wallets();
        assert_eq!(wallets.len(), 2);
    }
}
