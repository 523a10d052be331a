//! Seen-transaction store.
//!
//! Two disjoint sets: one for high-volume DEX events, one for wallet-scoped
//! transactions. A signature relevant to both feeds must alert on both, so a
//! single set would suppress the second class. Each in-memory set is capped;
//! on overflow the most recently added half survives. Insertions mirror to
//! the durable `seen_txs` table so a restart does not re-alert within the
//! 24 h horizon.

use crate::db::{self, DbPool};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};

/// Retention horizon for the durable table, in seconds.
pub const SEEN_TX_HORIZON_SECS: i64 = 24 * 3600;

/// Which feed a signature was observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertSource {
    Dex,
    Wallet,
}

impl AlertSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSource::Dex => "dex",
            AlertSource::Wallet => "wallet",
        }
    }
}

struct CappedSet {
    set: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl CappedSet {
    fn new(capacity: usize) -> Self {
        Self {
            set: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(2),
        }
    }

    /// Insert; `false` if already present. Overflow keeps the newer half.
    fn insert(&mut self, sig: &str) -> bool {
        if !self.set.insert(sig.to_string()) {
            return false;
        }
        self.order.push_back(sig.to_string());
        if self.set.len() > self.capacity {
            let drop_count = self.order.len() / 2;
            for _ in 0..drop_count {
                if let Some(old) = self.order.pop_front() {
                    self.set.remove(&old);
                }
            }
        }
        true
    }

    fn contains(&self, sig: &str) -> bool {
        self.set.contains(sig)
    }

    fn len(&self) -> usize {
        self.set.len()
    }
}

pub struct SeenTxStore {
    dex: Mutex<CappedSet>,
    wallet: Mutex<CappedSet>,
    db: DbPool,
}

impl SeenTxStore {
    pub fn new(db: DbPool, capacity: usize) -> Self {
        Self {
            dex: Mutex::new(CappedSet::new(capacity)),
            wallet: Mutex::new(CappedSet::new(capacity)),
            db,
        }
    }

    /// Load last-24h signatures from the durable table into memory.
    pub async fn warm_load(&self) {
        for source in [AlertSource::Dex, AlertSource::Wallet] {
            match db::load_seen_txs(&self.db, source.as_str(), SEEN_TX_HORIZON_SECS).await {
                Ok(sigs) => {
                    let count = sigs.len();
                    let set = match source {
                        AlertSource::Dex => &self.dex,
                        AlertSource::Wallet => &self.wallet,
                    };
                    let mut guard = set.lock();
                    for sig in sigs {
                        guard.insert(&sig);
                    }
                    tracing::info!(source = source.as_str(), count, "Warm-loaded seen txs");
                }
                Err(e) => {
                    tracing::warn!(source = source.as_str(), error = %e, "Seen-tx warm load failed");
                }
            }
        }
    }

    pub fn contains(&self, source: AlertSource, sig: &str) -> bool {
        match source {
            AlertSource::Dex => self.dex.lock().contains(sig),
            AlertSource::Wallet => self.wallet.lock().contains(sig),
        }
    }

    /// First-arrival check: inserts and mirrors durably, returning `true` iff
    /// the signature was new for this source. The memory insertion happens
    /// before the durable write, so a concurrent second arrival observes the
    /// signature and short-circuits even while the mirror is in flight.
    pub async fn check_and_insert(&self, source: AlertSource, sig: &str) -> bool {
        if sig.is_empty() {
            return false;
        }
        let inserted = match source {
            AlertSource::Dex => self.dex.lock().insert(sig),
            AlertSource::Wallet => self.wallet.lock().insert(sig),
        };
        if !inserted {
            return false;
        }
        if let Err(e) = db::insert_seen_tx(&self.db, sig, source.as_str(), Utc::now()).await {
            tracing::warn!(sig, error = %e, "Failed to mirror seen tx");
        }
        true
    }

    /// Delete durable rows past the horizon.
    pub async fn prune_durable(&self) {
        match db::prune_seen_txs(&self.db, SEEN_TX_HORIZON_SECS).await {
            Ok(removed) => {
                if removed > 0 {
                    tracing::info!(removed, "Pruned seen-tx rows");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Seen-tx prune failed"),
        }
    }

    pub fn len(&self, source: AlertSource) -> usize {
        match source {
            AlertSource::Dex => self.dex.lock().len(),
            AlertSource::Wallet => self.wallet.lock().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_memory_pool, run_migrations};

    async fn store(capacity: usize) -> SeenTxStore {
        let pool = init_memory_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        SeenTxStore::new(pool, capacity)
    }

    #[tokio::test]
    async fn test_first_arrival_wins() {
        let store = store(100).await;
        assert!(store.check_and_insert(AlertSource::Dex, "sig1").await);
        assert!(!store.check_and_insert(AlertSource::Dex, "sig1").await);
    }

    #[tokio::test]
    async fn test_sources_are_disjoint() {
        let store = store(100).await;
        assert!(store.check_and_insert(AlertSource::Dex, "sig1").await);
        // Same signature on the wallet feed still alerts.
        assert!(store.check_and_insert(AlertSource::Wallet, "sig1").await);
        assert!(!store.check_and_insert(AlertSource::Wallet, "sig1").await);
    }

    #[tokio::test]
    async fn test_overflow_keeps_recent_half() {
        let store = store(10).await;
        for i in 0..11 {
            store
                .check_and_insert(AlertSource::Dex, &format!("sig{}", i))
                .await;
        }
        // Oldest half dropped; the newest entries survive.
        assert!(!store.contains(AlertSource::Dex, "sig0"));
        assert!(store.contains(AlertSource::Dex, "sig10"));
        assert!(store.len(AlertSource::Dex) <= 10);
    }

    #[tokio::test]
    async fn test_warm_load_restores() {
        let pool = init_memory_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        {
            let store = SeenTxStore::new(pool.clone(), 100);
            store.check_and_insert(AlertSource::Dex, "persisted").await;
        }
        let fresh = SeenTxStore::new(pool, 100);
        assert!(!fresh.contains(AlertSource::Dex, "persisted"));
        fresh.warm_load().await;
        assert!(fresh.contains(AlertSource::Dex, "persisted"));
    }

    #[tokio::test]
    async fn test_empty_sig_rejected() {
        let store = store(100).await;
        assert!(!store.check_and_insert(AlertSource::Dex, "").await);
    }
}
