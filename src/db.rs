//! Database module for DLMM Sentinel
//!
//! Manages the SQLite connection pool with WAL mode and provides the
//! durable side of the subscriber store and the seen-transaction sets.

use crate::config::DatabaseConfig;
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use tracing::info;

/// Type alias for the SQLite connection pool
pub type DbPool = Pool<Sqlite>;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS subscribers (
    chat_id INTEGER PRIMARY KEY,
    created_at INTEGER NOT NULL,
    last_active INTEGER NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    blocked INTEGER NOT NULL DEFAULT 0,
    onboarded INTEGER NOT NULL DEFAULT 0,
    snoozed_until INTEGER NOT NULL DEFAULT 0,
    quiet_start INTEGER,
    quiet_end INTEGER,
    primary_buys INTEGER NOT NULL DEFAULT 1,
    primary_sells INTEGER NOT NULL DEFAULT 1,
    primary_lp_add INTEGER NOT NULL DEFAULT 0,
    primary_lp_remove INTEGER NOT NULL DEFAULT 0,
    track_other_pools INTEGER NOT NULL DEFAULT 0,
    other_buys INTEGER NOT NULL DEFAULT 0,
    other_sells INTEGER NOT NULL DEFAULT 0,
    other_lp_add INTEGER NOT NULL DEFAULT 0,
    other_lp_remove INTEGER NOT NULL DEFAULT 0,
    wallet_alerts INTEGER NOT NULL DEFAULT 1,
    daily_digest INTEGER NOT NULL DEFAULT 0,
    new_pool_alerts INTEGER NOT NULL DEFAULT 0,
    lock_alerts INTEGER NOT NULL DEFAULT 0,
    reward_alerts INTEGER NOT NULL DEFAULT 0,
    close_pool_alerts INTEGER NOT NULL DEFAULT 0,
    protocol_fee_alerts INTEGER NOT NULL DEFAULT 0,
    admin_alerts INTEGER NOT NULL DEFAULT 0,
    primary_trade_min TEXT NOT NULL DEFAULT '0',
    other_trade_min TEXT NOT NULL DEFAULT '0',
    other_lp_min TEXT NOT NULL DEFAULT '0',
    daily_alerts INTEGER NOT NULL DEFAULT 0,
    daily_volume_usd TEXT NOT NULL DEFAULT '0',
    lifetime_alerts INTEGER NOT NULL DEFAULT 0,
    lifetime_volume_usd TEXT NOT NULL DEFAULT '0',
    portfolio_last_sync INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS whale_wallets (
    chat_id INTEGER NOT NULL,
    wallet TEXT NOT NULL,
    PRIMARY KEY (chat_id, wallet)
);

CREATE TABLE IF NOT EXISTS watchlist (
    chat_id INTEGER NOT NULL,
    pool_id TEXT NOT NULL,
    PRIMARY KEY (chat_id, pool_id)
);

CREATE TABLE IF NOT EXISTS tracked_tokens (
    chat_id INTEGER NOT NULL,
    mint TEXT NOT NULL,
    PRIMARY KEY (chat_id, mint)
);

CREATE TABLE IF NOT EXISTS portfolio_wallets (
    chat_id INTEGER NOT NULL,
    wallet TEXT NOT NULL,
    position INTEGER NOT NULL,
    PRIMARY KEY (chat_id, wallet)
);

CREATE TABLE IF NOT EXISTS recent_alerts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_id INTEGER NOT NULL,
    message TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_recent_alerts_chat ON recent_alerts (chat_id, id);

CREATE TABLE IF NOT EXISTS seen_txs (
    sig TEXT NOT NULL,
    source TEXT NOT NULL,
    added_at INTEGER NOT NULL,
    PRIMARY KEY (sig, source)
);
CREATE INDEX IF NOT EXISTS idx_seen_txs_added ON seen_txs (added_at);
"#;

/// Initialize the database connection pool
pub async fn init_pool(config: &DatabaseConfig) -> AppResult<DbPool> {
    if let Some(parent) = config.path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Internal(format!("Failed to create database directory: {}", e))
            })?;
            info!("Created database directory: {:?}", parent);
        }
    }

    let db_url = format!("sqlite:{}?mode=rwc", config.path.display());

    let connect_options = SqliteConnectOptions::from_str(&db_url)
        .map_err(AppError::Database)?
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(5))
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect_with(connect_options)
        .await?;

    info!(
        "Database pool initialized: {:?} (max {} connections)",
        config.path, config.max_connections
    );

    Ok(pool)
}

/// In-memory pool for tests.
pub async fn init_memory_pool() -> AppResult<DbPool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    Ok(pool)
}

/// Apply the embedded schema. SQLite takes one statement per query.
pub async fn run_migrations(pool: &DbPool) -> AppResult<()> {
    for statement in SCHEMA.split(';') {
        let stmt = statement.trim();
        if stmt.is_empty() {
            continue;
        }
        sqlx::query(stmt).execute(pool).await?;
    }
    info!("Database schema applied");
    Ok(())
}

/// Mirror a seen signature to the durable table.
pub async fn insert_seen_tx(
    pool: &DbPool,
    sig: &str,
    source: &str,
    added_at: DateTime<Utc>,
) -> AppResult<()> {
    sqlx::query("INSERT OR IGNORE INTO seen_txs (sig, source, added_at) VALUES (?, ?, ?)")
        .bind(sig)
        .bind(source)
        .bind(added_at.timestamp())
        .execute(pool)
        .await?;
    Ok(())
}

/// Signatures newer than the horizon for one source, for warm-loading the
/// in-memory sets at startup.
pub async fn load_seen_txs(
    pool: &DbPool,
    source: &str,
    horizon_secs: i64,
) -> AppResult<Vec<String>> {
    let cutoff = Utc::now().timestamp() - horizon_secs;
    let rows = sqlx::query("SELECT sig FROM seen_txs WHERE source = ? AND added_at >= ? ORDER BY added_at ASC")
        .bind(source)
        .bind(cutoff)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(|r| r.get::<String, _>("sig")).collect())
}

/// Delete rows older than the horizon. Returns the number removed.
pub async fn prune_seen_txs(pool: &DbPool, horizon_secs: i64) -> AppResult<u64> {
    let cutoff = Utc::now().timestamp() - horizon_secs;
    let result = sqlx::query("DELETE FROM seen_txs WHERE added_at < ?")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_applies() {
        let pool = init_memory_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        // Idempotent.
        run_migrations(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_seen_tx_round_trip() {
        let pool = init_memory_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();

        insert_seen_tx(&pool, "sig1", "dex", Utc::now()).await.unwrap();
        insert_seen_tx(&pool, "sig1", "dex", Utc::now()).await.unwrap(); // no-op
        insert_seen_tx(&pool, "sig1", "wallet", Utc::now()).await.unwrap();

        let dex = load_seen_txs(&pool, "dex", 86_400).await.unwrap();
        assert_eq!(dex, vec!["sig1".to_string()]);
        let wallet = load_seen_txs(&pool, "wallet", 86_400).await.unwrap();
        assert_eq!(wallet.len(), 1);
    }

    #[tokio::test]
    async fn test_prune_removes_old_rows() {
        let pool = init_memory_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();

        let old = Utc::now() - chrono::Duration::hours(25);
        insert_seen_tx(&pool, "old", "dex", old).await.unwrap();
        insert_seen_tx(&pool, "new", "dex", Utc::now()).await.unwrap();

        let removed = prune_seen_txs(&pool, 86_400).await.unwrap();
        assert_eq!(removed, 1);
        let remaining = load_seen_txs(&pool, "dex", 86_400).await.unwrap();
        assert_eq!(remaining, vec!["new".to_string()]);
    }
}
