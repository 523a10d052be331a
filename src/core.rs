//! The `Core` value owns every shared component: caches, the subscriber
//! store, the pool snapshot, the seen-tx sets, the feed clients, and the
//! scheduler handles. It is constructed once at process start; components
//! hold `Arc` references into it.

use crate::commands::CommandApi;
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::decoder::{ChainIds, EventDecoder};
use crate::dedup::SeenTxStore;
use crate::error::AppResult;
use crate::fanout::FanOut;
use crate::feeds::{BackupPoller, DexFeed, WalletFeed};
use crate::net::{ApiHealthRegistry, RateLimiters};
use crate::pipeline::EventPipeline;
use crate::pools::{PoolRegistry, VolumeTable};
use crate::portfolio::balances::BalanceFetcher;
use crate::portfolio::staking::StakingFetcher;
use crate::portfolio::trades::TradeFetcher;
use crate::portfolio::PortfolioEngine;
use crate::providers::{
    BirdeyeClient, CoinGeckoClient, DexApiClient, DexScreenerClient, ProviderShared,
    RpcAggregatorClient, SolscanClient,
};
use crate::resolver::{PriceResolver, TokenMetaResolver};
use crate::scheduler::Scheduler;
use crate::sink::NotificationSink;
use crate::subscribers::SubscriberStore;
use crate::valuation::{ResolverPriceView, UsdValuator};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A subscriber is auto-synced only if active within this window.
const AUTO_SYNC_ACTIVE_WINDOW_MINUTES: i64 = 30;

pub struct Core {
    pub config: AppConfig,
    pub db: DbPool,
    pub health: Arc<ApiHealthRegistry>,
    pub store: Arc<SubscriberStore>,
    pub registry: Arc<PoolRegistry>,
    pub volumes: Arc<VolumeTable>,
    pub prices: Arc<PriceResolver>,
    pub meta: TokenMetaResolver,
    pub dedup: Arc<SeenTxStore>,
    pub fanout: Arc<FanOut>,
    pub pipeline: Arc<EventPipeline>,
    pub portfolio: Arc<PortfolioEngine>,
    pub commands: Arc<CommandApi>,
    pub dex_api: Arc<DexApiClient>,
    pub dex_feed: Arc<DexFeed>,
    pub wallet_feed: Arc<WalletFeed>,
    pub backup_poller: Arc<BackupPoller>,
    pub scheduler: Scheduler,
}

impl Core {
    pub async fn new(
        config: AppConfig,
        db: DbPool,
        sink: Arc<dyn NotificationSink>,
    ) -> AppResult<Arc<Self>> {
        let limiters = Arc::new(RateLimiters::new());
        let health = Arc::new(ApiHealthRegistry::new());
        let shared = ProviderShared::new(Arc::clone(&limiters), Arc::clone(&health));

        let dex_api = Arc::new(DexApiClient::new(
            shared.clone(),
            config.upstream.dex_api_url.clone(),
        ));
        let rpc = Arc::new(RpcAggregatorClient::new(
            shared.clone(),
            config.upstream.rpc_url.clone(),
            config.upstream.rpc_api_key.clone(),
        ));
        let birdeye = Arc::new(BirdeyeClient::new(
            shared.clone(),
            config.upstream.birdeye_url.clone(),
            config.upstream.birdeye_api_key.clone(),
        ));
        let dexscreener = Arc::new(DexScreenerClient::new(
            shared.clone(),
            config.upstream.dexscreener_url.clone(),
        ));
        let coingecko = Arc::new(CoinGeckoClient::new(
            shared.clone(),
            config.upstream.coingecko_url.clone(),
        ));
        let solscan = Arc::new(SolscanClient::new(
            shared.clone(),
            config.upstream.solscan_url.clone(),
        ));

        let registry = Arc::new(PoolRegistry::new(
            Arc::clone(&dex_api),
            config.chain.dex_program_id.clone(),
            config.chain.primary_token_mint.clone(),
        ));
        let volumes = Arc::new(VolumeTable::new(Arc::clone(&dex_api)));

        let prices = Arc::new(PriceResolver::new(
            config.chain.stable_mints.clone(),
            config.chain.primary_token_mint.clone(),
            config.chain.network_token_mint.clone(),
            config.refresh.price_refresh_ms,
            Arc::clone(&rpc),
            Arc::clone(&dexscreener),
            Arc::clone(&birdeye),
            Arc::clone(&coingecko),
        ));
        let meta = TokenMetaResolver::new(
            config.limits.token_meta_cache_cap,
            Arc::clone(&dex_api),
            Arc::clone(&solscan),
            Arc::clone(&dexscreener),
            Arc::clone(&rpc),
        );

        let store = Arc::new(SubscriberStore::new(
            db.clone(),
            config.limits.max_recent_alerts,
            config.refresh.save_debounce_ms,
        ));
        let dedup = Arc::new(SeenTxStore::new(db.clone(), config.limits.seen_tx_capacity));

        let view = Arc::new(ResolverPriceView {
            prices: Arc::clone(&prices),
            meta: meta.clone(),
        });
        let valuator = UsdValuator::new(view.clone(), config.chain.network_token_mint.clone());

        let fanout = Arc::new(FanOut::new(Arc::clone(&store), sink, meta.clone()));

        let decoder = EventDecoder::new(ChainIds {
            primary_token_mint: config.chain.primary_token_mint.clone(),
            network_token_mint: config.chain.network_token_mint.clone(),
        });
        let pipeline = Arc::new(EventPipeline::new(
            decoder,
            Arc::clone(&registry),
            Arc::clone(&dedup),
            valuator,
            Arc::clone(&fanout),
        ));

        let portfolio = Arc::new(PortfolioEngine::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            BalanceFetcher::new(
                Arc::clone(&rpc),
                view.clone(),
                config.chain.network_token_mint.clone(),
                config.limits.max_cache_size,
            ),
            TradeFetcher::new(
                Arc::clone(&rpc),
                view.clone(),
                config.chain.dex_program_id.clone(),
            ),
            StakingFetcher::new(
                config.chain.stake_vaults.clone(),
                Arc::clone(&rpc),
                view.clone(),
                config.limits.max_cache_size,
            ),
            Arc::clone(&birdeye),
            meta.clone(),
        ));

        let commands = Arc::new(CommandApi::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&volumes),
            Arc::clone(&portfolio),
            Arc::clone(&dex_api),
            config.limits.max_wallets_per_user,
            config.limits.max_watchlist_items,
        ));

        let dex_feed = Arc::new(DexFeed::new(
            Arc::clone(&dex_api),
            Arc::clone(&registry),
            Arc::clone(&pipeline),
            config.upstream.dex_ws_url.clone(),
            config.feeds.clone(),
        ));
        let wallet_feed = Arc::new(WalletFeed::new(
            Arc::clone(&store),
            Arc::clone(&pipeline),
            config.upstream.rpc_ws_url.clone(),
            config.feeds.clone(),
            Arc::clone(&commands.subscriptions_changed),
        ));
        let backup_poller = Arc::new(BackupPoller::new(
            Arc::clone(&dex_api),
            Arc::clone(&volumes),
            Arc::clone(&pipeline),
            dex_feed.open_flag(),
            config.feeds.clone(),
        ));

        let scheduler = Scheduler::new(CancellationToken::new());

        Ok(Arc::new(Self {
            config,
            db,
            health,
            store,
            registry,
            volumes,
            prices,
            meta,
            dedup,
            fanout,
            pipeline,
            portfolio,
            commands,
            dex_api,
            dex_feed,
            wallet_feed,
            backup_poller,
            scheduler,
        }))
    }

    /// Warm state from the durable store, take the first refreshes, start
    /// the feeds, and register every scheduled job.
    pub async fn start(self: Arc<Self>) -> AppResult<()> {
        self.store.load_all().await?;
        self.dedup.warm_load().await;

        // First pool snapshot before the DEX feed subscribes.
        self.registry.refresh().await;
        self.volumes.refresh().await;
        self.prices.refresh(&self.registry.snapshot()).await;

        let cancel = self.scheduler.cancel_token();

        let dex_feed = Arc::clone(&self.dex_feed);
        let dex_cancel = cancel.clone();
        self.scheduler.track(
            "dex_feed",
            tokio::spawn(async move { dex_feed.run(dex_cancel).await }),
        );

        let wallet_feed = Arc::clone(&self.wallet_feed);
        let wallet_cancel = cancel.clone();
        self.scheduler.track(
            "wallet_feed",
            tokio::spawn(async move { wallet_feed.run(wallet_cancel).await }),
        );

        self.clone().spawn_jobs();
        tracing::info!("Core started");
        Ok(())
    }

    fn spawn_jobs(self: Arc<Self>) {
        let refresh = &self.config.refresh;

        let registry = Arc::clone(&self.registry);
        self.scheduler.spawn_interval(
            "pool_refresh",
            Duration::from_millis(refresh.pool_refresh_ms),
            move || {
                let registry = Arc::clone(&registry);
                async move {
                    registry.refresh().await;
                }
            },
        );

        let prices = Arc::clone(&self.prices);
        let registry = Arc::clone(&self.registry);
        self.scheduler.spawn_interval(
            "price_refresh",
            Duration::from_millis(refresh.price_refresh_ms),
            move || {
                let prices = Arc::clone(&prices);
                let registry = Arc::clone(&registry);
                async move {
                    prices.refresh(&registry.snapshot()).await;
                }
            },
        );

        let volumes = Arc::clone(&self.volumes);
        self.scheduler.spawn_interval(
            "volume_refresh",
            Duration::from_millis(refresh.volume_refresh_ms),
            move || {
                let volumes = Arc::clone(&volumes);
                async move {
                    volumes.refresh().await;
                }
            },
        );

        let dex_api = Arc::clone(&self.dex_api);
        self.scheduler.spawn_interval(
            "upstream_health",
            Duration::from_millis(refresh.health_check_ms),
            move || {
                let dex_api = Arc::clone(&dex_api);
                async move {
                    // Outcome lands in the health registry either way.
                    if let Err(e) = dex_api.health().await {
                        tracing::debug!(error = %e, "DEX health probe failed");
                    }
                }
            },
        );

        let backup = Arc::clone(&self.backup_poller);
        self.scheduler.spawn_interval(
            "backup_trade_poll",
            Duration::from_millis(self.config.feeds.trades_poll_ms),
            move || {
                let backup = Arc::clone(&backup);
                async move {
                    backup.poll().await;
                }
            },
        );

        let prices = Arc::clone(&self.prices);
        let meta = self.meta.clone();
        let meta_cap = self.config.limits.token_meta_cache_cap;
        self.scheduler.spawn_interval(
            "cache_prune",
            Duration::from_millis(refresh.cache_prune_ms),
            move || {
                let prices = Arc::clone(&prices);
                let meta = meta.clone();
                async move {
                    let pruned = prices.prune();
                    let capped = meta.cap_to(meta_cap);
                    tracing::debug!(pruned, capped, "Cache prune complete");
                }
            },
        );

        let store = Arc::clone(&self.store);
        self.scheduler.spawn_interval(
            "persistence_flush",
            Duration::from_millis(refresh.persist_flush_ms),
            move || {
                let store = Arc::clone(&store);
                async move {
                    if let Err(e) = store.flush_dirty().await {
                        tracing::warn!(error = %e, "Periodic flush failed");
                    }
                }
            },
        );

        let core = Arc::clone(&self);
        self.scheduler.spawn_interval(
            "portfolio_auto_sync",
            Duration::from_millis(refresh.portfolio_auto_sync_ms),
            move || {
                let core = Arc::clone(&core);
                async move {
                    core.auto_sync_portfolios().await;
                }
            },
        );

        let fanout = Arc::clone(&self.fanout);
        self.scheduler.spawn_daily(
            "daily_digest",
            self.config.digest.daily_digest_hour,
            self.config.digest.daily_digest_minute,
            move || {
                let fanout = Arc::clone(&fanout);
                async move {
                    let sent = fanout.broadcast_digest().await;
                    tracing::info!(sent, "Daily digest broadcast");
                }
            },
        );

        let dedup = Arc::clone(&self.dedup);
        self.scheduler.spawn_daily(
            "seen_tx_prune",
            self.config.digest.seen_tx_prune_hour,
            0,
            move || {
                let dedup = Arc::clone(&dedup);
                async move {
                    dedup.prune_durable().await;
                }
            },
        );
    }

    /// Auto-sync subscribers active in the last 30 minutes whose snapshot is
    /// older than the auto-sync interval.
    async fn auto_sync_portfolios(&self) {
        let now = Utc::now();
        let active_cutoff = now - ChronoDuration::minutes(AUTO_SYNC_ACTIVE_WINDOW_MINUTES);
        let stale_cutoff =
            now - ChronoDuration::milliseconds(self.config.refresh.portfolio_auto_sync_ms as i64);

        let candidates: Vec<i64> = self
            .store
            .all()
            .into_iter()
            .filter(|s| s.enabled && !s.blocked && !s.portfolio_wallets.is_empty())
            .filter(|s| s.last_active >= active_cutoff)
            .filter(|s| {
                s.portfolio
                    .as_ref()
                    .map(|p| p.last_sync < stale_cutoff)
                    .unwrap_or(true)
            })
            .map(|s| s.chat_id)
            .collect();

        if candidates.is_empty() {
            return;
        }
        tracing::debug!(count = candidates.len(), "Portfolio auto-sync cycle");
        for chat_id in candidates {
            Arc::clone(&self.portfolio).sync(chat_id).await;
        }
    }

    /// Cooperative shutdown: cancel all tasks, drain with the 10 s grace.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down");
        self.scheduler.shutdown().await;
        if let Err(e) = self.store.flush_dirty().await {
            tracing::warn!(error = %e, "Final flush failed");
        }
    }
}
