//! DLMM Sentinel library
//!
//! Real-time activity tracker for a DLMM concentrated-liquidity DEX:
//! event ingestion, classification, deduplication, USD valuation,
//! subscriber fan-out, and portfolio aggregation.
//! This library exposes core modules for integration testing.

pub mod cache;
pub mod commands;
pub mod config;
pub mod core;
pub mod db;
pub mod decoder;
pub mod dedup;
pub mod error;
pub mod fanout;
pub mod feeds;
pub mod net;
pub mod pipeline;
pub mod pools;
pub mod portfolio;
pub mod providers;
pub mod resolver;
pub mod scheduler;
pub mod sink;
pub mod subscribers;
pub mod valuation;

// Re-export commonly used types for tests
pub use crate::commands::CommandApi;
pub use crate::config::AppConfig;
pub use crate::core::Core;
pub use crate::db::DbPool;
pub use crate::decoder::{Confidence, Direction, EventDecoder, EventKind, SemanticEvent};
pub use crate::dedup::{AlertSource, SeenTxStore};
pub use crate::error::{AppError, AppResult, CommandReject, UpstreamError};
pub use crate::fanout::FanOut;
pub use crate::pipeline::EventPipeline;
pub use crate::pools::{Pool, PoolRegistry, PoolSnapshot};
pub use crate::portfolio::{PortfolioEngine, PortfolioSnapshot};
pub use crate::resolver::{PriceResolver, TokenMetaResolver};
pub use crate::sink::{ActionHint, NotificationSink, SendOutcome};
pub use crate::subscribers::{FilterField, Subscriber, SubscriberStore, ThresholdKind};
pub use crate::valuation::UsdValuator;
