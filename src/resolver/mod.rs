//! Multi-source price and token-metadata resolution with health-tracked
//! failover.

pub mod metadata;
pub mod price;

pub use metadata::{escape_markdown, MetaSource, TokenMeta, TokenMetaResolver};
pub use price::{PriceEntry, PriceResolver, PriceSource};
