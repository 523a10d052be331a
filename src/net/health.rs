//! Per-upstream health tracking.
//!
//! Any success resets the failure counter and marks the provider ok; a
//! failure marks it degraded until three consecutive failures, then down.

use super::Provider;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

const DOWN_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Unknown,
    Ok,
    Degraded,
    Down,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Unknown => write!(f, "unknown"),
            HealthStatus::Ok => write!(f, "ok"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Down => write!(f, "down"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiHealth {
    pub status: HealthStatus,
    pub last_check: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

impl Default for ApiHealth {
    fn default() -> Self {
        Self {
            status: HealthStatus::Unknown,
            last_check: None,
            consecutive_failures: 0,
        }
    }
}

/// Registry of upstream health, shared by every provider client.
pub struct ApiHealthRegistry {
    health: RwLock<HashMap<Provider, ApiHealth>>,
}

impl ApiHealthRegistry {
    pub fn new() -> Self {
        let health = Provider::all()
            .into_iter()
            .map(|p| (p, ApiHealth::default()))
            .collect();
        Self {
            health: RwLock::new(health),
        }
    }

    pub fn record_success(&self, provider: Provider) {
        let mut health = self.health.write();
        let entry = health.entry(provider).or_default();
        if entry.status != HealthStatus::Ok {
            tracing::info!(provider = provider.name(), "Upstream recovered");
        }
        entry.status = HealthStatus::Ok;
        entry.consecutive_failures = 0;
        entry.last_check = Some(Utc::now());
    }

    pub fn record_failure(&self, provider: Provider) {
        let mut health = self.health.write();
        let entry = health.entry(provider).or_default();
        entry.consecutive_failures += 1;
        entry.status = if entry.consecutive_failures < DOWN_THRESHOLD {
            HealthStatus::Degraded
        } else {
            HealthStatus::Down
        };
        entry.last_check = Some(Utc::now());
        tracing::warn!(
            provider = provider.name(),
            failures = entry.consecutive_failures,
            status = %entry.status,
            "Upstream failure recorded"
        );
    }

    pub fn status(&self, provider: Provider) -> HealthStatus {
        self.health
            .read()
            .get(&provider)
            .map(|h| h.status)
            .unwrap_or(HealthStatus::Unknown)
    }

    pub fn get(&self, provider: Provider) -> Option<ApiHealth> {
        self.health.read().get(&provider).cloned()
    }

    pub fn snapshot(&self) -> HashMap<Provider, ApiHealth> {
        self.health.read().clone()
    }
}

impl Default for ApiHealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_unknown() {
        let registry = ApiHealthRegistry::new();
        assert_eq!(registry.status(Provider::DexApi), HealthStatus::Unknown);
    }

    #[test]
    fn test_degraded_then_down() {
        let registry = ApiHealthRegistry::new();
        registry.record_failure(Provider::Birdeye);
        assert_eq!(registry.status(Provider::Birdeye), HealthStatus::Degraded);
        registry.record_failure(Provider::Birdeye);
        assert_eq!(registry.status(Provider::Birdeye), HealthStatus::Degraded);
        registry.record_failure(Provider::Birdeye);
        assert_eq!(registry.status(Provider::Birdeye), HealthStatus::Down);
    }

    #[test]
    fn test_success_resets() {
        let registry = ApiHealthRegistry::new();
        for _ in 0..5 {
            registry.record_failure(Provider::CoinGecko);
        }
        assert_eq!(registry.status(Provider::CoinGecko), HealthStatus::Down);
        registry.record_success(Provider::CoinGecko);
        assert_eq!(registry.status(Provider::CoinGecko), HealthStatus::Ok);
        assert_eq!(
            registry.get(Provider::CoinGecko).unwrap().consecutive_failures,
            0
        );
    }
}
