//! Sliding-window rate limiter, one bucket per upstream provider.
//!
//! Implements a token bucket over a sliding one-second window. Limiters are
//! process-wide: every client for a given provider shares the same bucket.

use super::Provider;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Rate limiter using a token bucket with a sliding window
pub struct RateLimiter {
    /// Maximum requests per window
    max_requests: u32,
    /// Window size in seconds
    window_secs: u64,
    /// Request timestamps within the current window
    requests: Arc<Mutex<VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
            requests: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Acquire permission to make a request (blocks until the window admits it)
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let now = Instant::now();
                let window_start = now - Duration::from_secs(self.window_secs);

                let mut requests = self.requests.lock().unwrap();
                while let Some(&oldest) = requests.front() {
                    if oldest < window_start {
                        requests.pop_front();
                    } else {
                        break;
                    }
                }

                if (requests.len() as u32) < self.max_requests {
                    requests.push_back(now);
                    return;
                }

                // At limit; wait for the oldest request to leave the window.
                requests
                    .front()
                    .map(|&oldest| oldest + Duration::from_secs(self.window_secs) - now)
                    .unwrap_or(Duration::from_millis(10))
            };

            if wait.is_zero() {
                sleep(Duration::from_millis(10)).await;
            } else {
                sleep(wait).await;
            }
        }
    }

    /// Try to acquire without blocking; `false` if at limit.
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let window_start = now - Duration::from_secs(self.window_secs);

        let mut requests = self.requests.lock().unwrap();
        while let Some(&oldest) = requests.front() {
            if oldest < window_start {
                requests.pop_front();
            } else {
                break;
            }
        }

        if (requests.len() as u32) < self.max_requests {
            requests.push_back(now);
            true
        } else {
            false
        }
    }

    /// Current requests per second inside the window
    pub fn current_rate(&self) -> f64 {
        let now = Instant::now();
        let window_start = now - Duration::from_secs(self.window_secs);

        let mut requests = self.requests.lock().unwrap();
        while let Some(&oldest) = requests.front() {
            if oldest < window_start {
                requests.pop_front();
            } else {
                break;
            }
        }

        requests.len() as f64 / self.window_secs as f64
    }
}

/// Process-wide limiter registry, one bucket per provider.
pub struct RateLimiters {
    limiters: HashMap<Provider, Arc<RateLimiter>>,
}

impl RateLimiters {
    pub fn new() -> Self {
        let limiters = Provider::all()
            .into_iter()
            .map(|p| (p, Arc::new(RateLimiter::new(p.default_rate(), 1))))
            .collect();
        Self { limiters }
    }

    /// Block until the provider's bucket admits the caller.
    pub async fn acquire(&self, provider: Provider) {
        if let Some(limiter) = self.limiters.get(&provider) {
            limiter.acquire().await;
        }
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<RateLimiter>> {
        self.limiters.get(&provider).cloned()
    }
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::new()
    }
}
