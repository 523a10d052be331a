//! Retrying JSON fetch shared by every upstream client.
//!
//! On 429 the wait is `1s * (attempt + 1)` and the attempt still counts
//! toward the retry budget. Network errors and timeouts wait
//! `0.5s * (attempt + 1)`. Any other non-2xx is recorded and retried until
//! the budget is exhausted.

use crate::error::UpstreamError;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Per-request options for `fetch_with_retry`.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub provider: &'static str,
    pub max_retries: u32,
    pub timeout: Duration,
    pub headers: HashMap<&'static str, String>,
}

impl FetchOptions {
    pub fn new(provider: &'static str) -> Self {
        Self {
            provider,
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            headers: HashMap::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value.into());
        self
    }
}

/// GET a JSON document with retry, timeout, and 429-aware waits.
pub async fn fetch_with_retry(
    client: &Client,
    url: &str,
    opts: &FetchOptions,
) -> Result<Value, UpstreamError> {
    fetch_json(client, url, None, opts).await
}

/// POST a JSON body with the same retry policy. Used by the RPC aggregator.
pub async fn post_with_retry(
    client: &Client,
    url: &str,
    body: &Value,
    opts: &FetchOptions,
) -> Result<Value, UpstreamError> {
    fetch_json(client, url, Some(body), opts).await
}

async fn fetch_json(
    client: &Client,
    url: &str,
    body: Option<&Value>,
    opts: &FetchOptions,
) -> Result<Value, UpstreamError> {
    let mut last_status: Option<u16> = None;
    let mut timed_out = 0u32;

    for attempt in 0..=opts.max_retries {
        let mut request = match body {
            Some(b) => client.post(url).json(b),
            None => client.get(url),
        };
        request = request
            .header("Accept", "application/json")
            .timeout(opts.timeout);
        for (name, value) in &opts.headers {
            request = request.header(*name, value);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.as_u16() == 429 {
                    last_status = Some(429);
                    tracing::warn!(
                        provider = opts.provider,
                        attempt,
                        "Rate limited by upstream, backing off"
                    );
                    sleep(Duration::from_secs(1) * (attempt + 1)).await;
                    continue;
                }
                if !status.is_success() {
                    last_status = Some(status.as_u16());
                    tracing::debug!(
                        provider = opts.provider,
                        status = status.as_u16(),
                        attempt,
                        "Upstream returned non-success status"
                    );
                    sleep(Duration::from_millis(500) * (attempt + 1)).await;
                    continue;
                }
                return response.json::<Value>().await.map_err(|e| {
                    UpstreamError::Parse {
                        provider: opts.provider,
                        detail: e.to_string(),
                    }
                });
            }
            Err(e) => {
                if e.is_timeout() {
                    timed_out += 1;
                }
                if attempt == opts.max_retries {
                    return Err(if timed_out > 0 && e.is_timeout() {
                        UpstreamError::Timeout {
                            provider: opts.provider,
                            attempts: attempt + 1,
                        }
                    } else {
                        UpstreamError::Transport {
                            provider: opts.provider,
                            source: e,
                        }
                    });
                }
                tracing::debug!(
                    provider = opts.provider,
                    error = %e,
                    attempt,
                    "Upstream request failed, retrying"
                );
                sleep(Duration::from_millis(500) * (attempt + 1)).await;
            }
        }
    }

    Err(UpstreamError::Status {
        provider: opts.provider,
        status: last_status.unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_builder() {
        let opts = FetchOptions::new("dex_api")
            .with_timeout(Duration::from_secs(5))
            .with_header("X-API-KEY", "k");
        assert_eq!(opts.provider, "dex_api");
        assert_eq!(opts.timeout, Duration::from_secs(5));
        assert_eq!(opts.headers.get("X-API-KEY").unwrap(), "k");
        assert_eq!(opts.max_retries, DEFAULT_MAX_RETRIES);
    }
}
