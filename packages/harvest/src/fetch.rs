//! Retrying page fetcher.
//!
//! Wraps a single network request with bounded retries, exponential
//! backoff with jitter, and rotating identity selection. The actual
//! HTTP call sits behind the [`Transport`] trait so tests can script
//! outcomes without a network.

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{FetchError, FetchResult};
use crate::identity::{IdentityPool, IdentityProfile};

/// One GET request with a chosen identity, classified into the
/// transient/permanent taxonomy by the implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, profile: &IdentityProfile) -> FetchResult<String>;
}

/// Real HTTP transport on reqwest.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with the given per-request timeout.
    pub fn new(request_timeout: Duration) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| FetchError::Permanent {
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }

    /// Use a preconfigured reqwest client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str, profile: &IdentityProfile) -> FetchResult<String> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", &profile.user_agent)
            .header("Accept", &profile.accept)
            .header("Accept-Language", &profile.accept_language)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    FetchError::Transient {
                        reason: format!("request failed: {}", e),
                    }
                } else {
                    FetchError::Permanent {
                        reason: format!("request failed: {}", e),
                    }
                }
            })?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(FetchError::Transient {
                reason: format!("HTTP {}", status),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Permanent {
                reason: format!("HTTP {}", status),
            });
        }

        response.text().await.map_err(|e| FetchError::Transient {
            reason: format!("body read failed: {}", e),
        })
    }
}

/// Fetcher that retries transient failures with exponential backoff.
pub struct RetryingFetcher<T: Transport> {
    pub(crate) transport: T,
    identities: IdentityPool,
    attempt_budget: u32,
    base_delay: Duration,
}

impl<T: Transport> RetryingFetcher<T> {
    /// Create a fetcher making up to `attempt_budget` attempts per
    /// page (first try included; a budget of 0 is treated as 1).
    pub fn new(transport: T, attempt_budget: u32, base_delay: Duration) -> Self {
        Self {
            transport,
            identities: IdentityPool::builtin(),
            attempt_budget: attempt_budget.max(1),
            base_delay,
        }
    }

    /// Use a custom identity pool.
    pub fn with_identities(mut self, identities: IdentityPool) -> Self {
        self.identities = identities;
        self
    }

    /// Fetch one page, retrying transient failures until the attempt
    /// budget is spent. Permanent failures abort immediately; a
    /// cancellation abandons the in-flight attempt.
    pub async fn fetch(&self, url: &str, cancel: &CancellationToken) -> FetchResult<String> {
        for attempt in 1..=self.attempt_budget {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            let profile = self.identities.next_profile();
            debug!(url, attempt, user_agent = %profile.user_agent, "fetch attempt");

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                outcome = self.transport.get(url, &profile) => outcome,
            };

            match outcome {
                Ok(body) => {
                    debug!(url, attempt, bytes = body.len(), "fetch succeeded");
                    return Ok(body);
                }
                Err(e @ FetchError::Transient { .. }) => {
                    warn!(url, attempt, error = %e, "transient fetch failure");
                    if attempt < self.attempt_budget {
                        let delay = self.retry_delay(attempt);
                        debug!(url, attempt, delay_ms = delay.as_millis() as u64, "backing off");
                        tokio::select! {
                            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
                Err(e) => {
                    warn!(url, attempt, error = %e, "permanent fetch failure");
                    return Err(e);
                }
            }
        }

        warn!(url, attempts = self.attempt_budget, "fetch retries exhausted");
        Err(FetchError::Exhausted {
            attempts: self.attempt_budget,
        })
    }

    /// Deterministic backoff component for a given attempt:
    /// `base_delay * 2^(attempt-1)`.
    pub fn backoff_base(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Backoff plus uniform jitter in `[0, base_delay / 2)`.
    fn retry_delay(&self, attempt: u32) -> Duration {
        let base = self.backoff_base(attempt);
        let jitter_cap = self.base_delay.as_millis() as u64 / 2;
        if jitter_cap == 0 {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0..jitter_cap);
        base + Duration::from_millis(jitter)
    }
}
