//! Backoff fetcher: retry and throttle policy around a history provider.

use crate::history::{HistoryError, HistoryProvider};
use crate::series::Series;
use chrono::NaiveDate;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, warn};

/// Tunables for retry and throttle behaviour.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Retries beyond the initial attempt for rate-limit failures.
    pub max_retries: u32,
    /// First backoff wait; doubles after every rate-limited attempt.
    pub base_wait: Duration,
    /// Fractional perturbation applied to each backoff wait (0.2 = ±20%).
    pub jitter: f64,
    /// Bounds of the randomized pause after a provider call that returned.
    pub courtesy_min: Duration,
    pub courtesy_max: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        FetchPolicy {
            max_retries: 5,
            base_wait: Duration::from_secs(60),
            jitter: 0.2,
            courtesy_min: Duration::from_secs(1),
            courtesy_max: Duration::from_secs(5),
        }
    }
}

/// What a fetch produced. An empty series is a failed instrument; `error`
/// carries the provider message when one exists (rate-limit exhaustion or a
/// non-retryable failure). An empty series without an error means the
/// provider answered cleanly but had no rows.
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    pub series: Series,
    pub error: Option<String>,
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        !self.series.is_empty()
    }
}

pub struct BackoffFetcher<P> {
    provider: P,
    policy: FetchPolicy,
}

impl<P: HistoryProvider> BackoffFetcher<P> {
    pub fn new(provider: P, policy: FetchPolicy) -> Self {
        BackoffFetcher { provider, policy }
    }

    /// Fetches one symbol's history, retrying rate-limit failures with
    /// exponential backoff. Never returns an error: exhaustion and
    /// non-retryable failures degrade to an empty result the caller must
    /// treat as a failed instrument.
    pub async fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> FetchResult {
        let attempts = self.policy.max_retries + 1;
        let mut wait = self.policy.base_wait;
        let mut attempt = 1u32;

        loop {
            match self.provider.history(symbol, start, end).await {
                Ok(points) => {
                    debug!(symbol, rows = points.len(), "history fetched");
                    let series = Series::from_points(&points);
                    // Throttle even on success to avoid bursts across
                    // instruments.
                    self.courtesy_pause().await;
                    return FetchResult {
                        series,
                        error: None,
                    };
                }
                Err(HistoryError::RateLimited) => {
                    if attempt >= attempts {
                        warn!(symbol, attempts, "giving up after repeated rate limits");
                        return FetchResult {
                            series: Series::default(),
                            error: Some(format!("rate limited after {attempts} attempts")),
                        };
                    }
                    let pause = jittered(wait, self.policy.jitter);
                    warn!(
                        symbol,
                        attempt,
                        attempts,
                        wait_secs = pause.as_secs_f64(),
                        "rate limited, backing off"
                    );
                    tokio::time::sleep(pause).await;
                    wait *= 2;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(symbol, error = %err, "fetch failed, not retrying");
                    return FetchResult {
                        series: Series::default(),
                        error: Some(err.to_string()),
                    };
                }
            }
        }
    }

    async fn courtesy_pause(&self) {
        let min = self.policy.courtesy_min.as_secs_f64();
        let max = self.policy.courtesy_max.as_secs_f64();
        let pause = if max > min {
            Duration::from_secs_f64(rand::thread_rng().gen_range(min..=max))
        } else {
            self.policy.courtesy_min
        };
        if !pause.is_zero() {
            debug!(pause_secs = pause.as_secs_f64(), "courtesy pause");
            tokio::time::sleep(pause).await;
        }
    }
}

fn jittered(wait: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return wait;
    }
    let factor = rand::thread_rng().gen_range(1.0 - jitter..=1.0 + jitter);
    Duration::from_secs_f64(wait.as_secs_f64() * factor)
}
