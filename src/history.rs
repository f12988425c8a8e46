//! Data source abstraction for daily price history.

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

/// One daily close observation returned by a provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Provider failures. `RateLimited` is the only retryable kind.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("rate limited by provider")]
    RateLimited,
    #[error("provider returned HTTP {0}")]
    Http(reqwest::StatusCode),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed provider response: {0}")]
    Malformed(String),
    #[error("provider error: {0}")]
    Provider(String),
}

#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// Fetches daily close prices for `symbol` over the inclusive date range.
    ///
    /// An empty row set is a valid response; it means the provider has no
    /// trading data for the range.
    async fn history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ClosePoint>, HistoryError>;
}
