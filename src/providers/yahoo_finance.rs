use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::history::{ClosePoint, HistoryError, HistoryProvider};

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const USER_AGENT: &str = "quotegrid/0.1";

// YahooHistoryProvider implementation for HistoryProvider
pub struct YahooHistoryProvider {
    base_url: String,
}

impl YahooHistoryProvider {
    pub fn new(base_url: &str) -> Self {
        YahooHistoryProvider {
            base_url: base_url.to_string(),
        }
    }
}

#[derive(Deserialize, Debug)]
struct YahooChartResponse {
    chart: ChartResult,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    #[serde(default)]
    result: Option<Vec<ChartItem>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Deserialize, Debug)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Deserialize, Debug)]
struct ChartItem {
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Deserialize, Debug)]
struct Quote {
    close: Option<Vec<Option<f64>>>,
}

#[async_trait]
impl HistoryProvider for YahooHistoryProvider {
    #[instrument(
        name = "YahooHistoryFetch",
        skip(self),
        fields(symbol = %symbol)
    )]
    async fn history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ClosePoint>, HistoryError> {
        // period2 is exclusive; add a day to keep `end` inside the range.
        let period1 = start.and_time(NaiveTime::MIN).and_utc().timestamp();
        let period2 = (end + Duration::days(1))
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp();
        let url = format!(
            "{}/v8/finance/chart/{}?interval=1d&period1={}&period2={}",
            self.base_url, symbol, period1, period2
        );
        debug!("Requesting history from {}", url);

        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        let response = client.get(&url).send().await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(HistoryError::RateLimited);
        }
        if !status.is_success() {
            return Err(HistoryError::Http(status));
        }

        let text = response.text().await?;
        let data: YahooChartResponse = serde_json::from_str(&text)
            .map_err(|e| HistoryError::Malformed(format!("{symbol}: {e}")))?;

        if let Some(err) = data.chart.error {
            return Err(HistoryError::Provider(format!(
                "{}: {}",
                err.code, err.description
            )));
        }

        let Some(item) = data.chart.result.and_then(|r| r.into_iter().next()) else {
            return Ok(Vec::new());
        };

        let (Some(timestamps), Some(closes)) = (
            item.timestamp,
            item.indicators
                .and_then(|inds| inds.quote.into_iter().next())
                .and_then(|q| q.close),
        ) else {
            return Ok(Vec::new());
        };

        let points = timestamps
            .iter()
            .zip(closes)
            .filter_map(|(ts, close)| {
                let close = close?;
                let date = Utc.timestamp_opt(*ts, 0).single()?.date_naive();
                Some(ClosePoint { date, close })
            })
            .collect();
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn create_mock_server(symbol: &str, response: ResponseTemplate) -> MockServer {
        let mock_server = MockServer::start().await;
        let request_path = format!("/v8/finance/chart/{symbol}");

        Mock::given(method("GET"))
            .and(path(request_path))
            .and(query_param("interval", "1d"))
            .respond_with(response)
            .mount(&mock_server)
            .await;

        mock_server
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn ts(s: &str) -> i64 {
        // Midday UTC keeps the derived calendar date stable.
        date(s).and_hms_opt(12, 0, 0).unwrap().and_utc().timestamp()
    }

    #[tokio::test]
    async fn test_successful_history_fetch() {
        let mock_response = format!(
            r#"{{
                "chart": {{
                    "result": [{{
                        "timestamp": [{}, {}, {}],
                        "indicators": {{
                            "quote": [{{
                                "close": [100.5, null, 102.25]
                            }}]
                        }}
                    }}]
                }}
            }}"#,
            ts("2025-01-02"),
            ts("2025-01-03"),
            ts("2025-01-06"),
        );

        let mock_server = create_mock_server(
            "AAPL",
            ResponseTemplate::new(200).set_body_string(mock_response),
        )
        .await;
        let provider = YahooHistoryProvider::new(&mock_server.uri());

        let points = provider
            .history("AAPL", date("2025-01-01"), date("2025-01-07"))
            .await
            .unwrap();

        // Null closes are dropped, not turned into zeroes.
        assert_eq!(
            points,
            vec![
                ClosePoint {
                    date: date("2025-01-02"),
                    close: 100.5
                },
                ClosePoint {
                    date: date("2025-01-06"),
                    close: 102.25
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_rate_limit_status_is_distinguishable() {
        let mock_server = create_mock_server("^GDAXI", ResponseTemplate::new(429)).await;
        let provider = YahooHistoryProvider::new(&mock_server.uri());

        let result = provider
            .history("^GDAXI", date("2025-01-01"), date("2025-01-07"))
            .await;
        assert!(matches!(result, Err(HistoryError::RateLimited)));
    }

    #[tokio::test]
    async fn test_server_error_is_not_rate_limit() {
        let mock_server = create_mock_server("TSLA", ResponseTemplate::new(500)).await;
        let provider = YahooHistoryProvider::new(&mock_server.uri());

        let result = provider
            .history("TSLA", date("2025-01-01"), date("2025-01-07"))
            .await;
        match result {
            Err(HistoryError::Http(status)) => assert_eq!(status.as_u16(), 500),
            other => panic!("expected HTTP error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_chart_error_payload() {
        let mock_response = r#"{
            "chart": {
                "result": null,
                "error": {
                    "code": "Not Found",
                    "description": "No data found, symbol may be delisted"
                }
            }
        }"#;

        let mock_server = create_mock_server(
            "GONE",
            ResponseTemplate::new(200).set_body_string(mock_response),
        )
        .await;
        let provider = YahooHistoryProvider::new(&mock_server.uri());

        let result = provider
            .history("GONE", date("2025-01-01"), date("2025-01-07"))
            .await;
        match result {
            Err(HistoryError::Provider(message)) => {
                assert!(message.contains("No data found"));
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_result_yields_no_rows() {
        let mock_response = r#"{"chart": {"result": []}}"#;
        let mock_server = create_mock_server(
            "SPAX.PVT",
            ResponseTemplate::new(200).set_body_string(mock_response),
        )
        .await;
        let provider = YahooHistoryProvider::new(&mock_server.uri());

        let points = provider
            .history("SPAX.PVT", date("2025-01-01"), date("2025-01-07"))
            .await
            .unwrap();
        assert!(points.is_empty());
    }

    #[tokio::test]
    async fn test_result_without_bars_yields_no_rows() {
        let mock_response = r#"{"chart": {"result": [{"timestamp": null}]}}"#;
        let mock_server = create_mock_server(
            "WIG20.WA",
            ResponseTemplate::new(200).set_body_string(mock_response),
        )
        .await;
        let provider = YahooHistoryProvider::new(&mock_server.uri());

        let points = provider
            .history("WIG20.WA", date("2025-01-01"), date("2025-01-07"))
            .await
            .unwrap();
        assert!(points.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_response() {
        let mock_server = create_mock_server(
            "AMZN",
            ResponseTemplate::new(200).set_body_string("not json at all"),
        )
        .await;
        let provider = YahooHistoryProvider::new(&mock_server.uri());

        let result = provider
            .history("AMZN", date("2025-01-01"), date("2025-01-07"))
            .await;
        assert!(matches!(result, Err(HistoryError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_requested_period_covers_range_inclusive() {
        let mock_server = MockServer::start().await;
        let start = date("2025-03-01");
        let end = date("2025-03-10");
        let period1 = start.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
        let period2 = date("2025-03-11")
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp();

        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/BTC-USD"))
            .and(query_param("period1", period1.to_string()))
            .and(query_param("period2", period2.to_string()))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"chart": {"result": []}}"#),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = YahooHistoryProvider::new(&mock_server.uri());
        provider.history("BTC-USD", start, end).await.unwrap();
    }
}
