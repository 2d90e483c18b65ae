use crate::config::AppConfig;
use crate::errors::{EngineError, EngineResult};
use crate::state::{EngineEvent, QuoteSource};
use reqwest::Client;
use std::time::Duration;
use tokio::sync::mpsc;

/// FRED observations risk-free-rate provider. Polls the configured
/// series at a slow interval and sends RiskFreeRate events to the
/// engine via bounded channel.
pub async fn run_rate_feed(config: AppConfig, engine_tx: mpsc::Sender<EngineEvent>) {
    let Some(api_key) = config.fred_api_key.clone() else {
        tracing::info!("no FRED key configured, rate feed idle");
        return;
    };

    tracing::info!(series = %config.fred_series, "rate feed started (FRED)");

    let client = Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_default();

    let mut interval = tokio::time::interval(Duration::from_secs(config.rate_poll_secs.max(1)));
    let mut consecutive_errors: u32 = 0;

    loop {
        interval.tick().await;

        match fetch_rate(&client, &api_key, &config).await {
            Ok(rate) => {
                consecutive_errors = 0;
                if engine_tx
                    .send(EngineEvent::RiskFreeRate {
                        rate,
                        source: QuoteSource::Live,
                    })
                    .await
                    .is_err()
                {
                    tracing::error!("engine channel closed, rate feed shutting down");
                    return;
                }
            }
            Err(e) => {
                consecutive_errors += 1;
                tracing::warn!(
                    error = %e,
                    consecutive = consecutive_errors,
                    "rate fetch failed"
                );

                if consecutive_errors > 3 {
                    let backoff = std::cmp::min(consecutive_errors as u64 * 60, 1800);
                    tokio::time::sleep(Duration::from_secs(backoff)).await;
                }
            }
        }
    }
}

/// Latest observation of the configured series as a decimal annualized
/// rate (FRED publishes percentages).
pub async fn fetch_rate(client: &Client, api_key: &str, config: &AppConfig) -> EngineResult<f64> {
    let url = format!(
        "{}/fred/series/observations?series_id={}&api_key={}&file_type=json&sort_order=desc&limit=5",
        config.fred_base_url.trim_end_matches('/'),
        config.fred_series,
        api_key
    );

    let resp = client
        .get(&url)
        .send()
        .await
        .map_err(|e| EngineError::RateFeed(format!("request failed: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(EngineError::RateFeed(format!("HTTP {status}: {body}")));
    }

    let data: ObservationsResponse = resp
        .json()
        .await
        .map_err(|e| EngineError::RateFeed(format!("parse: {e}")))?;

    latest_rate(&data)
}

// FRED response format:
// {
//   "observations": [
//     { "date": "2026-08-04", "value": "4.35" },
//     { "date": "2026-08-03", "value": "." }
//   ]
// }
// "." marks dates with no published value.

#[derive(serde::Deserialize)]
struct ObservationsResponse {
    observations: Option<Vec<Observation>>,
}

#[derive(serde::Deserialize)]
struct Observation {
    #[allow(dead_code)]
    date: Option<String>,
    value: Option<String>,
}

/// First parseable observation, percent converted to decimal.
fn latest_rate(data: &ObservationsResponse) -> EngineResult<f64> {
    let observations = data
        .observations
        .as_ref()
        .filter(|o| !o.is_empty())
        .ok_or_else(|| EngineError::RateFeed("no observations in response".into()))?;

    for obs in observations {
        let Some(raw) = obs.value.as_deref() else {
            continue;
        };
        if raw == "." {
            continue;
        }
        let percent: f64 = raw
            .parse()
            .map_err(|_| EngineError::RateFeed(format!("invalid rate string: {raw}")))?;
        if !percent.is_finite() {
            return Err(EngineError::RateFeed(format!("invalid rate: {percent}")));
        }
        return Ok(percent / 100.0);
    }

    Err(EngineError::RateFeed(
        "no published value in recent observations".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_rate_converts_percent() {
        let body = r#"{
            "observations": [
                { "date": "2026-08-04", "value": "4.35" },
                { "date": "2026-08-03", "value": "4.33" }
            ]
        }"#;
        let data: ObservationsResponse = serde_json::from_str(body).unwrap();
        let rate = latest_rate(&data).unwrap();
        assert!((rate - 0.0435).abs() < 1e-12);
    }

    #[test]
    fn test_unpublished_values_skipped() {
        let body = r#"{
            "observations": [
                { "date": "2026-08-04", "value": "." },
                { "date": "2026-08-03", "value": "4.30" }
            ]
        }"#;
        let data: ObservationsResponse = serde_json::from_str(body).unwrap();
        let rate = latest_rate(&data).unwrap();
        assert!((rate - 0.0430).abs() < 1e-12);
    }

    #[test]
    fn test_empty_observations_is_an_error() {
        let data: ObservationsResponse = serde_json::from_str(r#"{ "observations": [] }"#).unwrap();
        assert!(latest_rate(&data).is_err());

        let data: ObservationsResponse = serde_json::from_str("{}").unwrap();
        assert!(latest_rate(&data).is_err());
    }

    #[test]
    fn test_all_unpublished_is_an_error() {
        let body = r#"{ "observations": [ { "date": "2026-08-04", "value": "." } ] }"#;
        let data: ObservationsResponse = serde_json::from_str(body).unwrap();
        assert!(latest_rate(&data).is_err());
    }
}
