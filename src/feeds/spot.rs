use crate::config::AppConfig;
use crate::errors::{EngineError, EngineResult};
use crate::state::{EngineEvent, QuoteSource};
use reqwest::Client;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;

/// Alpha Vantage daily-series spot provider with a single-scalar file
/// cache. A cached price younger than the configured maximum age
/// short-circuits the HTTP call; a successful fetch rewrites the cache.
/// Sends SpotPrice events to the engine via bounded channel.
pub async fn run_spot_feed(config: AppConfig, engine_tx: mpsc::Sender<EngineEvent>) {
    let Some(api_key) = config.alphavantage_api_key.clone() else {
        tracing::info!("no Alpha Vantage key configured, spot feed idle");
        return;
    };

    tracing::info!(symbol = %config.underlying_symbol, "spot feed started (Alpha Vantage)");

    let client = Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_default();

    let mut interval = tokio::time::interval(Duration::from_secs(config.spot_poll_secs.max(1)));
    let mut consecutive_errors: u32 = 0;

    loop {
        interval.tick().await;

        match fetch_spot(&client, &api_key, &config).await {
            Ok((price, source)) => {
                consecutive_errors = 0;
                if engine_tx
                    .send(EngineEvent::SpotPrice { price, source })
                    .await
                    .is_err()
                {
                    tracing::error!("engine channel closed, spot feed shutting down");
                    return;
                }
            }
            Err(e) => {
                consecutive_errors += 1;
                tracing::warn!(
                    error = %e,
                    consecutive = consecutive_errors,
                    "spot fetch failed"
                );

                // Exponential backoff on repeated failures (cap at 5 min)
                if consecutive_errors > 3 {
                    let backoff = std::cmp::min(consecutive_errors as u64 * 30, 300);
                    tokio::time::sleep(Duration::from_secs(backoff)).await;
                }
            }
        }
    }
}

/// Resolve the current spot: fresh cache entry first, then the provider.
pub async fn fetch_spot(
    client: &Client,
    api_key: &str,
    config: &AppConfig,
) -> EngineResult<(f64, QuoteSource)> {
    if let Some(cached) = read_cached(
        &config.spot_cache_path,
        Duration::from_secs(config.spot_cache_max_age_secs),
    ) {
        return Ok((cached, QuoteSource::Cached));
    }

    let url = format!(
        "{}/query?function=TIME_SERIES_DAILY&symbol={}&apikey={}",
        config.alphavantage_base_url.trim_end_matches('/'),
        config.underlying_symbol,
        api_key
    );

    let resp = client
        .get(&url)
        .send()
        .await
        .map_err(|e| EngineError::SpotFeed(format!("request failed: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(EngineError::SpotFeed(format!("HTTP {status}: {body}")));
    }

    let data: DailySeriesResponse = resp
        .json()
        .await
        .map_err(|e| EngineError::SpotFeed(format!("parse: {e}")))?;

    let price = latest_close(&data)?;
    write_cache(&config.spot_cache_path, price);
    Ok((price, QuoteSource::Live))
}

// Alpha Vantage response format:
// {
//   "Meta Data": { ... },
//   "Time Series (Daily)": {
//     "2026-08-04": { "1. open": "...", "4. close": "3350.00", ... },
//     "2026-08-03": { ... }
//   }
// }
// Rate-limit and error replies carry "Note" / "Error Message" instead.

#[derive(serde::Deserialize)]
struct DailySeriesResponse {
    #[serde(rename = "Time Series (Daily)")]
    series: Option<HashMap<String, DailyBar>>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

#[derive(serde::Deserialize)]
struct DailyBar {
    #[serde(rename = "4. close")]
    close: Option<String>,
}

/// Close of the most recent date in the series. Dates are ISO strings,
/// so the lexicographic maximum is the latest.
fn latest_close(data: &DailySeriesResponse) -> EngineResult<f64> {
    if let Some(note) = data.note.as_deref().or(data.error_message.as_deref()) {
        return Err(EngineError::SpotFeed(format!("provider refused: {note}")));
    }

    let series = data
        .series
        .as_ref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| EngineError::SpotFeed("no daily series in response".into()))?;

    let latest = series
        .keys()
        .max()
        .and_then(|date| series[date].close.as_deref())
        .ok_or_else(|| EngineError::SpotFeed("latest bar has no close".into()))?;

    let price: f64 = latest
        .parse()
        .map_err(|_| EngineError::SpotFeed(format!("invalid close string: {latest}")))?;

    if price <= 0.0 || !price.is_finite() {
        return Err(EngineError::SpotFeed(format!("invalid price: {price}")));
    }

    Ok(price)
}

/// Read the cached scalar if the file is younger than `max_age`.
fn read_cached(path: &Path, max_age: Duration) -> Option<f64> {
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
    let age = modified.elapsed().ok()?;
    if age >= max_age {
        return None;
    }
    let raw = std::fs::read_to_string(path).ok()?;
    let price: f64 = raw.trim().parse().ok()?;
    (price > 0.0 && price.is_finite()).then_some(price)
}

/// Persist the scalar. Failure is logged, never fatal; the next poll
/// simply refetches.
fn write_cache(path: &Path, price: f64) {
    if let Some(dir) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::warn!(error = %e, "spot cache dir create failed");
            return;
        }
    }
    if let Err(e) = std::fs::write(path, price.to_string()) {
        tracing::warn!(error = %e, "spot cache write failed");
    }
}
