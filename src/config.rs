use crate::errors::{EngineError, EngineResult};
use chrono::NaiveDate;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub alphavantage_api_key: Option<String>,
    pub alphavantage_base_url: String,
    pub underlying_symbol: String,
    pub fred_api_key: Option<String>,
    pub fred_base_url: String,
    pub fred_series: String,
    pub spot_cache_path: std::path::PathBuf,
    pub spot_cache_max_age_secs: u64,
    pub spot_poll_secs: u64,
    pub rate_poll_secs: u64,
    pub manual_spot: Option<f64>,
    pub manual_rate: Option<f64>,
    pub expiry_date: Option<NaiveDate>,
    pub default_tenor_years: f64,
    pub sigma: f64,
    pub beta: f64,
    pub time_step: f64,
    pub alpha: f64,
    pub strike_step: f64,
    pub curve_strikes: usize,
    pub server_port: u16,
}

impl AppConfig {
    pub fn from_env() -> EngineResult<Self> {
        dotenvy::dotenv().ok();

        let expiry_date = match std::env::var("EXPIRY_DATE") {
            Ok(raw) => Some(
                NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .map_err(|e| EngineError::Config(format!("EXPIRY_DATE: {e}")))?,
            ),
            Err(_) => None,
        };

        let config = Self {
            alphavantage_api_key: env_var_opt("ALPHAVANTAGE_API_KEY"),
            alphavantage_base_url: env_var_or("ALPHAVANTAGE_BASE_URL", "https://www.alphavantage.co"),
            underlying_symbol: env_var_or("UNDERLYING_SYMBOL", "GLD"),
            fred_api_key: env_var_opt("FRED_API_KEY"),
            fred_base_url: env_var_or("FRED_BASE_URL", "https://api.stlouisfed.org"),
            fred_series: env_var_or("FRED_SERIES", "DGS3MO"),
            spot_cache_path: env_var_or("SPOT_CACHE_PATH", "data/spot_price.txt").into(),
            spot_cache_max_age_secs: parse_var("SPOT_CACHE_MAX_AGE_SECS", "7200")?,
            spot_poll_secs: parse_var("SPOT_POLL_SECS", "600")?,
            rate_poll_secs: parse_var("RATE_POLL_SECS", "21600")?,
            manual_spot: parse_var_opt("MANUAL_SPOT")?,
            manual_rate: parse_var_opt("MANUAL_RISK_FREE_RATE")?,
            expiry_date,
            default_tenor_years: parse_var("DEFAULT_TENOR_YEARS", "1.0")?,
            sigma: parse_var("SIGMA", "0.2")?,
            beta: parse_var("BETA", "1.0")?,
            time_step: parse_var("TIME_STEP", "0.1")?,
            alpha: parse_var("ALPHA", "1.0")?,
            strike_step: parse_var("STRIKE_STEP", "5.0")?,
            curve_strikes: parse_var("CURVE_STRIKES", "7")?,
            server_port: parse_var("SERVER_PORT", "3000")?,
        };

        // Each market input needs a provider or a manual value; the pricing
        // core is never called with a missing spot or rate.
        if config.alphavantage_api_key.is_none() && config.manual_spot.is_none() {
            return Err(EngineError::Config(
                "set ALPHAVANTAGE_API_KEY or MANUAL_SPOT".into(),
            ));
        }
        if config.fred_api_key.is_none() && config.manual_rate.is_none() {
            return Err(EngineError::Config(
                "set FRED_API_KEY or MANUAL_RISK_FREE_RATE".into(),
            ));
        }
        if config.curve_strikes == 0 {
            return Err(EngineError::Config("CURVE_STRIKES must be at least 1".into()));
        }

        Ok(config)
    }
}

fn env_var_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: std::str::FromStr>(key: &str, default: &str) -> EngineResult<T>
where
    T::Err: std::fmt::Display,
{
    env_var_or(key, default)
        .parse::<T>()
        .map_err(|e| EngineError::Config(format!("{key}: {e}")))
}

fn parse_var_opt<T: std::str::FromStr>(key: &str) -> EngineResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env_var_opt(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| EngineError::Config(format!("{key}: {e}"))),
        None => Ok(None),
    }
}
