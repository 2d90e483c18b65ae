mod calendar;
mod config;
mod errors;
mod feeds;
mod model;
mod server;
mod state;

use crate::errors::{EngineError, EngineResult};
use crate::model::cache::PriceCache;
use crate::model::{calibrate, CalibrationTemplate, TreeParams};
use crate::state::*;
use portable_atomic::Ordering;
use smallvec::SmallVec;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Periodic curve refresh: tenor decays as the valuation date advances.
const RECALC_INTERVAL_SECS: u64 = 3600;

#[tokio::main]
async fn main() {
    // Structured logging (stderr, env-filtered)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("aurum valuation engine starting");

    // Load config
    let cfg = match config::AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("config error: {e}");
            std::process::exit(1);
        }
    };

    // Create bounded channel into the engine
    let (engine_tx, engine_rx) = mpsc::channel::<EngineEvent>(256);

    // Create shared state
    let app_state = AppState::new(cfg.clone(), engine_tx.clone());

    // ── Spawn tasks ──

    // 1. Spot price feed
    let spot_cfg = cfg.clone();
    let spot_tx = engine_tx.clone();
    tokio::spawn(async move {
        feeds::spot::run_spot_feed(spot_cfg, spot_tx).await;
    });

    // 2. Risk-free rate feed
    let rate_cfg = cfg.clone();
    let rate_tx = engine_tx.clone();
    tokio::spawn(async move {
        feeds::rates::run_rate_feed(rate_cfg, rate_tx).await;
    });

    // 3. Periodic recalculation tick
    let tick_tx = engine_tx.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(RECALC_INTERVAL_SECS));
        // First tick fires immediately; skip it, startup already recomputes.
        interval.tick().await;
        loop {
            interval.tick().await;
            if tick_tx.send(EngineEvent::Recalculate).await.is_err() {
                break;
            }
        }
    });

    // 4. Engine task (owns all mutable valuation state)
    let engine_state = app_state.clone();
    tokio::spawn(async move {
        run_engine(engine_state, engine_rx).await;
    });

    // 5. Axum HTTP server
    let server_state = app_state.clone();
    let port = cfg.server_port;

    let app = axum::Router::new()
        .route("/api/state", axum::routing::get(server::routes::get_state))
        .route("/api/curve", axum::routing::get(server::routes::get_curve))
        .route(
            "/api/counters",
            axum::routing::get(server::routes::get_counters),
        )
        .route(
            "/api/recalculate",
            axum::routing::post(server::routes::post_recalculate),
        )
        .route(
            "/api/market",
            axum::routing::post(server::routes::post_market),
        )
        .route(
            "/api/calibrate",
            axum::routing::post(server::routes::post_calibrate),
        )
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .with_state(server_state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("bind error: {e}");
            std::process::exit(1);
        });

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {e}");
    }
}

// ── Engine ──

/// Mutable valuation state, owned by the engine task. No locks.
struct EngineCore {
    spot: Option<(f64, QuoteSource)>,
    rate: Option<(f64, QuoteSource)>,
    /// Sigma in effect: configured default until a calibration replaces it.
    sigma: f64,
    calibrated_sigma: Option<f64>,
    price_cache: PriceCache,
}

/// Engine loop. Receives events, updates inputs, rebuilds the curve
/// snapshot. All pricing happens here, on owned state.
async fn run_engine(state: Arc<AppState>, mut rx: mpsc::Receiver<EngineEvent>) {
    tracing::info!("engine task started");

    let cfg = state.config.clone();
    let mut core = EngineCore {
        // Manual values seed the inputs; provider events override them.
        spot: cfg.manual_spot.map(|s| (s, QuoteSource::Manual)),
        rate: cfg.manual_rate.map(|r| (r, QuoteSource::Manual)),
        sigma: cfg.sigma,
        calibrated_sigma: None,
        price_cache: PriceCache::new(),
    };

    // Publish whatever the config alone allows (possibly a full curve
    // when both manual values are set).
    if let Err(e) = recompute(&mut core, &state) {
        tracing::warn!("initial valuation skipped: {e}");
    }

    while let Some(event) = rx.recv().await {
        if let Err(e) = process_event(event, &mut core, &state) {
            tracing::error!(error = %e, "engine error");
            PerfCounters::bump(&state.counters.errors_recovered);
        }
    }

    tracing::info!("engine task shutting down");
}

fn process_event(
    event: EngineEvent,
    core: &mut EngineCore,
    state: &Arc<AppState>,
) -> EngineResult<()> {
    match event {
        EngineEvent::SpotPrice { price, source } => {
            PerfCounters::bump(&state.counters.spot_updates);
            let first = core.spot.is_none();
            core.spot = Some((price, source));
            if first {
                tracing::info!(price = price, "first spot price received");
            }
            recompute(core, state)?;
        }

        EngineEvent::RiskFreeRate { rate, source } => {
            PerfCounters::bump(&state.counters.rate_updates);
            core.rate = Some((rate, source));
            recompute(core, state)?;
        }

        EngineEvent::ManualOverride { spot, rate } => {
            if let Some(s) = spot {
                tracing::info!(spot = s, "manual spot override");
                core.spot = Some((s, QuoteSource::Manual));
            }
            if let Some(r) = rate {
                tracing::info!(rate = r, "manual rate override");
                core.rate = Some((r, QuoteSource::Manual));
            }
            recompute(core, state)?;
        }

        EngineEvent::Recalculate => {
            recompute(core, state)?;
        }

        EngineEvent::Calibrate { quotes, reply } => {
            PerfCounters::bump(&state.counters.calibrations_run);
            let result = run_calibration(core, state, &quotes);
            let recovered = result.as_ref().ok().copied();
            let _ = reply.send(result);
            if let Some(sigma) = recovered {
                tracing::info!(sigma = sigma, quotes = quotes.len(), "sigma calibrated");
                core.sigma = sigma;
                core.calibrated_sigma = Some(sigma);
                recompute(core, state)?;
            }
        }

        EngineEvent::Shutdown => {
            tracing::info!("shutdown event received");
        }
    }

    Ok(())
}

/// Fit sigma to the supplied quotes using current market inputs.
fn run_calibration(
    core: &EngineCore,
    state: &Arc<AppState>,
    quotes: &[MarketQuote],
) -> EngineResult<f64> {
    let (spot, rate, tenor) = market_inputs(core, state)?;
    let cfg = &state.config;

    let template = CalibrationTemplate {
        spot,
        rate,
        tenor_years: tenor,
        beta: cfg.beta,
        time_step: cfg.time_step,
        alpha: cfg.alpha,
    };

    let observed: Vec<f64> = quotes.iter().map(|q| q.price).collect();
    let strikes: Vec<f64> = quotes.iter().map(|q| q.strike).collect();
    calibrate::implied_sigma(&observed, &strikes, &template)
}

/// Current (spot, rate, tenor) or an error when inputs are incomplete.
fn market_inputs(core: &EngineCore, state: &Arc<AppState>) -> EngineResult<(f64, f64, f64)> {
    let Some((spot, _)) = core.spot else {
        return Err(EngineError::InvalidParameter(
            "no spot price available yet".into(),
        ));
    };
    let Some((rate, _)) = core.rate else {
        return Err(EngineError::InvalidParameter(
            "no risk-free rate available yet".into(),
        ));
    };

    let cfg = &state.config;
    let tenor = match cfg.expiry_date {
        Some(expiry) => calendar::year_fraction(chrono::Utc::now().date_naive(), expiry)?,
        None => cfg.default_tenor_years,
    };
    Ok((spot, rate, tenor))
}

/// Rebuild the call-price curve and publish a fresh snapshot.
fn recompute(core: &mut EngineCore, state: &Arc<AppState>) -> EngineResult<()> {
    let cfg = &state.config;

    let (curve, tenor) = match market_inputs(core, state) {
        Ok((spot, rate, tenor)) => {
            let strikes = strike_grid(spot, cfg.strike_step, cfg.curve_strikes);
            let mut curve: SmallVec<[CurvePoint; 8]> = SmallVec::new();
            for strike in strikes {
                let params = TreeParams {
                    spot,
                    strike,
                    rate,
                    tenor_years: tenor,
                    sigma: core.sigma,
                    beta: cfg.beta,
                    time_step: cfg.time_step,
                    alpha: cfg.alpha,
                };
                let call_price = core.price_cache.price(&params)?;
                curve.push(CurvePoint { strike, call_price });
            }
            PerfCounters::bump(&state.counters.curves_computed);
            (curve, Some(tenor))
        }
        Err(e) => {
            tracing::debug!("curve not computed: {e}");
            (SmallVec::new(), None)
        }
    };

    state
        .counters
        .price_cache_hits
        .store(core.price_cache.hits, Ordering::Relaxed);
    state
        .counters
        .price_cache_misses
        .store(core.price_cache.misses, Ordering::Relaxed);

    let snapshot = ValuationSnapshot {
        engine_state: engine_state_of(core),
        spot: core.spot.map(|(v, _)| v),
        spot_source: core.spot.map(|(_, s)| s),
        risk_free_rate: core.rate.map(|(v, _)| v),
        rate_source: core.rate.map(|(_, s)| s),
        tenor_years: tenor,
        sigma: core.sigma,
        beta: cfg.beta,
        time_step: cfg.time_step,
        alpha: cfg.alpha,
        curve: curve.into_vec(),
        calibrated_sigma: core.calibrated_sigma,
        updated_at: chrono::Utc::now().to_rfc3339(),
    };
    let _ = state.snapshot_tx.send(snapshot);

    Ok(())
}

fn engine_state_of(core: &EngineCore) -> EngineState {
    match (core.spot, core.rate) {
        (Some((_, spot_src)), Some((_, rate_src))) => {
            if spot_src == QuoteSource::Manual || rate_src == QuoteSource::Manual {
                EngineState::Degraded
            } else {
                EngineState::Ready
            }
        }
        _ => EngineState::Starting,
    }
}

/// Strike grid centred on the at-the-money strike (spot rounded to the
/// strike step). Non-positive strikes from a tiny spot are dropped.
fn strike_grid(spot: f64, step: f64, count: usize) -> SmallVec<[f64; 8]> {
    let atm = (spot / step).round() * step;
    let half = (count / 2) as isize;
    (0..count as isize)
        .map(|i| atm + (i - half) as f64 * step)
        .filter(|&k| k > 0.0)
        .collect()
}
