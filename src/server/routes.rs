use crate::state::{AppState, EngineEvent, MarketQuote, ValuationSnapshot};
use axum::extract::State;
use axum::response::Json;
use std::sync::Arc;

#[derive(serde::Deserialize)]
pub struct CalibrateRequest {
    pub quotes: Vec<MarketQuote>,
}

#[derive(serde::Deserialize)]
pub struct MarketOverrideRequest {
    pub spot: Option<f64>,
    pub rate: Option<f64>,
}

/// GET /api/state -- current valuation snapshot (from watch channel, no lock)
pub async fn get_state(State(state): State<Arc<AppState>>) -> Json<ValuationSnapshot> {
    let snapshot = state.snapshot_rx.borrow().clone();
    Json(snapshot)
}

/// GET /api/curve -- model call prices across the strike grid
pub async fn get_curve(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let snapshot = state.snapshot_rx.borrow().clone();
    Json(serde_json::json!({
        "sigma": snapshot.sigma,
        "tenor_years": snapshot.tenor_years,
        "curve": snapshot.curve,
    }))
}

/// GET /api/counters -- performance counters (lock-free reads)
pub async fn get_counters(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    use portable_atomic::Ordering::Relaxed;
    Json(serde_json::json!({
        "spot_updates": state.counters.spot_updates.load(Relaxed),
        "rate_updates": state.counters.rate_updates.load(Relaxed),
        "curves_computed": state.counters.curves_computed.load(Relaxed),
        "calibrations_run": state.counters.calibrations_run.load(Relaxed),
        "price_cache_hits": state.counters.price_cache_hits.load(Relaxed),
        "price_cache_misses": state.counters.price_cache_misses.load(Relaxed),
        "errors_recovered": state.counters.errors_recovered.load(Relaxed),
    }))
}

/// POST /api/recalculate -- rebuild the curve from current inputs
pub async fn post_recalculate(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    match state.engine_tx.send(EngineEvent::Recalculate).await {
        Ok(()) => Json(serde_json::json!({ "status": "queued" })),
        Err(_) => Json(serde_json::json!({ "error": "engine unavailable" })),
    }
}

/// POST /api/market -- manual spot/rate entry (provider fallback)
pub async fn post_market(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MarketOverrideRequest>,
) -> Json<serde_json::Value> {
    if req.spot.is_none() && req.rate.is_none() {
        return Json(serde_json::json!({ "error": "provide spot and/or rate" }));
    }
    if let Some(spot) = req.spot {
        if !spot.is_finite() || spot <= 0.0 {
            return Json(serde_json::json!({ "error": format!("invalid spot: {spot}") }));
        }
    }
    if let Some(rate) = req.rate {
        if !rate.is_finite() {
            return Json(serde_json::json!({ "error": format!("invalid rate: {rate}") }));
        }
    }

    let event = EngineEvent::ManualOverride {
        spot: req.spot,
        rate: req.rate,
    };
    match state.engine_tx.send(event).await {
        Ok(()) => Json(serde_json::json!({ "status": "accepted" })),
        Err(_) => Json(serde_json::json!({ "error": "engine unavailable" })),
    }
}

/// POST /api/calibrate -- fit sigma to observed market quotes
pub async fn post_calibrate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CalibrateRequest>,
) -> Json<serde_json::Value> {
    let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
    let event = EngineEvent::Calibrate {
        quotes: req.quotes,
        reply: reply_tx,
    };
    if state.engine_tx.send(event).await.is_err() {
        return Json(serde_json::json!({ "error": "engine unavailable" }));
    }

    match reply_rx.await {
        Ok(Ok(sigma)) => Json(serde_json::json!({ "sigma": sigma })),
        Ok(Err(e)) => Json(serde_json::json!({ "error": e.to_string() })),
        Err(_) => Json(serde_json::json!({ "error": "calibration reply dropped" })),
    }
}
