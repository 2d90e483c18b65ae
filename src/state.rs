use crate::config::AppConfig;
use crate::errors::EngineResult;
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

// ── Engine State Machine ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    /// Waiting for the first complete (spot, rate) pair.
    Starting,
    /// Valuing off live or cached provider data.
    Ready,
    /// Valuing off manual overrides after provider failure.
    Degraded,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Ready => write!(f, "ready"),
            Self::Degraded => write!(f, "degraded"),
        }
    }
}

/// Provenance of a market input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteSource {
    Live,
    Cached,
    Manual,
}

// ── Messages INTO the engine (bounded channel) ──

#[derive(Debug)]
pub enum EngineEvent {
    SpotPrice {
        price: f64,
        source: QuoteSource,
    },
    RiskFreeRate {
        rate: f64,
        source: QuoteSource,
    },
    /// Manual entry fallback; either field may be set independently.
    ManualOverride {
        spot: Option<f64>,
        rate: Option<f64>,
    },
    /// Rebuild the curve from current inputs (tenor is re-derived).
    Recalculate,
    /// Fit sigma to market quotes; replies with the recovered value.
    Calibrate {
        quotes: Vec<MarketQuote>,
        reply: oneshot::Sender<EngineResult<f64>>,
    },
    Shutdown,
}

// ── API payloads ──

/// One observed market quote: a strike paired with a traded call price.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct MarketQuote {
    pub strike: f64,
    pub price: f64,
}

/// One point of the model curve: strike and the model call price.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CurvePoint {
    pub strike: f64,
    pub call_price: f64,
}

// ── Engine snapshot for the API (sent via watch channel) ──

#[derive(Debug, Clone, serde::Serialize)]
pub struct ValuationSnapshot {
    pub engine_state: EngineState,
    pub spot: Option<f64>,
    pub spot_source: Option<QuoteSource>,
    pub risk_free_rate: Option<f64>,
    pub rate_source: Option<QuoteSource>,
    pub tenor_years: Option<f64>,
    /// Sigma currently in effect (configured default or calibrated).
    pub sigma: f64,
    pub beta: f64,
    pub time_step: f64,
    pub alpha: f64,
    pub curve: Vec<CurvePoint>,
    pub calibrated_sigma: Option<f64>,
    pub updated_at: String,
}

impl Default for ValuationSnapshot {
    fn default() -> Self {
        Self {
            engine_state: EngineState::Starting,
            spot: None,
            spot_source: None,
            risk_free_rate: None,
            rate_source: None,
            tenor_years: None,
            sigma: 0.0,
            beta: 0.0,
            time_step: 0.0,
            alpha: 0.0,
            curve: Vec::new(),
            calibrated_sigma: None,
            updated_at: String::new(),
        }
    }
}

// ── Performance Counters (lock-free) ──

pub struct PerfCounters {
    pub spot_updates: AtomicU64,
    pub rate_updates: AtomicU64,
    pub curves_computed: AtomicU64,
    pub calibrations_run: AtomicU64,
    pub price_cache_hits: AtomicU64,
    pub price_cache_misses: AtomicU64,
    pub errors_recovered: AtomicU64,
}

impl PerfCounters {
    pub fn new() -> Self {
        Self {
            spot_updates: AtomicU64::new(0),
            rate_updates: AtomicU64::new(0),
            curves_computed: AtomicU64::new(0),
            calibrations_run: AtomicU64::new(0),
            price_cache_hits: AtomicU64::new(0),
            price_cache_misses: AtomicU64::new(0),
            errors_recovered: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// ── Application shared state (channels, not locks) ──

pub struct AppState {
    pub config: AppConfig,

    // Engine -> API: latest snapshot (watch = single producer, multi consumer)
    pub snapshot_tx: watch::Sender<ValuationSnapshot>,
    pub snapshot_rx: watch::Receiver<ValuationSnapshot>,

    // Feeds/API -> Engine: bounded event channel
    pub engine_tx: mpsc::Sender<EngineEvent>,

    // Lock-free performance counters
    pub counters: PerfCounters,
}

impl AppState {
    pub fn new(config: AppConfig, engine_tx: mpsc::Sender<EngineEvent>) -> Arc<Self> {
        let (snapshot_tx, snapshot_rx) = watch::channel(ValuationSnapshot::default());

        Arc::new(Self {
            config,
            snapshot_tx,
            snapshot_rx,
            engine_tx,
            counters: PerfCounters::new(),
        })
    }
}
