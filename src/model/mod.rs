pub mod binomial;
pub mod cache;
pub mod calibrate;
mod optim;

use crate::errors::{EngineError, EngineResult};

/// Full input set for one call-price evaluation. Stack-allocated, Copy.
/// The pricer is a pure function of these eight numbers; equal inputs
/// always produce equal outputs, which is what makes the bit-exact memo
/// cache in `cache` valid.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct TreeParams {
    pub spot: f64,
    pub strike: f64,
    pub rate: f64,
    pub tenor_years: f64,
    pub sigma: f64,
    /// Skew exponent on the time step inside the up factor.
    pub beta: f64,
    /// Tree time step in years ("paso"). Steps per tree = round(T / step).
    pub time_step: f64,
    /// Tree shape exponent. Scales the up factor and controls the
    /// up/down asymmetry: d = u^(-1/alpha^2).
    pub alpha: f64,
}

impl TreeParams {
    /// Reject anything the tree is undefined for, before any computation.
    pub fn validate(&self) -> EngineResult<()> {
        let fields = [
            ("spot", self.spot),
            ("strike", self.strike),
            ("rate", self.rate),
            ("tenor_years", self.tenor_years),
            ("sigma", self.sigma),
            ("beta", self.beta),
            ("time_step", self.time_step),
            ("alpha", self.alpha),
        ];
        for (name, v) in fields {
            if !v.is_finite() {
                return Err(EngineError::InvalidParameter(format!(
                    "{name} must be finite, got {v}"
                )));
            }
        }
        if self.spot <= 0.0 {
            return Err(EngineError::InvalidParameter(format!(
                "spot must be positive, got {}",
                self.spot
            )));
        }
        if self.strike <= 0.0 {
            return Err(EngineError::InvalidParameter(format!(
                "strike must be positive, got {}",
                self.strike
            )));
        }
        if self.tenor_years <= 0.0 {
            return Err(EngineError::InvalidParameter(format!(
                "tenor_years must be positive, got {}",
                self.tenor_years
            )));
        }
        if self.sigma <= 0.0 {
            return Err(EngineError::InvalidParameter(format!(
                "sigma must be positive, got {}",
                self.sigma
            )));
        }
        if self.time_step <= 0.0 {
            return Err(EngineError::InvalidParameter(format!(
                "time_step must be positive, got {}",
                self.time_step
            )));
        }
        if self.alpha == 0.0 {
            return Err(EngineError::InvalidParameter(
                "alpha must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Market and model inputs shared by every strike during calibration.
/// Sigma is the free variable the calibrator solves for.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct CalibrationTemplate {
    pub spot: f64,
    pub rate: f64,
    pub tenor_years: f64,
    pub beta: f64,
    pub time_step: f64,
    pub alpha: f64,
}

impl CalibrationTemplate {
    /// Bind a trial (sigma, strike) pair to the shared market inputs.
    #[inline]
    pub fn with_sigma_strike(&self, sigma: f64, strike: f64) -> TreeParams {
        TreeParams {
            spot: self.spot,
            strike,
            rate: self.rate,
            tenor_years: self.tenor_years,
            sigma,
            beta: self.beta,
            time_step: self.time_step,
            alpha: self.alpha,
        }
    }
}
