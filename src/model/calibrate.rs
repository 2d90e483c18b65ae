use crate::errors::{EngineError, EngineResult};
use crate::model::binomial::call_price;
use crate::model::optim::{golden_section_min, GoldenSectionConfig};
use crate::model::CalibrationTemplate;

/// Sigma search bounds: 1% to 200% annualized volatility.
pub const SIGMA_LO: f64 = 0.01;
pub const SIGMA_HI: f64 = 2.0;

/// Objective value standing in for +infinity outside the pricer's domain.
const SENTINEL: f64 = 1e10;

/// Implied volatility by joint least squares across strikes.
///
/// Finds the single sigma in [SIGMA_LO, SIGMA_HI] minimizing
///
///   error(sigma) = sum_i (call_price(sigma, strikes[i]) - observed[i])^2
///
/// One shared sigma is fitted to every strike simultaneously; this is a
/// joint calibration, not a per-strike inversion. Derivative-free bounded
/// search, since the objective is a deterministic but non-smooth loop
/// over strikes.
pub fn implied_sigma(
    observed: &[f64],
    strikes: &[f64],
    template: &CalibrationTemplate,
) -> EngineResult<f64> {
    if observed.len() != strikes.len() {
        return Err(EngineError::InvalidParameter(format!(
            "observed prices ({}) and strikes ({}) must pair by index",
            observed.len(),
            strikes.len()
        )));
    }
    if observed.is_empty() {
        return Err(EngineError::DegenerateInput(
            "no market quotes supplied".into(),
        ));
    }
    for &price in observed {
        if !price.is_finite() || price < 0.0 {
            return Err(EngineError::InvalidParameter(format!(
                "observed price must be non-negative and finite, got {price}"
            )));
        }
    }
    for &strike in strikes {
        if !strike.is_finite() || strike <= 0.0 {
            return Err(EngineError::InvalidParameter(format!(
                "strike must be positive and finite, got {strike}"
            )));
        }
    }
    if observed.iter().all(|&price| price <= 0.0) {
        return Err(EngineError::DegenerateInput(
            "all observed prices are non-positive, objective is constant".into(),
        ));
    }

    let sigma = golden_section_min(
        |trial| squared_error(trial, observed, strikes, template),
        SIGMA_LO,
        SIGMA_HI,
        &GoldenSectionConfig::default(),
    );
    Ok(sigma)
}

/// Sum of squared pricing errors at a trial sigma. Outside the pricer's
/// domain (sigma <= 0, or a pricing failure at this trial) the objective
/// returns the sentinel instead of propagating an error, so the search
/// can continue.
pub(crate) fn squared_error(
    sigma: f64,
    observed: &[f64],
    strikes: &[f64],
    template: &CalibrationTemplate,
) -> f64 {
    if sigma <= 0.0 {
        return SENTINEL;
    }
    let mut err = 0.0;
    for (&strike, &market) in strikes.iter().zip(observed.iter()) {
        let params = template.with_sigma_strike(sigma, strike);
        match call_price(&params) {
            Ok(model) => {
                let diff = model - market;
                err += diff * diff;
            }
            Err(_) => return SENTINEL,
        }
    }
    err
}
