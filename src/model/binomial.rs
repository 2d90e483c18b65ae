use crate::errors::{EngineError, EngineResult};
use crate::model::TreeParams;
use statrs::function::gamma::ln_gamma;

/// Generalized binomial-tree European call pricing.
///
/// C = e^{-rT} * sum_{k=0}^{m} C(m,k) p^k (1-p)^{m-k} * max(S u^k d^{m-k} - K, 0)
///
/// with m = round(T / step) forced to at least one step,
///   u = exp(alpha * sigma * step^beta)
///   d = u^(-1/alpha^2)
///   p = (e^{r dt} - d) / (u - d), clamped into [0, 1].
///
/// The down factor is deliberately NOT the reciprocal of u unless
/// alpha^2 = 1; substituting d = 1/u changes the model.
///
/// Pure function: deterministic output from inputs only, no side effects.
pub fn call_price(params: &TreeParams) -> EngineResult<f64> {
    params.validate()?;

    let rounded = (params.tenor_years / params.time_step).round();
    let m = if rounded <= 0.0 { 1 } else { rounded as usize };
    let dt = params.tenor_years / m as f64;

    let u = (params.alpha * params.sigma * params.time_step.powf(params.beta)).exp();
    let d = u.powf(-1.0 / (params.alpha * params.alpha));

    let growth = (params.rate * dt).exp();
    let p_up = (growth - d) / (u - d);
    if !p_up.is_finite() {
        return Err(EngineError::Numerical(format!(
            "up-probability is not finite (u = {u}, d = {d})"
        )));
    }
    let p_up = p_up.clamp(0.0, 1.0);

    let mf = m as f64;
    let mut expected = 0.0;

    if p_up <= 0.0 {
        // All mass on the lowest terminal node
        expected = (params.spot * d.powf(mf) - params.strike).max(0.0);
    } else if p_up >= 1.0 {
        // All mass on the highest terminal node
        expected = (params.spot * u.powf(mf) - params.strike).max(0.0);
    } else {
        let ln_p = p_up.ln();
        let ln_q = (1.0 - p_up).ln();
        for k in 0..=m {
            let kf = k as f64;
            let terminal = params.spot * u.powf(kf) * d.powf(mf - kf);
            let payoff = terminal - params.strike;
            if payoff <= 0.0 {
                continue;
            }
            let ln_mass = ln_choose(mf, kf) + kf * ln_p + (mf - kf) * ln_q;
            expected += ln_mass.exp() * payoff;
        }
    }

    Ok((-params.rate * params.tenor_years).exp() * expected)
}

/// ln C(n, k) via log-gamma. Stays finite for step counts in the
/// hundreds where a factorial-based coefficient overflows f64.
#[inline]
fn ln_choose(n: f64, k: f64) -> f64 {
    ln_gamma(n + 1.0) - ln_gamma(k + 1.0) - ln_gamma(n - k + 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(spot: f64, strike: f64, sigma: f64) -> TreeParams {
        TreeParams {
            spot,
            strike,
            rate: 0.02,
            tenor_years: 1.0,
            sigma,
            beta: 1.0,
            time_step: 0.1,
            alpha: 1.0,
        }
    }

    /// Plain CRR-style backward induction over the same lattice. Used as an
    /// independent reference for the terminal-distribution evaluation.
    fn backward_induction(spot: f64, strike: f64, rate: f64, tenor: f64, m: usize, u: f64, d: f64) -> f64 {
        let dt = tenor / m as f64;
        let p = ((rate * dt).exp() - d) / (u - d);
        let disc = (-rate * dt).exp();
        let mut values: Vec<f64> = (0..=m)
            .map(|j| (spot * u.powf(j as f64) * d.powf((m - j) as f64) - strike).max(0.0))
            .collect();
        for i in (0..m).rev() {
            for j in 0..=i {
                values[j] = disc * (p * values[j + 1] + (1.0 - p) * values[j]);
            }
        }
        values[0]
    }

    #[test]
    fn test_matches_backward_induction_at_crr_point() {
        // alpha = 1, beta = 1: d = 1/u, the CRR-shaped baseline.
        let p = TreeParams {
            spot: 100.0,
            strike: 100.0,
            rate: 0.02,
            tenor_years: 1.0,
            sigma: 0.2,
            beta: 1.0,
            time_step: 0.01,
            alpha: 1.0,
        };
        let price = call_price(&p).unwrap();

        let u = (0.2_f64 * 0.01).exp();
        let d = 1.0 / u;
        let reference = backward_induction(100.0, 100.0, 0.02, 1.0, 100, u, d);

        assert!(
            (price - reference).abs() < 1e-6,
            "terminal-sum price {price} should match backward induction {reference}"
        );
        assert!(price > 0.0 && price < 100.0);
    }

    #[test]
    fn test_down_factor_asymmetry_changes_price() {
        // alpha^2 != 1 means d != 1/u; a reciprocal-lattice reference must disagree.
        let p = TreeParams {
            alpha: 2.0,
            ..params(100.0, 100.0, 0.2)
        };
        let price = call_price(&p).unwrap();

        let u = (2.0_f64 * 0.2 * 0.1).exp();
        let reciprocal = backward_induction(100.0, 100.0, 0.02, 1.0, 10, u, 1.0 / u);

        assert!(
            (price - reciprocal).abs() > 1e-6,
            "asymmetric tree ({price}) must not collapse to the reciprocal lattice ({reciprocal})"
        );
    }

    #[test]
    fn test_monotone_in_spot() {
        let mut last = 0.0;
        for spot in [80.0, 90.0, 100.0, 110.0, 120.0] {
            let price = call_price(&params(spot, 100.0, 0.3)).unwrap();
            assert!(
                price >= last,
                "price should be non-decreasing in spot: {price} < {last} at S={spot}"
            );
            last = price;
        }
    }

    #[test]
    fn test_payoff_floor_and_spot_ceiling() {
        for sigma in [0.1, 0.5, 1.5] {
            for strike in [50.0, 100.0, 150.0] {
                let price = call_price(&params(100.0, strike, sigma)).unwrap();
                assert!(price >= 0.0, "call price cannot be negative: {price}");
                assert!(price <= 100.0, "call cannot exceed the underlying: {price}");
            }
        }
    }

    #[test]
    fn test_deep_itm_approaches_discounted_forward() {
        // Every terminal node in the money: price collapses to S - K e^{-rT}.
        let p = TreeParams {
            rate: 0.05,
            ..params(100.0, 1.0, 0.2)
        };
        let price = call_price(&p).unwrap();
        let expected = 100.0 - 1.0 * (-0.05_f64).exp();
        assert!(
            (price - expected).abs() < 1e-8,
            "deep ITM call {price} should equal discounted forward parity {expected}"
        );
    }

    #[test]
    fn test_step_count_clamped_to_one() {
        // T / step rounds to 0: the tree must use exactly one step.
        let p = TreeParams {
            spot: 100.0,
            strike: 100.0,
            rate: 0.0,
            tenor_years: 1.0,
            sigma: 0.3,
            beta: 1.0,
            time_step: 10.0,
            alpha: 1.0,
        };
        let price = call_price(&p).unwrap();

        let u = (0.3_f64 * 10.0).exp();
        let d = 1.0 / u;
        let prob = (1.0 - d) / (u - d);
        let expected = prob * (100.0 * u - 100.0);
        assert!(
            (price - expected).abs() < 1e-8,
            "degenerate step must price a single-step tree: {price} vs {expected}"
        );
    }

    #[test]
    fn test_probability_clamp_high() {
        // Growth far above the up factor: p clamps to 1, all mass on u^m.
        let p = TreeParams {
            spot: 100.0,
            strike: 100.0,
            rate: 5.0,
            tenor_years: 1.0,
            sigma: 0.05,
            beta: 1.0,
            time_step: 1.0,
            alpha: 1.0,
        };
        let price = call_price(&p).unwrap();
        let u = (0.05_f64).exp();
        let expected = (-5.0_f64).exp() * (100.0 * u - 100.0);
        assert!(price.is_finite());
        assert!(
            (price - expected).abs() < 1e-10,
            "clamped p=1 should put all mass on the top node: {price} vs {expected}"
        );
    }

    #[test]
    fn test_probability_clamp_low() {
        // Growth far below the down factor: p clamps to 0, all mass on d^m.
        let p = TreeParams {
            spot: 100.0,
            strike: 100.0,
            rate: -5.0,
            tenor_years: 1.0,
            sigma: 0.05,
            beta: 1.0,
            time_step: 1.0,
            alpha: 1.0,
        };
        let price = call_price(&p).unwrap();
        assert_eq!(price, 0.0, "bottom node is out of the money, price must be 0");
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let base = params(100.0, 100.0, 0.2);

        let cases = [
            TreeParams { sigma: 0.0, ..base },
            TreeParams { sigma: -0.1, ..base },
            TreeParams { tenor_years: 0.0, ..base },
            TreeParams { time_step: 0.0, ..base },
            TreeParams { alpha: 0.0, ..base },
            TreeParams { spot: 0.0, ..base },
            TreeParams { strike: -1.0, ..base },
            TreeParams { sigma: f64::NAN, ..base },
            TreeParams { rate: f64::INFINITY, ..base },
        ];
        for p in cases {
            let err = call_price(&p).unwrap_err();
            assert!(
                matches!(err, EngineError::InvalidParameter(_)),
                "expected InvalidParameter, got {err}"
            );
        }
    }

    #[test]
    fn test_large_step_count_stays_finite() {
        // m = 500: a factorial-based coefficient would overflow long before this.
        let p = TreeParams {
            time_step: 0.002,
            ..params(100.0, 100.0, 0.2)
        };
        let price = call_price(&p).unwrap();
        assert!(price.is_finite() && price >= 0.0 && price <= 100.0);
    }

    #[test]
    fn test_deterministic() {
        let p = params(100.0, 105.0, 0.25);
        let a = call_price(&p).unwrap();
        let b = call_price(&p).unwrap();
        assert_eq!(a, b, "identical inputs must yield bit-identical outputs");
    }

    #[test]
    fn test_ln_choose_small_values() {
        assert!((ln_choose(5.0, 2.0).exp() - 10.0).abs() < 1e-10);
        assert!((ln_choose(10.0, 0.0).exp() - 1.0).abs() < 1e-10);
        assert!((ln_choose(10.0, 10.0).exp() - 1.0).abs() < 1e-10);
    }
}
