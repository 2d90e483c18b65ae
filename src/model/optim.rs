/// Internal bounded scalar minimization for sigma calibration.

/// Inverse golden ratio, (sqrt(5) - 1) / 2.
const INV_PHI: f64 = 0.618_033_988_749_894_9;

/// Configuration for the bounded golden-section minimizer.
pub(crate) struct GoldenSectionConfig {
    /// Maximum number of interval reductions.
    pub max_iter: usize,
    /// Convergence threshold on bracket width.
    pub x_tol: f64,
}

impl Default for GoldenSectionConfig {
    fn default() -> Self {
        Self {
            max_iter: 200,
            x_tol: 1e-7,
        }
    }
}

/// Minimize `objective` over the closed interval [lo, hi] using
/// golden-section search. Derivative-free; requires only that the
/// objective is unimodal on the bracket. Returns the abscissa of the
/// final bracket midpoint.
pub(crate) fn golden_section_min<F>(objective: F, lo: f64, hi: f64, config: &GoldenSectionConfig) -> f64
where
    F: Fn(f64) -> f64,
{
    let (mut a, mut b) = if lo <= hi { (lo, hi) } else { (hi, lo) };

    let mut x1 = b - INV_PHI * (b - a);
    let mut x2 = a + INV_PHI * (b - a);
    let mut f1 = objective(x1);
    let mut f2 = objective(x2);

    for _ in 0..config.max_iter {
        if (b - a).abs() < config.x_tol {
            break;
        }
        if f1 <= f2 {
            b = x2;
            x2 = x1;
            f2 = f1;
            x1 = b - INV_PHI * (b - a);
            f1 = objective(x1);
        } else {
            a = x1;
            x1 = x2;
            f1 = f2;
            x2 = a + INV_PHI * (b - a);
            f2 = objective(x2);
        }
    }

    0.5 * (a + b)
}
