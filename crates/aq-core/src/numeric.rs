use crate::{CoreError, CoreResult, ZERO_FLOW};

/// Floating point type used throughout the engine.
pub type Real = f64;

/// Absolute-plus-relative comparison tolerance.
///
/// One pair serves both equality checks (unit round trips, result
/// comparisons) and convergence checks (flow-change norms against the
/// accuracy option).
#[derive(Clone, Copy, Debug)]
pub struct Tolerances {
    pub abs: Real,
    pub rel: Real,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self::new(1e-12, 1e-9)
    }
}

impl Tolerances {
    pub const fn new(abs: Real, rel: Real) -> Self {
        Self { abs, rel }
    }

    /// Tolerance for the hydraulic balance: flow changes below
    /// `ZERO_FLOW` are noise, relative agreement at the accuracy option.
    pub const fn from_accuracy(accuracy: Real) -> Self {
        Self::new(ZERO_FLOW, accuracy)
    }

    /// Whether `a` and `b` agree within the tolerance.
    pub fn close(self, a: Real, b: Real) -> bool {
        let diff = (a - b).abs();
        diff <= self.abs || diff <= self.rel * a.abs().max(b.abs())
    }

    /// Whether an iteration `change` has converged relative to the
    /// magnitude `scale` of the quantity being updated.
    pub fn converged(self, change: Real, scale: Real) -> bool {
        change <= self.abs || change <= self.rel * scale
    }
}

/// Guard against NaN or infinity escaping a solve.
pub fn ensure_finite(v: Real, what: &'static str) -> CoreResult<Real> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CoreError::NonFinite { what, value: v })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_basic() {
        let tol = Tolerances::default();
        assert!(tol.close(1.0, 1.0 + 1e-12));
        assert!(tol.close(0.0, 1e-13));
        assert!(!tol.close(1.0, 1.0 + 1e-6));
    }

    #[test]
    fn converged_scales_with_magnitude() {
        let tol = Tolerances::from_accuracy(1e-3);
        // a 0.5 cfs change against 1000 cfs of flow is converged
        assert!(tol.converged(0.5, 1000.0));
        assert!(!tol.converged(5.0, 1000.0));
        // with no flow at all, only noise-level changes pass
        assert!(tol.converged(ZERO_FLOW / 2.0, 0.0));
        assert!(!tol.converged(1e-3, 0.0));
    }

    #[test]
    fn ensure_finite_detects_nan() {
        let err = ensure_finite(Real::NAN, "test").unwrap_err();
        assert!(format!("{err}").contains("Non-finite"));
        assert_eq!(ensure_finite(1.5, "test").unwrap(), 1.5);
    }
}
