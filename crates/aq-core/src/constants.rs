//! Physical constants and solver tolerances.
//!
//! Internal units throughout the engine are feet for head/length and
//! cubic feet per second for flow; user-facing quantities are converted
//! through the factors in [`crate::units`].

/// Gravitational acceleration (ft/s^2).
pub const GRAVITY: f64 = 32.174;

/// Kinematic viscosity of water at 20 C (ft^2/s).
pub const VISCOSITY: f64 = 1.1e-5;

/// Meters per foot.
pub const M_PER_FT: f64 = 0.3048;

/// Liters per second per cfs.
pub const LPS_PER_CFS: f64 = 28.316_846_592;

/// US gallons per minute per cfs.
pub const GPM_PER_CFS: f64 = 448.831_168_8;

/// Million US gallons per day per cfs.
pub const MGD_PER_CFS: f64 = 0.646_316_883;

/// Cubic meters per hour per cfs.
pub const CMH_PER_CFS: f64 = 101.940_648;

/// Liters per minute per cfs.
pub const LPM_PER_CFS: f64 = LPS_PER_CFS * 60.0;

/// Psi per foot of head.
pub const PSI_PER_FT: f64 = 0.433_3;

/// Kilowatts per horsepower.
pub const KW_PER_HP: f64 = 0.745_7;

/// Flow magnitude treated as zero (cfs). A CLOSED link must carry no more.
pub const ZERO_FLOW: f64 = 1.0e-6;

/// Smallest allowed head-loss gradient; keeps the nodal matrix
/// diagonally dominant when links become frictionless.
pub const MIN_GRADIENT: f64 = 1.0e-6;

/// Resistance applied to closed links and to FCV excess flow.
pub const HIGH_RESISTANCE: f64 = 1.0e8;

/// Default relative flow-change tolerance for hydraulic convergence.
pub const HYD_ACCURACY: f64 = 1.0e-3;

/// Default cap on Newton iterations within one hydraulic time step.
pub const MAX_ITERATIONS: usize = 100;

/// Cap on extra iterations granted for valve status flips.
pub const MAX_STATUS_CHECKS: usize = 10;

/// Minimum minor-loss coefficient applied to valves during unit conversion.
pub const MIN_LOSS_COEFF: f64 = 0.1;

/// Converts a minor-loss coefficient on a V^2/2g basis to a Q^2 basis
/// (diameter in ft, flow in cfs).
pub fn minor_loss_factor(loss_coeff: f64, diameter: f64) -> f64 {
    0.02517 * loss_coeff / diameter.powi(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minor_loss_factor_scales_inverse_fourth_power() {
        let f1 = minor_loss_factor(1.0, 1.0);
        let f2 = minor_loss_factor(1.0, 2.0);
        assert!((f1 / f2 - 16.0).abs() < 1e-12);
    }

    #[test]
    fn unit_constants_consistent() {
        // 1 cfs in L/min must equal 60x the per-second figure.
        assert!((LPM_PER_CFS - 60.0 * LPS_PER_CFS).abs() < 1e-9);
    }
}
