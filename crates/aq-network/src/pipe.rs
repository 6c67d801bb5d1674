//! Pipe friction models: Hazen-Williams, Darcy-Weisbach, Chezy-Manning.

use crate::headloss::{closed, HeadLoss};
use crate::options::{HeadLossModel, Options};
use aq_core::{Quantity, Units, MIN_GRADIENT, VISCOSITY};
use std::f64::consts::PI;

// Darcy-Weisbach friction-factor constants
const A1: f64 = 3.141_592_653_589_793_2e3; // 1000*PI
const A2: f64 = 1.570_796_326_794_896_6e3; // 500*PI
const A8: f64 = 4.618_413_198_590_666_9; // 5.74*(PI/4)^0.9
const A9: f64 = -8.685_889_638_065_036_6e-1; // -2/ln(10)
const AB: f64 = 3.288_954_763_453_990_6e-3; // 5.74/(4000^0.9)
const AC: f64 = -5.142_149_657_990_938_8e-3; // AA*AB

/// Hazen-Williams and Chezy-Manning head-loss exponent handling.
const HW_EXPONENT: f64 = 1.852;

/// A pressurized pipe. Geometry is in internal units (ft) after
/// conversion; `resistance` is precomputed for the selected friction model.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipe {
    pub length: f64,
    pub roughness: f64,
    /// Minor-loss factor on a Q^2 basis.
    pub loss_factor: f64,
    /// Raw minor-loss coefficient as read from input.
    pub loss_coeff: f64,
    pub has_check_valve: bool,
    /// Friction resistance coefficient for the selected model.
    pub resistance: f64,
    model: HeadLossModel,
}

impl Pipe {
    pub fn new(length: f64, roughness: f64) -> Self {
        Self {
            length,
            roughness,
            loss_factor: 0.0,
            loss_coeff: 0.0,
            has_check_valve: false,
            resistance: 0.0,
            model: HeadLossModel::default(),
        }
    }

    /// Convert geometry to internal units and precompute the friction
    /// resistance for the model selected in the options.
    pub fn convert_units(&mut self, diameter: f64, units: &Units, opts: &Options) {
        self.length = units.to_internal(Quantity::Length, self.length);
        self.model = opts.head_loss_model;
        if self.model == HeadLossModel::DarcyWeisbach {
            // absolute roughness arrives in mm (SI) or thousandths of a foot
            self.roughness = match units.system() {
                aq_core::UnitSystem::SI => self.roughness / 1000.0 / aq_core::M_PER_FT,
                aq_core::UnitSystem::US => self.roughness / 1000.0,
            };
        }
        self.loss_factor = aq_core::minor_loss_factor(self.loss_coeff.max(0.0), diameter);
        self.resistance = self.resistance_for(diameter);
    }

    fn resistance_for(&self, d: f64) -> f64 {
        match self.model {
            HeadLossModel::HazenWilliams => {
                4.727 * self.length / self.roughness.powf(HW_EXPONENT) / d.powf(4.871)
            }
            HeadLossModel::DarcyWeisbach => {
                let area = PI * d * d / 4.0;
                self.length / 2.0 / aq_core::GRAVITY / d / (area * area)
            }
            HeadLossModel::ChezyManning => {
                let c = 4.0 * self.roughness / (1.49 * PI * d * d);
                c * c * (d / 4.0).powf(-1.333) * self.length
            }
        }
    }

    /// Head loss and gradient at flow `q`. `low_flow_limit` is the flow
    /// magnitude below which the power law is linearized.
    pub fn find_head_loss(&self, q: f64, d: f64, low_flow_limit: f64, closed_now: bool) -> HeadLoss {
        if closed_now {
            return closed(q);
        }
        match self.model {
            HeadLossModel::DarcyWeisbach => self.dw_head_loss(q, d),
            _ => self.power_law_head_loss(q, low_flow_limit),
        }
    }

    /// `hloss = r*|q|^n*sign(q) + ml*q^2`, linearized below the low-flow
    /// threshold so the gradient stays bounded near zero flow.
    fn power_law_head_loss(&self, q: f64, low_flow_limit: f64) -> HeadLoss {
        let n = match self.model {
            HeadLossModel::ChezyManning => 2.0,
            _ => HW_EXPONENT,
        };
        let r = self.resistance;
        let ml = self.loss_factor;
        let q_abs = q.abs();

        if q_abs < low_flow_limit {
            let hgrad = (n * r * low_flow_limit.powf(n - 1.0)).max(MIN_GRADIENT);
            return HeadLoss {
                hloss: hgrad * q,
                hgrad,
            };
        }

        let mut hgrad = n * r * q_abs.powf(n - 1.0);
        let mut hloss = hgrad * q_abs / n;
        if ml > 0.0 {
            hloss += ml * q_abs * q_abs;
            hgrad += 2.0 * ml * q_abs;
        }
        HeadLoss {
            hloss: hloss * q.signum(),
            hgrad,
        }
    }

    fn dw_head_loss(&self, q: f64, d: f64) -> HeadLoss {
        let q_abs = q.abs();
        let ml = self.loss_factor;
        let e = self.roughness / d; // relative roughness
        let s = VISCOSITY * d; // kinematic viscosity * diameter
        let r = self.resistance;

        // laminar flow (Re <= 2000): Hagen-Poiseuille
        if q_abs <= A2 * s {
            let rl = 16.0 * PI * s * r;
            let hgrad = (rl + 2.0 * ml * q_abs).max(MIN_GRADIENT);
            HeadLoss {
                hloss: q * (rl + ml * q_abs),
                hgrad,
            }
        } else {
            let (f, dfdq) = dw_friction_factor(q_abs, e, s);
            let r1 = f * r + ml;
            HeadLoss {
                hloss: r1 * q_abs * q,
                hgrad: 2.0 * r1 * q_abs + dfdq * r * q_abs * q_abs,
            }
        }
    }
}

/// Darcy-Weisbach friction factor and its flow derivative.
#[inline]
fn dw_friction_factor(q: f64, e: f64, s: f64) -> (f64, f64) {
    let w = q / s;
    if w >= A1 {
        // Re >= 4000: Swamee-Jain approximation
        let y1 = A8 / w.powf(0.9);
        let y2 = e / 3.7 + y1;
        let y3 = A9 * y2.ln();
        let f = 1.0 / (y3 * y3);
        let dfdq = 1.8 * f * y1 * A9 / y2 / y3 / q;
        (f, dfdq)
    } else {
        // transition flow (2000 < Re < 4000): Dunlop's interpolation
        let y2 = e / 3.7 + AB;
        let y3 = A9 * y2.ln();
        let fa = 1.0 / (y3 * y3);
        let fb = (2.0 + AC / (y2 * y3)) * fa;
        let r = w / A2;
        let x1 = 7.0 * fa - fb;
        let x2 = 0.128 - 17.0 * fa + 2.5 * fb;
        let x3 = -0.128 + 13.0 * fa - (fb + fb);
        let x4 = 0.032 - 3.0 * fa + 0.5 * fb;
        let f = x1 + r * (x2 + r * (x3 + r * x4));
        let dfdq = (x2 + r * (2.0 * x3 + r * 3.0 * x4)) / s / A2;
        (f, dfdq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aq_core::FlowUnits;

    fn hw_pipe(length_m: f64, d_mm: f64, c: f64) -> (Pipe, f64) {
        let units = Units::new(FlowUnits::Lps);
        let opts = Options {
            flow_units: FlowUnits::Lps,
            ..Options::default()
        };
        let d = units.to_internal(Quantity::Diameter, d_mm);
        let mut pipe = Pipe::new(length_m, c);
        pipe.convert_units(d, &units, &opts);
        (pipe, d)
    }

    #[test]
    fn hazen_williams_matches_closed_form() {
        // 1000 m of 200 mm C=130 pipe at 10 L/s
        let (pipe, d) = hw_pipe(1000.0, 200.0, 130.0);
        let q = 10.0 / aq_core::LPS_PER_CFS;
        let hl = pipe.find_head_loss(q, d, 1e-6, false);
        let expect = pipe.resistance * q.powf(1.852);
        assert!((hl.hloss - expect).abs() < 1e-9);
        // gradient is n*r*q^(n-1)
        let grad = 1.852 * pipe.resistance * q.powf(0.852);
        assert!((hl.hgrad - grad).abs() < 1e-9);
    }

    #[test]
    fn head_loss_is_odd_in_flow() {
        let (pipe, d) = hw_pipe(500.0, 150.0, 120.0);
        let hl_fwd = pipe.find_head_loss(0.2, d, 1e-6, false);
        let hl_rev = pipe.find_head_loss(-0.2, d, 1e-6, false);
        assert!((hl_fwd.hloss + hl_rev.hloss).abs() < 1e-12);
        assert!((hl_fwd.hgrad - hl_rev.hgrad).abs() < 1e-12);
    }

    #[test]
    fn low_flow_region_is_linear() {
        let (pipe, d) = hw_pipe(1000.0, 200.0, 130.0);
        let lim = 1e-3;
        let hl1 = pipe.find_head_loss(lim / 4.0, d, lim, false);
        let hl2 = pipe.find_head_loss(lim / 2.0, d, lim, false);
        assert!((hl2.hloss / hl1.hloss - 2.0).abs() < 1e-9);
        assert_eq!(hl1.hgrad, hl2.hgrad);
    }

    #[test]
    fn closed_pipe_uses_high_resistance() {
        let (pipe, d) = hw_pipe(1000.0, 200.0, 130.0);
        let hl = pipe.find_head_loss(0.1, d, 1e-6, true);
        assert_eq!(hl.hgrad, aq_core::HIGH_RESISTANCE);
    }

    #[test]
    fn darcy_weisbach_turbulent_positive() {
        let units = Units::new(FlowUnits::Lps);
        let opts = Options {
            flow_units: FlowUnits::Lps,
            head_loss_model: HeadLossModel::DarcyWeisbach,
            ..Options::default()
        };
        let d = units.to_internal(Quantity::Diameter, 200.0);
        let mut pipe = Pipe::new(1000.0, 0.1);
        pipe.convert_units(d, &units, &opts);
        let q = 20.0 / aq_core::LPS_PER_CFS;
        let hl = pipe.find_head_loss(q, d, 1e-6, false);
        assert!(hl.hloss > 0.0);
        assert!(hl.hgrad > 0.0);
    }
}
