//! Pump head-gain model.

use crate::curve::Curve;
use crate::headloss::{closed, HeadLoss};
use aq_core::{CurveId, PatternId, Quantity, Units, MIN_GRADIENT};

/// Head-flow characteristic derived from a pump's curve.
#[derive(Debug, Clone, PartialEq)]
pub enum PumpCurve {
    /// `h = h0 - r*q^n` (design-point or three-point fit).
    Power { h0: f64, r: f64, n: f64 },
    /// Piecewise-linear head curve, kept in user units.
    Piecewise(CurveId),
}

/// A pump link. `speed` is the relative speed setting (1 = nominal).
#[derive(Debug, Clone, PartialEq)]
pub struct Pump {
    pub curve_id: Option<CurveId>,
    pub curve: Option<PumpCurve>,
    pub speed: f64,
    pub init_speed: f64,
    pub speed_pattern: Option<PatternId>,
}

impl Pump {
    pub fn new(curve_id: Option<CurveId>) -> Self {
        Self {
            curve_id,
            curve: None,
            speed: 1.0,
            init_speed: 1.0,
            speed_pattern: None,
        }
    }

    /// Derive the characteristic from the referenced curve.
    ///
    /// A single design point (q1, h1) yields the classic fit with shutoff
    /// head 4/3*h1 and maximum flow 2*q1 (exponent 2). Multi-point curves
    /// are used piecewise.
    pub fn build_characteristic(&mut self, curves: &[Curve], units: &Units) {
        let Some(cid) = self.curve_id else {
            return;
        };
        let curve = &curves[cid.idx()];
        self.curve = match curve.len() {
            0 => None,
            1 => {
                let (q1_u, h1_u) = curve.first_point().unwrap_or((0.0, 0.0));
                let q1 = units.to_internal(Quantity::Flow, q1_u);
                let h1 = units.to_internal(Quantity::Head, h1_u);
                if q1 <= 0.0 || h1 <= 0.0 {
                    None
                } else {
                    Some(PumpCurve::Power {
                        h0: 4.0 * h1 / 3.0,
                        r: h1 / (3.0 * q1 * q1),
                        n: 2.0,
                    })
                }
            }
            _ => Some(PumpCurve::Piecewise(cid)),
        };
    }

    /// Shutoff head at the current speed (head gain at zero flow).
    pub fn shutoff_head(&self, curves: &[Curve], units: &Units) -> f64 {
        let w = self.speed;
        match &self.curve {
            Some(PumpCurve::Power { h0, .. }) => w * w * h0,
            Some(PumpCurve::Piecewise(cid)) => {
                let h_u = curves[cid.idx()].value_at(0.0);
                w * w * units.to_internal(Quantity::Head, h_u)
            }
            None => 0.0,
        }
    }

    /// Head "loss" (negative of the gain) and its gradient at flow `q`.
    ///
    /// Reverse flow is blocked by the balance engine's status checks; here
    /// negative flow simply sits on the shutoff plateau.
    pub fn find_head_loss(
        &self,
        q: f64,
        curves: &[Curve],
        units: &Units,
        closed_now: bool,
    ) -> HeadLoss {
        if closed_now || self.speed <= 0.0 {
            return closed(q);
        }
        let w = self.speed;
        match &self.curve {
            Some(PumpCurve::Power { h0, r, n }) => {
                let q_pos = q.max(0.0);
                // affinity-law scaling of the nominal characteristic
                let gain = w * w * h0 - r * q_pos.powf(*n) * w.powf(2.0 - *n);
                let hgrad = (n * r * q_pos.powf(*n - 1.0) * w.powf(2.0 - *n)).max(MIN_GRADIENT);
                HeadLoss {
                    hloss: -gain,
                    hgrad,
                }
            }
            Some(PumpCurve::Piecewise(cid)) => {
                let ucf_q = units.ucf(Quantity::Flow);
                let ucf_h = units.ucf(Quantity::Head);
                let q_equiv = (q.max(0.0) / w) * ucf_q;
                let (r_u, h0_u) = curves[cid.idx()].find_segment(q_equiv);
                let r_int = r_u * ucf_q / ucf_h;
                let h0_int = h0_u / ucf_h;
                let gain = w * w * h0_int + w * r_int * q.max(0.0);
                // head curves fall with flow, so -r is the loss gradient
                let hgrad = (-r_int * w).max(MIN_GRADIENT);
                HeadLoss {
                    hloss: -gain,
                    hgrad,
                }
            }
            None => closed(q),
        }
    }
}
