//! Valves: head-loss relations and open/closed/active state machines,
//! including the closure-control valve (CCV) and the dynamic
//! pressure-reducing valve (DPRV).

use crate::curve::Curve;
use crate::headloss::{closed, open_valve, HeadLoss};
use crate::link::LinkStatus;
use crate::options::CcvRepresentation;
use aq_core::{
    CurveId, NodeId, PatternId, Quantity, ScheduleId, Units, GRAVITY, HIGH_RESISTANCE,
    MIN_GRADIENT, MIN_LOSS_COEFF, ZERO_FLOW,
};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

// DPRV flow-coefficient polynomial, fitted to the reference valve
const CV_K1: f64 = 0.09;
const CV_K2: f64 = -1.21;
const CV_K3: f64 = 2.33;
const CV_K4: f64 = -0.21;
const CV_MAX: f64 = 1.442_760_731;
const CV_TRANSITION: f64 = 0.075_501_862_03;
/// Opening below which the Cv ramp is linear.
const XM_TRANSITION: f64 = 0.12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValveKind {
    Prv,
    Psv,
    Fcv,
    Tcv,
    Pbv,
    Gpv,
    Ccv,
    Dprv,
}

impl ValveKind {
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "PRV" => Some(Self::Prv),
            "PSV" => Some(Self::Psv),
            "FCV" => Some(Self::Fcv),
            "TCV" => Some(Self::Tcv),
            "PBV" => Some(Self::Pbv),
            "GPV" => Some(Self::Gpv),
            "CCV" => Some(Self::Ccv),
            "DPRV" => Some(Self::Dprv),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Prv => "PRV",
            Self::Psv => "PSV",
            Self::Fcv => "FCV",
            Self::Tcv => "TCV",
            Self::Pbv => "PBV",
            Self::Gpv => "GPV",
            Self::Ccv => "CCV",
            Self::Dprv => "DPRV",
        }
    }
}

/// Modulation strategy of a DPRV's downstream-pressure setpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Modulation {
    /// Constant outlet pressure.
    FixedOutlet { pressure: f64 },
    /// Day/night pressures switched by a schedule.
    TimeModulated {
        day_pressure: f64,
        night_pressure: f64,
        schedule: ScheduleId,
    },
    /// Setpoint as a quadratic of the valve's own flow (user units).
    FlowModulated { a: f64, b: f64, c: f64 },
    /// Setpoint enforced at a remote node.
    RemoteNode { node: NodeId, pressure: f64 },
}

impl Modulation {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::FixedOutlet { .. } => "FO",
            Self::TimeModulated { .. } => "TM",
            Self::FlowModulated { .. } => "FM",
            Self::RemoteNode { .. } => "RNM",
        }
    }
}

/// Mutable controller state of a DPRV.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DprvState {
    /// Normalized opening, 0 = shut, 1 = fully open.
    pub xm: f64,
    /// Opening at the end of the previous hydraulic step.
    pub xm_last: f64,
    /// Opening increment applied this step.
    pub delta_xm: f64,
    /// Setpoint error of the current step.
    pub error: f64,
    /// Accumulated (integral) error, clamped by the controller.
    pub error_sum: f64,
    /// Error of the previous step.
    pub error_pre: f64,
}

impl Default for DprvState {
    fn default() -> Self {
        Self {
            xm: 0.2,
            xm_last: 0.2,
            delta_xm: 0.0,
            error: 0.0,
            error_sum: 0.0,
            error_pre: 0.5,
        }
    }
}

/// A link that controls flow or pressure.
///
/// Isolation valves are modeled by fixing a pipe's status instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Valve {
    pub kind: ValveKind,
    pub setting: f64,
    pub init_setting: f64,
    /// Minor-loss coefficient as read from input.
    pub loss_coeff: f64,
    /// Open-valve loss factor on a Q^2 basis.
    pub loss_factor: f64,
    pub setting_pattern: Option<PatternId>,
    /// Head-loss curve of a GPV.
    pub gpv_curve: Option<CurveId>,
    /// Pressure-management strategy (DPRV only).
    pub modulation: Option<Modulation>,
    pub dprv: DprvState,
    /// True when an explicit OPEN/CLOSED status pins the valve.
    pub has_fixed_status: bool,
    /// Elevation reference of the pressure setting (downstream node for
    /// PRV/DPRV, upstream node for PSV).
    pub elev: f64,
}

impl Valve {
    pub fn new(kind: ValveKind) -> Self {
        Self {
            kind,
            setting: 0.0,
            init_setting: 0.0,
            loss_coeff: 0.0,
            loss_factor: 0.0,
            setting_pattern: None,
            gpv_curve: None,
            modulation: None,
            dprv: DprvState::default(),
            has_fixed_status: false,
            elev: 0.0,
        }
    }

    /// Convert user-unit attributes to internal units. Diameter arrives
    /// already converted.
    pub fn convert_units(&mut self, diameter: f64, units: &Units) {
        let c = self.loss_coeff.max(MIN_LOSS_COEFF);
        self.loss_factor = aq_core::minor_loss_factor(c, diameter);
        self.init_setting = self.convert_setting(self.init_setting, units);
        if let Some(m) = &mut self.modulation {
            match m {
                Modulation::FixedOutlet { pressure } => {
                    *pressure = units.to_internal(Quantity::Pressure, *pressure);
                }
                Modulation::TimeModulated {
                    day_pressure,
                    night_pressure,
                    ..
                } => {
                    *day_pressure = units.to_internal(Quantity::Pressure, *day_pressure);
                    *night_pressure = units.to_internal(Quantity::Pressure, *night_pressure);
                }
                // FM coefficients operate on user-unit flow; converted on use
                Modulation::FlowModulated { .. } => {}
                Modulation::RemoteNode { pressure, .. } => {
                    *pressure = units.to_internal(Quantity::Pressure, *pressure);
                }
            }
        }
    }

    /// Convert one setting value from user to internal units.
    pub fn convert_setting(&self, s: f64, units: &Units) -> f64 {
        match self.kind {
            ValveKind::Prv | ValveKind::Psv | ValveKind::Pbv => {
                units.to_internal(Quantity::Pressure, s)
            }
            ValveKind::Fcv => units.to_internal(Quantity::Flow, s),
            _ => s,
        }
    }

    /// Convert one setting value from internal back to user units.
    pub fn convert_setting_back(&self, s: f64, units: &Units) -> f64 {
        match self.kind {
            ValveKind::Prv | ValveKind::Psv | ValveKind::Pbv => {
                units.to_user(Quantity::Pressure, s)
            }
            ValveKind::Fcv => units.to_user(Quantity::Flow, s),
            _ => s,
        }
    }

    /// A valve's current setting in user units.
    pub fn setting_in_user_units(&self, units: &Units) -> f64 {
        self.convert_setting_back(self.setting, units)
    }

    /// Initial flow guess: velocity of 1 ft/s through the valve's bore.
    pub fn init_flow(&self, diameter: f64) -> f64 {
        match self.kind {
            ValveKind::Fcv => self.setting,
            ValveKind::Ccv if self.setting == 0.0 => ZERO_FLOW,
            ValveKind::Dprv if self.dprv.xm == 0.0 => ZERO_FLOW,
            _ => PI * diameter * diameter / 4.0,
        }
    }

    /// Head loss, gradient and inertial term at flow `q`.
    ///
    /// A CCV whose setting hits zero closes itself here, which is why the
    /// status is taken by mutable reference.
    pub fn find_head_loss(
        &self,
        status: &mut LinkStatus,
        q: f64,
        diameter: f64,
        curves: &[Curve],
        units: &Units,
        ccv_rep: CcvRepresentation,
    ) -> (HeadLoss, f64) {
        // temporarily closed (e.g. tries to drain an empty tank)
        if *status == LinkStatus::TempClosed {
            return (closed(q), MIN_GRADIENT);
        }

        // fixed OPEN or CLOSED status
        if self.has_fixed_status {
            return match *status {
                LinkStatus::Closed => (closed(q), MIN_GRADIENT),
                _ => (open_valve(q, self.loss_factor), MIN_GRADIENT),
            };
        }

        match self.kind {
            ValveKind::Pbv => (self.pbv_head_loss(q), MIN_GRADIENT),
            ValveKind::Tcv => (self.tcv_head_loss(q, diameter), MIN_GRADIENT),
            ValveKind::Gpv => (self.gpv_head_loss(q, curves, units), MIN_GRADIENT),
            ValveKind::Fcv => (self.fcv_head_loss(q), MIN_GRADIENT),
            ValveKind::Ccv => {
                if self.setting == 0.0 {
                    *status = LinkStatus::Closed;
                    (closed(q), MIN_GRADIENT)
                } else {
                    *status = LinkStatus::Open;
                    (
                        self.ccv_head_loss(q, diameter, ccv_rep),
                        inertial_term(diameter),
                    )
                }
            }
            ValveKind::Dprv => {
                if *status == LinkStatus::Closed || self.dprv.xm == 0.0 {
                    (closed(q), MIN_GRADIENT)
                } else if *status == LinkStatus::Open {
                    (open_valve(q, self.loss_factor), inertial_term(diameter))
                } else {
                    (self.dprv_head_loss(q), inertial_term(diameter))
                }
            }
            ValveKind::Prv | ValveKind::Psv => match *status {
                LinkStatus::Closed => (closed(q), MIN_GRADIENT),
                LinkStatus::Open => (open_valve(q, self.loss_factor), MIN_GRADIENT),
                // active: no loss relation of its own; the balance engine
                // pins the controlled node's head instead
                _ => (
                    HeadLoss {
                        hloss: 0.0,
                        hgrad: 0.0,
                    },
                    MIN_GRADIENT,
                ),
            },
        }
    }

    /// Pressure breaker: force the head loss to equal the setting unless
    /// the open-valve minor loss already exceeds it.
    fn pbv_head_loss(&self, q: f64) -> HeadLoss {
        let mloss = self.loss_factor * q * q;
        if mloss >= self.setting.abs() {
            open_valve(q, self.loss_factor)
        } else {
            HeadLoss {
                hloss: self.setting,
                hgrad: MIN_GRADIENT,
            }
        }
    }

    /// Throttle control: the setting is a loss coefficient, floored by the
    /// fully open coefficient.
    fn tcv_head_loss(&self, q: f64, diameter: f64) -> HeadLoss {
        let d2 = diameter * diameter;
        let throttled = 0.025_173 * self.setting / d2 / d2;
        open_valve(q, throttled.max(self.loss_factor))
    }

    /// General purpose: head loss from a user-supplied curve.
    fn gpv_head_loss(&self, q: f64, curves: &[Curve], units: &Units) -> HeadLoss {
        let Some(cid) = self.gpv_curve else {
            return open_valve(q, self.loss_factor);
        };
        let ucf_flow = units.ucf(Quantity::Flow);
        let ucf_head = units.ucf(Quantity::Head);
        let q_user = q.abs() * ucf_flow;
        let (r_u, h0_u) = curves[cid.idx()].find_segment(q_user);
        let r = (r_u * ucf_flow / ucf_head).max(MIN_GRADIENT);
        let h0 = h0_u / ucf_head;
        let hloss = h0 + r * q.abs();
        HeadLoss {
            hloss: if q < 0.0 { -hloss } else { hloss },
            hgrad: r,
        }
    }

    /// Flow control: a steep penalty on flow in excess of the setting.
    fn fcv_head_loss(&self, q: f64) -> HeadLoss {
        let xflow = q - self.setting;
        if xflow > 0.0 {
            HeadLoss {
                hloss: self.loss_factor * self.setting * self.setting + HIGH_RESISTANCE * xflow,
                hgrad: HIGH_RESISTANCE,
            }
        } else if q < 0.0 {
            closed(q)
        } else {
            open_valve(q, self.loss_factor)
        }
    }

    /// Closure control: loss factor from the opening setting, using either
    /// the Toe conductance or the Tullis Cd polynomial.
    fn ccv_head_loss(&self, q: f64, diameter: f64, rep: CcvRepresentation) -> HeadLoss {
        let s = self.setting;
        let factor = match rep {
            CcvRepresentation::Toe => {
                // globe valve conductance 16.96 ft^2.5/s at full opening
                let vc = 16.96_f64;
                1.0 / (vc * vc * s * s)
            }
            CcvRepresentation::Cd => {
                let s2 = s * s;
                let s3 = s2 * s;
                let cd = -1.1293 * s3 * s3 + 3.3823 * s3 * s2 - 3.443 * s2 * s2
                    + 0.5671 * s3
                    + 1.0371 * s2
                    - 0.0037 * s;
                let area = PI * diameter * diameter / 4.0;
                (1.0 / (cd * cd) - 1.0) / (2.0 * GRAVITY * area * area)
            }
        };
        open_valve(q, factor)
    }

    /// Dynamic PRV: loss factor from the flow coefficient at the current
    /// opening `Xm`.
    fn dprv_head_loss(&self, q: f64) -> HeadLoss {
        let cv = dprv_flow_coefficient(self.dprv.xm);
        open_valve(q, 1.0 / (cv * cv))
    }

    /// Head setting the DPRV state machine compares against. Fixed-outlet
    /// mode uses the configured pressure; the modulated modes track the
    /// valve's own downstream head, leaving setpoint enforcement to the
    /// opening controller.
    pub fn dprv_head_setting(&self, downstream_head: f64) -> f64 {
        match &self.modulation {
            Some(Modulation::FixedOutlet { pressure }) => pressure + self.elev,
            _ => downstream_head,
        }
    }

    /// State transition of a regulating valve, computed from the flows and
    /// heads at the end of the current iteration.
    pub fn update_status(
        &self,
        status: LinkStatus,
        q: f64,
        h1: f64,
        h2: f64,
    ) -> LinkStatus {
        if self.has_fixed_status {
            return status;
        }
        match self.kind {
            ValveKind::Prv => self.prv_transition(status, q, h1, h2, self.setting + self.elev),
            ValveKind::Dprv => self.prv_transition(status, q, h1, h2, self.dprv_head_setting(h2)),
            ValveKind::Psv => self.psv_transition(status, q, h1, h2, self.setting + self.elev),
            _ => status,
        }
    }

    fn prv_transition(
        &self,
        status: LinkStatus,
        q: f64,
        h1: f64,
        h2: f64,
        hset: f64,
    ) -> LinkStatus {
        match status {
            LinkStatus::Active => {
                if q < -ZERO_FLOW {
                    LinkStatus::Closed
                } else if h1 < hset {
                    LinkStatus::Open
                } else {
                    status
                }
            }
            LinkStatus::Open => {
                if q < -ZERO_FLOW {
                    LinkStatus::Closed
                } else if h2 > hset {
                    LinkStatus::Active
                } else {
                    status
                }
            }
            LinkStatus::Closed => {
                if h1 > hset && h2 < hset {
                    LinkStatus::Active
                } else if h1 < hset && h1 > h2 {
                    LinkStatus::Open
                } else {
                    status
                }
            }
            LinkStatus::TempClosed => status,
        }
    }

    fn psv_transition(
        &self,
        status: LinkStatus,
        q: f64,
        h1: f64,
        h2: f64,
        hset: f64,
    ) -> LinkStatus {
        match status {
            LinkStatus::Active => {
                if q < -ZERO_FLOW {
                    LinkStatus::Closed
                } else if h2 > hset {
                    LinkStatus::Open
                } else {
                    status
                }
            }
            LinkStatus::Open => {
                if q < -ZERO_FLOW {
                    LinkStatus::Closed
                } else if h1 < hset {
                    LinkStatus::Active
                } else {
                    status
                }
            }
            LinkStatus::Closed => {
                if h2 < hset && h1 > hset {
                    LinkStatus::Active
                } else if h2 > hset && h1 > h2 {
                    LinkStatus::Open
                } else {
                    status
                }
            }
            LinkStatus::TempClosed => status,
        }
    }
}

/// Flow coefficient of the reference DPRV at opening `xm`.
pub fn dprv_flow_coefficient(xm: f64) -> f64 {
    let xm = xm.clamp(0.0, 1.0);
    if xm < XM_TRANSITION {
        CV_TRANSITION * xm / XM_TRANSITION
    } else {
        let xm2 = xm * xm;
        (CV_K1 * xm2 * xm + CV_K2 * xm2 + CV_K3 * xm + CV_K4) * CV_MAX
    }
}

/// Inertial term of a partially open control valve (CCV, DPRV).
fn inertial_term(diameter: f64) -> f64 {
    10.765 / (GRAVITY * PI * diameter * diameter)
}
