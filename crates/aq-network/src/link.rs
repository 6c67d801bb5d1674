//! Links: the polymorphic edge of the network graph.

use crate::curve::Curve;
use crate::headloss::HeadLoss;
use crate::options::Options;
use crate::pipe::Pipe;
use crate::pump::Pump;
use crate::valve::{Valve, ValveKind};
use aq_core::{NodeId, Quantity, Units, ZERO_FLOW};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkStatus {
    Open,
    Closed,
    /// A regulating valve holding its setpoint.
    Active,
    /// Closed by the engine (empty tank, reversed pump), not by input.
    TempClosed,
}

impl LinkStatus {
    pub fn is_closed(self) -> bool {
        matches!(self, LinkStatus::Closed | LinkStatus::TempClosed)
    }

    pub fn keyword(self) -> &'static str {
        match self {
            LinkStatus::Open => "OPEN",
            LinkStatus::Closed => "CLOSED",
            LinkStatus::Active => "ACTIVE",
            LinkStatus::TempClosed => "TEMPCLOSED",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkKind {
    Pipe(Pipe),
    Pump(Pump),
    Valve(Valve),
}

/// One edge of the network. Numeric state is in internal units after
/// `Network::convert_units`.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub name: String,
    pub from: NodeId,
    pub to: NodeId,
    pub diameter: f64,
    pub status: LinkStatus,
    pub init_status: LinkStatus,
    /// Signed flow, positive from `from` to `to` (cfs).
    pub flow: f64,
    pub past_flow: f64,
    /// Last computed head loss and gradient.
    pub hloss: f64,
    pub hgrad: f64,
    pub past_hloss: f64,
    /// Inertial term for unsteady extensions.
    pub inertial: f64,
    /// Leakage discharge coefficient; per-end outflow is `C * p^leak_exp`.
    pub leak_coeff: f64,
    /// Total leakage of the current step (both ends, cfs).
    pub leakage: f64,
    pub kind: LinkKind,
}

impl Link {
    pub fn pipe(name: impl Into<String>, from: NodeId, to: NodeId, pipe: Pipe) -> Self {
        Self::new(name, from, to, LinkKind::Pipe(pipe), LinkStatus::Open)
    }

    pub fn pump(name: impl Into<String>, from: NodeId, to: NodeId, pump: Pump) -> Self {
        Self::new(name, from, to, LinkKind::Pump(pump), LinkStatus::Open)
    }

    pub fn valve(name: impl Into<String>, from: NodeId, to: NodeId, valve: Valve) -> Self {
        Self::new(name, from, to, LinkKind::Valve(valve), LinkStatus::Active)
    }

    fn new(
        name: impl Into<String>,
        from: NodeId,
        to: NodeId,
        kind: LinkKind,
        status: LinkStatus,
    ) -> Self {
        Self {
            name: name.into(),
            from,
            to,
            diameter: 0.0,
            status,
            init_status: status,
            flow: 0.0,
            past_flow: 0.0,
            hloss: 0.0,
            hgrad: 0.0,
            past_hloss: 0.0,
            inertial: 0.0,
            leak_coeff: 0.0,
            leakage: 0.0,
            kind,
        }
    }

    pub fn as_valve(&self) -> Option<&Valve> {
        match &self.kind {
            LinkKind::Valve(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_valve_mut(&mut self) -> Option<&mut Valve> {
        match &mut self.kind {
            LinkKind::Valve(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_pump(&self) -> Option<&Pump> {
        match &self.kind {
            LinkKind::Pump(p) => Some(p),
            _ => None,
        }
    }

    pub fn is_pipe(&self) -> bool {
        matches!(self.kind, LinkKind::Pipe(_))
    }

    /// True for an ACTIVE PRV or PSV, which the balance engine assembles
    /// by pinning the controlled node's head instead of via a loss
    /// relation.
    pub fn is_active_pressure_valve(&self) -> bool {
        if self.status != LinkStatus::Active {
            return false;
        }
        matches!(
            self.as_valve().map(|v| v.kind),
            Some(ValveKind::Prv) | Some(ValveKind::Psv)
        )
    }

    pub fn flow_area(&self) -> f64 {
        PI * self.diameter * self.diameter / 4.0
    }

    pub fn velocity(&self) -> f64 {
        let area = self.flow_area();
        if area > 0.0 {
            self.flow.abs() / area
        } else {
            0.0
        }
    }

    /// Convert user-unit attributes to internal units; precompute
    /// resistances and pump characteristics.
    pub fn convert_units(&mut self, curves: &[Curve], units: &Units, opts: &Options) {
        match &mut self.kind {
            LinkKind::Pump(_) => {}
            _ => self.diameter = units.to_internal(Quantity::Diameter, self.diameter),
        }
        if self.leak_coeff > 0.0 {
            let up = units.ucf(Quantity::Pressure);
            let uq = units.ucf(Quantity::Flow);
            self.leak_coeff *= up.powf(opts.leak_exponent) / uq;
        }
        match &mut self.kind {
            LinkKind::Pipe(p) => p.convert_units(self.diameter, units, opts),
            LinkKind::Pump(p) => p.build_characteristic(curves, units),
            LinkKind::Valve(v) => v.convert_units(self.diameter, units),
        }
    }

    /// Reset transient state; optionally re-seed the starting flow.
    pub fn initialize(&mut self, init_flow: bool) {
        self.status = self.init_status;
        if let LinkKind::Valve(v) = &mut self.kind {
            v.setting = v.init_setting;
            v.has_fixed_status = self.init_status != LinkStatus::Active;
        }
        if let LinkKind::Pump(p) = &mut self.kind {
            p.speed = p.init_speed;
        }
        if init_flow {
            self.flow = self.init_flow();
        }
        self.past_flow = 0.0;
        self.past_hloss = 0.0;
        self.leakage = 0.0;
    }

    /// Starting flow guess: velocity of 1 ft/s through the bore.
    pub fn init_flow(&self) -> f64 {
        match &self.kind {
            LinkKind::Pipe(_) => self.flow_area(),
            LinkKind::Pump(_) => self.flow_area().max(ZERO_FLOW),
            LinkKind::Valve(v) => v.init_flow(self.diameter),
        }
    }

    /// Evaluate the head-loss relation at the current flow, caching
    /// `(hloss, hgrad, inertial)` on the link.
    pub fn find_head_loss(&mut self, curves: &[Curve], units: &Units, opts: &Options) {
        let q = self.flow;
        let closed_now = self.status.is_closed();
        let (hl, inertial) = match &mut self.kind {
            LinkKind::Pipe(p) => (
                p.find_head_loss(q, self.diameter, opts.low_flow_limit, closed_now),
                aq_core::MIN_GRADIENT,
            ),
            LinkKind::Pump(p) => (
                p.find_head_loss(q, curves, units, closed_now),
                aq_core::MIN_GRADIENT,
            ),
            LinkKind::Valve(v) => v.find_head_loss(
                &mut self.status,
                q,
                self.diameter,
                curves,
                units,
                opts.ccv_representation,
            ),
        };
        self.hloss = hl.hloss;
        self.hgrad = hl.hgrad;
        self.inertial = inertial;
    }

    /// Run the link's status machine against the latest iteration state.
    /// Returns true when the status flipped.
    pub fn update_status(&mut self, h1: f64, h2: f64, curves: &[Curve], units: &Units) -> bool {
        let old = self.status;
        let new = match &self.kind {
            LinkKind::Valve(v) => v.update_status(self.status, self.flow, h1, h2),
            LinkKind::Pipe(p) => self.check_valve_status(p, h1, h2),
            LinkKind::Pump(p) => self.pump_status(p, h1, h2, curves, units),
        };
        if new != old {
            if new.is_closed() {
                self.flow = ZERO_FLOW;
            }
            self.status = new;
            true
        } else {
            false
        }
    }

    /// A check-valve pipe closes on reverse flow and reopens once the
    /// head difference drives flow forward again.
    fn check_valve_status(&self, pipe: &Pipe, h1: f64, h2: f64) -> LinkStatus {
        if !pipe.has_check_valve {
            return self.status;
        }
        match self.status {
            LinkStatus::TempClosed => {
                if h1 > h2 {
                    LinkStatus::Open
                } else {
                    self.status
                }
            }
            LinkStatus::Closed => self.status,
            _ => {
                if self.flow < -ZERO_FLOW {
                    LinkStatus::TempClosed
                } else {
                    self.status
                }
            }
        }
    }

    /// A pump cannot sustain reverse flow; it also cannot push beyond its
    /// shutoff head.
    fn pump_status(&self, pump: &Pump, h1: f64, h2: f64, curves: &[Curve], units: &Units) -> LinkStatus {
        match self.status {
            LinkStatus::TempClosed => {
                // reopen when the shutoff head can overcome the lift again
                if h1 + pump.shutoff_head(curves, units) > h2 {
                    LinkStatus::Open
                } else {
                    self.status
                }
            }
            LinkStatus::Closed => self.status,
            _ => {
                if self.flow < -ZERO_FLOW {
                    LinkStatus::TempClosed
                } else {
                    self.status
                }
            }
        }
    }

    /// Apply a control- or pattern-driven setting change. Mirrors the
    /// original rule set: a closed valve only records the value, a zero
    /// setting closes the valve outright. Returns true when live state
    /// changed.
    pub fn change_setting(&mut self, new_setting: f64) -> bool {
        match &mut self.kind {
            LinkKind::Valve(v) => {
                if v.setting == new_setting {
                    return false;
                }
                let kind_uses_zero_close = matches!(v.kind, ValveKind::Ccv);
                if self.status == LinkStatus::Closed
                    && (!kind_uses_zero_close || new_setting == 0.0)
                {
                    v.setting = new_setting;
                    return false;
                }
                if new_setting == 0.0 {
                    self.status = LinkStatus::Closed;
                    self.flow = ZERO_FLOW;
                } else {
                    self.status = LinkStatus::Open;
                }
                v.setting = new_setting;
                true
            }
            LinkKind::Pump(p) => {
                if p.speed == new_setting {
                    return false;
                }
                p.speed = new_setting;
                if new_setting == 0.0 {
                    self.status = LinkStatus::Closed;
                    self.flow = ZERO_FLOW;
                } else if self.status == LinkStatus::Closed {
                    self.status = LinkStatus::Open;
                }
                true
            }
            LinkKind::Pipe(_) => false,
        }
    }

    /// Apply a control-driven status change; pins the status for valves.
    pub fn change_status(&mut self, new_status: LinkStatus) -> bool {
        let fixed = self
            .as_valve()
            .map(|v| v.has_fixed_status)
            .unwrap_or(true);
        if !fixed || self.status != new_status {
            self.status = new_status;
            if let Some(v) = self.as_valve_mut() {
                v.has_fixed_status = true;
            }
            if new_status == LinkStatus::Closed {
                self.flow = ZERO_FLOW;
            }
            true
        } else {
            false
        }
    }

    /// Pressure-dependent leakage drawn at each end of the link.
    /// Returns outflow and its head derivative per endpoint.
    pub fn leakage_flows(&self, p1: f64, p2: f64, exponent: f64) -> [(f64, f64); 2] {
        if self.leak_coeff <= 0.0 || self.status.is_closed() {
            return [(0.0, 0.0), (0.0, 0.0)];
        }
        let per_end = |p: f64| {
            if p <= 0.0 {
                (0.0, 0.0)
            } else {
                let q = self.leak_coeff * p.powf(exponent);
                let dq = exponent * self.leak_coeff * p.powf(exponent - 1.0);
                (q, dq)
            }
        };
        [per_end(p1), per_end(p2)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aq_core::{FlowUnits, Id};

    fn test_pipe_link() -> Link {
        let pipe = Pipe::new(1000.0, 130.0);
        let mut link = Link::pipe("P1", Id::from_index(0), Id::from_index(1), pipe);
        link.diameter = 0.5;
        link
    }

    #[test]
    fn closed_status_check() {
        assert!(LinkStatus::Closed.is_closed());
        assert!(LinkStatus::TempClosed.is_closed());
        assert!(!LinkStatus::Open.is_closed());
        assert!(!LinkStatus::Active.is_closed());
    }

    #[test]
    fn check_valve_closes_on_reverse_flow() {
        let mut link = test_pipe_link();
        if let LinkKind::Pipe(p) = &mut link.kind {
            p.has_check_valve = true;
        }
        link.flow = -0.01;
        let units = Units::new(FlowUnits::Cfs);
        let changed = link.update_status(10.0, 20.0, &[], &units);
        assert!(changed);
        assert_eq!(link.status, LinkStatus::TempClosed);
        assert_eq!(link.flow, ZERO_FLOW);

        // reopens when the gradient reverses
        let changed = link.update_status(30.0, 20.0, &[], &units);
        assert!(changed);
        assert_eq!(link.status, LinkStatus::Open);
    }

    #[test]
    fn plain_pipe_never_flips() {
        let mut link = test_pipe_link();
        link.flow = -5.0;
        let units = Units::new(FlowUnits::Cfs);
        assert!(!link.update_status(0.0, 100.0, &[], &units));
    }

    #[test]
    fn leakage_grows_with_pressure() {
        let mut link = test_pipe_link();
        link.leak_coeff = 1e-4;
        let [(q_lo, _), _] = link.leakage_flows(10.0, 0.0, 1.18);
        let [(q_hi, _), _] = link.leakage_flows(40.0, 0.0, 1.18);
        assert!(q_hi > q_lo && q_lo > 0.0);
        // no leakage from negative pressure
        let [(q_neg, dq), _] = link.leakage_flows(-5.0, 0.0, 1.18);
        assert_eq!((q_neg, dq), (0.0, 0.0));
    }

    #[test]
    fn valve_setting_change_closes_at_zero() {
        let mut valve = Valve::new(ValveKind::Tcv);
        valve.setting = 3.0;
        let mut link = Link::valve("V1", Id::from_index(0), Id::from_index(1), valve);
        link.status = LinkStatus::Open;
        assert!(link.change_setting(0.0));
        assert_eq!(link.status, LinkStatus::Closed);
        assert_eq!(link.flow, ZERO_FLOW);
    }

    #[test]
    fn status_change_pins_valve() {
        let valve = Valve::new(ValveKind::Prv);
        let mut link = Link::valve("V1", Id::from_index(0), Id::from_index(1), valve);
        assert!(link.change_status(LinkStatus::Open));
        assert!(link.as_valve().unwrap().has_fixed_status);
    }
}
