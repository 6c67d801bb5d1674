//! Network nodes: junctions, reservoirs and storage tanks.

use crate::curve::Curve;
use crate::error::{NetworkError, NetworkResult};
use aq_core::{CurveId, PatternId, Quantity, Units};
use std::f64::consts::PI;

/// Demand node with optional pressure-dependent emitter discharge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Junction {
    /// Demand before pattern and multiplier scaling (internal cfs).
    pub base_demand: f64,
    pub demand_pattern: Option<PatternId>,
    /// Emitter discharge coefficient; outflow is `C * p^emitter_exponent`.
    pub emitter_coeff: f64,
}

/// Infinite external source/sink at fixed (optionally patterned) head.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reservoir {
    pub head_pattern: Option<PatternId>,
    /// Head before pattern scaling (internal ft).
    pub base_head: f64,
}

/// Storage tank. Levels are measured from the tank bottom (= node
/// elevation); the cross section comes from `diameter` or, when present,
/// from a level->volume curve.
#[derive(Debug, Clone, PartialEq)]
pub struct Tank {
    pub init_level: f64,
    pub min_level: f64,
    pub max_level: f64,
    pub diameter: f64,
    pub volume_curve: Option<CurveId>,
    /// Current stored volume (internal ft^3).
    pub volume: f64,
    /// Net inflow of the previous step, for trapezoidal integration.
    pub past_net_inflow: f64,
}

impl Tank {
    pub fn area(&self) -> f64 {
        PI * self.diameter * self.diameter / 4.0
    }

    /// Stored volume at a given level above the tank bottom.
    pub fn volume_at_level(&self, level: f64, curves: &[Curve], units: &Units) -> f64 {
        match self.volume_curve {
            Some(cid) => {
                // geometry curves stay in user units; convert at the seam
                let level_u = units.to_user(Quantity::Length, level);
                units.to_internal(Quantity::Volume, curves[cid.idx()].value_at(level_u))
            }
            None => self.area() * level,
        }
    }

    /// Level above the tank bottom for a given stored volume.
    pub fn level_at_volume(&self, volume: f64, curves: &[Curve], units: &Units) -> f64 {
        match self.volume_curve {
            Some(cid) => {
                let vol_u = units.to_user(Quantity::Volume, volume);
                units.to_internal(Quantity::Length, curves[cid.idx()].inverse_at(vol_u))
            }
            None => volume / self.area(),
        }
    }

    pub fn min_volume(&self, curves: &[Curve], units: &Units) -> f64 {
        self.volume_at_level(self.min_level, curves, units)
    }

    pub fn max_volume(&self, curves: &[Curve], units: &Units) -> f64 {
        self.volume_at_level(self.max_level, curves, units)
    }

    /// Seconds until the tank hits its nearest volume limit at the given
    /// net inflow rate; `None` when the level is not moving toward one.
    pub fn time_to_limit(&self, qnet: f64, curves: &[Curve], units: &Units) -> Option<u64> {
        if qnet.abs() < aq_core::ZERO_FLOW {
            return None;
        }
        let target = if qnet > 0.0 {
            self.max_volume(curves, units)
        } else {
            self.min_volume(curves, units)
        };
        let dv = target - self.volume;
        let dt = dv / qnet;
        if dt <= 0.0 {
            None
        } else {
            Some(dt.ceil() as u64)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Junction(Junction),
    Reservoir(Reservoir),
    Tank(Tank),
}

/// A node of the network arena. Numeric state is in internal units
/// (feet, cfs) after `Network::convert_units`.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub elevation: f64,
    /// Current total head.
    pub head: f64,
    /// Head at the end of the previous hydraulic step.
    pub past_head: f64,
    /// Actual demand at the current step (pattern-scaled).
    pub demand: f64,
    pub kind: NodeKind,
}

impl Node {
    pub fn junction(name: impl Into<String>, elevation: f64) -> Self {
        Self {
            name: name.into(),
            elevation,
            head: elevation,
            past_head: elevation,
            demand: 0.0,
            kind: NodeKind::Junction(Junction::default()),
        }
    }

    pub fn reservoir(name: impl Into<String>, head: f64) -> Self {
        Self {
            name: name.into(),
            elevation: head,
            head,
            past_head: head,
            demand: 0.0,
            kind: NodeKind::Reservoir(Reservoir {
                head_pattern: None,
                base_head: head,
            }),
        }
    }

    pub fn tank(name: impl Into<String>, elevation: f64, tank: Tank) -> Self {
        let head = elevation + tank.init_level;
        Self {
            name: name.into(),
            elevation,
            head,
            past_head: head,
            demand: 0.0,
            kind: NodeKind::Tank(tank),
        }
    }

    /// Reservoirs and tanks hold their head fixed within one balance solve.
    pub fn is_fixed_grade(&self) -> bool {
        matches!(self.kind, NodeKind::Reservoir(_) | NodeKind::Tank(_))
    }

    pub fn pressure(&self) -> f64 {
        self.head - self.elevation
    }

    pub fn as_junction(&self) -> Option<&Junction> {
        match &self.kind {
            NodeKind::Junction(j) => Some(j),
            _ => None,
        }
    }

    pub fn as_tank(&self) -> Option<&Tank> {
        match &self.kind {
            NodeKind::Tank(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_tank_mut(&mut self) -> Option<&mut Tank> {
        match &mut self.kind {
            NodeKind::Tank(t) => Some(t),
            _ => None,
        }
    }

    /// Convert user-unit attributes to internal units. `emitter_exponent`
    /// shapes the emitter coefficient conversion.
    pub fn convert_units(&mut self, units: &Units, emitter_exponent: f64) {
        let ucf_len = units.ucf(Quantity::Length);
        self.elevation /= ucf_len;
        self.head = self.elevation;
        self.past_head = self.elevation;
        match &mut self.kind {
            NodeKind::Junction(j) => {
                j.base_demand = units.to_internal(Quantity::Flow, j.base_demand);
                // emitter outflow C*p^e: rescale C so the law holds internally
                if j.emitter_coeff > 0.0 {
                    let up = units.ucf(Quantity::Pressure);
                    let uq = units.ucf(Quantity::Flow);
                    j.emitter_coeff *= up.powf(emitter_exponent) / uq;
                }
            }
            NodeKind::Reservoir(r) => {
                r.base_head = self.elevation;
            }
            NodeKind::Tank(t) => {
                t.init_level /= ucf_len;
                t.min_level /= ucf_len;
                t.max_level /= ucf_len;
                t.diameter /= ucf_len;
                self.head = self.elevation + t.init_level;
                self.past_head = self.head;
            }
        }
    }

    /// Reset transient state to start-of-simulation values.
    pub fn initialize(&mut self, curves: &[Curve], units: &Units) -> NetworkResult<()> {
        match &mut self.kind {
            NodeKind::Junction(_) => {
                self.head = self.elevation;
                self.demand = 0.0;
            }
            NodeKind::Reservoir(r) => {
                self.head = r.base_head;
            }
            NodeKind::Tank(t) => {
                if t.min_level > t.init_level || t.init_level > t.max_level {
                    return Err(NetworkError::OutOfRange {
                        what: "tank initial level",
                        value: t.init_level,
                    });
                }
                self.head = self.elevation + t.init_level;
                t.volume = t.volume_at_level(t.init_level, curves, units);
                t.past_net_inflow = 0.0;
            }
        }
        self.past_head = self.head;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aq_core::FlowUnits;

    fn cyl_tank() -> Tank {
        Tank {
            init_level: 10.0,
            min_level: 2.0,
            max_level: 20.0,
            diameter: 10.0,
            volume_curve: None,
            volume: 0.0,
            past_net_inflow: 0.0,
        }
    }

    #[test]
    fn junction_pressure_is_head_minus_elevation() {
        let mut n = Node::junction("J1", 50.0);
        n.head = 80.0;
        assert_eq!(n.pressure(), 30.0);
        assert!(!n.is_fixed_grade());
    }

    #[test]
    fn tank_volume_round_trip_cylindrical() {
        let t = cyl_tank();
        let units = Units::new(FlowUnits::Cfs);
        let v = t.volume_at_level(10.0, &[], &units);
        assert!((t.level_at_volume(v, &[], &units) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn tank_time_to_limit() {
        let mut t = cyl_tank();
        let units = Units::new(FlowUnits::Cfs);
        t.volume = t.volume_at_level(10.0, &[], &units);
        // rising at 1 cfs toward the 20 ft limit
        let dt = t.time_to_limit(1.0, &[], &units).unwrap();
        let expect = (t.max_volume(&[], &units) - t.volume).ceil() as u64;
        assert_eq!(dt, expect);
        // falling toward min level
        assert!(t.time_to_limit(-1.0, &[], &units).is_some());
        // static
        assert!(t.time_to_limit(0.0, &[], &units).is_none());
    }

    #[test]
    fn init_rejects_level_outside_bounds() {
        let mut t = cyl_tank();
        t.init_level = 1.0; // below min_level
        let mut n = Node::tank("T1", 100.0, t);
        let units = Units::new(FlowUnits::Cfs);
        assert!(n.initialize(&[], &units).is_err());
    }
}
