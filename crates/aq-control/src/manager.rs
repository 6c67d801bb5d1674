//! Per-step opening control of dynamic pressure-reducing valves.
//!
//! Once per hydraulic time step, before the balance engine solves, every
//! DPRV's opening `Xm` is nudged toward the pressure setpoint its
//! modulation strategy prescribes. After a successful step `lasting`
//! snapshots the opening and error for the next step.

use crate::error::{ControlError, ControlResult};
use aq_network::{ControlLaw, DprvState, LinkStatus, Modulation, Network, ValveKind};
use aq_core::{LinkId, Quantity};
use tracing::debug;

// Piston-chamber geometry of the reference valve
const V_CONTROL: f64 = 0.0047;
const LIFT: f64 = 0.057;
const K5: f64 = 1.30;
const K6: f64 = 0.56;

/// Bounds on the accumulated integral error.
const ERROR_SUM_LIMIT: f64 = 100.0;

/// Opening snapshot reported after each controller pass, for tracing.
#[derive(Debug, Clone, PartialEq)]
pub struct ValveOpening {
    pub link: LinkId,
    pub xm: f64,
}

/// The pressure-management controller. One instance drives every DPRV in
/// the network using a single control law.
#[derive(Debug, Clone)]
pub struct PressureManager {
    law: ControlLaw,
}

impl PressureManager {
    pub fn new(law: ControlLaw) -> Self {
        Self { law }
    }

    pub fn law(&self) -> ControlLaw {
        self.law
    }

    /// Update every DPRV's opening for the step starting at `t`.
    ///
    /// `dt` is the hydraulic step length in seconds. Node heads must still
    /// hold the values of the previous step's solution.
    pub fn step(&self, net: &mut Network, t: u64, dt: u64) -> ControlResult<Vec<ValveOpening>> {
        let units = net.units();
        let ucf_flow = units.ucf(Quantity::Flow);
        let ucf_len = units.ucf(Quantity::Length);
        let mut openings = Vec::new();

        for li in 0..net.links.len() {
            let link_id = LinkId::from_index(li as u32);
            let Some(valve) = net.links[li].as_valve() else {
                continue;
            };
            if valve.kind != ValveKind::Dprv {
                continue;
            }

            // endpoint pressures from the previous solution
            let from = &net.nodes[net.links[li].from.idx()];
            let to = &net.nodes[net.links[li].to.idx()];
            let p_from = from.head - from.elevation;
            let p_to = to.head - to.elevation;
            let p_to_past = to.past_head - to.elevation;
            let flow = net.links[li].flow;
            let status = net.links[li].status;

            let modulation =
                valve
                    .modulation
                    .clone()
                    .ok_or_else(|| ControlError::MissingModulation {
                        valve: net.links[li].name.clone(),
                    })?;

            // remote-node pressure read before taking the link mutably
            let p_remote = match &modulation {
                Modulation::RemoteNode { node, .. } => {
                    let n = net
                        .nodes
                        .get(node.idx())
                        .ok_or_else(|| ControlError::MissingRemoteNode {
                            valve: net.links[li].name.clone(),
                        })?;
                    Some(n.head - n.elevation)
                }
                _ => None,
            };
            let schedule_mode = match &modulation {
                Modulation::TimeModulated { schedule, .. } => Some(
                    net.schedules
                        .get(schedule.idx())
                        .ok_or_else(|| ControlError::MissingSchedule {
                            valve: net.links[li].name.clone(),
                        })?
                        .mode_at(t),
                ),
                _ => None,
            };

            let link = &mut net.links[li];

            if t == 0 {
                link.as_valve_mut().expect("checked above").dprv = DprvState::default();
            }

            // a fixed-outlet valve that closed on backflow reopens once
            // the pressures straddle its setpoint again
            if let Modulation::FixedOutlet { pressure } = &modulation {
                if status == LinkStatus::Closed && p_from > *pressure && p_to < *pressure {
                    link.status = LinkStatus::Active;
                }
            }

            let active = link.status == LinkStatus::Active;
            let valve = link.as_valve_mut().expect("checked above");
            if active {
                let (reference, target) = match &modulation {
                    Modulation::FixedOutlet { pressure } => (*pressure, p_to),
                    Modulation::TimeModulated {
                        day_pressure,
                        night_pressure,
                        ..
                    } => {
                        let p = match schedule_mode.expect("TM resolved above") {
                            aq_network::DayNight::Day => *day_pressure,
                            aq_network::DayNight::Night => *night_pressure,
                        };
                        (p, p_to)
                    }
                    Modulation::FlowModulated { a, b, c } => {
                        let q_user = flow * ucf_flow;
                        ((a * q_user * q_user + b * q_user + c) / ucf_len, p_to)
                    }
                    Modulation::RemoteNode { pressure, .. } => {
                        (*pressure, p_remote.expect("RNM resolved above"))
                    }
                };

                valve.dprv.error = reference - target;

                // piston cross section at the current opening
                let xm = valve.dprv.xm;
                let a_cs = (K5 * xm * xm + K6) * V_CONTROL / LIFT;

                let q3 = match self.law {
                    ControlLaw::Physical {
                        alpha_open,
                        alpha_close,
                    } => {
                        if valve.dprv.error >= 0.0 {
                            alpha_open * valve.dprv.error
                        } else {
                            alpha_close * valve.dprv.error
                        }
                    }
                    ControlLaw::Pid { kp, ki, kd } => {
                        valve.dprv.error_sum = (valve.dprv.error_sum + valve.dprv.error)
                            .clamp(-ERROR_SUM_LIMIT, ERROR_SUM_LIMIT);
                        -(kp * valve.dprv.error
                            + ki * valve.dprv.error_sum
                            + kd * (p_to - p_to_past))
                    }
                };

                valve.dprv.delta_xm = (q3 / a_cs) * dt as f64;
                valve.dprv.xm = valve.dprv.xm_last + valve.dprv.delta_xm;
            }

            valve.dprv.xm = valve.dprv.xm.clamp(0.0, 1.0);
            let xm = valve.dprv.xm;
            let error = valve.dprv.error;
            debug!(valve = %link.name, xm, error, "pressure management update");
            openings.push(ValveOpening { link: link_id, xm });
        }
        Ok(openings)
    }

    /// Snapshot per-valve state after a successful hydraulic step. Must
    /// run exactly once per step.
    pub fn lasting(&self, net: &mut Network) {
        for link in &mut net.links {
            let Some(valve) = link.as_valve_mut() else {
                continue;
            };
            if valve.kind != ValveKind::Dprv {
                continue;
            }
            valve.dprv.xm_last = valve.dprv.xm;
            valve.dprv.error_pre = valve.dprv.error;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aq_network::{Link, Modulation, Node, Pipe, Valve, ValveKind};

    fn dprv_net(modulation: Modulation) -> Network {
        let mut net = Network::new();
        let r = net.add_node(Node::reservoir("R1", 200.0)).unwrap();
        let j1 = net.add_node(Node::junction("J1", 0.0)).unwrap();
        let j2 = net.add_node(Node::junction("J2", 0.0)).unwrap();
        net.add_link(Link::pipe("P1", r, j1, Pipe::new(100.0, 130.0)))
            .unwrap();
        let mut v = Valve::new(ValveKind::Dprv);
        v.modulation = Some(modulation);
        let mut link = Link::valve("V1", j1, j2, v);
        link.diameter = 0.5;
        net.add_link(link).unwrap();
        net
    }

    fn physical_manager() -> PressureManager {
        PressureManager::new(ControlLaw::Physical {
            alpha_open: 1.0e-6,
            alpha_close: 1.0e-6,
        })
    }

    #[test]
    fn first_step_initializes_state() {
        let mut net = dprv_net(Modulation::FixedOutlet { pressure: 100.0 });
        let mgr = physical_manager();
        // perturb the state, then confirm the t=0 reset
        net.links[1].as_valve_mut().unwrap().dprv.xm = 0.9;
        mgr.step(&mut net, 0, 60).unwrap();
        let dprv = net.links[1].as_valve().unwrap().dprv;
        assert!((dprv.xm_last - 0.2).abs() < 1e-12);
        assert_eq!(dprv.error_pre, 0.5);
    }

    #[test]
    fn opening_moves_toward_setpoint() {
        let mut net = dprv_net(Modulation::FixedOutlet { pressure: 100.0 });
        let mgr = physical_manager();
        // downstream pressure far below the setpoint: valve must open
        net.nodes[1].head = 180.0;
        net.nodes[2].head = 40.0;
        net.nodes[2].past_head = 40.0;
        mgr.step(&mut net, 0, 3600).unwrap();
        let dprv = net.links[1].as_valve().unwrap().dprv;
        assert!(dprv.delta_xm > 0.0);
        assert!(dprv.xm > 0.2);
    }

    #[test]
    fn opening_clamped_to_unit_interval() {
        let mut net = dprv_net(Modulation::FixedOutlet { pressure: 1.0e5 });
        let mgr = physical_manager();
        net.nodes[2].head = 0.0;
        // enormous error drives the raw increment far above 1
        mgr.step(&mut net, 0, 36000).unwrap();
        let xm = net.links[1].as_valve().unwrap().dprv.xm;
        assert!(xm <= 1.0);
        // and a huge negative error pins it at zero
        let mut net = dprv_net(Modulation::FixedOutlet { pressure: -1.0e5 });
        mgr.step(&mut net, 0, 36000).unwrap();
        let xm = net.links[1].as_valve().unwrap().dprv.xm;
        assert_eq!(xm, 0.0);
    }

    #[test]
    fn closed_fo_valve_reopens_when_pressures_straddle() {
        let mut net = dprv_net(Modulation::FixedOutlet { pressure: 100.0 });
        let mgr = physical_manager();
        net.links[1].status = LinkStatus::Closed;
        net.nodes[1].head = 180.0; // upstream above setpoint
        net.nodes[2].head = 40.0; // downstream below
        mgr.step(&mut net, 3600, 3600).unwrap();
        assert_eq!(net.links[1].status, LinkStatus::Active);
    }

    #[test]
    fn pid_law_clamps_integral() {
        let mut net = dprv_net(Modulation::FixedOutlet { pressure: 1000.0 });
        let mgr = PressureManager::new(ControlLaw::Pid {
            kp: -1.365e-6,
            ki: 1.04e-7,
            kd: 6.7527e-7,
        });
        net.nodes[2].head = 0.0;
        for t in 0..50u64 {
            mgr.step(&mut net, t * 60, 60).unwrap();
            mgr.lasting(&mut net);
        }
        let sum = net.links[1].as_valve().unwrap().dprv.error_sum;
        assert!(sum <= ERROR_SUM_LIMIT && sum >= -ERROR_SUM_LIMIT);
    }

    #[test]
    fn lasting_snapshots_state() {
        let mut net = dprv_net(Modulation::FixedOutlet { pressure: 100.0 });
        let mgr = physical_manager();
        net.nodes[1].head = 180.0;
        net.nodes[2].head = 40.0;
        mgr.step(&mut net, 0, 3600).unwrap();
        let before = net.links[1].as_valve().unwrap().dprv;
        assert!(before.xm != before.xm_last);
        mgr.lasting(&mut net);
        let after = net.links[1].as_valve().unwrap().dprv;
        assert_eq!(after.xm, after.xm_last);
        assert_eq!(after.error_pre, after.error);
    }

    #[test]
    fn flow_modulated_setpoint_tracks_flow() {
        // ref = (a*Q^2 + b*Q + c) / ucf_len with Q in user units; with
        // a = b = 0 this degenerates to a fixed setpoint of c meters
        let mut net = dprv_net(Modulation::FlowModulated {
            a: 0.0,
            b: 0.0,
            c: 30.0,
        });
        net.options.flow_units = aq_core::FlowUnits::Lps;
        let mgr = physical_manager();
        net.nodes[1].head = 180.0;
        net.nodes[2].head = 40.0;
        mgr.step(&mut net, 0, 3600).unwrap();
        let err = net.links[1].as_valve().unwrap().dprv.error;
        // both the reference and the target are internal feet
        let expect = 30.0 / 0.3048 - 40.0;
        assert!((err - expect).abs() < 1e-9);
    }

    #[test]
    fn remote_node_error_uses_remote_pressure() {
        let remote = aq_core::Id::from_index(0); // the reservoir node
        let mut net = dprv_net(Modulation::RemoteNode {
            node: remote,
            pressure: 50.0,
        });
        let mgr = physical_manager();
        net.nodes[0].head = 230.0; // remote pressure = 30 ft
        mgr.step(&mut net, 0, 3600).unwrap();
        let err = net.links[1].as_valve().unwrap().dprv.error;
        assert!((err - (50.0 - 30.0)).abs() < 1e-9);
    }

    #[test]
    fn non_dprv_valves_skipped() {
        let mut net = Network::new();
        let r = net.add_node(Node::reservoir("R1", 100.0)).unwrap();
        let j = net.add_node(Node::junction("J1", 0.0)).unwrap();
        let mut v = Valve::new(ValveKind::Prv);
        v.setting = 40.0;
        net.add_link(Link::valve("V1", r, j, v)).unwrap();
        let mgr = physical_manager();
        let openings = mgr.step(&mut net, 0, 3600).unwrap();
        assert!(openings.is_empty());
    }
}
