//! Hydraulic balance: Newton iteration over nodal heads and link flows
//! within one time step.

use crate::error::SolverResult;
use crate::matrix::NodalSystem;
use aq_network::{LinkStatus, Network, NodeKind, ValveKind};
use aq_core::{LinkId, Tolerances, HIGH_RESISTANCE, MIN_GRADIENT, ZERO_FLOW};
use tracing::debug;

/// Damping applied to the flow update when the iteration oscillates.
const UNDER_RELAXATION: f64 = 0.6;
/// Tolerance on tank levels when deciding limit closures (ft).
const LEVEL_TOL: f64 = 1.0e-6;

/// Outcome of one balance solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceResults {
    pub converged: bool,
    pub trials: usize,
    pub rel_flow_change: f64,
    pub status_flips: usize,
    /// Demand (cfs) at junctions cut off behind closed links; excluded
    /// from the balance rather than forced through.
    pub unmet_demand: f64,
}

/// Iterate the network at the current boundary conditions until the
/// relative flow change drops below the accuracy option with no pending
/// status flips, or the trial budget runs out.
///
/// Non-convergence is not an error here: the caller decides whether to
/// warn and continue (extended-period runs do).
pub fn solve_balance(
    net: &mut Network,
    system: &mut NodalSystem,
    adjacency: &[Vec<(LinkId, f64)>],
) -> SolverResult<BalanceResults> {
    let units = net.units();
    let opts = net.options.clone();
    let tol = Tolerances::from_accuracy(opts.accuracy);
    let max_trials = opts.max_trials.max(1);

    let mut trials = 0usize;
    let mut status_checks = 0usize;
    let mut total_flips = 0usize;
    let mut relax = 1.0;
    let mut prev_dq_total = f64::INFINITY;

    apply_tank_limits(net);

    loop {
        // 1. head-loss relations at the current flows
        {
            let Network {
                links,
                curves,
                options,
                ..
            } = net;
            for link in links.iter_mut() {
                link.find_head_loss(curves, &units, options);
            }
        }

        // 2. assemble the nodal system
        let unmet_demand = assemble(net, system, adjacency)?;

        // 3. solve for junction heads
        system.solve(net)?;
        for row in 0..system.size() {
            let ni = system.node_of_row(row);
            net.nodes[ni].head = system.solution()[row];
        }

        // 4. Newton flow update (with under-relaxation when oscillating)
        let (dq_total, q_total) = update_flows(net, relax);
        update_regulating_valve_flows(net, adjacency);
        let rel_change = dq_total / q_total.max(ZERO_FLOW);

        // oscillation detection drives the damping of the next pass
        relax = if dq_total > prev_dq_total {
            UNDER_RELAXATION
        } else {
            1.0
        };
        prev_dq_total = dq_total;

        // 5. valve state machines and tank limit enforcement
        let mut flips = apply_tank_limits(net);
        {
            let Network {
                nodes,
                links,
                curves,
                ..
            } = net;
            for link in links.iter_mut() {
                let h1 = nodes[link.from.idx()].head;
                let h2 = nodes[link.to.idx()].head;
                if link.update_status(h1, h2, curves, &units) {
                    flips += 1;
                }
            }
        }
        total_flips += flips;

        debug!(
            trials,
            rel_change,
            flips,
            relax,
            "balance iteration"
        );

        if tol.converged(dq_total, q_total) && flips == 0 {
            return Ok(BalanceResults {
                converged: true,
                trials,
                rel_flow_change: rel_change,
                status_flips: total_flips,
                unmet_demand,
            });
        }

        // a status flip earns one extra pass without consuming a trial,
        // up to a fixed budget that stops valve cycling
        if flips > 0 && status_checks < aq_core::MAX_STATUS_CHECKS {
            status_checks += 1;
            continue;
        }

        trials += 1;
        if trials >= max_trials {
            return Ok(BalanceResults {
                converged: false,
                trials,
                rel_flow_change: rel_change,
                status_flips: total_flips,
                unmet_demand,
            });
        }
    }
}

/// Fill the nodal system from the current link linearizations, demands,
/// emitters and leakage. Returns the total demand at disconnected
/// junctions, which is left out of the balance.
fn assemble(
    net: &mut Network,
    system: &mut NodalSystem,
    adjacency: &[Vec<(LinkId, f64)>],
) -> SolverResult<f64> {
    system.reset();
    let leak_exp = net.options.leak_exponent;
    let emitter_exp = net.options.emitter_exponent;

    // link conductances
    for li in 0..net.links.len() {
        let (row_from, row_to) = system.link_rows(li);
        let link = &net.links[li];

        if link.is_active_pressure_valve() {
            let valve = link.as_valve().expect("active pressure valve");
            let hset = valve.setting + valve.elev;
            let q = link.flow;
            match valve.kind {
                // PRV: pin the downstream head; its flow acts as a fixed
                // withdrawal from the upstream node
                ValveKind::Prv => {
                    if let Some(rb) = row_to {
                        system.add_diag(rb, HIGH_RESISTANCE);
                        system.add_rhs(rb, HIGH_RESISTANCE * hset);
                    }
                    if let Some(ra) = row_from {
                        system.add_rhs(ra, -q);
                    }
                }
                // PSV: pin the upstream head; its flow feeds the
                // downstream node
                ValveKind::Psv => {
                    if let Some(ra) = row_from {
                        system.add_diag(ra, HIGH_RESISTANCE);
                        system.add_rhs(ra, HIGH_RESISTANCE * hset);
                    }
                    if let Some(rb) = row_to {
                        system.add_rhs(rb, q);
                    }
                }
                _ => unreachable!("only PRV/PSV are pinned"),
            }
            continue;
        }

        let g = link.hgrad.max(MIN_GRADIENT);
        let p = 1.0 / g;
        let y = link.flow - link.hloss / g;
        let h_from = net.nodes[link.from.idx()].head;
        let h_to = net.nodes[link.to.idx()].head;

        if let Some(ra) = row_from {
            system.add_diag(ra, p);
            system.add_rhs(ra, -y);
            if row_to.is_none() {
                system.add_rhs(ra, p * h_to);
            }
        }
        if let Some(rb) = row_to {
            system.add_diag(rb, p);
            system.add_rhs(rb, y);
            if row_from.is_none() {
                system.add_rhs(rb, p * h_from);
            }
        }
        if let (Some(_), Some(_)) = (row_from, row_to) {
            system.add_off_diag(li, p);
        }
    }

    // demands and emitters at junction rows; a junction whose incident
    // links are all closed is cut off, and its demand goes unmet instead
    // of being forced through a pinched link
    let mut unmet_demand = 0.0;
    for row in 0..system.size() {
        let ni = system.node_of_row(row);
        let node = &net.nodes[ni];
        let disconnected = adjacency[ni]
            .iter()
            .all(|&(lid, _)| net.links[lid.idx()].status.is_closed());
        if disconnected {
            unmet_demand += node.demand;
            continue;
        }
        system.add_rhs(row, -node.demand);
        if let NodeKind::Junction(j) = &node.kind {
            if j.emitter_coeff > 0.0 {
                let p0 = node.pressure();
                if p0 > 0.0 {
                    let e0 = j.emitter_coeff * p0.powf(emitter_exp);
                    let de = emitter_exp * j.emitter_coeff * p0.powf(emitter_exp - 1.0);
                    system.add_diag(row, de);
                    system.add_rhs(row, de * node.head - e0);
                }
            }
        }
    }

    // pressure-driven leakage drawn at the link endpoints
    for li in 0..net.links.len() {
        let (row_from, row_to) = system.link_rows(li);
        let p1 = net.nodes[net.links[li].from.idx()].pressure();
        let p2 = net.nodes[net.links[li].to.idx()].pressure();
        let h1 = net.nodes[net.links[li].from.idx()].head;
        let h2 = net.nodes[net.links[li].to.idx()].head;
        let link = &mut net.links[li];
        if link.leak_coeff <= 0.0 {
            link.leakage = 0.0;
            continue;
        }
        let ends = link.leakage_flows(p1, p2, leak_exp);
        link.leakage = ends[0].0 + ends[1].0;
        for ((q, dq), (row, h)) in ends.iter().zip([(row_from, h1), (row_to, h2)]) {
            if let Some(r) = row {
                if *dq > 0.0 {
                    system.add_diag(r, *dq);
                    system.add_rhs(r, dq * h - q);
                }
            }
        }
    }

    Ok(unmet_demand)
}

/// Newton step on every link flow; returns (sum |dq|, sum |q|).
fn update_flows(net: &mut Network, relax: f64) -> (f64, f64) {
    let mut dq_total = 0.0;
    let mut q_total = 0.0;
    for li in 0..net.links.len() {
        if net.links[li].is_active_pressure_valve() {
            continue;
        }
        let h1 = net.nodes[net.links[li].from.idx()].head;
        let h2 = net.nodes[net.links[li].to.idx()].head;
        let link = &mut net.links[li];
        let g = link.hgrad.max(MIN_GRADIENT);
        let dq = (link.hloss - (h1 - h2)) / g * relax;
        link.flow -= dq;
        dq_total += dq.abs();
        q_total += link.flow.abs();
    }
    (dq_total, q_total)
}

/// An active PRV/PSV carries whatever flow balances its controlled node;
/// recovered from continuity over the node's other links.
fn update_regulating_valve_flows(net: &mut Network, adjacency: &[Vec<(LinkId, f64)>]) {
    for li in 0..net.links.len() {
        if !net.links[li].is_active_pressure_valve() {
            continue;
        }
        let (kind, from, to) = {
            let link = &net.links[li];
            (
                link.as_valve().expect("valve").kind,
                link.from.idx(),
                link.to.idx(),
            )
        };
        let (node_idx, valve_sign) = match kind {
            ValveKind::Prv => (to, 1.0),
            _ => (from, -1.0),
        };
        let node = &net.nodes[node_idx];
        let mut q_balance = node.demand;
        for &(other, sign) in &adjacency[node_idx] {
            if other.idx() == li {
                continue;
            }
            q_balance -= sign * net.links[other.idx()].flow;
        }
        // valve_sign * q_valve must supply the residual
        net.links[li].flow = valve_sign * q_balance;
    }
}

/// Enforce tank level limits: a full tank blocks inflow, an empty tank
/// blocks outflow. Plain pipes temp-closed here reopen once the head
/// difference no longer pushes the wrong way. Returns the number of
/// status changes.
fn apply_tank_limits(net: &mut Network) -> usize {
    let mut changes = 0usize;
    for li in 0..net.links.len() {
        let from = net.links[li].from.idx();
        let to = net.links[li].to.idx();
        let mut blocked = false;
        for &ni in &[from, to] {
            let node = &net.nodes[ni];
            let NodeKind::Tank(tank) = &node.kind else {
                continue;
            };
            let level = node.head - node.elevation;
            let other = if ni == from { to } else { from };
            let h_other = net.nodes[other].head;
            let full = level >= tank.max_level - LEVEL_TOL;
            let empty = level <= tank.min_level + LEVEL_TOL;
            if (full && h_other > node.head) || (empty && h_other < node.head) {
                blocked = true;
            }
        }
        let link = &mut net.links[li];
        if blocked {
            if !link.status.is_closed() {
                link.status = LinkStatus::TempClosed;
                link.flow = ZERO_FLOW;
                changes += 1;
            }
        } else if link.status == LinkStatus::TempClosed {
            // pumps and check valves reopen through their own machines
            if let aq_network::LinkKind::Pipe(p) = &link.kind {
                if !p.has_check_valve {
                    link.status = LinkStatus::Open;
                    changes += 1;
                }
            }
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use aq_network::{Link, Node, Pipe, SolverKind, Tank};

    fn solve_simple(net: &mut Network) -> BalanceResults {
        net.convert_units();
        net.initialize(true).unwrap();
        let mut system = NodalSystem::new(net, SolverKind::Lu);
        let adjacency = net.adjacency();
        solve_balance(net, &mut system, &adjacency).unwrap()
    }

    /// Reservoir at 100 ft feeding one junction through a single pipe.
    #[test]
    fn single_pipe_balances() {
        let mut net = Network::new();
        net.options.flow_units = aq_core::FlowUnits::Cfs;
        let r = net.add_node(Node::reservoir("R", 100.0)).unwrap();
        let j = net.add_node(Node::junction("J", 0.0)).unwrap();
        let mut link = Link::pipe("P1", r, j, Pipe::new(1000.0, 130.0));
        link.diameter = 12.0; // inches in US units
        net.add_link(link).unwrap();

        // fixed demand of 1 cfs
        net.convert_units();
        net.initialize(true).unwrap();
        net.nodes[1].demand = 1.0;
        let mut system = NodalSystem::new(&net, SolverKind::Lu);
        let adjacency = net.adjacency();
        let res = solve_balance(&mut net, &mut system, &adjacency).unwrap();
        assert!(res.converged, "single pipe must converge");

        // continuity: pipe carries exactly the demand
        assert!((net.links[0].flow - 1.0).abs() < 1e-3);
        // energy: head difference equals the pipe's head loss
        let h_diff = net.nodes[0].head - net.nodes[1].head;
        assert!((h_diff - net.links[0].hloss).abs() < 1e-3);
        assert!(net.nodes[1].head < 100.0);
    }

    /// Two tanks exchange flow from the higher level to the lower one.
    #[test]
    fn two_tanks_flow_downhill() {
        let mut net = Network::new();
        net.options.flow_units = aq_core::FlowUnits::Cfs;
        let t1 = net
            .add_node(Node::tank(
                "T1",
                0.0,
                Tank {
                    init_level: 100.0,
                    min_level: 0.0,
                    max_level: 120.0,
                    diameter: 50.0,
                    volume_curve: None,
                    volume: 0.0,
                    past_net_inflow: 0.0,
                },
            ))
            .unwrap();
        let t2 = net
            .add_node(Node::tank(
                "T2",
                0.0,
                Tank {
                    init_level: 50.0,
                    min_level: 0.0,
                    max_level: 120.0,
                    diameter: 50.0,
                    volume_curve: None,
                    volume: 0.0,
                    past_net_inflow: 0.0,
                },
            ))
            .unwrap();
        let mut link = Link::pipe("P1", t1, t2, Pipe::new(1000.0, 130.0));
        link.diameter = 12.0;
        net.add_link(link).unwrap();

        let res = solve_simple(&mut net);
        assert!(res.converged);
        assert!(net.links[0].flow > 0.0, "flow runs from T1 down to T2");
    }
}
