//! Steady-state network scenarios solved through the balance engine.

use aq_network::{
    Link, LinkStatus, Network, Node, NodeKind, Pipe, Tank, Valve, ValveKind,
};
use aq_core::{FlowUnits, LPS_PER_CFS, M_PER_FT};
use aq_solver::{solve_balance, NodalSystem};

fn lps(v: f64) -> f64 {
    v / LPS_PER_CFS
}

fn si_net() -> Network {
    let mut net = Network::new();
    net.options.flow_units = FlowUnits::Lps;
    net
}

fn solve(net: &mut Network) -> aq_solver::BalanceResults {
    net.convert_units();
    net.initialize(true).unwrap();
    // demands are pattern-free here: base values become actual values
    for node in &mut net.nodes {
        if let NodeKind::Junction(j) = &node.kind {
            node.demand = j.base_demand;
        }
    }
    let mut system = NodalSystem::new(net, net.options.solver);
    let adjacency = net.adjacency();
    solve_balance(net, &mut system, &adjacency).unwrap()
}

fn pipe(name: &str, from: aq_core::NodeId, to: aq_core::NodeId, len_m: f64, d_mm: f64) -> Link {
    let mut link = Link::pipe(name, from, to, Pipe::new(len_m, 130.0));
    link.diameter = d_mm;
    link
}

/// Reservoir (100 m) -> 1 km of 200 mm pipe -> junction drawing 10 L/s.
/// Flow must equal the demand and the junction head must drop by the
/// Hazen-Williams loss.
#[test]
fn reservoir_pipe_junction() {
    let mut net = si_net();
    let r = net.add_node(Node::reservoir("R1", 100.0)).unwrap();
    let mut j = Node::junction("J1", 0.0);
    if let NodeKind::Junction(jx) = &mut j.kind {
        jx.base_demand = 10.0; // L/s, converted on load
    }
    let j = net.add_node(j).unwrap();
    net.add_link(pipe("P1", r, j, 1000.0, 200.0)).unwrap();

    let results = solve(&mut net);
    assert!(results.converged);

    // continuity
    assert!((net.links[0].flow - lps(10.0)).abs() < 1e-4);

    // junction head: 100 m minus the Hazen-Williams loss
    // (SI closed form: 10.67*L*Q^1.852 / (C^1.852 * D^4.871))
    let q = 0.010_f64; // m^3/s
    let hl_m = 10.67 * 1000.0 * q.powf(1.852) / (130.0_f64.powf(1.852) * 0.2_f64.powf(4.871));
    let head_m = net.nodes[1].head * M_PER_FT;
    assert!(
        (head_m - (100.0 - hl_m)).abs() < 0.05,
        "junction head {head_m:.3} m vs expected {:.3} m",
        100.0 - hl_m
    );

    // energy consistency across the link
    let h_diff = net.nodes[0].head - net.nodes[1].head;
    assert!((h_diff - net.links[0].hloss).abs() < 1e-3);
}

/// Reservoir -> pipe -> PRV set to 40 m -> pipe -> junction. The valve
/// goes ACTIVE and pins its downstream pressure at the setting.
#[test]
fn prv_regulates_downstream_pressure() {
    let mut net = si_net();
    let r = net.add_node(Node::reservoir("R1", 100.0)).unwrap();
    let j1 = net.add_node(Node::junction("J1", 0.0)).unwrap();
    let j2 = net.add_node(Node::junction("J2", 0.0)).unwrap();
    let mut j3 = Node::junction("J3", 0.0);
    if let NodeKind::Junction(jx) = &mut j3.kind {
        jx.base_demand = 5.0;
    }
    let j3 = net.add_node(j3).unwrap();

    net.add_link(pipe("P1", r, j1, 500.0, 200.0)).unwrap();
    let mut v = Valve::new(ValveKind::Prv);
    v.init_setting = 40.0; // meters
    v.setting = 40.0;
    let mut vlink = Link::valve("V1", j1, j2, v);
    vlink.diameter = 200.0;
    net.add_link(vlink).unwrap();
    net.add_link(pipe("P2", j2, j3, 100.0, 200.0)).unwrap();

    let results = solve(&mut net);
    assert!(results.converged);
    assert_eq!(net.links[1].status, LinkStatus::Active);

    let p_j2_m = net.nodes[2].pressure() * M_PER_FT;
    assert!(
        (p_j2_m - 40.0).abs() < 0.1,
        "controlled pressure {p_j2_m:.3} m should sit at the 40 m setting"
    );
    // the demand node sits just below the setting (100 m of short pipe)
    let p_j3_m = net.nodes[3].pressure() * M_PER_FT;
    assert!(p_j3_m < 40.0 && p_j3_m > 39.0);

    // valve carries the downstream demand
    assert!((net.links[1].flow - lps(5.0)).abs() < 1e-3);
}

/// Two connected tanks: water runs downhill, and reverses once the
/// levels are swapped.
#[test]
fn tank_to_tank_flow_direction() {
    // levels in user meters; conversion happens on load
    let tank = |level: f64| Tank {
        init_level: level,
        min_level: 0.5,
        max_level: 150.0,
        diameter: 30.0,
        volume_curve: None,
        volume: 0.0,
        past_net_inflow: 0.0,
    };

    let mut net = si_net();
    let t1 = net.add_node(Node::tank("T1", 0.0, tank(100.0))).unwrap();
    let t2 = net.add_node(Node::tank("T2", 0.0, tank(50.0))).unwrap();
    net.add_link(pipe("P1", t1, t2, 800.0, 250.0)).unwrap();
    let results = solve(&mut net);
    assert!(results.converged);
    assert!(net.links[0].flow > 0.0, "flow must run from T1 to T2");

    // reversed levels reverse the flow
    let mut net = si_net();
    let t1 = net.add_node(Node::tank("T1", 0.0, tank(50.0))).unwrap();
    let t2 = net.add_node(Node::tank("T2", 0.0, tank(100.0))).unwrap();
    net.add_link(pipe("P1", t1, t2, 800.0, 250.0)).unwrap();
    let results = solve(&mut net);
    assert!(results.converged);
    assert!(net.links[0].flow < 0.0, "flow must reverse toward T1");
}

/// A closed CCV (setting zero) on the only path to a demand node: the
/// solve still converges, the valve passes no flow, and the cut-off
/// demand is reported unmet.
#[test]
fn closed_ccv_isolates_demand() {
    let mut net = si_net();
    let r = net.add_node(Node::reservoir("R1", 100.0)).unwrap();
    let j1 = net.add_node(Node::junction("J1", 0.0)).unwrap();
    let mut j2 = Node::junction("J2", 0.0);
    if let NodeKind::Junction(jx) = &mut j2.kind {
        jx.base_demand = 5.0;
    }
    let j2 = net.add_node(j2).unwrap();

    net.add_link(pipe("P1", r, j1, 500.0, 200.0)).unwrap();
    let mut v = Valve::new(ValveKind::Ccv);
    v.init_setting = 0.0;
    v.setting = 0.0;
    let mut vlink = Link::valve("V1", j1, j2, v);
    vlink.diameter = 200.0;
    net.add_link(vlink).unwrap();

    let results = solve(&mut net);
    assert!(results.converged, "isolation must not diverge");
    assert_eq!(net.links[1].status, LinkStatus::Closed);
    assert!(
        net.links[1].flow.abs() <= 1e-4,
        "closed valve flow {} must be negligible",
        net.links[1].flow
    );
    assert!(
        (results.unmet_demand - lps(5.0)).abs() < 1e-6,
        "the isolated junction's demand goes unmet"
    );
    // the supplied side is untouched: J1 floats at reservoir head
    assert!((net.nodes[1].head - net.nodes[0].head).abs() < 0.1);
}
