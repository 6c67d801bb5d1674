//! Input-file round-trip: load -> save -> load preserves the network.

use aq_core::Tolerances;
use aq_network::{LinkKind, NodeKind};
use aq_project::{parse_inp, render_inp};

const FULL_INP: &str = "\
[TITLE]
Round-trip fixture

[OPTIONS]
UNITS LPS
HEADLOSS H-W
ACCURACY 0.0005
TRIALS 80
SOLVER CG
VALVE REP CD
CONTROL LAW PID
PID KP -0.000001365
PID KI 0.000000104
PID KD 0.00000067527
DEMAND MULTIPLIER 1.2
LEAK EXPONENT 1.18

[TIMES]
DURATION 24:00
HYDRAULIC TIMESTEP 0:30
PATTERN TIMESTEP 2:00
REPORT TIMESTEP 1:00

[CURVES]
PC1 20 55
VC1 0 0
VC1 5 800

[PATTERNS]
D1 0.5 0.8 1.4 1.1

[SCHEDULES]
S1 0:00 6:00 NIGHT
S1 6:00 22:00 DAY
S1 22:00 24:00 NIGHT

[RESERVOIRS]
R1 120

[JUNCTIONS]
J1 10 4 D1
J2 5 6
J3 2 0

[TANKS]
T1 80 3 0.5 6 25 VC1

[PIPES]
P1 R1 J1 900 250 130 0.5
P2 J1 J2 400 200 120 0
P3 J2 T1 600 150 110 0 CV

[PUMPS]
PU1 R1 J1 HEAD PC1 SPEED 1.1

[VALVES]
V1 J1 J2 200 PRV 35 0.2
V2 J2 J3 150 DPRV TM 40 25 S1 0.1

[LEAKAGE]
P2 0.002

[EMITTERS]
J2 0.15

[STATUS]
V1 OPEN

[CONTROLS]
LINK P2 CLOSED AT TIME 6:00
LINK P2 OPEN IF NODE T1 BELOW 1.5

[REPORT]
STATUS YES
TRACE NODE J2
";

fn close(a: f64, b: f64) -> bool {
    Tolerances::new(1e-9, 1e-9).close(a, b)
}

#[test]
fn load_save_load_is_idempotent() {
    let (net1, title1) = parse_inp(FULL_INP).expect("fixture parses");
    let text2 = render_inp(&net1, &title1);
    let (net2, title2) = parse_inp(&text2).expect("rendered text parses");

    assert_eq!(title1, title2);

    // topology: same elements, same names, same endpoints
    assert_eq!(net1.node_count(), net2.node_count());
    assert_eq!(net1.link_count(), net2.link_count());
    for (a, b) in net1.nodes.iter().zip(&net2.nodes) {
        assert_eq!(a.name, b.name);
        assert!(close(a.elevation, b.elevation), "elevation of {}", a.name);
        assert_eq!(
            std::mem::discriminant(&a.kind),
            std::mem::discriminant(&b.kind)
        );
    }
    for (a, b) in net1.links.iter().zip(&net2.links) {
        assert_eq!(a.name, b.name);
        assert_eq!(net1.node(a.from).name, net2.node(b.from).name);
        assert_eq!(net1.node(a.to).name, net2.node(b.to).name);
        assert!(close(a.diameter, b.diameter), "diameter of {}", a.name);
        assert_eq!(a.init_status, b.init_status);
        assert!(close(a.leak_coeff, b.leak_coeff));
        match (&a.kind, &b.kind) {
            (LinkKind::Pipe(p1), LinkKind::Pipe(p2)) => {
                assert!(close(p1.length, p2.length));
                assert!(close(p1.roughness, p2.roughness));
                assert_eq!(p1.has_check_valve, p2.has_check_valve);
            }
            (LinkKind::Pump(p1), LinkKind::Pump(p2)) => {
                assert!(close(p1.init_speed, p2.init_speed));
                assert_eq!(p1.curve_id.is_some(), p2.curve_id.is_some());
            }
            (LinkKind::Valve(v1), LinkKind::Valve(v2)) => {
                assert_eq!(v1.kind, v2.kind);
                assert!(close(v1.init_setting, v2.init_setting));
                assert_eq!(v1.modulation.is_some(), v2.modulation.is_some());
            }
            other => panic!("link kind changed across round trip: {other:?}"),
        }
    }

    // identical option values
    assert_eq!(net1.options, net2.options);

    // tables survive
    assert_eq!(net1.curves.len(), net2.curves.len());
    assert_eq!(net1.patterns.len(), net2.patterns.len());
    assert_eq!(net1.schedules.len(), net2.schedules.len());
    assert_eq!(net1.controls.len(), net2.controls.len());
    for (a, b) in net1.controls.iter().zip(&net2.controls) {
        assert_eq!(
            std::mem::discriminant(&a.condition),
            std::mem::discriminant(&b.condition)
        );
    }

    // a second cycle preserves structure just the same
    let text3 = render_inp(&net2, &title2);
    let (net3, _) = parse_inp(&text3).expect("second render parses");
    assert_eq!(net2.node_count(), net3.node_count());
    assert_eq!(net2.link_count(), net3.link_count());
    assert_eq!(net2.options, net3.options);
    assert_eq!(text2.lines().count(), text3.lines().count());
}

#[test]
fn junction_demands_survive_round_trip() {
    let (net1, title) = parse_inp(FULL_INP).unwrap();
    let (net2, _) = parse_inp(&render_inp(&net1, &title)).unwrap();
    for (a, b) in net1.nodes.iter().zip(&net2.nodes) {
        if let (NodeKind::Junction(j1), NodeKind::Junction(j2)) = (&a.kind, &b.kind) {
            assert!(close(j1.base_demand, j2.base_demand), "demand of {}", a.name);
            assert!(close(j1.emitter_coeff, j2.emitter_coeff));
            assert_eq!(j1.demand_pattern.is_some(), j2.demand_pattern.is_some());
        }
    }
}
