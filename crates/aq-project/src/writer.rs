//! Canonical input-file writer: the inverse of the reader, in user units.

use crate::error::ProjectResult;
use aq_network::{
    ControlAction, ControlCondition, HeadLossModel, LinkKind, LinkStatus, Modulation, Network,
    NodeKind, ValveKind,
};
use aq_core::{Quantity, UnitSystem};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

pub fn write_inp(path: &Path, net: &Network, title: &str) -> ProjectResult<()> {
    let text = render_inp(net, title);
    fs::write(path, text)?;
    Ok(())
}

/// Render the network back to input-file text. Loading the result yields
/// an identical topology and identical option values.
pub fn render_inp(net: &Network, title: &str) -> String {
    let units = net.units();
    let ucf_len = units.ucf(Quantity::Length);
    let ucf_diam = units.ucf(Quantity::Diameter);
    let ucf_flow = units.ucf(Quantity::Flow);
    let ucf_press = units.ucf(Quantity::Pressure);
    let mut out = String::new();

    writeln!(out, "[TITLE]").unwrap();
    if !title.is_empty() {
        writeln!(out, "{title}").unwrap();
    }

    writeln!(out, "\n[OPTIONS]").unwrap();
    writeln!(out, "UNITS {}", net.options.flow_units.keyword()).unwrap();
    writeln!(out, "HEADLOSS {}", net.options.head_loss_model.keyword()).unwrap();
    writeln!(out, "ACCURACY {}", net.options.accuracy).unwrap();
    writeln!(out, "TRIALS {}", net.options.max_trials).unwrap();
    let solver = match net.options.solver {
        aq_network::SolverKind::Lu => "LU",
        aq_network::SolverKind::Cg => "CG",
    };
    writeln!(out, "SOLVER {solver}").unwrap();
    let rep = match net.options.ccv_representation {
        aq_network::CcvRepresentation::Toe => "TOE",
        aq_network::CcvRepresentation::Cd => "CD",
    };
    writeln!(out, "VALVE REP {rep}").unwrap();
    match net.options.control_law {
        aq_network::ControlLaw::Physical {
            alpha_open,
            alpha_close,
        } => {
            writeln!(out, "CONTROL LAW PHYSICAL").unwrap();
            writeln!(out, "ALPHA OPEN {alpha_open}").unwrap();
            writeln!(out, "ALPHA CLOSE {alpha_close}").unwrap();
        }
        aq_network::ControlLaw::Pid { kp, ki, kd } => {
            writeln!(out, "CONTROL LAW PID").unwrap();
            writeln!(out, "PID KP {kp}").unwrap();
            writeln!(out, "PID KI {ki}").unwrap();
            writeln!(out, "PID KD {kd}").unwrap();
        }
    }
    writeln!(out, "DEMAND MULTIPLIER {}", net.options.demand_multiplier).unwrap();
    writeln!(out, "EMITTER EXPONENT {}", net.options.emitter_exponent).unwrap();
    writeln!(out, "LEAK EXPONENT {}", net.options.leak_exponent).unwrap();
    writeln!(out, "PUMP EFFICIENCY {}", net.options.pump_efficiency).unwrap();

    writeln!(out, "\n[TIMES]").unwrap();
    writeln!(out, "DURATION {}", clock(net.options.duration)).unwrap();
    writeln!(out, "HYDRAULIC TIMESTEP {}", clock(net.options.hyd_step)).unwrap();
    writeln!(out, "PATTERN TIMESTEP {}", clock(net.options.pattern_step)).unwrap();
    writeln!(out, "REPORT TIMESTEP {}", clock(net.options.report_step)).unwrap();

    if !net.curves.is_empty() {
        writeln!(out, "\n[CURVES]").unwrap();
        for curve in &net.curves {
            for (x, y) in curve.points() {
                writeln!(out, "{} {} {}", curve.name, fmt(x), fmt(y)).unwrap();
            }
        }
    }

    if !net.patterns.is_empty() {
        writeln!(out, "\n[PATTERNS]").unwrap();
        for pattern in &net.patterns {
            write!(out, "{}", pattern.name).unwrap();
            for f in pattern.factors() {
                write!(out, " {}", fmt(*f)).unwrap();
            }
            writeln!(out).unwrap();
        }
    }

    if !net.schedules.is_empty() {
        writeln!(out, "\n[SCHEDULES]").unwrap();
        for schedule in &net.schedules {
            for iv in schedule.intervals() {
                writeln!(
                    out,
                    "{} {} {} {}",
                    schedule.name,
                    clock(iv.start),
                    clock(iv.end),
                    iv.mode.keyword()
                )
                .unwrap();
            }
        }
    }

    writeln!(out, "\n[RESERVOIRS]").unwrap();
    for node in &net.nodes {
        if let NodeKind::Reservoir(r) = &node.kind {
            write!(out, "{} {}", node.name, fmt(r.base_head * ucf_len)).unwrap();
            if let Some(p) = r.head_pattern {
                write!(out, " {}", net.patterns[p.idx()].name).unwrap();
            }
            writeln!(out).unwrap();
        }
    }

    writeln!(out, "\n[JUNCTIONS]").unwrap();
    for node in &net.nodes {
        if let NodeKind::Junction(j) = &node.kind {
            write!(
                out,
                "{} {} {}",
                node.name,
                fmt(node.elevation * ucf_len),
                fmt(j.base_demand * ucf_flow)
            )
            .unwrap();
            if let Some(p) = j.demand_pattern {
                write!(out, " {}", net.patterns[p.idx()].name).unwrap();
            }
            writeln!(out).unwrap();
        }
    }

    writeln!(out, "\n[TANKS]").unwrap();
    for node in &net.nodes {
        if let NodeKind::Tank(t) = &node.kind {
            write!(
                out,
                "{} {} {} {} {} {}",
                node.name,
                fmt(node.elevation * ucf_len),
                fmt(t.init_level * ucf_len),
                fmt(t.min_level * ucf_len),
                fmt(t.max_level * ucf_len),
                fmt(t.diameter * ucf_len)
            )
            .unwrap();
            match t.volume_curve {
                Some(c) => writeln!(out, " {}", net.curves[c.idx()].name).unwrap(),
                None => writeln!(out).unwrap(),
            }
        }
    }

    writeln!(out, "\n[PIPES]").unwrap();
    for link in &net.links {
        if let LinkKind::Pipe(p) = &link.kind {
            let roughness = match (net.options.head_loss_model, units.system()) {
                (HeadLossModel::DarcyWeisbach, UnitSystem::SI) => {
                    p.roughness * 1000.0 * aq_core::M_PER_FT
                }
                (HeadLossModel::DarcyWeisbach, UnitSystem::US) => p.roughness * 1000.0,
                _ => p.roughness,
            };
            write!(
                out,
                "{} {} {} {} {} {} {}",
                link.name,
                net.node(link.from).name,
                net.node(link.to).name,
                fmt(p.length * ucf_len),
                fmt(link.diameter * ucf_diam),
                fmt(roughness),
                fmt(p.loss_coeff)
            )
            .unwrap();
            if p.has_check_valve {
                writeln!(out, " CV").unwrap();
            } else if link.init_status == LinkStatus::Closed {
                writeln!(out, " CLOSED").unwrap();
            } else {
                writeln!(out).unwrap();
            }
        }
    }

    writeln!(out, "\n[PUMPS]").unwrap();
    for link in &net.links {
        if let LinkKind::Pump(p) = &link.kind {
            write!(
                out,
                "{} {} {}",
                link.name,
                net.node(link.from).name,
                net.node(link.to).name
            )
            .unwrap();
            if let Some(c) = p.curve_id {
                write!(out, " HEAD {}", net.curves[c.idx()].name).unwrap();
            }
            if p.init_speed != 1.0 {
                write!(out, " SPEED {}", fmt(p.init_speed)).unwrap();
            }
            if let Some(pat) = p.speed_pattern {
                write!(out, " PATTERN {}", net.patterns[pat.idx()].name).unwrap();
            }
            writeln!(out).unwrap();
        }
    }

    writeln!(out, "\n[VALVES]").unwrap();
    for link in &net.links {
        if let LinkKind::Valve(v) = &link.kind {
            write!(
                out,
                "{} {} {} {} {}",
                link.name,
                net.node(link.from).name,
                net.node(link.to).name,
                fmt(link.diameter * ucf_diam),
                v.kind.keyword()
            )
            .unwrap();
            match v.kind {
                ValveKind::Gpv => {
                    if let Some(c) = v.gpv_curve {
                        write!(out, " {}", net.curves[c.idx()].name).unwrap();
                    }
                }
                ValveKind::Dprv => {
                    if let Some(m) = &v.modulation {
                        write!(out, " {}", m.keyword()).unwrap();
                        match m {
                            Modulation::FixedOutlet { pressure } => {
                                write!(out, " {}", fmt(pressure * ucf_press)).unwrap();
                            }
                            Modulation::TimeModulated {
                                day_pressure,
                                night_pressure,
                                schedule,
                            } => {
                                write!(
                                    out,
                                    " {} {} {}",
                                    fmt(day_pressure * ucf_press),
                                    fmt(night_pressure * ucf_press),
                                    net.schedules[schedule.idx()].name
                                )
                                .unwrap();
                            }
                            Modulation::FlowModulated { a, b, c } => {
                                write!(out, " {} {} {}", fmt(*a), fmt(*b), fmt(*c)).unwrap();
                            }
                            Modulation::RemoteNode { node, pressure } => {
                                write!(
                                    out,
                                    " {} {}",
                                    net.node(*node).name,
                                    fmt(pressure * ucf_press)
                                )
                                .unwrap();
                            }
                        }
                    }
                }
                _ => {
                    write!(out, " {}", fmt(v.convert_setting_back(v.init_setting, &units)))
                        .unwrap();
                }
            }
            writeln!(out, " {}", fmt(v.loss_coeff)).unwrap();
        }
    }

    let leaky: Vec<_> = net.links.iter().filter(|l| l.leak_coeff > 0.0).collect();
    if !leaky.is_empty() {
        let leak_exp = net.options.leak_exponent;
        writeln!(out, "\n[LEAKAGE]").unwrap();
        for link in leaky {
            let user = link.leak_coeff * ucf_flow / ucf_press.powf(leak_exp);
            writeln!(out, "{} {}", link.name, fmt(user)).unwrap();
        }
    }

    let emitters: Vec<_> = net
        .nodes
        .iter()
        .filter_map(|n| match &n.kind {
            NodeKind::Junction(j) if j.emitter_coeff > 0.0 => Some((n, j)),
            _ => None,
        })
        .collect();
    if !emitters.is_empty() {
        let exp = net.options.emitter_exponent;
        writeln!(out, "\n[EMITTERS]").unwrap();
        for (node, j) in emitters {
            let user = j.emitter_coeff * ucf_flow / ucf_press.powf(exp);
            writeln!(out, "{} {}", node.name, fmt(user)).unwrap();
        }
    }

    let fixed_valves: Vec<_> = net
        .links
        .iter()
        .filter(|l| {
            matches!(l.kind, LinkKind::Valve(_))
                && matches!(l.init_status, LinkStatus::Open | LinkStatus::Closed)
        })
        .collect();
    if !fixed_valves.is_empty() {
        writeln!(out, "\n[STATUS]").unwrap();
        for link in fixed_valves {
            writeln!(out, "{} {}", link.name, link.init_status.keyword()).unwrap();
        }
    }

    if !net.controls.is_empty() {
        writeln!(out, "\n[CONTROLS]").unwrap();
        for control in &net.controls {
            let link = net.link(control.link);
            write!(out, "LINK {}", link.name).unwrap();
            match control.action {
                ControlAction::Status(s) => write!(out, " {}", s.keyword()).unwrap(),
                ControlAction::Setting(v) => {
                    let user = match link.as_valve() {
                        Some(valve) => valve.convert_setting_back(v, &units),
                        None => v,
                    };
                    write!(out, " {}", fmt(user)).unwrap();
                }
            }
            match control.condition {
                ControlCondition::AtTime(t) => writeln!(out, " AT TIME {}", clock(t)).unwrap(),
                ControlCondition::NodeAbove { node, head }
                | ControlCondition::NodeBelow { node, head } => {
                    let n = net.node(node);
                    let offset = head - n.elevation;
                    let user = match n.kind {
                        NodeKind::Tank(_) => offset * ucf_len,
                        _ => offset * ucf_press,
                    };
                    let cmp = match control.condition {
                        ControlCondition::NodeAbove { .. } => "ABOVE",
                        _ => "BELOW",
                    };
                    writeln!(out, " IF NODE {} {} {}", n.name, cmp, fmt(user)).unwrap();
                }
            }
        }
    }

    if net.options.trace != Default::default() || net.options.report_detail {
        writeln!(out, "\n[REPORT]").unwrap();
        if net.options.report_detail {
            writeln!(out, "STATUS YES").unwrap();
        }
        if let Some(p) = &net.options.trace.pressure_flow_path {
            writeln!(out, "TRACEFILE {p}").unwrap();
        }
        if let Some(p) = &net.options.trace.valve_opening_path {
            writeln!(out, "XMFILE {p}").unwrap();
        }
        for n in &net.options.trace.nodes {
            writeln!(out, "TRACE NODE {n}").unwrap();
        }
        for l in &net.options.trace.links {
            writeln!(out, "TRACE LINK {l}").unwrap();
        }
    }

    out
}

/// Seconds to `H:MM:SS`.
fn clock(t: u64) -> String {
    format!("{}:{:02}:{:02}", t / 3600, (t % 3600) / 60, t % 60)
}

/// Shortest round-trippable float formatting.
fn fmt(v: f64) -> String {
    // Display of f64 in Rust prints the shortest string that reparses
    // to the same value
    format!("{v}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_formats() {
        assert_eq!(clock(0), "0:00:00");
        assert_eq!(clock(9000), "2:30:00");
        assert_eq!(clock(86400), "24:00:00");
    }

    #[test]
    fn float_formatting_round_trips() {
        for v in [0.1, 1.0 / 3.0, 123.456e-7] {
            let s = fmt(v);
            assert_eq!(s.parse::<f64>().unwrap(), v);
        }
    }
}
