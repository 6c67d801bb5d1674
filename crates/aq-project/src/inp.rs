//! Free-format, section-delimited input file reader.
//!
//! Sections may appear in any order; lines hold whitespace-separated
//! fields with `;` comments. The reader fills a [`Network`] in user
//! units, converts it, and resolves the unit-dependent sections last.

use crate::error::{ProjectError, ProjectResult};
use aq_network::{
    Control, ControlAction, ControlCondition, Curve, DayNight, HeadLossModel, Link, LinkStatus,
    Modulation, Network, Node, NodeKind, Pattern, Pipe, Pump, Schedule, ScheduleInterval, Tank,
    Valve, ValveKind,
};
use aq_core::{FlowUnits, Quantity};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const SECTIONS: &[&str] = &[
    "TITLE",
    "JUNCTIONS",
    "RESERVOIRS",
    "TANKS",
    "PIPES",
    "PUMPS",
    "VALVES",
    "TAGS",
    "EMITTERS",
    "LEAKAGE",
    "DEMANDS",
    "STATUS",
    "CONTROLS",
    "PATTERNS",
    "CURVES",
    "SCHEDULES",
    "TIMES",
    "OPTIONS",
    "REPORT",
];

/// A raw input line with its 1-based position in the file.
type RawLine = (usize, String);

pub fn read_inp(path: &Path) -> ProjectResult<(Network, String)> {
    let text = fs::read_to_string(path).map_err(|source| ProjectError::CannotOpenInput {
        path: path.to_path_buf(),
        source,
    })?;
    parse_inp(&text)
}

/// Parse input text into a fully converted network plus the title block.
pub fn parse_inp(text: &str) -> ProjectResult<(Network, String)> {
    let sections = split_sections(text)?;
    let mut net = Network::new();

    parse_options(&mut net, sections.get("OPTIONS"))?;
    parse_times(&mut net, sections.get("TIMES"))?;
    parse_curves(&mut net, sections.get("CURVES"))?;
    parse_patterns(&mut net, sections.get("PATTERNS"))?;
    parse_schedules(&mut net, sections.get("SCHEDULES"))?;
    parse_junctions(&mut net, sections.get("JUNCTIONS"))?;
    parse_reservoirs(&mut net, sections.get("RESERVOIRS"))?;
    parse_tanks(&mut net, sections.get("TANKS"))?;
    parse_emitters(&mut net, sections.get("EMITTERS"))?;
    parse_pipes(&mut net, sections.get("PIPES"))?;
    parse_pumps(&mut net, sections.get("PUMPS"))?;
    parse_valves(&mut net, sections.get("VALVES"))?;
    parse_leakage(&mut net, sections.get("LEAKAGE"))?;
    parse_demands(&mut net, sections.get("DEMANDS"))?;
    parse_status(&mut net, sections.get("STATUS"))?;
    parse_report(&mut net, sections.get("REPORT"))?;

    // everything above is in user units
    net.convert_units();

    // controls compare against internal heads, so they resolve last
    parse_controls(&mut net, sections.get("CONTROLS"))?;

    let title = sections
        .get("TITLE")
        .map(|lines| {
            lines
                .iter()
                .map(|(_, l)| l.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();
    Ok((net, title))
}

fn split_sections(text: &str) -> ProjectResult<HashMap<String, Vec<RawLine>>> {
    let mut sections: HashMap<String, Vec<RawLine>> = HashMap::new();
    let mut current: Option<String> = None;
    for (i, raw) in text.lines().enumerate() {
        let line_no = i + 1;
        // strip comments
        let line = match raw.find(';') {
            Some(pos) => &raw[..pos],
            None => raw,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('[') {
            if !line.ends_with(']') {
                return Err(ProjectError::BadSection {
                    header: raw.trim().to_string(),
                });
            }
            let name = line[1..line.len() - 1].trim().to_ascii_uppercase();
            if !SECTIONS.contains(&name.as_str()) {
                return Err(ProjectError::BadSection {
                    header: raw.trim().to_string(),
                });
            }
            current = Some(name.clone());
            sections.entry(name).or_default();
            continue;
        }
        match &current {
            Some(name) => sections
                .get_mut(name)
                .expect("section entry exists")
                .push((line_no, line.to_string())),
            None => {
                return Err(ProjectError::Syntax {
                    line: line_no,
                    message: format!("data before any section header: {line}"),
                })
            }
        }
    }
    Ok(sections)
}

// ---- field helpers -----------------------------------------------------

fn field<'a>(toks: &mut impl Iterator<Item = &'a str>, line: usize) -> ProjectResult<&'a str> {
    toks.next().ok_or(ProjectError::MissingField { line })
}

fn number(tok: &str, line: usize) -> ProjectResult<f64> {
    tok.parse::<f64>().map_err(|_| ProjectError::OutOfRange {
        line,
        value: tok.to_string(),
    })
}

fn opt_number<'a>(
    toks: &mut impl Iterator<Item = &'a str>,
    line: usize,
    default: f64,
) -> ProjectResult<f64> {
    match toks.next() {
        Some(tok) => number(tok, line),
        None => Ok(default),
    }
}

/// Clock times: `H:MM`, `H:MM:SS`, or decimal hours (optionally suffixed
/// HOURS / MIN / SEC). Returns seconds.
fn parse_clock(tok: &str, unit: Option<&str>, line: usize) -> ProjectResult<u64> {
    if tok.contains(':') {
        let mut parts = tok.split(':');
        let h: u64 = parts
            .next()
            .unwrap_or("0")
            .parse()
            .map_err(|_| ProjectError::OutOfRange {
                line,
                value: tok.to_string(),
            })?;
        let m: u64 = parts
            .next()
            .unwrap_or("0")
            .parse()
            .map_err(|_| ProjectError::OutOfRange {
                line,
                value: tok.to_string(),
            })?;
        let s: u64 = parts
            .next()
            .unwrap_or("0")
            .parse()
            .map_err(|_| ProjectError::OutOfRange {
                line,
                value: tok.to_string(),
            })?;
        return Ok(h * 3600 + m * 60 + s);
    }
    let v = number(tok, line)?;
    let scale = match unit.map(|u| u.to_ascii_uppercase()) {
        Some(u) if u.starts_with("SEC") => 1.0,
        Some(u) if u.starts_with("MIN") => 60.0,
        _ => 3600.0,
    };
    Ok((v * scale).round() as u64)
}

fn node_ref(net: &Network, name: &str, line: usize) -> ProjectResult<aq_core::NodeId> {
    net.node_id(name)
        .map_err(|_| ProjectError::UnknownReference {
            line,
            kind: "node",
            name: name.to_string(),
        })
}

// ---- per-section parsers ------------------------------------------------

fn parse_options(net: &mut Network, lines: Option<&Vec<RawLine>>) -> ProjectResult<()> {
    let Some(lines) = lines else { return Ok(()) };
    // control-law pieces assemble after the whole section is read
    let mut law_kind: Option<String> = None;
    let mut alpha_open = 1.0e-6;
    let mut alpha_close = 1.0e-6;
    let mut kp = -1.365e-6;
    let mut ki = 1.04e-7;
    let mut kd = 6.7527e-7;

    for (line_no, line) in lines {
        let mut toks = line.split_whitespace();
        let key = field(&mut toks, *line_no)?.to_ascii_uppercase();
        match key.as_str() {
            "UNITS" => {
                let word = field(&mut toks, *line_no)?;
                net.options.flow_units = FlowUnits::from_keyword(word).ok_or_else(|| {
                    ProjectError::UnknownKeyword {
                        line: *line_no,
                        word: word.to_string(),
                    }
                })?;
            }
            "HEADLOSS" => {
                let word = field(&mut toks, *line_no)?;
                net.options.head_loss_model =
                    HeadLossModel::from_keyword(word).ok_or_else(|| {
                        ProjectError::UnknownKeyword {
                            line: *line_no,
                            word: word.to_string(),
                        }
                    })?;
            }
            "ACCURACY" => net.options.accuracy = number(field(&mut toks, *line_no)?, *line_no)?,
            "TRIALS" => {
                net.options.max_trials =
                    number(field(&mut toks, *line_no)?, *line_no)? as usize
            }
            "SOLVER" => {
                let word = field(&mut toks, *line_no)?.to_ascii_uppercase();
                net.options.solver = match word.as_str() {
                    "LU" => aq_network::SolverKind::Lu,
                    "CG" => aq_network::SolverKind::Cg,
                    _ => {
                        return Err(ProjectError::UnknownKeyword {
                            line: *line_no,
                            word,
                        })
                    }
                };
            }
            "VALVE" => {
                // VALVE REP TOE|CD
                let _rep = field(&mut toks, *line_no)?;
                let word = field(&mut toks, *line_no)?.to_ascii_uppercase();
                net.options.ccv_representation = match word.as_str() {
                    "TOE" => aq_network::CcvRepresentation::Toe,
                    "CD" => aq_network::CcvRepresentation::Cd,
                    _ => {
                        return Err(ProjectError::UnknownKeyword {
                            line: *line_no,
                            word,
                        })
                    }
                };
            }
            "CONTROL" => {
                // CONTROL LAW PHYSICAL|PID
                let _law = field(&mut toks, *line_no)?;
                law_kind = Some(field(&mut toks, *line_no)?.to_ascii_uppercase());
            }
            "ALPHA" => {
                let which = field(&mut toks, *line_no)?.to_ascii_uppercase();
                let v = number(field(&mut toks, *line_no)?, *line_no)?;
                match which.as_str() {
                    "OPEN" => alpha_open = v,
                    "CLOSE" => alpha_close = v,
                    _ => {
                        return Err(ProjectError::UnknownKeyword {
                            line: *line_no,
                            word: which,
                        })
                    }
                }
            }
            "PID" => {
                let which = field(&mut toks, *line_no)?.to_ascii_uppercase();
                let v = number(field(&mut toks, *line_no)?, *line_no)?;
                match which.as_str() {
                    "KP" => kp = v,
                    "KI" => ki = v,
                    "KD" => kd = v,
                    _ => {
                        return Err(ProjectError::UnknownKeyword {
                            line: *line_no,
                            word: which,
                        })
                    }
                }
            }
            "DEMAND" => {
                let _mult = field(&mut toks, *line_no)?;
                net.options.demand_multiplier = number(field(&mut toks, *line_no)?, *line_no)?;
            }
            "EMITTER" => {
                let _exp = field(&mut toks, *line_no)?;
                net.options.emitter_exponent = number(field(&mut toks, *line_no)?, *line_no)?;
            }
            "LEAK" => {
                let _exp = field(&mut toks, *line_no)?;
                net.options.leak_exponent = number(field(&mut toks, *line_no)?, *line_no)?;
            }
            "PUMP" => {
                let _eff = field(&mut toks, *line_no)?;
                net.options.pump_efficiency = number(field(&mut toks, *line_no)?, *line_no)?;
            }
            _ => {
                return Err(ProjectError::UnknownKeyword {
                    line: *line_no,
                    word: key,
                })
            }
        }
    }

    match law_kind.as_deref() {
        Some("PID") => {
            net.options.control_law = aq_network::ControlLaw::Pid { kp, ki, kd };
        }
        _ => {
            net.options.control_law = aq_network::ControlLaw::Physical {
                alpha_open,
                alpha_close,
            };
        }
    }
    Ok(())
}

fn parse_times(net: &mut Network, lines: Option<&Vec<RawLine>>) -> ProjectResult<()> {
    let Some(lines) = lines else { return Ok(()) };
    for (line_no, line) in lines {
        let toks: Vec<&str> = line.split_whitespace().collect();
        if toks.is_empty() {
            continue;
        }
        let key = toks[0].to_ascii_uppercase();
        match key.as_str() {
            "DURATION" => {
                let tok = toks
                    .get(1)
                    .copied()
                    .ok_or(ProjectError::MissingField { line: *line_no })?;
                net.options.duration = parse_clock(tok, toks.get(2).copied(), *line_no)?;
            }
            "HYDRAULIC" | "PATTERN" | "REPORT" => {
                // "<kind> TIMESTEP <value> [unit]"
                let tok = toks
                    .get(2)
                    .copied()
                    .ok_or(ProjectError::MissingField { line: *line_no })?;
                let secs = parse_clock(tok, toks.get(3).copied(), *line_no)?;
                match key.as_str() {
                    "HYDRAULIC" => net.options.hyd_step = secs.max(1),
                    "PATTERN" => net.options.pattern_step = secs.max(1),
                    _ => net.options.report_step = secs.max(1),
                }
            }
            _ => {
                return Err(ProjectError::UnknownKeyword {
                    line: *line_no,
                    word: key,
                })
            }
        }
    }
    Ok(())
}

fn parse_curves(net: &mut Network, lines: Option<&Vec<RawLine>>) -> ProjectResult<()> {
    let Some(lines) = lines else { return Ok(()) };
    for (line_no, line) in lines {
        let mut toks = line.split_whitespace();
        let name = field(&mut toks, *line_no)?;
        let x = number(field(&mut toks, *line_no)?, *line_no)?;
        let y = number(field(&mut toks, *line_no)?, *line_no)?;
        let cid = net.add_curve(Curve::new(name))?;
        net.curves[cid.idx()]
            .add_point(x, y)
            .map_err(|_| ProjectError::OutOfRange {
                line: *line_no,
                value: format!("{x}"),
            })?;
    }
    Ok(())
}

fn parse_patterns(net: &mut Network, lines: Option<&Vec<RawLine>>) -> ProjectResult<()> {
    let Some(lines) = lines else { return Ok(()) };
    for (line_no, line) in lines {
        let mut toks = line.split_whitespace();
        let name = field(&mut toks, *line_no)?;
        let pid = net.add_pattern(Pattern::new(name))?;
        for tok in toks {
            let f = number(tok, *line_no)?;
            net.patterns[pid.idx()].add_factor(f);
        }
    }
    Ok(())
}

fn parse_schedules(net: &mut Network, lines: Option<&Vec<RawLine>>) -> ProjectResult<()> {
    let Some(lines) = lines else { return Ok(()) };
    // rows accumulate per schedule name, then validate as one unit
    let mut order: Vec<String> = Vec::new();
    let mut rows: HashMap<String, Vec<ScheduleInterval>> = HashMap::new();
    for (line_no, line) in lines {
        let mut toks = line.split_whitespace();
        let name = field(&mut toks, *line_no)?.to_string();
        let start = parse_clock(field(&mut toks, *line_no)?, None, *line_no)?;
        let end = parse_clock(field(&mut toks, *line_no)?, None, *line_no)?;
        let word = field(&mut toks, *line_no)?;
        let mode = DayNight::from_keyword(word).ok_or_else(|| ProjectError::UnknownKeyword {
            line: *line_no,
            word: word.to_string(),
        })?;
        if !rows.contains_key(&name) {
            order.push(name.clone());
        }
        rows.entry(name).or_default().push(ScheduleInterval {
            start,
            end,
            mode,
        });
    }
    for name in order {
        let intervals = rows.remove(&name).expect("collected above");
        let schedule = Schedule::new(name, intervals)?;
        net.add_schedule(schedule)?;
    }
    Ok(())
}

fn parse_junctions(net: &mut Network, lines: Option<&Vec<RawLine>>) -> ProjectResult<()> {
    let Some(lines) = lines else { return Ok(()) };
    for (line_no, line) in lines {
        let mut toks = line.split_whitespace();
        let name = field(&mut toks, *line_no)?;
        let elev = number(field(&mut toks, *line_no)?, *line_no)?;
        let demand = opt_number(&mut toks, *line_no, 0.0)?;
        let pattern = match toks.next() {
            Some(p) => Some(net.pattern_id(p).map_err(|_| ProjectError::UnknownReference {
                line: *line_no,
                kind: "pattern",
                name: p.to_string(),
            })?),
            None => None,
        };
        let mut node = Node::junction(name, elev);
        if let NodeKind::Junction(j) = &mut node.kind {
            j.base_demand = demand;
            j.demand_pattern = pattern;
        }
        net.add_node(node).map_err(|e| dup_to_project(e, *line_no))?;
    }
    Ok(())
}

fn parse_reservoirs(net: &mut Network, lines: Option<&Vec<RawLine>>) -> ProjectResult<()> {
    let Some(lines) = lines else { return Ok(()) };
    for (line_no, line) in lines {
        let mut toks = line.split_whitespace();
        let name = field(&mut toks, *line_no)?;
        let head = number(field(&mut toks, *line_no)?, *line_no)?;
        let mut node = Node::reservoir(name, head);
        if let Some(p) = toks.next() {
            if let NodeKind::Reservoir(r) = &mut node.kind {
                r.head_pattern =
                    Some(net.pattern_id(p).map_err(|_| ProjectError::UnknownReference {
                        line: *line_no,
                        kind: "pattern",
                        name: p.to_string(),
                    })?);
            }
        }
        net.add_node(node).map_err(|e| dup_to_project(e, *line_no))?;
    }
    Ok(())
}

fn parse_tanks(net: &mut Network, lines: Option<&Vec<RawLine>>) -> ProjectResult<()> {
    let Some(lines) = lines else { return Ok(()) };
    for (line_no, line) in lines {
        let mut toks = line.split_whitespace();
        let name = field(&mut toks, *line_no)?;
        let elev = number(field(&mut toks, *line_no)?, *line_no)?;
        let init_level = number(field(&mut toks, *line_no)?, *line_no)?;
        let min_level = number(field(&mut toks, *line_no)?, *line_no)?;
        let max_level = number(field(&mut toks, *line_no)?, *line_no)?;
        let diameter = number(field(&mut toks, *line_no)?, *line_no)?;
        let volume_curve = match toks.next() {
            Some("*") | None => None,
            Some(c) => Some(net.curve_id(c).map_err(|_| ProjectError::UnknownReference {
                line: *line_no,
                kind: "curve",
                name: c.to_string(),
            })?),
        };
        let tank = Tank {
            init_level,
            min_level,
            max_level,
            diameter,
            volume_curve,
            volume: 0.0,
            past_net_inflow: 0.0,
        };
        net.add_node(Node::tank(name, elev, tank))
            .map_err(|e| dup_to_project(e, *line_no))?;
    }
    Ok(())
}

fn parse_emitters(net: &mut Network, lines: Option<&Vec<RawLine>>) -> ProjectResult<()> {
    let Some(lines) = lines else { return Ok(()) };
    for (line_no, line) in lines {
        let mut toks = line.split_whitespace();
        let name = field(&mut toks, *line_no)?;
        let coeff = number(field(&mut toks, *line_no)?, *line_no)?;
        let id = node_ref(net, name, *line_no)?;
        if let NodeKind::Junction(j) = &mut net.nodes[id.idx()].kind {
            j.emitter_coeff = coeff;
        }
    }
    Ok(())
}

fn parse_pipes(net: &mut Network, lines: Option<&Vec<RawLine>>) -> ProjectResult<()> {
    let Some(lines) = lines else { return Ok(()) };
    for (line_no, line) in lines {
        let mut toks = line.split_whitespace();
        let name = field(&mut toks, *line_no)?;
        let from = node_ref(net, field(&mut toks, *line_no)?, *line_no)?;
        let to = node_ref(net, field(&mut toks, *line_no)?, *line_no)?;
        let length = number(field(&mut toks, *line_no)?, *line_no)?;
        let diameter = number(field(&mut toks, *line_no)?, *line_no)?;
        let roughness = number(field(&mut toks, *line_no)?, *line_no)?;
        let mloss = opt_number(&mut toks, *line_no, 0.0)?;

        let mut pipe = Pipe::new(length, roughness);
        pipe.loss_coeff = mloss;
        let mut status = LinkStatus::Open;
        if let Some(word) = toks.next() {
            match word.to_ascii_uppercase().as_str() {
                "OPEN" => status = LinkStatus::Open,
                "CLOSED" => status = LinkStatus::Closed,
                "CV" => pipe.has_check_valve = true,
                other => {
                    return Err(ProjectError::UnknownKeyword {
                        line: *line_no,
                        word: other.to_string(),
                    })
                }
            }
        }
        let mut link = Link::pipe(name, from, to, pipe);
        link.diameter = diameter;
        link.status = status;
        link.init_status = status;
        net.add_link(link).map_err(|e| dup_to_project(e, *line_no))?;
    }
    Ok(())
}

fn parse_pumps(net: &mut Network, lines: Option<&Vec<RawLine>>) -> ProjectResult<()> {
    let Some(lines) = lines else { return Ok(()) };
    for (line_no, line) in lines {
        let mut toks = line.split_whitespace();
        let name = field(&mut toks, *line_no)?;
        let from = node_ref(net, field(&mut toks, *line_no)?, *line_no)?;
        let to = node_ref(net, field(&mut toks, *line_no)?, *line_no)?;

        let mut pump = Pump::new(None);
        while let Some(key) = toks.next() {
            match key.to_ascii_uppercase().as_str() {
                "HEAD" => {
                    let c = field(&mut toks, *line_no)?;
                    pump.curve_id =
                        Some(net.curve_id(c).map_err(|_| ProjectError::UnknownReference {
                            line: *line_no,
                            kind: "curve",
                            name: c.to_string(),
                        })?);
                }
                "SPEED" => {
                    let v = number(field(&mut toks, *line_no)?, *line_no)?;
                    pump.speed = v;
                    pump.init_speed = v;
                }
                "PATTERN" => {
                    let p = field(&mut toks, *line_no)?;
                    pump.speed_pattern =
                        Some(net.pattern_id(p).map_err(|_| ProjectError::UnknownReference {
                            line: *line_no,
                            kind: "pattern",
                            name: p.to_string(),
                        })?);
                }
                other => {
                    return Err(ProjectError::UnknownKeyword {
                        line: *line_no,
                        word: other.to_string(),
                    })
                }
            }
        }
        net.add_link(Link::pump(name, from, to, pump))
            .map_err(|e| dup_to_project(e, *line_no))?;
    }
    Ok(())
}

fn parse_valves(net: &mut Network, lines: Option<&Vec<RawLine>>) -> ProjectResult<()> {
    let Some(lines) = lines else { return Ok(()) };
    for (line_no, line) in lines {
        let mut toks = line.split_whitespace();
        let name = field(&mut toks, *line_no)?;
        let from = node_ref(net, field(&mut toks, *line_no)?, *line_no)?;
        let to = node_ref(net, field(&mut toks, *line_no)?, *line_no)?;
        let diameter = number(field(&mut toks, *line_no)?, *line_no)?;
        let type_word = field(&mut toks, *line_no)?;
        let kind = ValveKind::from_keyword(type_word).ok_or_else(|| {
            ProjectError::UnknownKeyword {
                line: *line_no,
                word: type_word.to_string(),
            }
        })?;
        let mut valve = Valve::new(kind);

        match kind {
            ValveKind::Gpv => {
                let c = field(&mut toks, *line_no)?;
                valve.gpv_curve =
                    Some(net.curve_id(c).map_err(|_| ProjectError::UnknownReference {
                        line: *line_no,
                        kind: "curve",
                        name: c.to_string(),
                    })?);
            }
            ValveKind::Dprv => {
                let mode = field(&mut toks, *line_no)?.to_ascii_uppercase();
                valve.modulation = Some(match mode.as_str() {
                    "FO" => Modulation::FixedOutlet {
                        pressure: number(field(&mut toks, *line_no)?, *line_no)?,
                    },
                    "TM" => {
                        let day = number(field(&mut toks, *line_no)?, *line_no)?;
                        let night = number(field(&mut toks, *line_no)?, *line_no)?;
                        let s = field(&mut toks, *line_no)?;
                        let schedule =
                            net.schedule_id(s)
                                .map_err(|_| ProjectError::UnknownReference {
                                    line: *line_no,
                                    kind: "schedule",
                                    name: s.to_string(),
                                })?;
                        Modulation::TimeModulated {
                            day_pressure: day,
                            night_pressure: night,
                            schedule,
                        }
                    }
                    "FM" => Modulation::FlowModulated {
                        a: number(field(&mut toks, *line_no)?, *line_no)?,
                        b: number(field(&mut toks, *line_no)?, *line_no)?,
                        c: number(field(&mut toks, *line_no)?, *line_no)?,
                    },
                    "RNM" => {
                        let n = field(&mut toks, *line_no)?;
                        let node = node_ref(net, n, *line_no)?;
                        Modulation::RemoteNode {
                            node,
                            pressure: number(field(&mut toks, *line_no)?, *line_no)?,
                        }
                    }
                    _ => {
                        return Err(ProjectError::UnknownKeyword {
                            line: *line_no,
                            word: mode,
                        })
                    }
                });
            }
            _ => {
                valve.init_setting = number(field(&mut toks, *line_no)?, *line_no)?;
                valve.setting = valve.init_setting;
            }
        }

        valve.loss_coeff = opt_number(&mut toks, *line_no, 0.0)?;
        let mut link = Link::valve(name, from, to, valve);
        link.diameter = diameter;
        net.add_link(link).map_err(|e| dup_to_project(e, *line_no))?;
    }
    Ok(())
}

fn parse_leakage(net: &mut Network, lines: Option<&Vec<RawLine>>) -> ProjectResult<()> {
    let Some(lines) = lines else { return Ok(()) };
    for (line_no, line) in lines {
        let mut toks = line.split_whitespace();
        let name = field(&mut toks, *line_no)?;
        let coeff = number(field(&mut toks, *line_no)?, *line_no)?;
        let id = net.link_id(name).map_err(|_| ProjectError::UnknownReference {
            line: *line_no,
            kind: "link",
            name: name.to_string(),
        })?;
        net.links[id.idx()].leak_coeff = coeff;
    }
    Ok(())
}

fn parse_demands(net: &mut Network, lines: Option<&Vec<RawLine>>) -> ProjectResult<()> {
    let Some(lines) = lines else { return Ok(()) };
    for (line_no, line) in lines {
        let mut toks = line.split_whitespace();
        let name = field(&mut toks, *line_no)?;
        let demand = number(field(&mut toks, *line_no)?, *line_no)?;
        let pattern = match toks.next() {
            Some(p) => Some(net.pattern_id(p).map_err(|_| ProjectError::UnknownReference {
                line: *line_no,
                kind: "pattern",
                name: p.to_string(),
            })?),
            None => None,
        };
        let id = node_ref(net, name, *line_no)?;
        if let NodeKind::Junction(j) = &mut net.nodes[id.idx()].kind {
            j.base_demand = demand;
            if pattern.is_some() {
                j.demand_pattern = pattern;
            }
        }
    }
    Ok(())
}

fn parse_status(net: &mut Network, lines: Option<&Vec<RawLine>>) -> ProjectResult<()> {
    let Some(lines) = lines else { return Ok(()) };
    for (line_no, line) in lines {
        let mut toks = line.split_whitespace();
        let name = field(&mut toks, *line_no)?;
        let word = field(&mut toks, *line_no)?;
        let id = net.link_id(name).map_err(|_| ProjectError::UnknownReference {
            line: *line_no,
            kind: "link",
            name: name.to_string(),
        })?;
        let link = &mut net.links[id.idx()];
        match word.to_ascii_uppercase().as_str() {
            "OPEN" => {
                link.init_status = LinkStatus::Open;
                link.status = LinkStatus::Open;
            }
            "CLOSED" => {
                link.init_status = LinkStatus::Closed;
                link.status = LinkStatus::Closed;
            }
            other => {
                // a numeric value sets a pump's relative speed
                let v = number(other, *line_no)?;
                if let aq_network::LinkKind::Pump(p) = &mut link.kind {
                    p.speed = v;
                    p.init_speed = v;
                } else {
                    return Err(ProjectError::Syntax {
                        line: *line_no,
                        message: format!("numeric status on non-pump link {name}"),
                    });
                }
            }
        }
    }
    Ok(())
}

fn parse_report(net: &mut Network, lines: Option<&Vec<RawLine>>) -> ProjectResult<()> {
    let Some(lines) = lines else { return Ok(()) };
    for (line_no, line) in lines {
        let mut toks = line.split_whitespace();
        let key = field(&mut toks, *line_no)?.to_ascii_uppercase();
        match key.as_str() {
            "STATUS" => {
                let word = field(&mut toks, *line_no)?.to_ascii_uppercase();
                net.options.report_detail = word == "YES" || word == "FULL";
            }
            "TRACEFILE" => {
                net.options.trace.pressure_flow_path =
                    Some(field(&mut toks, *line_no)?.to_string());
            }
            "XMFILE" => {
                net.options.trace.valve_opening_path =
                    Some(field(&mut toks, *line_no)?.to_string());
            }
            "TRACE" => {
                let what = field(&mut toks, *line_no)?.to_ascii_uppercase();
                let name = field(&mut toks, *line_no)?.to_string();
                match what.as_str() {
                    "NODE" => net.options.trace.nodes.push(name),
                    "LINK" => net.options.trace.links.push(name),
                    _ => {
                        return Err(ProjectError::UnknownKeyword {
                            line: *line_no,
                            word: what,
                        })
                    }
                }
            }
            _ => {
                return Err(ProjectError::UnknownKeyword {
                    line: *line_no,
                    word: key,
                })
            }
        }
    }
    Ok(())
}

/// `LINK <id> <status|setting> IF NODE <id> ABOVE|BELOW <value>`
/// `LINK <id> <status|setting> AT TIME <clock>`
fn parse_controls(net: &mut Network, lines: Option<&Vec<RawLine>>) -> ProjectResult<()> {
    let Some(lines) = lines else { return Ok(()) };
    let units = net.units();
    for (line_no, line) in lines {
        let mut toks = line.split_whitespace();
        let lead = field(&mut toks, *line_no)?.to_ascii_uppercase();
        if lead != "LINK" {
            return Err(ProjectError::UnknownKeyword {
                line: *line_no,
                word: lead,
            });
        }
        let link_name = field(&mut toks, *line_no)?;
        let link_id = net
            .link_id(link_name)
            .map_err(|_| ProjectError::UnknownReference {
                line: *line_no,
                kind: "link",
                name: link_name.to_string(),
            })?;
        let action_word = field(&mut toks, *line_no)?;
        let action = match action_word.to_ascii_uppercase().as_str() {
            "OPEN" => ControlAction::Status(LinkStatus::Open),
            "CLOSED" => ControlAction::Status(LinkStatus::Closed),
            other => {
                let raw = number(other, *line_no)?;
                // settings are stored internally; valves convert by kind
                let value = match net.links[link_id.idx()].as_valve() {
                    Some(v) => v.convert_setting(raw, &units),
                    None => raw,
                };
                ControlAction::Setting(value)
            }
        };
        let mode = field(&mut toks, *line_no)?.to_ascii_uppercase();
        let condition = match mode.as_str() {
            "AT" => {
                let _time = field(&mut toks, *line_no)?; // the TIME keyword
                let tok = field(&mut toks, *line_no)?;
                ControlCondition::AtTime(parse_clock(tok, toks.next(), *line_no)?)
            }
            "IF" => {
                let _node = field(&mut toks, *line_no)?; // the NODE keyword
                let node_name = field(&mut toks, *line_no)?;
                let node = node_ref(net, node_name, *line_no)?;
                let cmp = field(&mut toks, *line_no)?.to_ascii_uppercase();
                let raw = number(field(&mut toks, *line_no)?, *line_no)?;
                // tanks compare levels, junctions compare pressures
                let offset = match net.nodes[node.idx()].kind {
                    NodeKind::Tank(_) => units.to_internal(Quantity::Length, raw),
                    _ => units.to_internal(Quantity::Pressure, raw),
                };
                let head = net.nodes[node.idx()].elevation + offset;
                match cmp.as_str() {
                    "ABOVE" => ControlCondition::NodeAbove { node, head },
                    "BELOW" => ControlCondition::NodeBelow { node, head },
                    _ => {
                        return Err(ProjectError::UnknownKeyword {
                            line: *line_no,
                            word: cmp,
                        })
                    }
                }
            }
            _ => {
                return Err(ProjectError::UnknownKeyword {
                    line: *line_no,
                    word: mode,
                })
            }
        };
        net.controls.push(Control {
            link: link_id,
            action,
            condition,
        });
    }
    Ok(())
}

fn dup_to_project(e: aq_network::NetworkError, line: usize) -> ProjectError {
    match e {
        aq_network::NetworkError::DuplicateName { name, .. } => {
            ProjectError::DuplicateName { line, name }
        }
        other => ProjectError::Network(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_INP: &str = "\
[TITLE]
Small test network

[OPTIONS]
UNITS LPS
HEADLOSS H-W

[TIMES]
DURATION 24:00
HYDRAULIC TIMESTEP 1:00

[RESERVOIRS]
R1  100

[JUNCTIONS]
J1  0  10
J2  0  5

[PIPES]
P1  R1 J1  1000  200  130  0
P2  J1 J2  500   150  130  0
";

    #[test]
    fn parses_small_network() {
        let (net, title) = parse_inp(SMALL_INP).unwrap();
        assert_eq!(title, "Small test network");
        assert_eq!(net.node_count(), 3);
        assert_eq!(net.link_count(), 2);
        assert_eq!(net.options.duration, 86400);
        assert_eq!(net.options.hyd_step, 3600);
        assert_eq!(net.options.flow_units, FlowUnits::Lps);
        // demand converted to cfs
        let j1 = &net.nodes[net.node_id("J1").unwrap().idx()];
        if let NodeKind::Junction(j) = &j1.kind {
            assert!((j.base_demand - 10.0 / aq_core::LPS_PER_CFS).abs() < 1e-9);
        } else {
            panic!("J1 must be a junction");
        }
    }

    #[test]
    fn rejects_unknown_section() {
        let err = parse_inp("[NOPE]\nx 1\n").unwrap_err();
        assert!(matches!(err, ProjectError::BadSection { .. }));
    }

    #[test]
    fn rejects_unknown_node_reference() {
        let text = "\
[RESERVOIRS]
R1 100
[PIPES]
P1 R1 MISSING 1000 200 130
";
        let err = parse_inp(text).unwrap_err();
        assert!(matches!(err, ProjectError::UnknownReference { .. }));
    }

    #[test]
    fn parses_dprv_with_schedule() {
        let text = "\
[OPTIONS]
UNITS LPS
[SCHEDULES]
S1 0 10 DAY
S1 10 24 NIGHT
[RESERVOIRS]
R1 100
[JUNCTIONS]
J1 0 10
J2 0 0
[PIPES]
P1 R1 J1 1000 200 130
[VALVES]
V1 J1 J2 200 DPRV TM 40 25 S1 0.1
";
        let (net, _) = parse_inp(text).unwrap();
        let v = net.links[net.link_id("V1").unwrap().idx()]
            .as_valve()
            .unwrap()
            .clone();
        assert_eq!(v.kind, ValveKind::Dprv);
        match v.modulation.unwrap() {
            Modulation::TimeModulated {
                day_pressure,
                night_pressure,
                schedule,
            } => {
                // stored internally in feet of head
                assert!((day_pressure - 40.0 / 0.3048).abs() < 1e-6);
                assert!((night_pressure - 25.0 / 0.3048).abs() < 1e-6);
                assert_eq!(net.schedules[schedule.idx()].intervals().len(), 2);
            }
            other => panic!("expected TM modulation, got {other:?}"),
        }
    }

    #[test]
    fn rejects_gapped_schedule() {
        let text = "\
[SCHEDULES]
S1 0 10 DAY
S1 12 24 NIGHT
[RESERVOIRS]
R1 100
[JUNCTIONS]
J1 0 1
[PIPES]
P1 R1 J1 100 200 130
";
        assert!(parse_inp(text).is_err());
    }

    #[test]
    fn parses_time_based_control() {
        let text = "\
[RESERVOIRS]
R1 100
[JUNCTIONS]
J1 0 1
[PIPES]
P1 R1 J1 100 200 130
[CONTROLS]
LINK P1 CLOSED AT TIME 2:30
";
        let (net, _) = parse_inp(text).unwrap();
        assert_eq!(net.controls.len(), 1);
        assert_eq!(
            net.controls[0].condition,
            ControlCondition::AtTime(9000)
        );
    }
}
