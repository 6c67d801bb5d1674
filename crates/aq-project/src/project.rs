//! The project facade: owns the network, the engines and the result
//! files, and exposes the stepping API used by the CLI and by embedders.

use crate::error::{ProjectError, ProjectResult};
use crate::inp::{parse_inp, read_inp};
use crate::output::{read_output, OutputWriter};
use crate::report::ReportWriter;
use crate::trace::{PressureFlowTrace, ValveOpeningTrace};
use crate::writer::write_inp;
use aq_network::{LinkKind, LinkStatus, Network, NodeKind};
use aq_core::Quantity;
use aq_solver::HydEngine;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Node attribute codes of the programmatic surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeParam {
    Elevation = 0,
    Head = 1,
    Pressure = 2,
    Demand = 3,
}

impl NodeParam {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Elevation),
            1 => Some(Self::Head),
            2 => Some(Self::Pressure),
            3 => Some(Self::Demand),
            _ => None,
        }
    }
}

/// Link attribute codes of the programmatic surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkParam {
    Flow = 0,
    Velocity = 1,
    HeadLoss = 2,
    Status = 3,
    Setting = 4,
    Leakage = 5,
    Opening = 6,
    Diameter = 7,
}

impl LinkParam {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Flow),
            1 => Some(Self::Velocity),
            2 => Some(Self::HeadLoss),
            3 => Some(Self::Status),
            4 => Some(Self::Setting),
            5 => Some(Self::Leakage),
            6 => Some(Self::Opening),
            7 => Some(Self::Diameter),
            _ => None,
        }
    }
}

/// Element kinds countable through the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountKind {
    Nodes,
    Links,
    Junctions,
    Reservoirs,
    Tanks,
    Valves,
}

#[derive(Default)]
pub struct Project {
    network: Network,
    title: String,
    network_empty: bool,
    engine: Option<HydEngine>,
    solver_initialized: bool,
    inp_path: Option<PathBuf>,
    rpt_path: Option<PathBuf>,
    out_path: Option<PathBuf>,
    report_file: Option<BufWriter<File>>,
    output: Option<OutputWriter>,
    pf_trace: Option<PressureFlowTrace>,
    xm_trace: Option<ValveOpeningTrace>,
    msg_log: String,
}

impl Project {
    pub fn new() -> Self {
        Self {
            network_empty: true,
            ..Default::default()
        }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn log_message(&mut self, msg: &str) {
        self.msg_log.push_str(msg);
        self.msg_log.push('\n');
    }

    /// Load a project from an input file, replacing any current network.
    pub fn load(&mut self, path: &Path) -> ProjectResult<()> {
        self.clear();
        for other in [&self.rpt_path, &self.out_path].into_iter().flatten() {
            if other.as_path() == path {
                return Err(ProjectError::DuplicateFileNames);
            }
        }
        let (net, title) = read_inp(path)?;
        self.network = net;
        self.title = title;
        self.network_empty = false;
        self.inp_path = Some(path.to_path_buf());
        info!(path = %path.display(), "project loaded");
        Ok(())
    }

    /// Load from already-read input text (embedders and tests).
    pub fn load_from_text(&mut self, text: &str) -> ProjectResult<()> {
        self.clear();
        let (net, title) = parse_inp(text)?;
        self.network = net;
        self.title = title;
        self.network_empty = false;
        Ok(())
    }

    /// Save the network back to a canonical input file.
    pub fn save(&mut self, path: &Path) -> ProjectResult<()> {
        if self.network_empty {
            return Ok(());
        }
        write_inp(path, &self.network, &self.title)
    }

    /// Drop all project data. Open report/output streams are released.
    pub fn clear(&mut self) {
        self.network = Network::new();
        self.title.clear();
        self.network_empty = true;
        self.engine = None;
        self.solver_initialized = false;
        self.inp_path = None;
        self.output = None;
        self.pf_trace = None;
        self.xm_trace = None;
        self.msg_log.clear();
    }

    /// Initialize the hydraulic engine; `init_flows` reseeds link flows.
    pub fn init_solver(&mut self, init_flows: bool) -> ProjectResult<()> {
        if self.network_empty {
            return Ok(());
        }
        self.solver_initialized = false;
        let mut engine = match self.engine.take() {
            Some(e) => e,
            None => HydEngine::open(&self.network),
        };
        engine.init(&mut self.network, init_flows)?;
        self.engine = Some(engine);

        // configured side traces are (re)created per run
        if let Some(path) = self.network.options.trace.pressure_flow_path.clone() {
            self.pf_trace = Some(PressureFlowTrace::create(Path::new(&path), &self.network)?);
        }
        if let Some(path) = self.network.options.trace.valve_opening_path.clone() {
            self.xm_trace = Some(ValveOpeningTrace::create(Path::new(&path), &self.network)?);
        }

        self.solver_initialized = true;
        Ok(())
    }

    /// Solve hydraulics at the current time; reports it in `t`.
    pub fn run_solver(&mut self, t: &mut u64) -> ProjectResult<()> {
        if !self.solver_initialized {
            return Err(ProjectError::NotInitialized);
        }
        let engine = self.engine.as_mut().ok_or(ProjectError::NotInitialized)?;
        let results = engine.solve(&mut self.network, t)?;
        if !results.converged {
            self.msg_log.push_str(&format!(
                "WARNING: hydraulics unconverged at {} (flow change {:.2e})\n",
                crate::report::format_clock(*t),
                results.rel_flow_change
            ));
        }
        if let Some(output) = &mut self.output {
            if *t % self.network.options.report_step == 0 {
                output.write_period(&self.network)?;
            }
        }
        if let Some(trace) = &mut self.pf_trace {
            trace.write_step(&self.network, *t)?;
        }
        if let Some(trace) = &mut self.xm_trace {
            trace.write_step(&self.network, *t)?;
        }
        Ok(())
    }

    /// Advance to the next time boundary; `dt` of zero means completion
    /// (results are finalized).
    pub fn advance_solver(&mut self, dt: &mut u64) -> ProjectResult<()> {
        let engine = self.engine.as_mut().ok_or(ProjectError::NotInitialized)?;
        engine.advance(&mut self.network, dt)?;
        if *dt == 0 {
            self.finalize_solver()?;
        }
        Ok(())
    }

    fn finalize_solver(&mut self) -> ProjectResult<()> {
        let (energy, peak) = self
            .engine
            .as_ref()
            .map(|e| (e.energy_kwh(), e.peak_kw()))
            .unwrap_or((0.0, 0.0));
        if let Some(output) = &mut self.output {
            output.finish(energy, peak)?;
        }
        if let Some(trace) = &mut self.pf_trace {
            trace.flush()?;
        }
        if let Some(trace) = &mut self.xm_trace {
            trace.flush()?;
        }
        Ok(())
    }

    /// Open the binary results file.
    pub fn open_output(&mut self, path: &Path) -> ProjectResult<()> {
        if self.network_empty {
            return Ok(());
        }
        if self.inp_path.as_deref() == Some(path) || self.rpt_path.as_deref() == Some(path) {
            return Err(ProjectError::DuplicateFileNames);
        }
        self.output = Some(OutputWriter::create(path, &self.network)?);
        self.out_path = Some(path.to_path_buf());
        Ok(())
    }

    /// Open the report file and write its heading.
    pub fn open_report(&mut self, path: &Path) -> ProjectResult<()> {
        if self.inp_path.as_deref() == Some(path) || self.out_path.as_deref() == Some(path) {
            return Err(ProjectError::DuplicateFileNames);
        }
        let file = File::create(path).map_err(|source| ProjectError::CannotOpenReport {
            path: path.to_path_buf(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        ReportWriter::new(&mut writer).write_heading()?;
        self.report_file = Some(writer);
        self.rpt_path = Some(path.to_path_buf());
        Ok(())
    }

    /// Write the title/option summary to the report file.
    pub fn write_summary(&mut self) -> ProjectResult<()> {
        let Some(file) = &mut self.report_file else {
            return Ok(());
        };
        let inp_name = self
            .inp_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        ReportWriter::new(file).write_summary(&inp_name, &self.network, &self.title)
    }

    /// Read the binary results back and report them.
    pub fn write_report(&mut self) -> ProjectResult<()> {
        let out_path = self.out_path.clone().ok_or(ProjectError::NoResultsSaved)?;
        let Some(file) = &mut self.report_file else {
            return Err(ProjectError::NoResultsSaved);
        };
        let contents = read_output(&out_path)?;
        let mut rw = ReportWriter::new(file);
        if self.network.options.report_detail {
            rw.write_results(&contents)?;
        }
        rw.write_energy_summary(&contents)?;
        Ok(())
    }

    /// Append the message log to the report file and clear it.
    pub fn write_msg_log(&mut self) -> ProjectResult<()> {
        if let Some(file) = &mut self.report_file {
            file.write_all(self.msg_log.as_bytes())?;
            file.flush()?;
        }
        self.msg_log.clear();
        Ok(())
    }

    // ---- attribute access -------------------------------------------

    pub fn count(&self, kind: CountKind) -> usize {
        match kind {
            CountKind::Nodes => self.network.node_count(),
            CountKind::Links => self.network.link_count(),
            CountKind::Junctions => self.network.junction_count(),
            CountKind::Reservoirs => self.network.reservoir_count(),
            CountKind::Tanks => self.network.tank_count(),
            CountKind::Valves => self.network.valve_count(),
        }
    }

    pub fn node_index(&self, name: &str) -> ProjectResult<usize> {
        Ok(self.network.node_id(name)?.idx())
    }

    pub fn link_index(&self, name: &str) -> ProjectResult<usize> {
        Ok(self.network.link_id(name)?.idx())
    }

    /// Node attribute in user units.
    pub fn node_value(&self, index: usize, param: NodeParam) -> ProjectResult<f64> {
        let node = self
            .network
            .nodes
            .get(index)
            .ok_or(ProjectError::BadIndex { index })?;
        let units = self.network.units();
        Ok(match param {
            NodeParam::Elevation => units.to_user(Quantity::Length, node.elevation),
            NodeParam::Head => units.to_user(Quantity::Head, node.head),
            NodeParam::Pressure => units.to_user(Quantity::Pressure, node.pressure()),
            NodeParam::Demand => units.to_user(Quantity::Flow, node.demand),
        })
    }

    /// Link attribute in user units.
    pub fn link_value(&self, index: usize, param: LinkParam) -> ProjectResult<f64> {
        let link = self
            .network
            .links
            .get(index)
            .ok_or(ProjectError::BadIndex { index })?;
        let units = self.network.units();
        Ok(match param {
            LinkParam::Flow => units.to_user(Quantity::Flow, link.flow),
            LinkParam::Velocity => units.to_user(Quantity::Velocity, link.velocity()),
            LinkParam::HeadLoss => units.to_user(Quantity::Head, link.hloss),
            LinkParam::Status => match link.status {
                LinkStatus::Open => 1.0,
                LinkStatus::Active => 2.0,
                _ => 0.0,
            },
            LinkParam::Setting => match &link.kind {
                LinkKind::Valve(v) => v.setting_in_user_units(&units),
                LinkKind::Pump(p) => p.speed,
                LinkKind::Pipe(_) => 0.0,
            },
            LinkParam::Leakage => units.to_user(Quantity::Flow, link.leakage),
            LinkParam::Opening => link.as_valve().map(|v| v.dprv.xm).unwrap_or(0.0),
            LinkParam::Diameter => units.to_user(Quantity::Diameter, link.diameter),
        })
    }

    /// Change a link's setting or status from user units.
    pub fn set_link_value(
        &mut self,
        index: usize,
        param: LinkParam,
        value: f64,
    ) -> ProjectResult<()> {
        let units = self.network.units();
        let link = self
            .network
            .links
            .get_mut(index)
            .ok_or(ProjectError::BadIndex { index })?;
        match param {
            LinkParam::Setting => {
                let internal = match link.as_valve() {
                    Some(v) => v.convert_setting(value, &units),
                    None => value,
                };
                link.change_setting(internal);
            }
            LinkParam::Status => {
                let status = if value > 0.0 {
                    LinkStatus::Open
                } else {
                    LinkStatus::Closed
                };
                link.change_status(status);
            }
            _ => return Err(ProjectError::BadIndex { index }),
        }
        Ok(())
    }

    /// Change a junction's base demand from user units.
    pub fn set_node_demand(&mut self, index: usize, value: f64) -> ProjectResult<()> {
        let units = self.network.units();
        let node = self
            .network
            .nodes
            .get_mut(index)
            .ok_or(ProjectError::BadIndex { index })?;
        if let NodeKind::Junction(j) = &mut node.kind {
            j.base_demand = units.to_internal(Quantity::Flow, value);
        }
        Ok(())
    }

    /// Run a complete simulation: load, solve every period, report.
    /// Returns the highest error code encountered (0 on success).
    pub fn run(
        &mut self,
        inp: &Path,
        rpt: &Path,
        out: &Path,
        mut progress: impl FnMut(u64, u64),
    ) -> i32 {
        let mut worst = 0;

        let setup = self
            .open_report(rpt)
            .and_then(|_| self.load(inp))
            .and_then(|_| self.open_output(out))
            .and_then(|_| self.write_summary())
            .and_then(|_| self.init_solver(false));
        if let Err(e) = setup {
            self.log_message(&e.to_string());
            let _ = self.write_msg_log();
            return e.code();
        }

        let duration = self.network.options.duration;
        let mut t = 0u64;
        let mut dt = u64::MAX;
        loop {
            if let Err(e) = self.run_solver(&mut t) {
                self.log_message(&e.to_string());
                worst = worst.max(e.code());
                break;
            }
            progress(t, duration);
            if let Err(e) = self.advance_solver(&mut dt) {
                self.log_message(&e.to_string());
                worst = worst.max(e.code());
                break;
            }
            if dt == 0 {
                break;
            }
        }

        if worst == 0 {
            if let Err(e) = self.write_report() {
                self.log_message(&e.to_string());
                worst = worst.max(e.code());
            }
        }
        let _ = self.write_msg_log();
        worst
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NET: &str = "\
[OPTIONS]
UNITS LPS
[TIMES]
DURATION 0:00
[RESERVOIRS]
R1 100
[JUNCTIONS]
J1 0 10
[PIPES]
P1 R1 J1 1000 200 130
";

    #[test]
    fn run_solver_requires_init() {
        let mut p = Project::new();
        p.load_from_text(NET).unwrap();
        let mut t = 0;
        let err = p.run_solver(&mut t).unwrap_err();
        assert_eq!(err.code(), 301);
    }

    #[test]
    fn steady_run_and_values() {
        let mut p = Project::new();
        p.load_from_text(NET).unwrap();
        p.init_solver(true).unwrap();
        let mut t = 0;
        p.run_solver(&mut t).unwrap();
        assert_eq!(t, 0);

        // flow through the only pipe equals the demand, in user units
        let li = p.link_index("P1").unwrap();
        let flow = p.link_value(li, LinkParam::Flow).unwrap();
        assert!((flow - 10.0).abs() < 0.05, "flow {flow} should be ~10 LPS");

        let ni = p.node_index("J1").unwrap();
        let pressure = p.node_value(ni, NodeParam::Pressure).unwrap();
        assert!(pressure > 0.0 && pressure < 100.0);

        let mut dt = u64::MAX;
        p.advance_solver(&mut dt).unwrap();
        assert_eq!(dt, 0, "zero duration completes after one step");
    }

    #[test]
    fn counts_reflect_network() {
        let mut p = Project::new();
        p.load_from_text(NET).unwrap();
        assert_eq!(p.count(CountKind::Nodes), 2);
        assert_eq!(p.count(CountKind::Links), 1);
        assert_eq!(p.count(CountKind::Junctions), 1);
        assert_eq!(p.count(CountKind::Reservoirs), 1);
    }

    #[test]
    fn bad_index_rejected() {
        let mut p = Project::new();
        p.load_from_text(NET).unwrap();
        assert!(p.node_value(99, NodeParam::Head).is_err());
        assert!(p.set_link_value(99, LinkParam::Status, 1.0).is_err());
    }
}
