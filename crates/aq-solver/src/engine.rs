//! Extended-period hydraulic engine.
//!
//! Drives the balance solver through simulation time: applies patterns
//! and controls at each step boundary, runs the pressure-management
//! controller, integrates tank storage, and picks the next step size.

use crate::balance::{solve_balance, BalanceResults};
use crate::error::{SolverError, SolverResult};
use crate::matrix::NodalSystem;
use aq_control::{PressureManager, ValveOpening};
use aq_network::{
    ControlAction, LinkKind, Network, NodeKind,
};
use aq_core::{LinkId, KW_PER_HP, ZERO_FLOW};
use tracing::{debug, warn};

/// Horsepower denominator for water power in ft*cfs (550/62.4).
const HP_FACTOR: f64 = 8.814;

/// The stepping engine. All large buffers are sized once in `open`.
pub struct HydEngine {
    system: NodalSystem,
    adjacency: Vec<Vec<(LinkId, f64)>>,
    manager: PressureManager,
    heads_scratch: Vec<f64>,
    tank_inflow: Vec<f64>,
    t: u64,
    last_results: Option<BalanceResults>,
    last_openings: Vec<ValveOpening>,
    energy_kwh: f64,
    peak_kw: f64,
}

impl HydEngine {
    /// Size the engine for a network. Reallocation after this point is a
    /// defect; the same buffers serve every step.
    pub fn open(net: &Network) -> Self {
        Self {
            system: NodalSystem::new(net, net.options.solver),
            adjacency: net.adjacency(),
            manager: PressureManager::new(net.options.control_law),
            heads_scratch: vec![0.0; net.nodes.len()],
            tank_inflow: vec![0.0; net.nodes.len()],
            t: 0,
            last_results: None,
            last_openings: Vec::new(),
            energy_kwh: 0.0,
            peak_kw: 0.0,
        }
    }

    /// Validate the network and reset all transient state.
    pub fn init(&mut self, net: &mut Network, init_flows: bool) -> SolverResult<()> {
        net.validate()?;
        net.initialize(init_flows)?;
        self.t = 0;
        self.energy_kwh = 0.0;
        self.peak_kw = 0.0;
        self.last_results = None;
        self.last_openings.clear();
        Ok(())
    }

    pub fn elapsed(&self) -> u64 {
        self.t
    }

    pub fn energy_kwh(&self) -> f64 {
        self.energy_kwh
    }

    pub fn peak_kw(&self) -> f64 {
        self.peak_kw
    }

    pub fn last_results(&self) -> Option<BalanceResults> {
        self.last_results
    }

    /// DPRV openings computed for the current step, for tracing.
    pub fn openings(&self) -> &[ValveOpening] {
        &self.last_openings
    }

    /// Solve network hydraulics at the current point in time.
    ///
    /// A convergence failure is reported in the returned results and via
    /// a warning; the network keeps the best state found, and stepping
    /// may continue.
    pub fn solve(&mut self, net: &mut Network, t_out: &mut u64) -> SolverResult<BalanceResults> {
        self.apply_patterns(net);
        self.apply_controls(net);

        // opening control runs before the solve, on last step's heads
        self.last_openings = self
            .manager
            .step(net, self.t, net.options.hyd_step)?;

        // snapshot heads for next step's derivative terms before the
        // balance overwrites them
        for node in &mut net.nodes {
            node.past_head = node.head;
        }

        let results = solve_balance(net, &mut self.system, &self.adjacency)?;
        if !results.converged {
            warn!(
                t = self.t,
                trials = results.trials,
                rel_change = results.rel_flow_change,
                "hydraulics did not fully converge; continuing with best state"
            );
        }
        self.last_results = Some(results);
        *t_out = self.t;
        Ok(results)
    }

    /// Advance to the next time boundary. Writes the step actually taken
    /// to `dt_out`; zero means the simulation is complete.
    pub fn advance(&mut self, net: &mut Network, dt_out: &mut u64) -> SolverResult<()> {
        // per-step snapshots for the opening controller
        self.manager.lasting(net);

        let duration = net.options.duration;
        if self.t >= duration {
            *dt_out = 0;
            return Ok(());
        }

        let dt = self.next_step_size(net);
        self.accumulate_energy(net, dt);
        self.integrate_tanks(net, dt);

        self.t += dt;
        *dt_out = dt;
        debug!(t = self.t, dt, "advanced hydraulics");
        Ok(())
    }

    /// Smallest of: remaining hydraulic step, report boundary, pattern
    /// boundary, next time-based control, next tank limit event, end of
    /// the simulation.
    fn next_step_size(&mut self, net: &Network) -> u64 {
        let opts = &net.options;
        let t = self.t;
        let until = |step: u64| -> u64 {
            if step == 0 {
                u64::MAX
            } else {
                step - t % step
            }
        };
        let mut dt = until(opts.hyd_step)
            .min(until(opts.report_step))
            .min(until(opts.pattern_step))
            .min(opts.duration - t);

        for control in &net.controls {
            if let Some(fire_in) = control.time_until_fire(t) {
                dt = dt.min(fire_in);
            }
        }

        self.compute_tank_inflows(net);
        let units = net.units();
        for (ni, node) in net.nodes.iter().enumerate() {
            if let NodeKind::Tank(tank) = &node.kind {
                if let Some(event) =
                    tank.time_to_limit(self.tank_inflow[ni], &net.curves, &units)
                {
                    dt = dt.min(event);
                }
            }
        }
        dt.max(1)
    }

    fn compute_tank_inflows(&mut self, net: &Network) {
        for (ni, node) in net.nodes.iter().enumerate() {
            self.tank_inflow[ni] = 0.0;
            if !matches!(node.kind, NodeKind::Tank(_)) {
                continue;
            }
            for &(lid, sign) in &self.adjacency[ni] {
                self.tank_inflow[ni] += sign * net.links[lid.idx()].flow;
            }
        }
    }

    /// Trapezoidal storage update; levels clamp at the tank limits (the
    /// next balance pass then temp-closes the offending links).
    fn integrate_tanks(&mut self, net: &mut Network, dt: u64) {
        self.compute_tank_inflows(net);
        let units = net.units();
        let Network { nodes, curves, .. } = net;
        for (ni, node) in nodes.iter_mut().enumerate() {
            let elevation = node.elevation;
            let qnet = self.tank_inflow[ni];
            let NodeKind::Tank(tank) = &mut node.kind else {
                continue;
            };
            let dv = 0.5 * (qnet + tank.past_net_inflow) * dt as f64;
            let vmin = tank.min_volume(curves, &units);
            let vmax = tank.max_volume(curves, &units);
            tank.volume = (tank.volume + dv).clamp(vmin, vmax);
            tank.past_net_inflow = qnet;
            let level = tank.level_at_volume(tank.volume, curves, &units);
            node.head = elevation + level;
        }
    }

    /// Pump energy use over the step, plus the running power peak.
    fn accumulate_energy(&mut self, net: &Network, dt: u64) {
        let eff = net.options.pump_efficiency.max(0.05);
        for link in &net.links {
            if !matches!(link.kind, LinkKind::Pump(_)) {
                continue;
            }
            let gain = -link.hloss;
            if link.flow <= ZERO_FLOW || gain <= 0.0 {
                continue;
            }
            let kw = KW_PER_HP * link.flow * gain / (HP_FACTOR * eff);
            self.peak_kw = self.peak_kw.max(kw);
            self.energy_kwh += kw * dt as f64 / 3600.0;
        }
    }

    /// Pattern factors applied to demands, reservoir heads, valve
    /// settings and pump speeds for the step starting at the current time.
    fn apply_patterns(&mut self, net: &mut Network) {
        let t = self.t;
        let Network {
            nodes,
            links,
            patterns,
            options,
            ..
        } = net;
        let step = options.pattern_step;
        let multiplier = options.demand_multiplier;

        for node in nodes.iter_mut() {
            match &mut node.kind {
                NodeKind::Junction(j) => {
                    let factor = j
                        .demand_pattern
                        .map(|p| patterns[p.idx()].current_factor(t, step))
                        .unwrap_or(1.0);
                    node.demand = j.base_demand * multiplier * factor;
                }
                NodeKind::Reservoir(r) => {
                    if let Some(p) = r.head_pattern {
                        node.head = r.base_head * patterns[p.idx()].current_factor(t, step);
                    }
                }
                NodeKind::Tank(_) => {}
            }
        }

        for link in links.iter_mut() {
            match &mut link.kind {
                LinkKind::Valve(v) => {
                    if let Some(p) = v.setting_pattern {
                        v.setting = v.init_setting * patterns[p.idx()].current_factor(t, step);
                    }
                }
                LinkKind::Pump(p) => {
                    if let Some(pat) = p.speed_pattern {
                        p.speed = p.init_speed * patterns[pat.idx()].current_factor(t, step);
                    }
                }
                LinkKind::Pipe(_) => {}
            }
        }
    }

    /// Re-evaluate every operating rule at this step boundary.
    fn apply_controls(&mut self, net: &mut Network) {
        for (ni, node) in net.nodes.iter().enumerate() {
            self.heads_scratch[ni] = node.head;
        }
        let t = self.t;
        for ci in 0..net.controls.len() {
            let control = net.controls[ci].clone();
            if !control.is_triggered(t, &self.heads_scratch) {
                continue;
            }
            let link = &mut net.links[control.link.idx()];
            let changed = match control.action {
                ControlAction::Status(status) => link.change_status(status),
                ControlAction::Setting(value) => link.change_setting(value),
            };
            if changed {
                debug!(t, link = %link.name, "control rule fired");
            }
        }
    }
}

/// Convenience for one-shot steady solves: open, init, run one balance.
pub fn solve_steady(net: &mut Network) -> SolverResult<BalanceResults> {
    let mut engine = HydEngine::open(net);
    engine.init(net, true)?;
    let mut t = 0;
    let results = engine.solve(net, &mut t)?;
    if results.converged {
        Ok(results)
    } else {
        Err(SolverError::NotConverged {
            trials: results.trials,
            rel_change: results.rel_flow_change,
        })
    }
}
