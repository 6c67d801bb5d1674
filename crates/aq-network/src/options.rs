//! Simulation options bundle.

use aq_core::{FlowUnits, Units, HYD_ACCURACY, MAX_ITERATIONS};
use serde::{Deserialize, Serialize};

/// Friction model used for pipe head loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HeadLossModel {
    #[default]
    HazenWilliams,
    DarcyWeisbach,
    ChezyManning,
}

impl HeadLossModel {
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "H-W" | "HW" => Some(Self::HazenWilliams),
            "D-W" | "DW" => Some(Self::DarcyWeisbach),
            "C-M" | "CM" => Some(Self::ChezyManning),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::HazenWilliams => "H-W",
            Self::DarcyWeisbach => "D-W",
            Self::ChezyManning => "C-M",
        }
    }
}

/// Linear-system back end for the nodal head solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SolverKind {
    /// Dense LU factorization (small and mid-size networks).
    #[default]
    Lu,
    /// Jacobi-preconditioned conjugate gradient on the sparse arrays.
    Cg,
}

/// How a closure-control valve's setting maps to a loss factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CcvRepresentation {
    /// Valve conductance scaled by the opening ratio (Toe coefficient).
    #[default]
    Toe,
    /// Tullis discharge-coefficient polynomial for a globe valve.
    Cd,
}

/// Feedback law used by the pressure-management controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ControlLaw {
    /// Piston-chamber flow proportional to the pressure error.
    Physical { alpha_open: f64, alpha_close: f64 },
    /// Discrete PID on the downstream pressure error.
    Pid { kp: f64, ki: f64, kd: f64 },
}

impl Default for ControlLaw {
    fn default() -> Self {
        // gains of the reference pilot installation
        ControlLaw::Physical {
            alpha_open: 1.0e-6,
            alpha_close: 1.0e-6,
        }
    }
}

/// Optional text trace outputs written while stepping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceConfig {
    /// Tab-separated pressure/flow trace file.
    pub pressure_flow_path: Option<String>,
    /// Tab-separated DPRV opening trace file.
    pub valve_opening_path: Option<String>,
    /// Node names whose pressures appear in the pressure/flow trace.
    pub nodes: Vec<String>,
    /// Link names whose flows appear in the pressure/flow trace.
    pub links: Vec<String>,
}

/// All run-level options, in user units where applicable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Options {
    pub flow_units: FlowUnits,
    pub head_loss_model: HeadLossModel,
    pub solver: SolverKind,
    pub ccv_representation: CcvRepresentation,
    pub control_law: ControlLaw,

    /// Total simulation duration (s). Zero means a single steady solve.
    pub duration: u64,
    /// Hydraulic time step (s).
    pub hyd_step: u64,
    /// Pattern period length (s).
    pub pattern_step: u64,
    /// Reporting interval (s).
    pub report_step: u64,

    /// Relative flow-change convergence tolerance.
    pub accuracy: f64,
    /// Newton iteration cap per time step.
    pub max_trials: usize,
    /// Flow magnitude (cfs) below which pipe losses are linearized.
    pub low_flow_limit: f64,

    /// Global demand multiplier.
    pub demand_multiplier: f64,
    /// Exponent of pressure in emitter outflow.
    pub emitter_exponent: f64,
    /// Exponent of pressure in link leakage outflow.
    pub leak_exponent: f64,
    /// Wire-to-water pump efficiency used for energy accounting.
    pub pump_efficiency: f64,

    /// Write per-period result tables into the report file.
    pub report_detail: bool,

    pub trace: TraceConfig,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            flow_units: FlowUnits::Gpm,
            head_loss_model: HeadLossModel::default(),
            solver: SolverKind::default(),
            ccv_representation: CcvRepresentation::default(),
            control_law: ControlLaw::default(),
            duration: 0,
            hyd_step: 3600,
            pattern_step: 3600,
            report_step: 3600,
            accuracy: HYD_ACCURACY,
            max_trials: MAX_ITERATIONS,
            low_flow_limit: 1.0e-4,
            demand_multiplier: 1.0,
            emitter_exponent: 0.5,
            leak_exponent: 1.18,
            pump_efficiency: 0.75,
            report_detail: false,
            trace: TraceConfig::default(),
        }
    }
}

impl Options {
    pub fn units(&self) -> Units {
        Units::new(self.flow_units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headloss_keywords() {
        assert_eq!(
            HeadLossModel::from_keyword("h-w"),
            Some(HeadLossModel::HazenWilliams)
        );
        assert_eq!(
            HeadLossModel::from_keyword("D-W"),
            Some(HeadLossModel::DarcyWeisbach)
        );
        assert!(HeadLossModel::from_keyword("X-Y").is_none());
    }

    #[test]
    fn defaults_sane() {
        let opts = Options::default();
        assert_eq!(opts.hyd_step, 3600);
        assert!(opts.accuracy > 0.0);
        assert!(matches!(opts.control_law, ControlLaw::Physical { .. }));
    }
}
