//! aq-network: the AquaNet element model.
//!
//! Nodes (junctions, reservoirs, tanks), links (pipes, pumps, valves —
//! including the closure-control valve and the dynamic pressure-reducing
//! valve), data curves, time patterns, modulation schedules, operating
//! controls and the owning [`Network`] container.
//!
//! Topology is arena-plus-index: elements live in contiguous vectors and
//! reference each other through 32-bit ids, keeping solver loops
//! cache-friendly and free of ownership cycles.

pub mod control;
pub mod curve;
pub mod error;
pub mod headloss;
pub mod link;
pub mod network;
pub mod node;
pub mod options;
pub mod pattern;
pub mod pipe;
pub mod pump;
pub mod schedule;
pub mod valve;

pub use control::{Control, ControlAction, ControlCondition};
pub use curve::Curve;
pub use error::{NetworkError, NetworkResult};
pub use headloss::HeadLoss;
pub use link::{Link, LinkKind, LinkStatus};
pub use network::Network;
pub use node::{Junction, Node, NodeKind, Reservoir, Tank};
pub use options::{
    CcvRepresentation, ControlLaw, HeadLossModel, Options, SolverKind, TraceConfig,
};
pub use pattern::Pattern;
pub use pipe::Pipe;
pub use pump::{Pump, PumpCurve};
pub use schedule::{DayNight, Schedule, ScheduleInterval};
pub use valve::{dprv_flow_coefficient, DprvState, Modulation, Valve, ValveKind};
