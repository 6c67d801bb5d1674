//! aq-control: closed-loop pressure management for AquaNet.
//!
//! Drives the opening of every dynamic pressure-reducing valve once per
//! hydraulic time step, using a physical piston law or a PID law selected
//! at runtime.

pub mod error;
pub mod manager;

pub use error::{ControlError, ControlResult};
pub use manager::{PressureManager, ValveOpening};
