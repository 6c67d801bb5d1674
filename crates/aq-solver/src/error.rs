//! Error types for solver operations.

use aq_control::ControlError;
use aq_network::NetworkError;
use thiserror::Error;

/// Errors that can occur while solving network hydraulics.
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Solver not initialized")]
    NotInitialized,

    #[error("Singular nodal matrix near node {node}")]
    Singular { node: String },

    #[error("Hydraulics did not converge after {trials} trials (flow change {rel_change:.2e})")]
    NotConverged { trials: usize, rel_change: f64 },

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Control error: {0}")]
    Control(#[from] ControlError),

    #[error("Numeric error: {what}")]
    Numeric { what: &'static str },
}

pub type SolverResult<T> = Result<T, SolverError>;
