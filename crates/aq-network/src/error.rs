//! Error types for network model operations.

use thiserror::Error;

/// Errors raised while building or validating a network.
#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    #[error("Duplicate {kind} name: {name}")]
    DuplicateName { kind: &'static str, name: String },

    #[error("Unknown {kind} reference: {name}")]
    UnknownName { kind: &'static str, name: String },

    #[error("Node {name} is not connected to any link")]
    NodeWithoutLinks { name: String },

    #[error("Node {name} is not connected to any fixed-grade node")]
    Disconnected { name: String },

    #[error("Network has no nodes or no links")]
    EmptyNetwork,

    #[error("Network has no fixed-grade node (reservoir or tank)")]
    NoFixedGrade,

    #[error("Curve {name}: {what}")]
    BadCurve { name: String, what: &'static str },

    #[error("Schedule {name}: {what}")]
    BadSchedule { name: String, what: &'static str },

    #[error("Invalid value for {what}: {value}")]
    OutOfRange { what: &'static str, value: f64 },
}

pub type NetworkResult<T> = Result<T, NetworkError>;
