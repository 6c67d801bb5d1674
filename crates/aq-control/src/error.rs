//! Error types for controller operations.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ControlError {
    #[error("DPRV {valve} has no modulation strategy")]
    MissingModulation { valve: String },

    #[error("DPRV {valve} references missing schedule")]
    MissingSchedule { valve: String },

    #[error("DPRV {valve} references missing remote node")]
    MissingRemoteNode { valve: String },
}

pub type ControlResult<T> = Result<T, ControlError>;
