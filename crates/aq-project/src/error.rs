//! Project-level errors and their small-integer API codes.

use aq_network::NetworkError;
use aq_solver::SolverError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectError {
    // ---- file errors -------------------------------------------------
    #[error("Cannot open input file: {path}")]
    CannotOpenInput { path: PathBuf, source: std::io::Error },

    #[error("Cannot open report file: {path}")]
    CannotOpenReport { path: PathBuf, source: std::io::Error },

    #[error("Cannot open output file: {path}")]
    CannotOpenOutput { path: PathBuf, source: std::io::Error },

    #[error("Duplicate file names supplied")]
    DuplicateFileNames,

    #[error("No results saved to report on")]
    NoResultsSaved,

    #[error("Output file is corrupt: {what}")]
    CorruptOutput { what: &'static str },

    // ---- input errors ------------------------------------------------
    #[error("Input line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("Input line {line}: unknown keyword {word}")]
    UnknownKeyword { line: usize, word: String },

    #[error("Input line {line}: value out of range: {value}")]
    OutOfRange { line: usize, value: String },

    #[error("Input line {line}: missing required field")]
    MissingField { line: usize },

    #[error("Input line {line}: unknown {kind} reference {name}")]
    UnknownReference {
        line: usize,
        kind: &'static str,
        name: String,
    },

    #[error("Input line {line}: duplicate name {name}")]
    DuplicateName { line: usize, name: String },

    #[error("Corrupt section header: {header}")]
    BadSection { header: String },

    // ---- network / system errors ------------------------------------
    #[error("Network error: {0}")]
    Network(NetworkError),

    #[error("Solver not initialized")]
    NotInitialized,

    #[error("Singular matrix near node {node}")]
    Singular { node: String },

    #[error("Hydraulics not converged after {trials} trials")]
    NotConverged { trials: usize },

    #[error("Index out of range: {index}")]
    BadIndex { index: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ProjectResult<T> = Result<T, ProjectError>;

impl ProjectError {
    /// The small non-negative integer code of the programmatic surface;
    /// zero is reserved for success.
    pub fn code(&self) -> i32 {
        match self {
            ProjectError::CannotOpenInput { .. } => 101,
            ProjectError::CannotOpenReport { .. } => 102,
            ProjectError::CannotOpenOutput { .. } => 103,
            ProjectError::DuplicateFileNames => 104,
            ProjectError::NoResultsSaved => 105,
            ProjectError::CorruptOutput { .. } => 106,
            ProjectError::Syntax { .. } => 200,
            ProjectError::UnknownKeyword { .. } => 201,
            ProjectError::OutOfRange { .. } => 202,
            ProjectError::MissingField { .. } => 203,
            ProjectError::UnknownReference { .. } => 204,
            ProjectError::DuplicateName { .. } => 205,
            ProjectError::BadSection { .. } => 206,
            ProjectError::Network(_) => 233,
            ProjectError::NotInitialized => 301,
            ProjectError::Singular { .. } => 302,
            ProjectError::NotConverged { .. } => 303,
            ProjectError::BadIndex { .. } => 304,
            ProjectError::Io(_) => 308,
        }
    }
}

impl From<NetworkError> for ProjectError {
    fn from(e: NetworkError) -> Self {
        ProjectError::Network(e)
    }
}

impl From<SolverError> for ProjectError {
    fn from(e: SolverError) -> Self {
        match e {
            SolverError::NotInitialized => ProjectError::NotInitialized,
            SolverError::Singular { node } => ProjectError::Singular { node },
            SolverError::NotConverged { trials, .. } => ProjectError::NotConverged { trials },
            SolverError::Network(e) => ProjectError::Network(e),
            SolverError::Control(e) => ProjectError::Syntax {
                line: 0,
                message: e.to_string(),
            },
            SolverError::Numeric { what } => ProjectError::Syntax {
                line: 0,
                message: what.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let e = ProjectError::NotInitialized;
        assert_eq!(e.code(), 301);
        let e = ProjectError::DuplicateFileNames;
        assert_eq!(e.code(), 104);
    }
}
