use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

/// Numeric guard errors raised by the foundation layer.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },
}
