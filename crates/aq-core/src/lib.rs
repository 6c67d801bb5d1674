//! aq-core: stable foundation for AquaNet.
//!
//! Contains:
//! - constants (solver tolerances + physical constants, US internal units)
//! - units (user <-> internal unit conversion factors)
//! - numeric (Real + tolerances + float helpers)
//! - ids (stable compact IDs for network elements)
//! - error (shared error type)

pub mod constants;
pub mod error;
pub mod ids;
pub mod numeric;
pub mod units;

// Re-exports: nice ergonomics for downstream crates
pub use constants::*;
pub use error::{CoreError, CoreResult};
pub use ids::*;
pub use numeric::*;
pub use units::{FlowUnits, Quantity, UnitSystem, Units};
