//! User <-> internal unit conversion.
//!
//! The engine computes in feet (head, length) and cfs (flow). The unit
//! system is chosen by the flow-units keyword of the input file: GPM, CFS
//! and MGD select US customary units, LPS, LPM and CMH select SI. Each
//! quantity has a single conversion factor with `user = internal * ucf`.

use crate::constants::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitSystem {
    US,
    SI,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowUnits {
    Cfs,
    Gpm,
    Mgd,
    Lps,
    Lpm,
    Cmh,
}

impl FlowUnits {
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "CFS" => Some(Self::Cfs),
            "GPM" => Some(Self::Gpm),
            "MGD" => Some(Self::Mgd),
            "LPS" => Some(Self::Lps),
            "LPM" => Some(Self::Lpm),
            "CMH" => Some(Self::Cmh),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Cfs => "CFS",
            Self::Gpm => "GPM",
            Self::Mgd => "MGD",
            Self::Lps => "LPS",
            Self::Lpm => "LPM",
            Self::Cmh => "CMH",
        }
    }

    pub fn system(self) -> UnitSystem {
        match self {
            Self::Cfs | Self::Gpm | Self::Mgd => UnitSystem::US,
            Self::Lps | Self::Lpm | Self::Cmh => UnitSystem::SI,
        }
    }

    fn per_cfs(self) -> f64 {
        match self {
            Self::Cfs => 1.0,
            Self::Gpm => GPM_PER_CFS,
            Self::Mgd => MGD_PER_CFS,
            Self::Lps => LPS_PER_CFS,
            Self::Lpm => LPM_PER_CFS,
            Self::Cmh => CMH_PER_CFS,
        }
    }
}

/// Quantities the engine converts at its boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Length,
    Diameter,
    Pressure,
    Head,
    Flow,
    Velocity,
    Volume,
    Power,
}

/// Conversion-factor table for one unit-system choice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Units {
    flow_units: FlowUnits,
}

impl Default for Units {
    fn default() -> Self {
        Self {
            flow_units: FlowUnits::Gpm,
        }
    }
}

impl Units {
    pub fn new(flow_units: FlowUnits) -> Self {
        Self { flow_units }
    }

    pub fn flow_units(&self) -> FlowUnits {
        self.flow_units
    }

    pub fn system(&self) -> UnitSystem {
        self.flow_units.system()
    }

    /// Conversion factor for `q`: user value = internal value * ucf.
    pub fn ucf(&self, q: Quantity) -> f64 {
        let si = self.system() == UnitSystem::SI;
        match q {
            Quantity::Length | Quantity::Head => {
                if si {
                    M_PER_FT
                } else {
                    1.0
                }
            }
            Quantity::Diameter => {
                if si {
                    M_PER_FT * 1000.0
                } else {
                    12.0
                }
            }
            // SI reports pressure as meters of head, US as psi
            Quantity::Pressure => {
                if si {
                    M_PER_FT
                } else {
                    PSI_PER_FT
                }
            }
            Quantity::Flow => self.flow_units.per_cfs(),
            Quantity::Velocity => {
                if si {
                    M_PER_FT
                } else {
                    1.0
                }
            }
            Quantity::Volume => {
                if si {
                    M_PER_FT.powi(3)
                } else {
                    1.0
                }
            }
            Quantity::Power => 1.0,
        }
    }

    /// Convert an internal value to user units.
    pub fn to_user(&self, q: Quantity, v: f64) -> f64 {
        v * self.ucf(q)
    }

    /// Convert a user value to internal units.
    pub fn to_internal(&self, q: Quantity, v: f64) -> f64 {
        v / self.ucf(q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tolerances;

    #[test]
    fn flow_units_select_system() {
        assert_eq!(FlowUnits::Gpm.system(), UnitSystem::US);
        assert_eq!(FlowUnits::Lps.system(), UnitSystem::SI);
    }

    #[test]
    fn conversion_round_trip() {
        let tol = Tolerances::default();
        let units = Units::new(FlowUnits::Lps);
        for q in [
            Quantity::Length,
            Quantity::Diameter,
            Quantity::Pressure,
            Quantity::Flow,
            Quantity::Volume,
        ] {
            let x = 123.456;
            let rt = units.to_user(q, units.to_internal(q, x));
            assert!(tol.close(rt, x), "round trip failed for {q:?}");
        }
    }

    #[test]
    fn lps_flow_factor() {
        let units = Units::new(FlowUnits::Lps);
        // 1 cfs = 28.3168 L/s
        assert!((units.to_user(Quantity::Flow, 1.0) - 28.316_846_592).abs() < 1e-6);
    }

    #[test]
    fn si_pressure_is_meters_of_head() {
        let units = Units::new(FlowUnits::Lps);
        // 10 m of head expressed internally in feet
        let internal = units.to_internal(Quantity::Pressure, 10.0);
        assert!((internal - 10.0 / 0.3048).abs() < 1e-9);
    }

    #[test]
    fn keyword_round_trip() {
        for w in ["CFS", "GPM", "MGD", "LPS", "LPM", "CMH"] {
            let fu = FlowUnits::from_keyword(w).unwrap();
            assert_eq!(fu.keyword(), w);
        }
        assert!(FlowUnits::from_keyword("FURLONGS").is_none());
    }
}
