//! Planetary and thermodynamic constants.

use serde::{Deserialize, Serialize};

/// Physical constants of the planet the model was run for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanetConstants {
    /// Planetary radius [m].
    pub radius: f64,
    /// Surface gravity [m s-2].
    pub gravity: f64,
    /// Specific gas constant of the dry atmosphere [J kg-1 K-1].
    pub gas_constant: f64,
    /// Specific heat at constant pressure [J kg-1 K-1].
    pub cp: f64,
}

impl PlanetConstants {
    /// Earth with a dry-air atmosphere.
    pub fn earth() -> Self {
        Self {
            radius: 6_371_220.0,
            gravity: 9.80665,
            gas_constant: 287.05,
            cp: 1004.64,
        }
    }

    /// Mars with a CO2 atmosphere.
    pub fn mars() -> Self {
        Self {
            radius: 3_389_500.0,
            gravity: 3.728,
            gas_constant: 188.92,
            cp: 735.0,
        }
    }

    /// R/cp, the Poisson exponent used for potential temperature.
    pub fn kappa(&self) -> f64 {
        self.gas_constant / self.cp
    }
}

impl Default for PlanetConstants {
    fn default() -> Self {
        Self::earth()
    }
}

/// Standard-atmosphere temperature lapse rate [K m-1].
pub const LAPSE_RATE: f64 = 0.0065;

/// Ratio of gas constants for dry air and water vapor.
pub const EPSILON: f64 = 0.622;

/// Virtual temperature moisture factor, (1 - eps)/eps.
pub const VTMP_FACTOR: f64 = 0.6078;

/// Reference saturation vapor pressure at the triple point [Pa].
pub const ESAT_REFERENCE: f64 = 610.78;

/// Magnus formula numerator constant (over water).
pub const MAGNUS_A: f64 = 17.269_388;

/// Magnus formula denominator offset [K].
pub const MAGNUS_B: f64 = 35.86;

/// Triple point of water [K].
pub const T_TRIPLE: f64 = 273.16;
