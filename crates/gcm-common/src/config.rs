//! Postprocessing configuration.
//!
//! The orchestration layer drives the postprocessor with a namelist-style
//! text selection; this module parses it into a typed configuration with
//! environment-variable overrides and validation.

use crate::constants::PlanetConstants;
use crate::error::{PostError, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Horizontal representation of the output fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Gaussian grid in the model's coordinate frame.
    #[default]
    Grid,
    /// Spherical-harmonic coefficients.
    Spectral,
    /// Fourier coefficients per latitude.
    Fourier,
    /// Gaussian grid rotated to the substellar-centered frame.
    Synchronous,
    /// Fourier coefficients in the substellar-centered frame.
    SyncFourier,
}

impl OutputMode {
    /// Parse from string (case-insensitive). Unknown values fall back to grid.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "spectral" => Self::Spectral,
            "fourier" => Self::Fourier,
            "synchronous" | "sync" => Self::Synchronous,
            "syncfourier" => Self::SyncFourier,
            _ => Self::Grid,
        }
    }

    /// True for the two substellar-frame modes.
    pub fn is_synchronous(&self) -> bool {
        matches!(self, Self::Synchronous | Self::SyncFourier)
    }
}

impl std::fmt::Display for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Grid => write!(f, "grid"),
            Self::Spectral => write!(f, "spectral"),
            Self::Fourier => write!(f, "fourier"),
            Self::Synchronous => write!(f, "synchronous"),
            Self::SyncFourier => write!(f, "syncfourier"),
        }
    }
}

/// Interpolation rule for time resampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    #[default]
    Linear,
    Nearest,
}

impl Interpolation {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "nearest" => Self::Nearest,
            _ => Self::Linear,
        }
    }
}

/// Configuration for one postprocessing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostConfig {
    /// Requested variables, as codes or short names (empty = everything raw).
    pub variables: Vec<String>,

    /// Horizontal output representation.
    pub mode: OutputMode,

    /// Average over the longitude axis after all other processing.
    pub zonal_mean: bool,

    /// Damp high spherical wavenumbers during synthesis and analysis.
    pub physics_filter: bool,

    /// Substellar longitude [degrees east] for the synchronous frame.
    pub substellar_lon: f64,

    /// Interpolation rule for the non-averaging resample path.
    pub interpolation: Interpolation,

    /// Planetary constants (radius, gravity, gas constant, cp).
    pub planet: PlanetConstants,
}

impl Default for PostConfig {
    fn default() -> Self {
        Self {
            variables: Vec::new(),
            mode: OutputMode::Grid,
            zonal_mean: false,
            physics_filter: false,
            substellar_lon: 0.0,
            interpolation: Interpolation::Linear,
            planet: PlanetConstants::earth(),
        }
    }
}

impl PostConfig {
    /// Load configuration overrides from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("GCM_POST_MODE") {
            config.mode = OutputMode::from_str(&val);
        }

        if let Ok(val) = std::env::var("GCM_POST_ZONAL_MEAN") {
            config.zonal_mean = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("GCM_POST_PHYSICS_FILTER") {
            config.physics_filter = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("GCM_POST_SUBSTELLAR_LON") {
            if let Ok(lon) = val.parse() {
                config.substellar_lon = lon;
            }
        }

        if let Ok(val) = std::env::var("GCM_POST_INTERPOLATION") {
            config.interpolation = Interpolation::from_str(&val);
        }

        if let Ok(val) = std::env::var("GCM_POST_MARS") {
            if val.to_lowercase() == "true" || val == "1" {
                config.planet = PlanetConstants::mars();
            }
        }

        config
    }

    /// Parse a namelist-style selection: one `key = value` pair per line,
    /// `!`-prefixed comments, variable lists separated by commas or spaces.
    ///
    /// Recognized keys: `code` / `variables`, `mode` / `hhog`, `mean`,
    /// `physfilter`, `substellar`, `mars`, `radius`, `gravity`, `gascon`, `cp`.
    pub fn from_namelist(text: &str) -> Self {
        let mut config = Self::default();

        for line in text.lines() {
            let line = line.split('!').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "code" | "variables" => {
                    config.variables = value
                        .split(|c: char| c == ',' || c.is_whitespace())
                        .filter(|t| !t.is_empty())
                        .map(|t| t.to_string())
                        .collect();
                }
                "mode" | "hhog" => config.mode = OutputMode::from_str(value),
                "interpolation" => config.interpolation = Interpolation::from_str(value),
                "mean" => config.zonal_mean = truthy(value),
                "physfilter" => config.physics_filter = truthy(value),
                "substellar" => {
                    if let Ok(lon) = value.parse() {
                        config.substellar_lon = lon;
                    }
                }
                "mars" => {
                    if truthy(value) {
                        config.planet = PlanetConstants::mars();
                    }
                }
                "radius" => {
                    if let Ok(v) = value.parse() {
                        config.planet.radius = v;
                    }
                }
                "gravity" => {
                    if let Ok(v) = value.parse() {
                        config.planet.gravity = v;
                    }
                }
                "gascon" => {
                    if let Ok(v) = value.parse() {
                        config.planet.gas_constant = v;
                    }
                }
                "cp" => {
                    if let Ok(v) = value.parse() {
                        config.planet.cp = v;
                    }
                }
                other => warn!(key = other, "ignoring unrecognized namelist key"),
            }
        }

        config
    }

    /// Parse a JSON configuration document.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| PostError::config(e.to_string()))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.planet.radius <= 0.0 {
            return Err("planet radius must be > 0".to_string());
        }
        if self.planet.gravity <= 0.0 {
            return Err("gravity must be > 0".to_string());
        }
        if self.planet.gas_constant <= 0.0 || self.planet.cp <= 0.0 {
            return Err("gas constant and cp must be > 0".to_string());
        }
        if !(-360.0..=360.0).contains(&self.substellar_lon) {
            return Err("substellar longitude must be within [-360, 360]".to_string());
        }
        if self.zonal_mean
            && matches!(
                self.mode,
                OutputMode::Spectral | OutputMode::Fourier | OutputMode::SyncFourier
            )
        {
            return Err("zonal mean is only defined for grid output".to_string());
        }
        Ok(())
    }
}

fn truthy(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "t" | "yes" | "1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_validates() {
        assert!(PostConfig::default().validate().is_ok());
    }

    #[test]
    fn test_namelist_parse() {
        let text = "\
            code = ts, ta, ua va   ! requested fields\n\
            mode = synchronous\n\
            mean = 1\n\
            physfilter = true\n\
            substellar = 180.0\n";
        let config = PostConfig::from_namelist(text);

        assert_eq!(config.variables, vec!["ts", "ta", "ua", "va"]);
        assert_eq!(config.mode, OutputMode::Synchronous);
        assert!(config.zonal_mean);
        assert!(config.physics_filter);
        assert!((config.substellar_lon - 180.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_namelist_mars_override() {
        let config = PostConfig::from_namelist("mars = true\ngravity = 3.9\n");
        assert!((config.planet.radius - 3_389_500.0).abs() < 1.0);
        assert!((config.planet.gravity - 3.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_json_parse_with_defaults() {
        let config = PostConfig::from_json(r#"{"mode": "fourier", "physics_filter": true}"#).unwrap();
        assert_eq!(config.mode, OutputMode::Fourier);
        assert!(config.physics_filter);
        assert_eq!(config.interpolation, Interpolation::Linear);
        assert!(config.variables.is_empty());
    }

    #[test]
    fn test_zonal_mean_spectral_rejected() {
        let mut config = PostConfig::default();
        config.zonal_mean = true;
        config.mode = OutputMode::Spectral;
        assert!(config.validate().is_err());
    }
}
