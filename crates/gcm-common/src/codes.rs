//! Variable code registry.
//!
//! Maps the model's integer variable codes to short names, long names and
//! physical units, and back. The table covers both quantities the model
//! writes directly and quantities the derivation engine can produce.
//!
//! The registry is built once at startup and is bidirectional: integer-code
//! and short-name lookups resolve to the same descriptor.

use crate::error::{PostError, Result};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Descriptor for one physical quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarDescriptor {
    pub code: u32,
    pub short_name: &'static str,
    pub long_name: &'static str,
    pub units: &'static str,
}

/// Static code table: (code, short name, long name, units).
///
/// Numbering follows the ECHAM-style convention the model uses; codes above
/// 258 are postprocessor-derived quantities that never appear in the raw
/// stream.
const TABLE: &[(u32, &str, &str, &str)] = &[
    (110, "mld", "mixed layer depth", "m"),
    (129, "sg", "surface geopotential", "m2 s-2"),
    (130, "ta", "air temperature", "K"),
    (131, "ua", "eastward wind", "m s-1"),
    (132, "va", "northward wind", "m s-1"),
    (133, "hus", "specific humidity", "kg kg-1"),
    (134, "ps", "surface pressure", "Pa"),
    (135, "wap", "vertical velocity", "Pa s-1"),
    (137, "wa", "upward wind", "m s-1"),
    (138, "zeta", "relative vorticity", "s-1"),
    (139, "ts", "surface temperature", "K"),
    (140, "mrso", "soil wetness", "m"),
    (141, "snd", "snow depth", "m"),
    (142, "prl", "large scale precipitation", "m s-1"),
    (143, "prc", "convective precipitation", "m s-1"),
    (144, "prsn", "snow fall", "m s-1"),
    (145, "bld", "boundary layer dissipation", "W m-2"),
    (146, "hfss", "surface sensible heat flux", "W m-2"),
    (147, "hfls", "surface latent heat flux", "W m-2"),
    (148, "stf", "streamfunction", "kg s-1"),
    (149, "vp", "velocity potential", "m2 s-1"),
    (151, "psl", "sea level pressure", "Pa"),
    (152, "lnps", "log surface pressure", "1"),
    (153, "clw", "cloud liquid water content", "kg kg-1"),
    (154, "cli", "cloud ice water content", "kg kg-1"),
    (155, "d", "divergence", "s-1"),
    (156, "zg", "geopotential height", "m"),
    (157, "hur", "relative humidity", "%"),
    (158, "tps", "tendency of surface pressure", "Pa s-1"),
    (159, "u3", "ustar**3", "m3 s-3"),
    (160, "mrro", "surface runoff", "m s-1"),
    (161, "drain", "drainage", "m s-1"),
    (162, "cld", "cloud cover", "1"),
    (163, "cl", "total cloud cover (instant)", "1"),
    (164, "clt", "total cloud cover", "1"),
    (165, "uas", "eastward wind 10m", "m s-1"),
    (166, "vas", "northward wind 10m", "m s-1"),
    (167, "tas", "air temperature 2m", "K"),
    (168, "tds", "dew point temperature 2m", "K"),
    (169, "tsa", "surface temperature (radiative)", "K"),
    (170, "tsod", "deep soil temperature", "K"),
    (171, "dsw", "deep soil wetness", "1"),
    (172, "sftlf", "land sea mask", "1"),
    (173, "z0", "surface roughness", "m"),
    (174, "alb", "surface albedo", "1"),
    (176, "rss", "surface solar radiation", "W m-2"),
    (177, "rls", "surface thermal radiation", "W m-2"),
    (178, "rst", "top solar radiation", "W m-2"),
    (179, "rlut", "top thermal radiation", "W m-2"),
    (180, "tauu", "eastward wind stress", "Pa"),
    (181, "tauv", "northward wind stress", "Pa"),
    (182, "evap", "evaporation", "m s-1"),
    (183, "tso", "soil temperature", "K"),
    (184, "wsoi", "soil wetness fraction", "1"),
    (199, "vegc", "vegetation cover", "1"),
    (203, "rsut", "top solar radiation upward", "W m-2"),
    (204, "ssru", "surface solar radiation upward", "W m-2"),
    (205, "stru", "surface thermal radiation upward", "W m-2"),
    (207, "tso2", "soil temperature level 2", "K"),
    (208, "tso3", "soil temperature level 3", "K"),
    (209, "tso4", "soil temperature level 4", "K"),
    (210, "sic", "sea ice cover", "1"),
    (211, "sit", "sea ice thickness", "m"),
    (218, "snm", "snow melt", "m s-1"),
    (221, "sndc", "snow depth change", "m s-1"),
    (230, "prw", "vertically integrated water vapor", "kg m-2"),
    (232, "glac", "glacier cover", "1"),
    (238, "tsn", "snow temperature", "K"),
    (259, "spd", "wind speed", "m s-1"),
    (260, "pr", "total precipitation", "m s-1"),
    (261, "ntr", "net top radiation", "W m-2"),
    (262, "nbr", "net bottom radiation", "W m-2"),
    (263, "hfns", "surface heat budget", "W m-2"),
    (264, "wfn", "net water flux", "m s-1"),
    (268, "theta", "potential temperature", "K"),
    (269, "thetah", "half level potential temperature", "K"),
    (273, "dpdx", "d(ps)/dx", "Pa m-1"),
    (274, "dpdy", "d(ps)/dy", "Pa m-1"),
    (277, "hlpr", "half level pressure", "Pa"),
    (278, "flpr", "full level pressure", "Pa"),
];

/// Bidirectional code/name registry, built once.
#[derive(Debug)]
pub struct VarRegistry {
    by_code: HashMap<u32, VarDescriptor>,
    by_name: HashMap<&'static str, u32>,
}

impl VarRegistry {
    fn build() -> Self {
        let mut by_code = HashMap::new();
        let mut by_name = HashMap::new();
        for &(code, short_name, long_name, units) in TABLE {
            by_code.insert(
                code,
                VarDescriptor {
                    code,
                    short_name,
                    long_name,
                    units,
                },
            );
            by_name.insert(short_name, code);
        }
        Self { by_code, by_name }
    }

    /// Look up a descriptor by integer code.
    pub fn by_code(&self, code: u32) -> Result<&VarDescriptor> {
        self.by_code
            .get(&code)
            .ok_or_else(|| PostError::unknown_variable(format!("code {code}")))
    }

    /// Look up a descriptor by short name.
    pub fn by_name(&self, name: &str) -> Result<&VarDescriptor> {
        self.by_name
            .get(name)
            .and_then(|code| self.by_code.get(code))
            .ok_or_else(|| PostError::unknown_variable(name.to_string()))
    }

    /// Resolve a selection token: either a decimal code or a short name.
    pub fn resolve(&self, token: &str) -> Result<&VarDescriptor> {
        if let Ok(code) = token.parse::<u32>() {
            self.by_code(code)
        } else {
            self.by_name(token)
        }
    }

    /// Number of registered quantities.
    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    /// Check whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

/// Global registry accessor.
pub fn registry() -> &'static VarRegistry {
    static REGISTRY: OnceLock<VarRegistry> = OnceLock::new();
    REGISTRY.get_or_init(VarRegistry::build)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_lookup() {
        let reg = registry();
        let ts = reg.by_code(139).unwrap();
        assert_eq!(ts.short_name, "ts");
        assert_eq!(ts.units, "K");
    }

    #[test]
    fn test_name_lookup_is_inverse_of_code_lookup() {
        let reg = registry();
        for &(code, short, _, _) in TABLE {
            let by_code = reg.by_code(code).unwrap();
            let by_name = reg.by_name(short).unwrap();
            assert_eq!(by_code, by_name);
        }
    }

    #[test]
    fn test_resolve_accepts_code_strings_and_names() {
        let reg = registry();
        assert_eq!(reg.resolve("130").unwrap().short_name, "ta");
        assert_eq!(reg.resolve("ta").unwrap().code, 130);
    }

    #[test]
    fn test_unknown_code_is_fatal() {
        let reg = registry();
        assert!(matches!(
            reg.by_code(9999),
            Err(PostError::UnknownVariable(_))
        ));
        assert!(matches!(
            reg.by_name("nosuchvar"),
            Err(PostError::UnknownVariable(_))
        ));
    }
}
