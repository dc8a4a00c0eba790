//! Derivation of quantities the model does not write directly.
//!
//! Per requested code the flow is lookup first (is the code in the raw
//! file verbatim?), then derivation from one of the fixed formulas in
//! [`crate::physics`], always in grid space. A [`DeriveContext`] caches
//! every grid field it touches for the duration of one file, so the
//! expensive wind synthesis runs at most once however many downstream
//! quantities need it.

use crate::physics;
use gcm_common::{registry, PlanetConstants, PostError, Result};
use ndarray::{Array4, ArrayD, Axis, Ix3, Ix4};
use spectral_transform::{mode_wavenumbers, TransformEngine};
use srv_decoder::RawFile;
use std::collections::HashMap;
use tracing::debug;

/// Variable codes the derivation engine understands, beyond what the
/// raw file carries.
pub mod code {
    pub const SURFACE_GEOPOTENTIAL: u32 = 129;
    pub const TEMPERATURE: u32 = 130;
    pub const U_WIND: u32 = 131;
    pub const V_WIND: u32 = 132;
    pub const HUMIDITY: u32 = 133;
    pub const SURFACE_PRESSURE: u32 = 134;
    pub const OMEGA: u32 = 135;
    pub const UPWARD_WIND: u32 = 137;
    pub const VORTICITY: u32 = 138;
    pub const SURFACE_TEMPERATURE: u32 = 139;
    pub const LARGE_SCALE_PRECIP: u32 = 142;
    pub const CONVECTIVE_PRECIP: u32 = 143;
    pub const SENSIBLE_HEAT: u32 = 146;
    pub const LATENT_HEAT: u32 = 147;
    pub const STREAMFUNCTION: u32 = 148;
    pub const VELOCITY_POTENTIAL: u32 = 149;
    pub const SEA_LEVEL_PRESSURE: u32 = 151;
    pub const LOG_SURFACE_PRESSURE: u32 = 152;
    pub const DIVERGENCE: u32 = 155;
    pub const GEOPOTENTIAL_HEIGHT: u32 = 156;
    pub const RELATIVE_HUMIDITY: u32 = 157;
    pub const SURFACE_SOLAR: u32 = 176;
    pub const SURFACE_THERMAL: u32 = 177;
    pub const TOP_SOLAR: u32 = 178;
    pub const TOP_THERMAL: u32 = 179;
    pub const EVAPORATION: u32 = 182;
    pub const WIND_SPEED: u32 = 259;
    pub const TOTAL_PRECIP: u32 = 260;
    pub const NET_TOP_RADIATION: u32 = 261;
    pub const NET_BOTTOM_RADIATION: u32 = 262;
    pub const SURFACE_HEAT_BUDGET: u32 = 263;
    pub const NET_WATER_FLUX: u32 = 264;
    pub const THETA: u32 = 268;
    pub const THETA_HALF: u32 = 269;
    pub const DPS_DX: u32 = 273;
    pub const DPS_DY: u32 = 274;
    pub const HALF_LEVEL_PRESSURE: u32 = 277;
    pub const FULL_LEVEL_PRESSURE: u32 = 278;
}

/// The closed set of derivable quantities, dispatched by match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedQuantity {
    SurfacePressure,
    EastwardWind,
    NorthwardWind,
    WindSpeed,
    OmegaVelocity,
    UpwardWind,
    SeaLevelPressure,
    GeopotentialHeight,
    RelativeHumidity,
    Streamfunction,
    VelocityPotential,
    Theta,
    ThetaHalf,
    PressureGradientX,
    PressureGradientY,
    HalfLevelPressure,
    FullLevelPressure,
    TotalPrecipitation,
    NetTopRadiation,
    NetBottomRadiation,
    SurfaceHeatBudget,
    NetWaterFlux,
}

impl DerivedQuantity {
    /// The derivation behind a variable code, if there is one.
    pub fn for_code(c: u32) -> Option<Self> {
        match c {
            code::SURFACE_PRESSURE => Some(Self::SurfacePressure),
            code::U_WIND => Some(Self::EastwardWind),
            code::V_WIND => Some(Self::NorthwardWind),
            code::WIND_SPEED => Some(Self::WindSpeed),
            code::OMEGA => Some(Self::OmegaVelocity),
            code::UPWARD_WIND => Some(Self::UpwardWind),
            code::SEA_LEVEL_PRESSURE => Some(Self::SeaLevelPressure),
            code::GEOPOTENTIAL_HEIGHT => Some(Self::GeopotentialHeight),
            code::RELATIVE_HUMIDITY => Some(Self::RelativeHumidity),
            code::STREAMFUNCTION => Some(Self::Streamfunction),
            code::VELOCITY_POTENTIAL => Some(Self::VelocityPotential),
            code::THETA => Some(Self::Theta),
            code::THETA_HALF => Some(Self::ThetaHalf),
            code::DPS_DX => Some(Self::PressureGradientX),
            code::DPS_DY => Some(Self::PressureGradientY),
            code::HALF_LEVEL_PRESSURE => Some(Self::HalfLevelPressure),
            code::FULL_LEVEL_PRESSURE => Some(Self::FullLevelPressure),
            code::TOTAL_PRECIP => Some(Self::TotalPrecipitation),
            code::NET_TOP_RADIATION => Some(Self::NetTopRadiation),
            code::NET_BOTTOM_RADIATION => Some(Self::NetBottomRadiation),
            code::SURFACE_HEAT_BUDGET => Some(Self::SurfaceHeatBudget),
            code::NET_WATER_FLUX => Some(Self::NetWaterFlux),
            _ => None,
        }
    }
}

/// Per-file derivation state: the decoded raw fields, the transform
/// engine for the file's resolution, and the grid-field cache.
pub struct DeriveContext<'a> {
    raw: &'a RawFile,
    engine: &'a TransformEngine,
    planet: PlanetConstants,
    synchronous: bool,
    lat_rad: Vec<f64>,
    cache: HashMap<u32, ArrayD<f64>>,
}

impl<'a> DeriveContext<'a> {
    pub fn new(
        raw: &'a RawFile,
        engine: &'a TransformEngine,
        planet: PlanetConstants,
        synchronous: bool,
    ) -> Self {
        let lat_rad = raw.grid.lat.iter().map(|d| d.to_radians()).collect();
        Self {
            raw,
            engine,
            planet,
            synchronous,
            lat_rad,
            cache: HashMap::new(),
        }
    }

    /// The requested code as a grid-point field: straight from the raw
    /// file (transformed to grid) when present, derived otherwise.
    pub fn grid_field(&mut self, c: u32) -> Result<ArrayD<f64>> {
        if let Some(cached) = self.cache.get(&c) {
            return Ok(cached.clone());
        }
        if self.raw.contains(c) {
            let grid = self.engine.to_grid(&self.raw.field(c)?.data)?;
            self.cache.insert(c, grid.clone());
            return Ok(grid);
        }

        let quantity = DerivedQuantity::for_code(c).ok_or_else(|| describe_unknown(c))?;
        debug!(code = c, ?quantity, "deriving");
        let out = self.compute(quantity)?;
        self.cache.insert(c, out.clone());
        Ok(out)
    }

    fn compute(&mut self, q: DerivedQuantity) -> Result<ArrayD<f64>> {
        match q {
            DerivedQuantity::SurfacePressure => {
                let lnps = self.grid_field(code::LOG_SURFACE_PRESSURE)?;
                Ok(lnps.mapv(f64::exp))
            }
            DerivedQuantity::EastwardWind => {
                self.derive_winds()?;
                self.grid_field(code::U_WIND)
            }
            DerivedQuantity::NorthwardWind => {
                self.derive_winds()?;
                self.grid_field(code::V_WIND)
            }
            DerivedQuantity::WindSpeed => {
                let u = self.grid_field(code::U_WIND)?;
                let v = self.grid_field(code::V_WIND)?;
                let mut out = u;
                for (a, b) in out.iter_mut().zip(v.iter()) {
                    *a = a.hypot(*b);
                }
                Ok(out)
            }
            DerivedQuantity::OmegaVelocity => self.derive_omega(),
            DerivedQuantity::UpwardWind => {
                let wap = self.grid_field(code::OMEGA)?;
                let ta = self.grid_field(code::TEMPERATURE)?;
                let ps = self.surface_field(code::SURFACE_PRESSURE, wap.shape()[0])?;
                let wap = as4(&wap)?;
                let out = physics::vertical_wind(
                    wap.view(),
                    as4(&ta)?.view(),
                    ps.view().into_dimensionality::<Ix3>().map_err(shape_err)?,
                    &self.raw.grid.lev,
                    &self.planet,
                );
                Ok(out.into_dyn())
            }
            DerivedQuantity::SeaLevelPressure => {
                let ps = self.grid_field(code::SURFACE_PRESSURE)?;
                let ntimes = ps.shape()[0];
                let sg = self.surface_field(code::SURFACE_GEOPOTENTIAL, ntimes)?;
                let ta = self.grid_field(code::TEMPERATURE)?;
                let ta = as4(&ta)?;
                let nlev = ta.shape()[1];
                let ta_low = ta.index_axis(Axis(1), nlev - 1).to_owned();
                let out = physics::sea_level_pressure(
                    as3(&ps)?.view(),
                    sg.view().into_dimensionality::<Ix3>().map_err(shape_err)?,
                    ta_low.view(),
                    self.raw.grid.lev[nlev - 1],
                    &self.planet,
                );
                Ok(out.into_dyn())
            }
            DerivedQuantity::GeopotentialHeight => {
                let ta = self.grid_field(code::TEMPERATURE)?;
                let ntimes = ta.shape()[0];
                let sg = self.surface_field(code::SURFACE_GEOPOTENTIAL, ntimes)?;
                let hus = if self.raw.contains(code::HUMIDITY) {
                    Some(self.grid_field(code::HUMIDITY)?)
                } else {
                    None
                };
                let ta = as4(&ta)?;
                let hus = match &hus {
                    Some(q) => Some(as4(q)?),
                    None => None,
                };
                let out = physics::geopotential_height(
                    ta.view(),
                    hus.as_ref().map(|q| q.view()),
                    sg.view().into_dimensionality::<Ix3>().map_err(shape_err)?,
                    &self.raw.grid.lev,
                    &self.raw.grid.levp,
                    &self.planet,
                );
                Ok(out.into_dyn())
            }
            DerivedQuantity::RelativeHumidity => {
                let ta = self.grid_field(code::TEMPERATURE)?;
                let hus = self.grid_field(code::HUMIDITY)?;
                let ps = self.grid_field(code::SURFACE_PRESSURE)?;
                let out = physics::relative_humidity(
                    as4(&ta)?.view(),
                    as4(&hus)?.view(),
                    as3(&ps)?.view(),
                    &self.raw.grid.lev,
                );
                Ok(out.into_dyn())
            }
            DerivedQuantity::Streamfunction => {
                let v = self.grid_field(code::V_WIND)?;
                let ps = self.grid_field(code::SURFACE_PRESSURE)?;
                let sign = if self.synchronous { -1.0 } else { 1.0 };
                let out = physics::streamfunction(
                    as4(&v)?.view(),
                    as3(&ps)?.view(),
                    &self.raw.grid.levp,
                    &self.engine.basis().coslat,
                    &self.planet,
                    sign,
                );
                Ok(out.into_dyn())
            }
            DerivedQuantity::VelocityPotential => self.derive_velocity_potential(),
            DerivedQuantity::Theta => {
                let thetah = self.grid_field(code::THETA_HALF)?;
                let out = physics::full_level_theta(as4(&thetah)?.view());
                Ok(out.into_dyn())
            }
            DerivedQuantity::ThetaHalf => {
                let ta = self.grid_field(code::TEMPERATURE)?;
                let ts = self.grid_field(code::SURFACE_TEMPERATURE)?;
                let out = physics::half_level_theta(
                    as4(&ta)?.view(),
                    as3(&ts)?.view(),
                    &self.raw.grid.levp,
                    &self.planet,
                );
                Ok(out.into_dyn())
            }
            DerivedQuantity::PressureGradientX => Ok(self.pressure_gradients()?.0),
            DerivedQuantity::PressureGradientY => Ok(self.pressure_gradients()?.1),
            DerivedQuantity::HalfLevelPressure => self.level_pressures(&self.raw.grid.levp.clone()),
            DerivedQuantity::FullLevelPressure => self.level_pressures(&self.raw.grid.lev.clone()),
            DerivedQuantity::TotalPrecipitation => {
                self.sum_of(&[code::LARGE_SCALE_PRECIP, code::CONVECTIVE_PRECIP])
            }
            DerivedQuantity::NetTopRadiation => {
                self.sum_of(&[code::TOP_SOLAR, code::TOP_THERMAL])
            }
            DerivedQuantity::NetBottomRadiation => {
                self.sum_of(&[code::SURFACE_SOLAR, code::SURFACE_THERMAL])
            }
            DerivedQuantity::SurfaceHeatBudget => self.sum_of(&[
                code::SURFACE_SOLAR,
                code::SURFACE_THERMAL,
                code::SENSIBLE_HEAT,
                code::LATENT_HEAT,
            ]),
            DerivedQuantity::NetWaterFlux => {
                self.sum_of(&[code::EVAPORATION, code::TOTAL_PRECIP])
            }
        }
    }

    /// Wind synthesis from spectral vorticity and divergence. Both
    /// components land in the cache in one pass.
    fn derive_winds(&mut self) -> Result<()> {
        if self.cache.contains_key(&code::U_WIND) && self.cache.contains_key(&code::V_WIND) {
            return Ok(());
        }
        let zeta = self.spectral_field(code::VORTICITY)?;
        let div = self.spectral_field(code::DIVERGENCE)?;
        let (u, v) = self
            .engine
            .uv_from_vordiv(&zeta, &div, self.planet.radius)?;
        debug!("synthesized winds from vorticity and divergence");
        self.cache.insert(code::U_WIND, u);
        self.cache.insert(code::V_WIND, v);
        Ok(())
    }

    fn derive_omega(&mut self) -> Result<ArrayD<f64>> {
        let u = self.grid_field(code::U_WIND)?;
        let v = self.grid_field(code::V_WIND)?;
        let div = self.grid_field(code::DIVERGENCE)?;
        let ps = self.grid_field(code::SURFACE_PRESSURE)?;
        let lnps = ps.mapv(f64::ln);

        let lnps3 = as3(&lnps)?;
        let (gx, gy) = physics::horizontal_gradients(
            lnps3.view(),
            &self.lat_rad,
            &self.engine.basis().coslat,
            self.planet.radius,
        );
        let out = physics::omega(
            as3(&ps)?.view(),
            as4(&u)?.view(),
            as4(&v)?.view(),
            as4(&div)?.view(),
            gx.view(),
            gy.view(),
            &self.raw.grid.lev,
            &self.raw.grid.levp,
        );
        Ok(out.into_dyn())
    }

    /// Velocity potential: spectral divergence scaled per mode by
    /// `-radius^2 / (n(n+1))`, the global mode held at zero.
    fn derive_velocity_potential(&mut self) -> Result<ArrayD<f64>> {
        let div = self.spectral_field(code::DIVERGENCE)?;
        let modes = mode_wavenumbers(self.engine.ntrunc());
        let nspec = self.engine.nspec();
        let a2 = self.planet.radius * self.planet.radius;

        let mut chi = div;
        for (idx, value) in chi.iter_mut().enumerate() {
            let (_, n) = modes[(idx % nspec) / 2];
            *value = if n == 0 {
                0.0
            } else {
                -a2 * *value / (n * (n + 1)) as f64
            };
        }
        self.engine.to_grid(&chi)
    }

    fn pressure_gradients(&mut self) -> Result<(ArrayD<f64>, ArrayD<f64>)> {
        let ps = self.grid_field(code::SURFACE_PRESSURE)?;
        let lnps = ps.mapv(f64::ln);
        let lnps3 = as3(&lnps)?;
        let (gx, gy) = physics::horizontal_gradients(
            lnps3.view(),
            &self.lat_rad,
            &self.engine.basis().coslat,
            self.planet.radius,
        );
        // d(ps)/dx = ps * d(lnps)/dx.
        let ps3 = as3(&ps)?;
        Ok(((gx * &ps3).into_dyn(), (gy * &ps3).into_dyn()))
    }

    /// `sigma x ps` expanded to a leveled field.
    fn level_pressures(&mut self, sigma: &[f64]) -> Result<ArrayD<f64>> {
        let ps = self.grid_field(code::SURFACE_PRESSURE)?;
        let ps = as3(&ps)?;
        let (ntime, nlat, nlon) = ps.dim();
        let out = Array4::from_shape_fn((ntime, sigma.len(), nlat, nlon), |(t, k, i, j)| {
            sigma[k] * ps[[t, i, j]]
        });
        Ok(out.into_dyn())
    }

    /// Elementwise sum of grid fields; every ingredient must resolve.
    fn sum_of(&mut self, codes: &[u32]) -> Result<ArrayD<f64>> {
        let mut total = self.grid_field(codes[0])?;
        for &c in &codes[1..] {
            let next = self.grid_field(c)?;
            if next.shape() != total.shape() {
                return Err(PostError::dimension(format!(
                    "cannot combine fields of shapes {:?} and {:?}",
                    total.shape(),
                    next.shape()
                )));
            }
            total += &next;
        }
        Ok(total)
    }

    /// Raw field in spectral representation.
    fn spectral_field(&mut self, c: u32) -> Result<ArrayD<f64>> {
        if !self.raw.contains(c) {
            return Err(describe_unknown(c));
        }
        self.engine.to_spectral(&self.raw.field(c)?.data)
    }

    /// A surface field with the time axis broadcast to `ntimes`.
    /// Time-invariant fields (orography) are often written once.
    fn surface_field(&mut self, c: u32, ntimes: usize) -> Result<ArrayD<f64>> {
        let field = self.grid_field(c)?;
        let shape = field.shape().to_vec();
        if shape[0] == ntimes {
            return Ok(field);
        }
        if shape[0] != 1 {
            return Err(PostError::dimension(format!(
                "field {c} has {} time steps, expected 1 or {ntimes}",
                shape[0]
            )));
        }
        let sample: Vec<f64> = field.iter().copied().collect();
        let mut values = Vec::with_capacity(sample.len() * ntimes);
        for _ in 0..ntimes {
            values.extend_from_slice(&sample);
        }
        let mut out_shape = shape;
        out_shape[0] = ntimes;
        ArrayD::from_shape_vec(out_shape, values)
            .map_err(|e| PostError::dimension(format!("time broadcast failed: {e}")))
    }
}

fn describe_unknown(c: u32) -> PostError {
    match registry().by_code(c) {
        Ok(desc) => PostError::unknown_variable(format!(
            "code {c} ({}) is neither in the raw file nor derivable from it",
            desc.short_name
        )),
        Err(_) => PostError::unknown_variable(format!("code {c} is not in the variable library")),
    }
}

fn shape_err(e: ndarray::ShapeError) -> PostError {
    PostError::dimension(e.to_string())
}

fn as3(a: &ArrayD<f64>) -> Result<ndarray::Array3<f64>> {
    a.view()
        .into_dimensionality::<Ix3>()
        .map(|v| v.to_owned())
        .map_err(shape_err)
}

fn as4(a: &ArrayD<f64>) -> Result<Array4<f64>> {
    a.view()
        .into_dimensionality::<Ix4>()
        .map(|v| v.to_owned())
        .map_err(shape_err)
}
