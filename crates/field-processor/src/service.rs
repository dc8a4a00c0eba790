//! Dataset assembly: the top-level entry point of the postprocessor.
//!
//! One call takes a raw model file (as bytes) and a configuration, and
//! produces the assembled [`Dataset`]: decode, derive the requested
//! quantities, bring each to the requested horizontal representation,
//! and attach coordinates and metadata.

use crate::derive::DeriveContext;
use crate::remap::{CoordinateRemapper, SubstellarRemapper};
use crate::resample::{ResampleSpec, TimeResampler};
use gcm_common::{
    registry, Dataset, OutputMode, PostConfig, PostError, Result, VarMeta, Variable,
};
use ndarray::{ArrayD, Axis};
use spectral_transform::{BasisCache, TransformEngine};
use srv_decoder::{decode, RawFile};
use tracing::{debug, info};

/// Drives one or more postprocessing runs with a fixed configuration.
pub struct Postprocessor {
    config: PostConfig,
    basis_cache: BasisCache,
    remapper: Box<dyn CoordinateRemapper>,
}

impl Postprocessor {
    /// Build a postprocessor after validating the configuration.
    pub fn new(config: PostConfig) -> Result<Self> {
        config.validate().map_err(PostError::config)?;
        Ok(Self {
            config,
            basis_cache: BasisCache::new(),
            remapper: Box::new(SubstellarRemapper),
        })
    }

    /// Replace the default substellar remapper.
    pub fn with_remapper(mut self, remapper: Box<dyn CoordinateRemapper>) -> Self {
        self.remapper = remapper;
        self
    }

    /// Decode one raw file and assemble the requested dataset.
    pub fn process(&self, buffer: &[u8]) -> Result<Dataset> {
        let raw = decode(buffer)?;
        let grid = &raw.grid;
        info!(
            nlat = grid.nlat(),
            nlon = grid.nlon(),
            nlev = grid.nlev(),
            ntrunc = grid.ntrunc,
            fields = raw.fields.len(),
            "decoded raw file"
        );

        let basis = self.basis_cache.get(grid.nlat(), grid.ntrunc)?;
        let engine = TransformEngine::new(basis, grid.nlon(), self.config.physics_filter)?;
        let mut ctx = DeriveContext::new(
            &raw,
            &engine,
            self.config.planet,
            self.config.mode.is_synchronous(),
        );

        let codes = self.requested_codes(&raw)?;
        let mut ds = Dataset::new();
        self.insert_coordinates(&mut ds, &raw);
        let ntime = ds.get("time").map(|t| t.data.len()).unwrap_or(1);

        for code in codes {
            let grid_field = ctx.grid_field(code)?;
            let data = self.represent(&engine, &raw, &grid_field)?;
            let data = broadcast_time(data, ntime)?;
            let meta = self.metadata(code, data.shape())?;
            debug!(code, name = %meta.short_name, shape = ?data.shape(), "assembled variable");
            ds.insert(meta.short_name.clone(), Variable { data, meta });
        }

        ds.check_invariants().map_err(PostError::dimension)?;
        Ok(ds)
    }

    /// Resample a processed dataset along its time axis, using the
    /// configured interpolation rule.
    pub fn resample(&self, ds: &Dataset, spec: &ResampleSpec, with_std: bool) -> Result<Dataset> {
        TimeResampler::new(self.config.interpolation)
            .with_std(with_std)
            .resample(ds, spec)
    }

    /// The variable codes this run will emit: the configured selection,
    /// or every raw field when no selection was given.
    fn requested_codes(&self, raw: &RawFile) -> Result<Vec<u32>> {
        if self.config.variables.is_empty() {
            let mut codes: Vec<u32> = raw.fields.keys().copied().collect();
            codes.sort_unstable();
            return Ok(codes);
        }
        self.config
            .variables
            .iter()
            .map(|token| registry().resolve(token).map(|d| d.code))
            .collect()
    }

    /// Bring a grid field to the configured output representation and
    /// apply the zonal mean when requested.
    fn represent(
        &self,
        engine: &TransformEngine,
        raw: &RawFile,
        grid_field: &ArrayD<f64>,
    ) -> Result<ArrayD<f64>> {
        let data = match self.config.mode {
            OutputMode::Grid => grid_field.clone(),
            OutputMode::Spectral => engine.to_spectral(grid_field)?,
            OutputMode::Fourier => engine.to_fourier(grid_field)?,
            OutputMode::Synchronous => {
                self.remapper
                    .remap(grid_field, &raw.grid.lon, self.config.substellar_lon)?
            }
            OutputMode::SyncFourier => {
                let rotated =
                    self.remapper
                        .remap(grid_field, &raw.grid.lon, self.config.substellar_lon)?;
                engine.to_fourier(&rotated)?
            }
        };

        if self.config.zonal_mean {
            // validate() restricts the mean to grid-like output.
            let lon_axis = data.ndim() - 1;
            return Ok(data.mean_axis(Axis(lon_axis)).ok_or_else(|| {
                PostError::dimension("cannot average an empty longitude axis")
            })?);
        }
        Ok(data)
    }

    /// Registry metadata plus dimension names inferred from the output
    /// shape and representation.
    fn metadata(&self, code: u32, shape: &[usize]) -> Result<VarMeta> {
        let desc = registry().by_code(code)?;
        let trailing: &[&str] = match self.config.mode {
            OutputMode::Spectral => &["nsp2"],
            OutputMode::Fourier | OutputMode::SyncFourier => &["lat", "nfc"],
            OutputMode::Grid | OutputMode::Synchronous => {
                if self.config.zonal_mean {
                    &["lat"]
                } else {
                    &["lat", "lon"]
                }
            }
        };

        let mut dims = vec!["time".to_string()];
        // One extra leading axis beyond time and the trailing axes
        // means the field spans vertical levels.
        if shape.len() == trailing.len() + 2 {
            dims.push("lev".to_string());
        }
        dims.extend(trailing.iter().map(|s| s.to_string()));

        Ok(VarMeta {
            short_name: desc.short_name.to_string(),
            long_name: desc.long_name.to_string(),
            units: desc.units.to_string(),
            code: Some(code),
            dims,
        })
    }

    fn insert_coordinates(&self, ds: &mut Dataset, raw: &RawFile) {
        let grid = &raw.grid;

        let lon: Vec<f64> = if self.config.mode.is_synchronous() {
            // Rotated frame: longitudes relative to the substellar point.
            let nlon = grid.nlon();
            (0..nlon)
                .map(|i| 360.0 * i as f64 / nlon as f64 - 180.0)
                .collect()
        } else {
            grid.lon.clone()
        };

        let time = if raw.time.is_empty() {
            // No time-marker records: number the samples.
            let ntimes = raw
                .fields
                .values()
                .map(|v| v.data.shape()[0])
                .max()
                .unwrap_or(1);
            (0..ntimes).map(|i| i as f64).collect()
        } else {
            raw.time.clone()
        };

        let coords: [(&str, &Vec<f64>, &str, &str); 5] = [
            ("lat", &grid.lat, "latitude", "degrees_north"),
            ("lon", &lon, "longitude", "degrees_east"),
            ("lev", &grid.lev, "sigma at layer midpoints", "level"),
            ("levp", &grid.levp, "sigma at layer interfaces", "level"),
            ("time", &time, "time", "steps"),
        ];
        for (name, values, long_name, units) in coords {
            ds.insert(
                name,
                Variable {
                    data: ArrayD::from_shape_vec(vec![values.len()], values.clone())
                        .unwrap_or_else(|_| ArrayD::zeros(vec![0])),
                    meta: VarMeta::coordinate(name, long_name, units),
                },
            );
        }
    }
}

/// Repeat a single-step field along the time axis. Time-invariant
/// fields (orography, land mask) are written once but must line up with
/// the dataset's time coordinate.
fn broadcast_time(data: ArrayD<f64>, ntime: usize) -> Result<ArrayD<f64>> {
    let shape = data.shape().to_vec();
    if shape[0] == ntime {
        return Ok(data);
    }
    if shape[0] != 1 {
        return Err(PostError::dimension(format!(
            "variable carries {} time steps where the file has {ntime}",
            shape[0]
        )));
    }
    let sample: Vec<f64> = data.iter().copied().collect();
    let mut values = Vec::with_capacity(sample.len() * ntime);
    for _ in 0..ntime {
        values.extend_from_slice(&sample);
    }
    let mut out_shape = shape;
    out_shape[0] = ntime;
    ArrayD::from_shape_vec(out_shape, values)
        .map_err(|e| PostError::dimension(format!("time broadcast failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcm_common::Interpolation;

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = PostConfig::default();
        config.planet.gravity = -1.0;
        assert!(matches!(
            Postprocessor::new(config),
            Err(PostError::Config(_))
        ));
    }

    #[test]
    fn test_resample_uses_configured_interpolation() {
        let mut config = PostConfig::default();
        config.interpolation = Interpolation::Nearest;
        let post = Postprocessor::new(config).unwrap();
        // An empty dataset has no time axis: the resampler must say so.
        let ds = Dataset::new();
        assert!(matches!(
            post.resample(&ds, &ResampleSpec::MeanBins(2), false),
            Err(PostError::Dimension(_))
        ));
    }
}
