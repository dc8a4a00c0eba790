//! Raw field decoding: one linear sweep over the record stream.
//!
//! The first record is the main header whose payload is the half-level
//! sigma vector; every following record carries one variable sample.
//! Samples are concatenated per variable code and reshaped afterwards
//! from the declared grid dimensions.

use crate::reader::{Record, RecordReader, HEADER_WORDS};
use gcm_common::{PostError, Result};
use ndarray::ArrayD;
use spectral_transform::basis::gaussian_latitudes;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Variable code whose records mark the passage of time: one time step
/// is appended per surface-temperature record, by model convention.
pub const TIME_MARKER_CODE: i64 = 139;

/// Horizontal/vertical coordinate description of one decoded file.
#[derive(Debug, Clone)]
pub struct Grid {
    /// Gaussian latitudes in degrees, north to south.
    pub lat: Vec<f64>,
    /// Uniform longitudes in degrees, `0..360` exclusive.
    pub lon: Vec<f64>,
    /// Mid-layer sigma levels.
    pub lev: Vec<f64>,
    /// Half-level sigma values (layer bottoms; the last entry is 1).
    pub levp: Vec<f64>,
    /// Gaussian quadrature weights matching `lat`.
    pub weights: Vec<f64>,
    /// Triangular truncation wavenumber.
    pub ntrunc: usize,
}

impl Grid {
    pub fn nlat(&self) -> usize {
        self.lat.len()
    }

    pub fn nlon(&self) -> usize {
        self.lon.len()
    }

    pub fn nlev(&self) -> usize {
        self.lev.len()
    }

    /// Length of the spectral trailing axis, `(ntrunc+1)(ntrunc+2)`
    /// (real/imaginary pairs of the triangular truncation).
    pub fn nspec(&self) -> usize {
        (self.ntrunc + 1) * (self.ntrunc + 2)
    }
}

/// One decoded variable: the reshaped samples plus the header of the
/// first record that carried it.
#[derive(Debug, Clone)]
pub struct RawVariable {
    pub data: ArrayD<f64>,
    pub header: [i64; HEADER_WORDS],
}

impl RawVariable {
    /// True when the record spans vertical levels.
    pub fn is_leveled(&self) -> bool {
        self.header[1] == 1
    }
}

/// Everything one decode pass produces: reshaped fields keyed by
/// variable code, the grid, and the time-step sequence.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub fields: HashMap<u32, RawVariable>,
    pub grid: Grid,
    /// Step index per time-marker record.
    pub time: Vec<f64>,
}

impl RawFile {
    /// Fetch a decoded field by code.
    pub fn field(&self, code: u32) -> Result<&RawVariable> {
        self.fields
            .get(&code)
            .ok_or_else(|| PostError::unknown_variable(format!("code {code} not in raw file")))
    }

    pub fn contains(&self, code: u32) -> bool {
        self.fields.contains_key(&code)
    }
}

/// Decode an entire raw buffer into reshaped per-variable arrays.
pub fn decode(buffer: &[u8]) -> Result<RawFile> {
    let mut reader = RecordReader::new(buffer)?;

    // Main header first: sigma half levels plus grid extents.
    let main = reader.read_record()?;
    let sigmah = main.payload.clone();
    let nlev = sigmah.len();
    if nlev == 0 {
        return Err(PostError::format("main header carries no sigma levels"));
    }
    let dim1 = main.header[4].max(main.header[5]);
    let dim2 = main.header[4].min(main.header[5]);
    if dim1 <= 0 || dim2 <= 0 {
        return Err(PostError::format(format!(
            "main header grid extents {dim1}x{dim2} are not positive"
        )));
    }
    let (nlon, nlat) = (dim1 as usize, dim2 as usize);
    let ntrunc = main.header[6] as usize;

    debug!(nlon, nlat, nlev, ntrunc, "decoded main header");

    let mut flats: HashMap<u32, (Vec<f64>, [i64; HEADER_WORDS])> = HashMap::new();
    let mut time = Vec::new();

    while !reader.is_exhausted() {
        let Record { header, payload } = reader.read_record()?;
        let code = header[0];
        if code < 0 {
            return Err(PostError::format(format!("negative variable code {code}")));
        }
        if code == TIME_MARKER_CODE {
            time.push(header[7] as f64);
        }
        let entry = flats.entry(code as u32).or_insert_with(|| (Vec::new(), header));
        entry.0.extend_from_slice(&payload);
    }

    if flats.is_empty() {
        warn!("raw file contains no variable records");
    }

    let mut fields = HashMap::new();
    for (code, (flat, header)) in flats {
        let data = refactor_variable(flat, &header, nlev)?;
        fields.insert(code, RawVariable { data, header });
    }

    let grid = build_grid(nlat, nlon, ntrunc, &sigmah)?;

    Ok(RawFile { fields, grid, time })
}

/// Recover the true multi-dimensional shape of a variable from its
/// concatenated samples and record header.
///
/// Leveled variables first try the file's level count; if the flattened
/// length does not divide evenly the model has emitted an extra interface
/// level, so one more is tried before giving up. Spectral variables have
/// `dim2 == 1` and keep a single trailing mode axis.
pub fn refactor_variable(
    flat: Vec<f64>,
    header: &[i64; HEADER_WORDS],
    default_nlev: usize,
) -> Result<ArrayD<f64>> {
    let dim1 = header[4].max(header[5]) as usize;
    let dim2 = header[4].min(header[5]) as usize;
    if dim1 == 0 {
        return Err(PostError::dimension(format!(
            "variable {} declares a zero-sized grid",
            header[0]
        )));
    }

    let leveled = header[1] == 1;
    let mut nlev = if leveled { default_nlev.max(1) } else { 1 };
    let plane = dim1 * dim2;
    if leveled && flat.len() % (plane * nlev) != 0 {
        // The model occasionally writes one extra interface level.
        nlev += 1;
    }
    let sample = plane * nlev;
    if sample == 0 || flat.len() % sample != 0 {
        return Err(PostError::dimension(format!(
            "variable {}: {} values do not factor into {dim2}x{dim1} planes over {nlev} levels",
            header[0],
            flat.len()
        )));
    }
    let ntimes = flat.len() / sample;

    let mut shape = vec![ntimes];
    if leveled {
        shape.push(nlev);
    }
    if dim2 > 1 {
        shape.push(dim2);
    }
    shape.push(dim1);

    ArrayD::from_shape_vec(shape, flat)
        .map_err(|e| PostError::dimension(format!("reshape failed: {e}")))
}

/// Rebuild the Gaussian grid from the header extents and sigma vector.
fn build_grid(nlat: usize, nlon: usize, ntrunc: usize, sigmah: &[f64]) -> Result<Grid> {
    let (sinlat, weights) = gaussian_latitudes(nlat)?;
    let lat: Vec<f64> = sinlat.iter().map(|s| s.asin().to_degrees()).collect();
    let lon: Vec<f64> = (0..nlon)
        .map(|i| 360.0 * i as f64 / nlon as f64)
        .collect();

    // Mid-layer sigma, with an implicit top boundary at sigma = 0.
    let mut lev = Vec::with_capacity(sigmah.len());
    let mut prev = 0.0;
    for &half in sigmah {
        lev.push(0.5 * (prev + half));
        prev = half;
    }

    Ok(Grid {
        lat,
        lon,
        lev,
        levp: sigmah.to_vec(),
        weights,
        ntrunc,
    })
}
