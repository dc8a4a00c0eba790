//! Gaussian latitudes and associated Legendre coefficient tables.
//!
//! The eight tables built here are pure functions of `(nlat, ntrunc)`
//! and are what the transform engine and the wind derivation consume.
//! Normalization conventions:
//!
//! - quadrature weights sum to 1 over the sphere,
//! - `P(m,n)` is fully normalized with `integral P^2 dmu = 2`,
//!
//! so that direct and inverse Legendre projections are exact inverses
//! for band-limited fields.

use gcm_common::{PostError, Result};
use ndarray::Array2;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

const NEWTON_MAX_ITER: usize = 50;
const NEWTON_TOL: f64 = 1e-16;

/// Legendre polynomial value P_n(x) by upward recurrence.
#[inline]
fn legendre_value(n: usize, x: f64) -> f64 {
    let mut p0 = 1.0;
    let mut p1 = x;
    if n == 0 {
        return p0;
    }
    for k in 2..=n {
        let pk = ((2 * k - 1) as f64 * x * p1 - (k - 1) as f64 * p0) / k as f64;
        p0 = p1;
        p1 = pk;
    }
    p1
}

/// Derivative dP_n/dx away from the poles.
#[inline]
fn legendre_derivative(n: usize, x: f64) -> f64 {
    let pn = legendre_value(n, x);
    let pn1 = legendre_value(n - 1, x);
    n as f64 * (x * pn - pn1) / (x * x - 1.0)
}

/// Compute the Gaussian latitudes and quadrature weights for `nlat` rows.
///
/// Returns `(sin(lat), weight)` pairs ordered north to south; the sine
/// latitudes are antisymmetric about the equator and the weights sum to 1.
pub fn gaussian_latitudes(nlat: usize) -> Result<(Vec<f64>, Vec<f64>)> {
    if nlat < 2 || nlat % 2 != 0 {
        return Err(PostError::dimension(format!(
            "gaussian grid needs an even latitude count >= 2, got {nlat}"
        )));
    }

    let mut sinlat = vec![0.0; nlat];
    let mut weights = vec![0.0; nlat];

    for j in 0..nlat / 2 {
        // Standard first guess for the j-th root of P_nlat.
        let mut x = (std::f64::consts::PI * (j as f64 + 0.75) / (nlat as f64 + 0.5)).cos();

        let mut converged = false;
        for _ in 0..NEWTON_MAX_ITER {
            let dx = legendre_value(nlat, x) / legendre_derivative(nlat, x);
            x -= dx;
            if dx.abs() <= NEWTON_TOL {
                converged = true;
                break;
            }
        }
        if !converged {
            return Err(PostError::format(format!(
                "gaussian latitude iteration failed to converge for nlat={nlat}"
            )));
        }

        let pn1 = legendre_value(nlat - 1, x);
        // Quadrature weight, normalized so all weights sum to 1.
        let w = (1.0 - x * x) / (nlat as f64 * pn1).powi(2);

        sinlat[j] = x;
        sinlat[nlat - 1 - j] = -x;
        weights[j] = w;
        weights[nlat - 1 - j] = w;
    }

    Ok((sinlat, weights))
}

/// Number of spectral modes of a triangular truncation.
pub fn ncsp(ntrunc: usize) -> usize {
    (ntrunc + 1) * (ntrunc + 2) / 2
}

/// (m, n) wavenumber pair of every mode, in storage order (m-major).
pub fn mode_wavenumbers(ntrunc: usize) -> Vec<(usize, usize)> {
    let mut out = Vec::with_capacity(ncsp(ntrunc));
    for m in 0..=ntrunc {
        for n in m..=ntrunc {
            out.push((m, n));
        }
    }
    out
}

/// The precomputed spectral basis for one `(nlat, ntrunc)` resolution.
///
/// Table roles (each shaped `(nlat, ncsp)`):
///
/// - `qi`: `P(m,n)` — harmonic synthesis
/// - `qj`: `Q(m,n) = (1-mu^2) dP/dmu` — derivative synthesis
/// - `qc`: `P * w` — forward projection with quadrature weight
/// - `qu`: `P * m / (n(n+1))` — zonal-derivative form for winds
/// - `qv`: `Q / (n(n+1))` — meridional-derivative form for winds
/// - `qe`: `Q * w / cos^2` — weighted derivative for tendencies
/// - `qq`: `P * w * m / cos^2` — weighted zonal derivative for tendencies
/// - `qm`: `P * m` — zonal derivative synthesis
#[derive(Debug)]
pub struct SpectralBasis {
    pub nlat: usize,
    pub ntrunc: usize,
    pub sinlat: Vec<f64>,
    pub coslat: Vec<f64>,
    pub weights: Vec<f64>,
    pub qi: Array2<f64>,
    pub qj: Array2<f64>,
    pub qc: Array2<f64>,
    pub qu: Array2<f64>,
    pub qv: Array2<f64>,
    pub qe: Array2<f64>,
    pub qq: Array2<f64>,
    pub qm: Array2<f64>,
}

impl SpectralBasis {
    /// Build the basis for one resolution.
    pub fn new(nlat: usize, ntrunc: usize) -> Result<Self> {
        let (sinlat, weights) = gaussian_latitudes(nlat)?;
        let coslat: Vec<f64> = sinlat.iter().map(|s| (1.0 - s * s).sqrt()).collect();
        let ncsp = ncsp(ntrunc);

        let mut qi = Array2::zeros((nlat, ncsp));
        let mut qj = Array2::zeros((nlat, ncsp));
        let mut qc = Array2::zeros((nlat, ncsp));
        let mut qu = Array2::zeros((nlat, ncsp));
        let mut qv = Array2::zeros((nlat, ncsp));
        let mut qe = Array2::zeros((nlat, ncsp));
        let mut qq = Array2::zeros((nlat, ncsp));
        let mut qm = Array2::zeros((nlat, ncsp));

        for jlat in 0..nlat {
            let mu = sinlat[jlat];
            let cos2 = 1.0 - mu * mu;
            let w = weights[jlat];
            // P(m,n) one degree past the truncation, for the derivative
            // recurrence at n = ntrunc.
            let pnm = normalized_pnm(mu, ntrunc + 1);

            let mut mode = 0;
            for m in 0..=ntrunc {
                for n in m..=ntrunc {
                    let p = pnm[pnm_index(m, n, ntrunc + 1)];
                    // Q(m,n) = (n+1) e(m,n) P(m,n-1) - n e(m,n+1) P(m,n+1)
                    let q = {
                        let up = epsilon(m, n + 1) * pnm[pnm_index(m, n + 1, ntrunc + 1)];
                        let down = if n > m {
                            epsilon(m, n) * pnm[pnm_index(m, n - 1, ntrunc + 1)]
                        } else {
                            0.0
                        };
                        (n + 1) as f64 * down - n as f64 * up
                    };
                    let nn1 = if n > 0 { (n * (n + 1)) as f64 } else { 1.0 };
                    let fm = m as f64;

                    qi[[jlat, mode]] = p;
                    qj[[jlat, mode]] = q;
                    qc[[jlat, mode]] = p * w;
                    qu[[jlat, mode]] = if n > 0 { p * fm / nn1 } else { 0.0 };
                    qv[[jlat, mode]] = if n > 0 { q / nn1 } else { 0.0 };
                    qe[[jlat, mode]] = q * w / cos2;
                    qq[[jlat, mode]] = p * w * fm / cos2;
                    qm[[jlat, mode]] = p * fm;
                    mode += 1;
                }
            }
        }

        debug!(nlat, ntrunc, "built spectral basis");

        Ok(Self {
            nlat,
            ntrunc,
            sinlat,
            coslat,
            weights,
            qi,
            qj,
            qc,
            qu,
            qv,
            qe,
            qq,
            qm,
        })
    }

    /// Number of spectral modes.
    pub fn ncsp(&self) -> usize {
        ncsp(self.ntrunc)
    }
}

/// e(m,n) = sqrt((n^2 - m^2) / (4 n^2 - 1)).
#[inline]
fn epsilon(m: usize, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let (m, n) = (m as f64, n as f64);
    ((n * n - m * m) / (4.0 * n * n - 1.0)).sqrt()
}

/// Flat index into the (m, n <= nmax) triangular table.
#[inline]
fn pnm_index(m: usize, n: usize, nmax: usize) -> usize {
    // Row m starts after rows 0..m, each row m' holding nmax+1-m' entries.
    m * (nmax + 1) - m * (m.saturating_sub(1)) / 2 + (n - m)
}

/// Fully normalized associated Legendre values P(m,n)(mu) for all
/// 0 <= m <= n <= nmax, triangular storage (see [`pnm_index`]).
fn normalized_pnm(mu: f64, nmax: usize) -> Vec<f64> {
    let cos = (1.0 - mu * mu).sqrt();
    let len = (nmax + 1) * (nmax + 2) / 2;
    let mut pnm = vec![0.0; len];

    // Diagonal: P(0,0) = 1, P(m,m) = cos * sqrt((2m+1)/(2m)) * P(m-1,m-1).
    let mut diag = 1.0;
    pnm[pnm_index(0, 0, nmax)] = diag;
    for m in 1..=nmax {
        diag *= cos * ((2 * m + 1) as f64 / (2 * m) as f64).sqrt();
        pnm[pnm_index(m, m, nmax)] = diag;
    }

    // Upward in n: P(m,n) = (mu P(m,n-1) - e(m,n-1) P(m,n-2)) / e(m,n).
    for m in 0..=nmax {
        for n in (m + 1)..=nmax {
            let p1 = pnm[pnm_index(m, n - 1, nmax)];
            let p2 = if n >= m + 2 {
                pnm[pnm_index(m, n - 2, nmax)]
            } else {
                0.0
            };
            pnm[pnm_index(m, n, nmax)] = (mu * p1 - epsilon(m, n - 1) * p2) / epsilon(m, n);
        }
    }

    pnm
}

/// Immutable, resolution-keyed cache of spectral bases.
///
/// Bases are built on first request and shared read-only afterwards.
#[derive(Debug, Default)]
pub struct BasisCache {
    inner: Mutex<HashMap<(usize, usize), Arc<SpectralBasis>>>,
}

impl BasisCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch or build the basis for `(nlat, ntrunc)`.
    pub fn get(&self, nlat: usize, ntrunc: usize) -> Result<Arc<SpectralBasis>> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(basis) = inner.get(&(nlat, ntrunc)) {
            return Ok(Arc::clone(basis));
        }
        let basis = Arc::new(SpectralBasis::new(nlat, ntrunc)?);
        inner.insert((nlat, ntrunc), Arc::clone(&basis));
        Ok(basis)
    }
}
