//! The transform engine: moves fields between spherical-harmonic,
//! Fourier and Gaussian-grid representations.
//!
//! Array layouts, always on the trailing axes:
//!
//! - spectral: `[..., 2 * ncsp]`, interleaved real/imaginary pairs in
//!   m-major mode order,
//! - Fourier: `[..., nlat, 2 * (ntrunc + 1)]`, interleaved pairs per
//!   zonal wavenumber,
//! - grid: `[..., nlat, nlon]`.
//!
//! The representation of an input is recognized from its shape, so the
//! high-level `to_*` entry points accept any of the three.

use crate::basis::{mode_wavenumbers, SpectralBasis};
use crate::fft::{Cpx, FftPlan};
use gcm_common::{PostError, Result};
use ndarray::ArrayD;
use std::sync::Arc;
use tracing::debug;

/// How a field is currently represented, recognized from its shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    Spectral,
    Fourier,
    Grid,
}

/// Transform engine bound to one resolution.
pub struct TransformEngine {
    basis: Arc<SpectralBasis>,
    plan: FftPlan,
    nlon: usize,
    /// Per-mode damping `exp(-8 (n/T)^8)`, present when the physics
    /// filter is enabled.
    filter: Option<Vec<f64>>,
}

impl TransformEngine {
    pub fn new(basis: Arc<SpectralBasis>, nlon: usize, physics_filter: bool) -> Result<Self> {
        if nlon <= 2 * basis.ntrunc {
            return Err(PostError::dimension(format!(
                "{nlon} longitudes cannot carry zonal wavenumbers up to {}",
                basis.ntrunc
            )));
        }
        let plan = FftPlan::new(nlon)?;
        let filter = physics_filter.then(|| {
            let t = basis.ntrunc as f64;
            mode_wavenumbers(basis.ntrunc)
                .iter()
                .map(|&(_, n)| (-8.0 * (n as f64 / t).powi(8)).exp())
                .collect()
        });
        debug!(nlat = basis.nlat, nlon, ntrunc = basis.ntrunc, "transform engine ready");
        Ok(Self { basis, plan, nlon, filter })
    }

    pub fn basis(&self) -> &Arc<SpectralBasis> {
        &self.basis
    }

    pub fn nlat(&self) -> usize {
        self.basis.nlat
    }

    pub fn nlon(&self) -> usize {
        self.nlon
    }

    pub fn ntrunc(&self) -> usize {
        self.basis.ntrunc
    }

    /// Spectral trailing-axis length, `2 * ncsp`.
    pub fn nspec(&self) -> usize {
        2 * self.basis.ncsp()
    }

    fn nfc(&self) -> usize {
        2 * (self.basis.ntrunc + 1)
    }

    /// Recognize the representation of a shape by its trailing axes.
    pub fn representation_of(&self, shape: &[usize]) -> Result<Representation> {
        if shape.last() == Some(&self.nspec()) {
            return Ok(Representation::Spectral);
        }
        if shape.len() >= 2 && shape[shape.len() - 2] == self.basis.nlat {
            if shape[shape.len() - 1] == self.nlon {
                return Ok(Representation::Grid);
            }
            if shape[shape.len() - 1] == self.nfc() {
                return Ok(Representation::Fourier);
            }
        }
        Err(PostError::dimension(format!(
            "shape {shape:?} matches no representation at nlat={} nlon={} ntrunc={}",
            self.basis.nlat, self.nlon, self.basis.ntrunc
        )))
    }

    /// Inverse Legendre transform: spectral to Fourier coefficients.
    pub fn sp2fc(&self, sp: &ArrayD<f64>) -> Result<ArrayD<f64>> {
        let (flat, prefix) = self.flatten(sp, &[self.nspec()])?;
        let nlat = self.basis.nlat;
        let ncsp = self.basis.ncsp();
        let nfc = self.nfc();
        let modes = mode_wavenumbers(self.basis.ntrunc);
        let nsamples = flat.len() / self.nspec();

        let mut out = vec![0.0; nsamples * nlat * nfc];
        for s in 0..nsamples {
            let sp = &flat[s * 2 * ncsp..(s + 1) * 2 * ncsp];
            let fc = &mut out[s * nlat * nfc..(s + 1) * nlat * nfc];
            for jlat in 0..nlat {
                for (mode, &(m, _)) in modes.iter().enumerate() {
                    let damp = self.filter.as_ref().map_or(1.0, |f| f[mode]);
                    let p = self.basis.qi[[jlat, mode]] * damp;
                    fc[jlat * nfc + 2 * m] += p * sp[2 * mode];
                    fc[jlat * nfc + 2 * m + 1] += p * sp[2 * mode + 1];
                }
            }
        }

        self.unflatten(out, prefix, &[nlat, nfc])
    }

    /// Direct Legendre transform: Fourier coefficients to spectral.
    pub fn fc2sp(&self, fc: &ArrayD<f64>) -> Result<ArrayD<f64>> {
        let nlat = self.basis.nlat;
        let nfc = self.nfc();
        let (flat, prefix) = self.flatten(fc, &[nlat, nfc])?;
        let ncsp = self.basis.ncsp();
        let modes = mode_wavenumbers(self.basis.ntrunc);
        let nsamples = flat.len() / (nlat * nfc);

        let mut out = vec![0.0; nsamples * 2 * ncsp];
        for s in 0..nsamples {
            let fc = &flat[s * nlat * nfc..(s + 1) * nlat * nfc];
            let sp = &mut out[s * 2 * ncsp..(s + 1) * 2 * ncsp];
            for (mode, &(m, _)) in modes.iter().enumerate() {
                let damp = self.filter.as_ref().map_or(1.0, |f| f[mode]);
                let mut re = 0.0;
                let mut im = 0.0;
                for jlat in 0..nlat {
                    let pw = self.basis.qc[[jlat, mode]];
                    re += pw * fc[jlat * nfc + 2 * m];
                    im += pw * fc[jlat * nfc + 2 * m + 1];
                }
                sp[2 * mode] = re * damp;
                sp[2 * mode + 1] = im * damp;
            }
        }

        self.unflatten(out, prefix, &[2 * ncsp])
    }

    /// Fourier synthesis: zonal coefficients to grid-point rows.
    ///
    /// Each latitude row is expanded hermitian-symmetrically into a full
    /// complex spectrum and passed through the unscaled inverse DFT, so
    /// the grid values come out in physical units directly.
    pub fn fc2gp(&self, fc: &ArrayD<f64>) -> Result<ArrayD<f64>> {
        let nlat = self.basis.nlat;
        let nfc = self.nfc();
        let (flat, prefix) = self.flatten(fc, &[nlat, nfc])?;
        let nlon = self.nlon;
        let ntrunc = self.basis.ntrunc;
        let nrows = flat.len() / nfc;

        let mut out = Vec::with_capacity(nrows * nlon);
        let mut spectrum = vec![Cpx::ZERO; nlon];
        for row in 0..nrows {
            let fc = &flat[row * nfc..(row + 1) * nfc];
            for v in &mut spectrum {
                *v = Cpx::ZERO;
            }
            spectrum[0] = Cpx::new(fc[0], 0.0);
            for m in 1..=ntrunc {
                let c = Cpx::new(fc[2 * m], fc[2 * m + 1]);
                spectrum[m] = c;
                spectrum[nlon - m] = c.conj();
            }
            let grid = self.plan.inverse(&spectrum);
            out.extend(grid.iter().map(|c| c.re));
        }

        self.unflatten(out, prefix, &[nlat, nlon])
    }

    /// Fourier analysis: grid-point rows to zonal coefficients.
    pub fn gp2fc(&self, gp: &ArrayD<f64>) -> Result<ArrayD<f64>> {
        let nlat = self.basis.nlat;
        let nlon = self.nlon;
        let (flat, prefix) = self.flatten(gp, &[nlat, nlon])?;
        let nfc = self.nfc();
        let ntrunc = self.basis.ntrunc;
        let nrows = flat.len() / nlon;

        let mut out = Vec::with_capacity(nrows * nfc);
        for row in 0..nrows {
            let gp = &flat[row * nlon..(row + 1) * nlon];
            let signal: Vec<Cpx> = gp.iter().map(|&v| Cpx::new(v, 0.0)).collect();
            let spectrum = self.plan.forward(&signal);
            for m in 0..=ntrunc {
                out.push(spectrum[m].re);
                out.push(spectrum[m].im);
            }
        }

        self.unflatten(out, prefix, &[nlat, nfc])
    }

    /// Spectral straight to grid.
    pub fn sp2gp(&self, sp: &ArrayD<f64>) -> Result<ArrayD<f64>> {
        self.fc2gp(&self.sp2fc(sp)?)
    }

    /// Grid straight to spectral.
    pub fn gp2sp(&self, gp: &ArrayD<f64>) -> Result<ArrayD<f64>> {
        self.fc2sp(&self.gp2fc(gp)?)
    }

    /// Bring a field of any representation to grid points.
    pub fn to_grid(&self, data: &ArrayD<f64>) -> Result<ArrayD<f64>> {
        match self.representation_of(data.shape())? {
            Representation::Spectral => self.sp2gp(data),
            Representation::Fourier => self.fc2gp(data),
            Representation::Grid => Ok(data.clone()),
        }
    }

    /// Bring a field of any representation to Fourier coefficients.
    pub fn to_fourier(&self, data: &ArrayD<f64>) -> Result<ArrayD<f64>> {
        match self.representation_of(data.shape())? {
            Representation::Spectral => self.sp2fc(data),
            Representation::Fourier => Ok(data.clone()),
            Representation::Grid => self.gp2fc(data),
        }
    }

    /// Bring a field of any representation to spectral modes.
    pub fn to_spectral(&self, data: &ArrayD<f64>) -> Result<ArrayD<f64>> {
        match self.representation_of(data.shape())? {
            Representation::Spectral => Ok(data.clone()),
            Representation::Fourier => self.fc2sp(data),
            Representation::Grid => self.gp2sp(data),
        }
    }

    /// Horizontal winds from spectral vorticity and divergence.
    ///
    /// In Fourier space, per zonal wavenumber m and latitude:
    ///
    /// ```text
    /// U = a sum_n ( qv * zeta - i qu * delta )
    /// V = a sum_n ( -i qu * zeta - qv * delta )
    /// ```
    ///
    /// then synthesis to grid and division by cos(lat) yields u, v.
    pub fn uv_from_vordiv(
        &self,
        vort: &ArrayD<f64>,
        div: &ArrayD<f64>,
        radius: f64,
    ) -> Result<(ArrayD<f64>, ArrayD<f64>)> {
        let (zeta, prefix) = self.flatten(vort, &[self.nspec()])?;
        let (delta, dprefix) = self.flatten(div, &[self.nspec()])?;
        if prefix != dprefix {
            return Err(PostError::dimension(
                "vorticity and divergence shapes disagree",
            ));
        }

        let nlat = self.basis.nlat;
        let ncsp = self.basis.ncsp();
        let nfc = self.nfc();
        let modes = mode_wavenumbers(self.basis.ntrunc);
        let nsamples = zeta.len() / (2 * ncsp);

        let mut ufc = vec![0.0; nsamples * nlat * nfc];
        let mut vfc = vec![0.0; nsamples * nlat * nfc];
        for s in 0..nsamples {
            let z = &zeta[s * 2 * ncsp..(s + 1) * 2 * ncsp];
            let d = &delta[s * 2 * ncsp..(s + 1) * 2 * ncsp];
            let uf = &mut ufc[s * nlat * nfc..(s + 1) * nlat * nfc];
            let vf = &mut vfc[s * nlat * nfc..(s + 1) * nlat * nfc];
            for jlat in 0..nlat {
                for (mode, &(m, _)) in modes.iter().enumerate() {
                    let qu = self.basis.qu[[jlat, mode]] * radius;
                    let qv = self.basis.qv[[jlat, mode]] * radius;
                    let (zre, zim) = (z[2 * mode], z[2 * mode + 1]);
                    let (dre, dim) = (d[2 * mode], d[2 * mode + 1]);
                    uf[jlat * nfc + 2 * m] += qv * zre + qu * dim;
                    uf[jlat * nfc + 2 * m + 1] += qv * zim - qu * dre;
                    vf[jlat * nfc + 2 * m] += qu * zim - qv * dre;
                    vf[jlat * nfc + 2 * m + 1] += -qu * zre - qv * dim;
                }
            }
        }

        let ufc = self.unflatten(ufc, prefix.clone(), &[nlat, nfc])?;
        let vfc = self.unflatten(vfc, prefix, &[nlat, nfc])?;
        let mut u = self.fc2gp(&ufc)?;
        let mut v = self.fc2gp(&vfc)?;
        self.divide_by_coslat(&mut u);
        self.divide_by_coslat(&mut v);
        Ok((u, v))
    }

    /// Divide a grid field by cos(lat) in place (second-to-last axis).
    fn divide_by_coslat(&self, grid: &mut ArrayD<f64>) {
        let nlon = self.nlon;
        let nlat = self.basis.nlat;
        let plane = nlat * nlon;
        for (i, v) in grid.iter_mut().enumerate() {
            let jlat = (i % plane) / nlon;
            *v /= self.basis.coslat[jlat];
        }
    }

    /// Check the trailing axes and return the data as a contiguous flat
    /// vector plus the leading shape prefix.
    fn flatten(&self, data: &ArrayD<f64>, trailing: &[usize]) -> Result<(Vec<f64>, Vec<usize>)> {
        let shape = data.shape();
        if shape.len() < trailing.len() || !shape.ends_with(trailing) {
            return Err(PostError::dimension(format!(
                "shape {shape:?} does not end with {trailing:?}"
            )));
        }
        let prefix = shape[..shape.len() - trailing.len()].to_vec();
        Ok((data.iter().copied().collect(), prefix))
    }

    fn unflatten(&self, flat: Vec<f64>, prefix: Vec<usize>, trailing: &[usize]) -> Result<ArrayD<f64>> {
        let mut shape = prefix;
        shape.extend_from_slice(trailing);
        ArrayD::from_shape_vec(shape, flat)
            .map_err(|e| PostError::dimension(format!("transform output reshape failed: {e}")))
    }
}
