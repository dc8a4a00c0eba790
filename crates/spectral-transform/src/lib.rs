//! Spherical-harmonic / Fourier / Gaussian-grid transform engine.
//!
//! Built from three layers:
//!
//! - [`basis`]: Gaussian latitudes, quadrature weights and the
//!   precomputed Legendre coefficient tables, cached per resolution,
//! - [`fft`]: the mixed-radix Fourier transform over longitude,
//! - [`engine`]: the [`engine::TransformEngine`] combining both, with
//!   shape-recognized conversion between the three representations and
//!   the wind synthesis from vorticity and divergence.

pub mod basis;
pub mod engine;
pub mod fft;

pub use basis::{gaussian_latitudes, mode_wavenumbers, ncsp, BasisCache, SpectralBasis};
pub use engine::{Representation, TransformEngine};
pub use fft::{Cpx, FftPlan};
