//! Transform round trips at realistic model resolutions.

use ndarray::ArrayD;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spectral_transform::{ncsp, SpectralBasis, TransformEngine};
use std::sync::Arc;

/// Random coefficients of a real field: the m = 0 modes are their own
/// conjugates, so their imaginary parts are held at zero.
fn random_spectral(rng: &mut StdRng, ntrunc: usize, nsamples: usize) -> ArrayD<f64> {
    let n = 2 * ncsp(ntrunc);
    let mut data: Vec<f64> = (0..nsamples * n).map(|_| rng.gen_range(-1.0..1.0)).collect();
    for s in 0..nsamples {
        // m-major mode order: the first ntrunc+1 modes are m = 0.
        for mode in 0..=ntrunc {
            data[s * n + 2 * mode + 1] = 0.0;
        }
    }
    let shape = if nsamples == 1 {
        vec![n]
    } else {
        vec![nsamples, n]
    };
    ArrayD::from_shape_vec(shape, data).unwrap()
}

#[test]
fn spectral_grid_roundtrip_t21() {
    // T21 on the standard 32 x 64 Gaussian grid.
    let basis = Arc::new(SpectralBasis::new(32, 21).unwrap());
    let eng = TransformEngine::new(basis, 64, false).unwrap();
    let mut rng = StdRng::seed_from_u64(21);

    let sp = random_spectral(&mut rng, 21, 3);
    let grid = eng.to_grid(&sp).unwrap();
    assert_eq!(grid.shape(), &[3, 32, 64]);

    let back = eng.to_spectral(&grid).unwrap();
    let mut worst = 0.0f64;
    for (a, b) in back.iter().zip(sp.iter()) {
        worst = worst.max((a - b).abs());
    }
    assert!(worst < 1e-9, "worst deviation {worst}");
}

#[test]
fn spectral_fourier_grid_chain_agrees_with_direct() {
    let basis = Arc::new(SpectralBasis::new(16, 10).unwrap());
    let eng = TransformEngine::new(basis, 48, false).unwrap();
    let mut rng = StdRng::seed_from_u64(7);

    let sp = random_spectral(&mut rng, 10, 1);
    let via_fourier = eng.fc2gp(&eng.sp2fc(&sp).unwrap()).unwrap();
    let direct = eng.to_grid(&sp).unwrap();
    for (a, b) in via_fourier.iter().zip(direct.iter()) {
        assert!((a - b).abs() < 1e-12);
    }
}

#[test]
fn rotation_wind_is_purely_zonal() {
    // Solid-body rotation: zeta = 2 Omega mu is the (0,1) spherical
    // harmonic, which must synthesize u = Omega a cos(lat), v = 0.
    let radius = 6.371e6;
    let omega = 7.292e-5;
    let nlat = 32;
    let basis = Arc::new(SpectralBasis::new(nlat, 21).unwrap());
    let coslat = basis.coslat.clone();
    let eng = TransformEngine::new(basis, 64, false).unwrap();

    // zeta(0,1) spectral coefficient: 2 Omega mu = c * P(0,1) with
    // P(0,1) = sqrt(3) mu, so c = 2 Omega / sqrt(3).
    let mut sp = vec![0.0; eng.nspec()];
    sp[2] = 2.0 * omega / 3.0_f64.sqrt();
    let zeta = ArrayD::from_shape_vec(vec![eng.nspec()], sp).unwrap();
    let div = ArrayD::zeros(vec![eng.nspec()]);

    let (u, v) = eng.uv_from_vordiv(&zeta, &div, radius).unwrap();
    for jlat in 0..nlat {
        let expect = omega * radius * coslat[jlat];
        for i in 0..64 {
            assert!((u[[jlat, i]] - expect).abs() < expect.abs() * 1e-9 + 1e-9);
            assert!(v[[jlat, i]].abs() < 1e-6);
        }
    }
}
