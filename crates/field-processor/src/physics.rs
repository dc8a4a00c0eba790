//! Grid-space physics formulas.
//!
//! All functions here operate on grid-point arrays in concrete
//! dimensionality: surface fields `(time, lat, lon)` and leveled fields
//! `(time, lev, lat, lon)`. Vertical coordinates are sigma values, so
//! pressures are formed as `sigma * ps` per column.

use gcm_common::constants::{
    PlanetConstants, EPSILON, ESAT_REFERENCE, LAPSE_RATE, MAGNUS_A, MAGNUS_B, T_TRIPLE,
    VTMP_FACTOR,
};
use ndarray::{Array3, Array4, ArrayView3, ArrayView4};

/// Centered horizontal gradients of a surface field on the sphere.
///
/// Zonal differences wrap around; meridional differences are one-sided
/// at the first and last Gaussian rows. Latitudes come in as radians in
/// storage order (north to south), which the difference quotient handles
/// by construction.
pub fn horizontal_gradients(
    field: ArrayView3<f64>,
    lat_rad: &[f64],
    coslat: &[f64],
    radius: f64,
) -> (Array3<f64>, Array3<f64>) {
    let (ntime, nlat, nlon) = field.dim();
    let dlambda = std::f64::consts::TAU / nlon as f64;

    let mut ddx = Array3::zeros((ntime, nlat, nlon));
    let mut ddy = Array3::zeros((ntime, nlat, nlon));

    for t in 0..ntime {
        for i in 0..nlat {
            let zonal_scale = 2.0 * dlambda * radius * coslat[i];
            for j in 0..nlon {
                let east = field[[t, i, (j + 1) % nlon]];
                let west = field[[t, i, (j + nlon - 1) % nlon]];
                ddx[[t, i, j]] = (east - west) / zonal_scale;

                let (i0, i1) = (i.saturating_sub(1), (i + 1).min(nlat - 1));
                let dphi = lat_rad[i1] - lat_rad[i0];
                ddy[[t, i, j]] = (field[[t, i1, j]] - field[[t, i0, j]]) / (dphi * radius);
            }
        }
    }

    (ddx, ddy)
}

/// Vertical pressure velocity from the continuity equation:
///
/// ```text
/// omega_k = p_k * adv_k - integral_0^{p_k} (div + adv) dp
/// ```
///
/// with `adv = u d(lnps)/dx + v d(lnps)/dy` and the integral taken as a
/// cumulative trapezoid over the sigma layers of the column.
#[allow(clippy::too_many_arguments)]
pub fn omega(
    ps: ArrayView3<f64>,
    u: ArrayView4<f64>,
    v: ArrayView4<f64>,
    div: ArrayView4<f64>,
    dlnps_dx: ArrayView3<f64>,
    dlnps_dy: ArrayView3<f64>,
    sigma_full: &[f64],
    sigma_half: &[f64],
) -> Array4<f64> {
    let (ntime, nlev, nlat, nlon) = u.dim();
    let mut out = Array4::zeros((ntime, nlev, nlat, nlon));

    for t in 0..ntime {
        for i in 0..nlat {
            for j in 0..nlon {
                let psv = ps[[t, i, j]];
                let gx = dlnps_dx[[t, i, j]];
                let gy = dlnps_dy[[t, i, j]];

                let mut acc = 0.0;
                let mut sigma_above = 0.0;
                for k in 0..nlev {
                    let adv = u[[t, k, i, j]] * gx + v[[t, k, i, j]] * gy;
                    let tend = div[[t, k, i, j]] + adv;
                    let dp = (sigma_half[k] - sigma_above) * psv;
                    // Integral up to the full level: all layers above in
                    // full, half of the current one.
                    let to_mid = acc + 0.5 * tend * dp;
                    out[[t, k, i, j]] = sigma_full[k] * psv * adv - to_mid;
                    acc += tend * dp;
                    sigma_above = sigma_half[k];
                }
            }
        }
    }

    out
}

/// Geometric vertical wind, `w = -omega R T / (g p)`.
pub fn vertical_wind(
    omega: ArrayView4<f64>,
    ta: ArrayView4<f64>,
    ps: ArrayView3<f64>,
    sigma_full: &[f64],
    planet: &PlanetConstants,
) -> Array4<f64> {
    let (ntime, nlev, nlat, nlon) = omega.dim();
    let mut out = Array4::zeros((ntime, nlev, nlat, nlon));

    for t in 0..ntime {
        for k in 0..nlev {
            for i in 0..nlat {
                for j in 0..nlon {
                    let p = sigma_full[k] * ps[[t, i, j]];
                    out[[t, k, i, j]] = -omega[[t, k, i, j]] * planet.gas_constant
                        * ta[[t, k, i, j]]
                        / (planet.gravity * p);
                }
            }
        }
    }

    out
}

/// Sea-level pressure by standard-atmosphere lapse extrapolation.
///
/// Where the surface geopotential is negligible the surface pressure is
/// returned verbatim. Otherwise the lapse exponent is adjusted when the
/// extrapolated sea-level temperature nearly equals the station value,
/// which would otherwise hit a removable singularity in the log term.
pub fn sea_level_pressure(
    ps: ArrayView3<f64>,
    surface_geopotential: ArrayView3<f64>,
    ta_lowest: ArrayView3<f64>,
    sigma_lowest: f64,
    planet: &PlanetConstants,
) -> Array3<f64> {
    let (ntime, nlat, nlon) = ps.dim();
    let rd = planet.gas_constant;
    let g = planet.gravity;
    let mut out = Array3::zeros((ntime, nlat, nlon));

    for t in 0..ntime {
        for i in 0..nlat {
            for j in 0..nlon {
                let psv = ps[[t, i, j]];
                let geo = surface_geopotential[[t, i, j]];
                if geo.abs() < 1e-4 {
                    out[[t, i, j]] = psv;
                    continue;
                }

                // Extrapolate the lowest-layer temperature down to the
                // surface along the standard lapse rate.
                let mut tstar =
                    (1.0 + LAPSE_RATE * rd / g * (1.0 / sigma_lowest - 1.0)) * ta_lowest[[t, i, j]];
                if tstar < 255.0 {
                    tstar = 0.5 * (255.0 + tstar);
                }
                let mut tmsl = tstar + LAPSE_RATE * geo / g;
                if tmsl > 290.5 && tstar > 290.5 {
                    tstar = 0.5 * (290.5 + tstar);
                    tmsl = tstar;
                }

                let alpha = if (tmsl - tstar).abs() < 1e-6 {
                    0.0
                } else {
                    rd * (tmsl - tstar) / geo
                };
                let zprt = geo / (rd * tstar);
                let zprtal = zprt * alpha;
                out[[t, i, j]] = psv * (zprt * (1.0 - zprtal * (0.5 - zprtal / 3.0))).exp();
            }
        }
    }

    out
}

/// Geopotential height by hydrostatic integration from the surface up.
///
/// The virtual-temperature correction is applied when specific humidity
/// is available; the dry form otherwise.
pub fn geopotential_height(
    ta: ArrayView4<f64>,
    hus: Option<ArrayView4<f64>>,
    surface_geopotential: ArrayView3<f64>,
    sigma_full: &[f64],
    sigma_half: &[f64],
    planet: &PlanetConstants,
) -> Array4<f64> {
    let (ntime, nlev, nlat, nlon) = ta.dim();
    let rd = planet.gas_constant;
    let mut out = Array4::zeros((ntime, nlev, nlat, nlon));

    for t in 0..ntime {
        for i in 0..nlat {
            for j in 0..nlon {
                // Half-level geopotential, walking from the surface up.
                let mut phi_below = surface_geopotential[[t, i, j]];
                for k in (0..nlev).rev() {
                    let tv = match hus {
                        Some(q) => ta[[t, k, i, j]] * (1.0 + VTMP_FACTOR * q[[t, k, i, j]]),
                        None => ta[[t, k, i, j]],
                    };
                    let sh_below = sigma_half[k];
                    out[[t, k, i, j]] =
                        (phi_below + rd * tv * (sh_below / sigma_full[k]).ln()) / planet.gravity;
                    if k > 0 {
                        phi_below += rd * tv * (sh_below / sigma_half[k - 1]).ln();
                    }
                }
            }
        }
    }

    out
}

/// Magnus-type saturation vapor pressure over water [Pa].
pub fn saturation_vapor_pressure(t: f64) -> f64 {
    ESAT_REFERENCE * (MAGNUS_A * (t - T_TRIPLE) / (t - MAGNUS_B)).exp()
}

/// Relative humidity in percent, clamped to `[0, 100]`.
pub fn relative_humidity(
    ta: ArrayView4<f64>,
    hus: ArrayView4<f64>,
    ps: ArrayView3<f64>,
    sigma_full: &[f64],
) -> Array4<f64> {
    let (ntime, nlev, nlat, nlon) = ta.dim();
    let mut out = Array4::zeros((ntime, nlev, nlat, nlon));

    for t in 0..ntime {
        for k in 0..nlev {
            for i in 0..nlat {
                for j in 0..nlon {
                    let p = sigma_full[k] * ps[[t, i, j]];
                    let esat = saturation_vapor_pressure(ta[[t, k, i, j]]);
                    let denom = p - (1.0 - EPSILON) * esat;
                    let value = if denom <= 0.0 {
                        // Saturation pressure at or above ambient pressure.
                        100.0
                    } else {
                        let qsat = EPSILON * esat / denom;
                        100.0 * hus[[t, k, i, j]] / qsat
                    };
                    out[[t, k, i, j]] = value.clamp(0.0, 100.0);
                }
            }
        }
    }

    out
}

/// Mass streamfunction: cumulative pressure integral of the meridional
/// wind scaled by `2 pi radius cos(lat) / g`. `sign` is -1 in the
/// substellar-rotated frame, +1 otherwise.
pub fn streamfunction(
    v: ArrayView4<f64>,
    ps: ArrayView3<f64>,
    sigma_half: &[f64],
    coslat: &[f64],
    planet: &PlanetConstants,
    sign: f64,
) -> Array4<f64> {
    let (ntime, nlev, nlat, nlon) = v.dim();
    let mut out = Array4::zeros((ntime, nlev, nlat, nlon));

    for t in 0..ntime {
        for i in 0..nlat {
            let scale = sign * std::f64::consts::TAU * planet.radius * coslat[i] / planet.gravity;
            for j in 0..nlon {
                let psv = ps[[t, i, j]];
                let mut acc = 0.0;
                let mut sigma_above = 0.0;
                for k in 0..nlev {
                    acc += v[[t, k, i, j]] * (sigma_half[k] - sigma_above) * psv;
                    out[[t, k, i, j]] = scale * acc;
                    sigma_above = sigma_half[k];
                }
            }
        }
    }

    out
}

/// Potential temperature at half levels: the boundary-mean temperature
/// scaled by `(ps / p_half)^kappa`; the lowest half level is the surface
/// temperature itself.
pub fn half_level_theta(
    ta: ArrayView4<f64>,
    ts: ArrayView3<f64>,
    sigma_half: &[f64],
    planet: &PlanetConstants,
) -> Array4<f64> {
    let (ntime, nlev, nlat, nlon) = ta.dim();
    let kappa = planet.kappa();
    let mut out = Array4::zeros((ntime, nlev, nlat, nlon));

    for t in 0..ntime {
        for i in 0..nlat {
            for j in 0..nlon {
                for k in 0..nlev - 1 {
                    // (ps / p_half)^kappa = sigma_half^-kappa.
                    let tbar = 0.5 * (ta[[t, k, i, j]] + ta[[t, k + 1, i, j]]);
                    out[[t, k, i, j]] = tbar * sigma_half[k].powf(-kappa);
                }
                out[[t, nlev - 1, i, j]] = ts[[t, i, j]];
            }
        }
    }

    out
}

/// Full-level potential temperature: the mean of the bounding half
/// levels, with the topmost layer taking its lower boundary's value.
pub fn full_level_theta(thetah: ArrayView4<f64>) -> Array4<f64> {
    let (ntime, nlev, nlat, nlon) = thetah.dim();
    let mut out = Array4::zeros((ntime, nlev, nlat, nlon));

    for t in 0..ntime {
        for i in 0..nlat {
            for j in 0..nlon {
                out[[t, 0, i, j]] = thetah[[t, 0, i, j]];
                for k in 1..nlev {
                    out[[t, k, i, j]] = 0.5 * (thetah[[t, k - 1, i, j]] + thetah[[t, k, i, j]]);
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, Array4};

    fn earth() -> PlanetConstants {
        PlanetConstants::earth()
    }

    #[test]
    fn test_zonal_gradient_of_wave() {
        // f = sin(lambda) on 2 rows, gradient = cos(lambda)/(a cos(phi)).
        let nlon = 64;
        let lat_rad = [0.5, -0.5];
        let coslat = [0.5f64.cos(), 0.5f64.cos()];
        let radius = 6.371e6;
        let field = Array3::from_shape_fn((1, 2, nlon), |(_, _, j)| {
            (std::f64::consts::TAU * j as f64 / nlon as f64).sin()
        });

        let (ddx, _) = horizontal_gradients(field.view(), &lat_rad, &coslat, radius);
        for j in 0..nlon {
            let lam = std::f64::consts::TAU * j as f64 / nlon as f64;
            let expect = lam.cos() / (radius * coslat[0]);
            // Centered differences on 64 points: ~0.3% accurate.
            assert!((ddx[[0, 0, j]] - expect).abs() < 5e-3 * expect.abs() + 1e-12);
        }
    }

    #[test]
    fn test_omega_vanishes_for_resting_atmosphere() {
        let (nt, nl, ny, nx) = (1, 3, 2, 4);
        let ps = Array3::from_elem((nt, ny, nx), 1.0e5);
        let zeros4 = Array4::zeros((nt, nl, ny, nx));
        let zeros3 = Array3::zeros((nt, ny, nx));
        let out = omega(
            ps.view(),
            zeros4.view(),
            zeros4.view(),
            zeros4.view(),
            zeros3.view(),
            zeros3.view(),
            &[0.25, 0.55, 0.85],
            &[0.4, 0.7, 1.0],
        );
        for &v in out.iter() {
            assert!(v.abs() < 1e-30);
        }
    }

    #[test]
    fn test_omega_uniform_divergence_column() {
        // Constant divergence D and no advection: the integral term gives
        // omega_k = -D * p_k.
        let (nt, nl, ny, nx) = (1, 2, 1, 1);
        let d = 1e-5;
        let psv = 1.0e5;
        let ps = Array3::from_elem((nt, ny, nx), psv);
        let div = Array4::from_elem((nt, nl, ny, nx), d);
        let zeros4 = Array4::zeros((nt, nl, ny, nx));
        let zeros3 = Array3::zeros((nt, ny, nx));
        let sigma_full = [0.25, 0.75];
        let sigma_half = [0.5, 1.0];

        let out = omega(
            ps.view(),
            zeros4.view(),
            zeros4.view(),
            div.view(),
            zeros3.view(),
            zeros3.view(),
            &sigma_full,
            &sigma_half,
        );
        for k in 0..nl {
            let expect = -d * sigma_full[k] * psv;
            assert!((out[[0, k, 0, 0]] - expect).abs() < 1e-9);
        }
    }

    #[test]
    fn test_slp_identity_over_flat_terrain() {
        let ps = Array3::from_elem((1, 2, 2), 101_325.0);
        let geo = Array3::zeros((1, 2, 2));
        let ta = Array3::from_elem((1, 2, 2), 288.0);
        let out = sea_level_pressure(ps.view(), geo.view(), ta.view(), 0.95, &earth());
        for &v in out.iter() {
            assert!((v - 101_325.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_slp_exceeds_surface_pressure_over_high_ground() {
        // 1000 m of orography at standard conditions: roughly +120 hPa.
        let g = earth().gravity;
        let ps = Array3::from_elem((1, 1, 1), 90_000.0);
        let geo = Array3::from_elem((1, 1, 1), 1000.0 * g);
        let ta = Array3::from_elem((1, 1, 1), 281.0);
        let out = sea_level_pressure(ps.view(), geo.view(), ta.view(), 0.95, &earth());
        let psl = out[[0, 0, 0]];
        assert!(psl > 95_000.0 && psl < 110_000.0, "psl = {psl}");
    }

    #[test]
    fn test_relative_humidity_clamped() {
        let ta = Array4::from_elem((1, 1, 1, 2), 300.0);
        let mut hus = Array4::zeros((1, 1, 1, 2));
        hus[[0, 0, 0, 0]] = 1.0; // far beyond saturation
        hus[[0, 0, 0, 1]] = -0.001; // spurious negative from the transform
        let ps = Array3::from_elem((1, 1, 2), 1.0e5);
        let out = relative_humidity(ta.view(), hus.view(), ps.view(), &[0.9]);
        assert!((out[[0, 0, 0, 0]] - 100.0).abs() < 1e-12);
        assert!(out[[0, 0, 0, 1]].abs() < 1e-12);
    }

    #[test]
    fn test_relative_humidity_midrange() {
        // q = 0.5 qsat must come out near 50%.
        let t = 290.0;
        let p = 0.9 * 1.0e5;
        let esat = saturation_vapor_pressure(t);
        let qsat = EPSILON * esat / (p - (1.0 - EPSILON) * esat);

        let ta = Array4::from_elem((1, 1, 1, 1), t);
        let hus = Array4::from_elem((1, 1, 1, 1), 0.5 * qsat);
        let ps = Array3::from_elem((1, 1, 1), 1.0e5);
        let out = relative_humidity(ta.view(), hus.view(), ps.view(), &[0.9]);
        assert!((out[[0, 0, 0, 0]] - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_geopotential_height_increases_upward() {
        let ta = Array4::from_elem((1, 3, 1, 1), 270.0);
        let geo = Array3::zeros((1, 1, 1));
        let out = geopotential_height(
            ta.view(),
            None,
            geo.view(),
            &[0.25, 0.55, 0.85],
            &[0.4, 0.7, 1.0],
            &earth(),
        );
        assert!(out[[0, 0, 0, 0]] > out[[0, 1, 0, 0]]);
        assert!(out[[0, 1, 0, 0]] > out[[0, 2, 0, 0]]);
        assert!(out[[0, 2, 0, 0]] > 0.0);
    }

    #[test]
    fn test_virtual_temperature_raises_heights() {
        let ta = Array4::from_elem((1, 2, 1, 1), 280.0);
        let hus = Array4::from_elem((1, 2, 1, 1), 0.01);
        let geo = Array3::zeros((1, 1, 1));
        let sigma_full = [0.4, 0.8];
        let sigma_half = [0.6, 1.0];

        let dry = geopotential_height(
            ta.view(), None, geo.view(), &sigma_full, &sigma_half, &earth(),
        );
        let moist = geopotential_height(
            ta.view(),
            Some(hus.view()),
            geo.view(),
            &sigma_full,
            &sigma_half,
            &earth(),
        );
        assert!(moist[[0, 0, 0, 0]] > dry[[0, 0, 0, 0]]);
    }

    #[test]
    fn test_streamfunction_zero_meridional_wind() {
        let v = Array4::zeros((1, 2, 2, 2));
        let ps = Array3::from_elem((1, 2, 2), 1.0e5);
        let out = streamfunction(v.view(), ps.view(), &[0.5, 1.0], &[0.9, 0.9], &earth(), 1.0);
        for &x in out.iter() {
            assert!(x.abs() < 1e-30);
        }
    }

    #[test]
    fn test_theta_surface_boundary() {
        let ta = Array4::from_elem((1, 2, 1, 1), 280.0);
        let ts = Array3::from_elem((1, 1, 1), 290.0);
        let thetah = half_level_theta(ta.view(), ts.view(), &[0.5, 1.0], &earth());
        // Lowest half level is the surface temperature verbatim.
        assert!((thetah[[0, 1, 0, 0]] - 290.0).abs() < 1e-12);
        // Interior half level exceeds the in-situ temperature (sigma < 1).
        assert!(thetah[[0, 0, 0, 0]] > 280.0);

        let theta = full_level_theta(thetah.view());
        assert!((theta[[0, 0, 0, 0]] - thetah[[0, 0, 0, 0]]).abs() < 1e-12);
        let mid = 0.5 * (thetah[[0, 0, 0, 0]] + thetah[[0, 1, 0, 0]]);
        assert!((theta[[0, 1, 0, 0]] - mid).abs() < 1e-12);
    }
}
