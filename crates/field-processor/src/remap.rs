//! Coordinate remapping seam for the substellar-rotated output frames.
//!
//! The synchronous output modes present fields in a frame whose central
//! meridian is the substellar point. Callers can supply their own
//! [`CoordinateRemapper`]; the default rolls the longitude axis of the
//! regular grid.

use gcm_common::{PostError, Result};
use ndarray::ArrayD;

/// Maps a grid field into the substellar-centered frame.
pub trait CoordinateRemapper: Send + Sync {
    /// Remap a grid field whose trailing axis is longitude. `lon` holds
    /// the grid longitudes in degrees east, `substellar_lon` the
    /// longitude to center on.
    fn remap(&self, field: &ArrayD<f64>, lon: &[f64], substellar_lon: f64) -> Result<ArrayD<f64>>;
}

/// Default remapper: rotates the longitude axis so the column nearest
/// the substellar longitude lands at the center of the axis.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubstellarRemapper;

impl SubstellarRemapper {
    /// Index of the grid column closest to `target` degrees east.
    fn nearest_column(lon: &[f64], target: f64) -> usize {
        let target = target.rem_euclid(360.0);
        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for (i, &l) in lon.iter().enumerate() {
            let d = (l - target).rem_euclid(360.0);
            let dist = d.min(360.0 - d);
            if dist < best_dist {
                best_dist = dist;
                best = i;
            }
        }
        best
    }
}

impl CoordinateRemapper for SubstellarRemapper {
    fn remap(&self, field: &ArrayD<f64>, lon: &[f64], substellar_lon: f64) -> Result<ArrayD<f64>> {
        let nlon = lon.len();
        if field.shape().last() != Some(&nlon) {
            return Err(PostError::dimension(format!(
                "remap input shape {:?} does not end with the {nlon}-point longitude axis",
                field.shape()
            )));
        }

        let center = Self::nearest_column(lon, substellar_lon);
        // Shift so `center` ends up at nlon/2.
        let shift = (center + nlon - nlon / 2) % nlon;
        if shift == 0 {
            return Ok(field.clone());
        }

        let mut out = field.clone();
        let flat_in: Vec<f64> = field.iter().copied().collect();
        for (idx, v) in out.iter_mut().enumerate() {
            let row = idx / nlon;
            let j = idx % nlon;
            *v = flat_in[row * nlon + (j + shift) % nlon];
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ArrayD;

    fn lons(nlon: usize) -> Vec<f64> {
        (0..nlon).map(|i| 360.0 * i as f64 / nlon as f64).collect()
    }

    #[test]
    fn test_substellar_column_moves_to_center() {
        let nlon = 8;
        let lon = lons(nlon);
        let field =
            ArrayD::from_shape_vec(vec![1, nlon], (0..nlon).map(|i| i as f64).collect()).unwrap();

        // Substellar point at 180 degrees = column 4; already central.
        let out = SubstellarRemapper
            .remap(&field, &lon, 180.0)
            .unwrap();
        assert!((out[[0, 4]] - 4.0).abs() < 1e-12);

        // Substellar at 0 degrees: column 0 moves to the center slot.
        let out = SubstellarRemapper.remap(&field, &lon, 0.0).unwrap();
        assert!((out[[0, 4]] - 0.0).abs() < 1e-12);
        // The axis stays a rotation, not a permutation of any other kind.
        let values: Vec<f64> = (0..nlon).map(|j| out[[0, j]]).collect();
        assert_eq!(values, vec![4.0, 5.0, 6.0, 7.0, 0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_remap_preserves_leading_axes() {
        let lon = lons(4);
        let field = ArrayD::from_shape_vec(
            vec![2, 3, 4],
            (0..24).map(|i| i as f64).collect(),
        )
        .unwrap();
        let out = SubstellarRemapper.remap(&field, &lon, 90.0).unwrap();
        assert_eq!(out.shape(), &[2, 3, 4]);
        // Row sums are invariant under a longitude roll.
        for t in 0..2 {
            for i in 0..3 {
                let a: f64 = (0..4).map(|j| field[[t, i, j]]).sum();
                let b: f64 = (0..4).map(|j| out[[t, i, j]]).sum();
                assert!((a - b).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_wrong_trailing_axis_rejected() {
        let lon = lons(8);
        let field = ArrayD::zeros(vec![2, 5]);
        assert!(matches!(
            SubstellarRemapper.remap(&field, &lon, 0.0),
            Err(PostError::Dimension(_))
        ));
    }
}
