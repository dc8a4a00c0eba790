//! Time-axis resampling of an assembled dataset.
//!
//! Two families of operation: bin averaging (an equal-count partition or
//! explicit fractional bin edges) and plain 1-D interpolation onto new
//! timestamps. Averaging can attach per-bin standard deviations as
//! sibling variables with an `_std` suffix.

use gcm_common::{Dataset, Interpolation, PostError, Result, Variable};
use ndarray::ArrayD;
use tracing::debug;

/// Densification factor applied before fractional-edge binning, so bin
/// edges need not coincide with existing samples.
const DENSIFY_FACTOR: usize = 10;

/// What to resample onto.
#[derive(Debug, Clone)]
pub enum ResampleSpec {
    /// Average into this many contiguous equal-count bins.
    MeanBins(usize),
    /// Average into bins bounded by these fractions of the time span
    /// (ascending, within `[0, 1]`).
    FractionalEdges(Vec<f64>),
    /// Interpolate onto these timestamps, no averaging.
    Timestamps(Vec<f64>),
}

/// Resamples every data variable of a dataset along its time axis.
#[derive(Debug, Clone)]
pub struct TimeResampler {
    interpolation: Interpolation,
    with_std: bool,
}

impl TimeResampler {
    pub fn new(interpolation: Interpolation) -> Self {
        Self {
            interpolation,
            with_std: false,
        }
    }

    /// Also emit per-bin standard deviations (`<name>_std`) when
    /// averaging.
    pub fn with_std(mut self, with_std: bool) -> Self {
        self.with_std = with_std;
        self
    }

    /// Resample the dataset onto the given target.
    pub fn resample(&self, ds: &Dataset, spec: &ResampleSpec) -> Result<Dataset> {
        let time = time_values(ds)?;
        if time.windows(2).any(|w| w[1] <= w[0]) {
            return Err(PostError::unit(
                "time coordinate is not strictly increasing",
            ));
        }

        match spec {
            ResampleSpec::Timestamps(stamps) => {
                if stamps.len() == time.len()
                    && stamps
                        .iter()
                        .zip(&time)
                        .all(|(a, b)| (a - b).abs() < 1e-9)
                {
                    debug!("resample targets match the existing time axis, passing through");
                    return Ok(ds.clone());
                }
                self.interpolate(ds, &time, stamps)
            }
            ResampleSpec::MeanBins(nbins) => {
                let bins = equal_count_bins(time.len(), *nbins)?;
                self.average(ds, &time, None, &bins)
            }
            ResampleSpec::FractionalEdges(edges) => {
                let (dense_time, dense) = densify(ds, &time)?;
                let bins = fractional_bins(&dense_time, edges)?;
                self.average(&dense, &dense_time, Some(ds), &bins)
            }
        }
    }

    /// Non-averaging path: per-variable 1-D interpolation in time.
    fn interpolate(&self, ds: &Dataset, time: &[f64], stamps: &[f64]) -> Result<Dataset> {
        for &t in stamps {
            if t < time[0] || t > time[time.len() - 1] {
                return Err(PostError::dimension(format!(
                    "timestamp {t} lies outside the sampled range [{}, {}]",
                    time[0],
                    time[time.len() - 1]
                )));
            }
        }

        let mut out = clone_coords(ds);
        out.insert("time", time_variable(ds, stamps.to_vec()));

        for name in ds.data_names() {
            let var = ds.get(&name).ok_or_else(|| missing(&name))?;
            let sample = sample_len(&var.data, time.len(), &name)?;
            let flat: Vec<f64> = var.data.iter().copied().collect();

            let mut values = Vec::with_capacity(stamps.len() * sample);
            for &t in stamps {
                let (i0, w) = bracket(time, t);
                match self.interpolation {
                    Interpolation::Nearest => {
                        let i = if w < 0.5 { i0 } else { i0 + 1 };
                        values.extend_from_slice(&flat[i * sample..(i + 1) * sample]);
                    }
                    Interpolation::Linear => {
                        let a = &flat[i0 * sample..(i0 + 1) * sample];
                        let b = &flat[(i0 + 1) * sample..(i0 + 2) * sample];
                        values.extend(a.iter().zip(b).map(|(x, y)| x * (1.0 - w) + y * w));
                    }
                }
            }

            let mut shape = var.data.shape().to_vec();
            shape[0] = stamps.len();
            out.insert(
                name.clone(),
                Variable {
                    data: reshape(values, shape)?,
                    meta: var.meta.clone(),
                },
            );
        }

        Ok(out)
    }

    /// Averaging path over precomputed index bins. `meta_source` carries
    /// the un-densified dataset when binning ran on a densified copy.
    fn average(
        &self,
        ds: &Dataset,
        time: &[f64],
        meta_source: Option<&Dataset>,
        bins: &[(usize, usize)],
    ) -> Result<Dataset> {
        let meta_ds = meta_source.unwrap_or(ds);
        let mut out = clone_coords(meta_ds);
        let midpoints: Vec<f64> = bins
            .iter()
            .map(|&(a, b)| 0.5 * (time[a] + time[b - 1]))
            .collect();
        out.insert("time", time_variable(meta_ds, midpoints));

        for name in ds.data_names() {
            let var = ds.get(&name).ok_or_else(|| missing(&name))?;
            let sample = sample_len(&var.data, time.len(), &name)?;
            let flat: Vec<f64> = var.data.iter().copied().collect();

            let mut means = Vec::with_capacity(bins.len() * sample);
            let mut stds = Vec::with_capacity(bins.len() * sample);
            for &(a, b) in bins {
                let count = (b - a) as f64;
                for s in 0..sample {
                    let mut sum = 0.0;
                    for k in a..b {
                        sum += flat[k * sample + s];
                    }
                    let mean = sum / count;
                    means.push(mean);
                    if self.with_std {
                        let mut sq = 0.0;
                        for k in a..b {
                            let d = flat[k * sample + s] - mean;
                            sq += d * d;
                        }
                        stds.push((sq / count).sqrt());
                    }
                }
            }

            let meta = meta_ds
                .get(&name)
                .map(|v| v.meta.clone())
                .unwrap_or_else(|| var.meta.clone());
            let mut shape = var.data.shape().to_vec();
            shape[0] = bins.len();
            out.insert(
                name.clone(),
                Variable {
                    data: reshape(means, shape.clone())?,
                    meta: meta.clone(),
                },
            );
            if self.with_std {
                let mut std_meta = meta;
                std_meta.short_name = format!("{}_std", std_meta.short_name);
                std_meta.long_name = format!("{} standard deviation", std_meta.long_name);
                out.insert(
                    format!("{name}_std"),
                    Variable {
                        data: reshape(stds, shape)?,
                        meta: std_meta,
                    },
                );
            }
        }

        Ok(out)
    }
}

/// Split `n` samples into `nbins` contiguous runs, the leftover spread
/// over the leading bins.
fn equal_count_bins(n: usize, nbins: usize) -> Result<Vec<(usize, usize)>> {
    if nbins == 0 || nbins > n {
        return Err(PostError::dimension(format!(
            "cannot partition {n} time steps into {nbins} bins"
        )));
    }
    let base = n / nbins;
    let extra = n % nbins;
    let mut bins = Vec::with_capacity(nbins);
    let mut start = 0;
    for b in 0..nbins {
        let len = base + usize::from(b < extra);
        bins.push((start, start + len));
        start += len;
    }
    Ok(bins)
}

/// Digitize-style binning: each consecutive pair of fractional edges
/// spans one bin of the (densified) time axis.
fn fractional_bins(time: &[f64], edges: &[f64]) -> Result<Vec<(usize, usize)>> {
    if edges.len() < 2 {
        return Err(PostError::dimension(
            "fractional binning needs at least two edges",
        ));
    }
    if edges.windows(2).any(|w| w[1] <= w[0]) || edges[0] < 0.0 || edges[edges.len() - 1] > 1.0 {
        return Err(PostError::unit(
            "fractional bin edges must ascend within [0, 1]",
        ));
    }

    let span = time[time.len() - 1] - time[0];
    let abs: Vec<f64> = edges.iter().map(|f| time[0] + f * span).collect();

    let mut bins = Vec::with_capacity(abs.len() - 1);
    for w in abs.windows(2) {
        let a = time.partition_point(|&t| t < w[0]);
        // Last edge is inclusive so the final sample is not dropped.
        let b = if (w[1] - abs[abs.len() - 1]).abs() < 1e-12 {
            time.partition_point(|&t| t <= w[1])
        } else {
            time.partition_point(|&t| t < w[1])
        };
        if b <= a {
            return Err(PostError::dimension(format!(
                "bin [{}, {}) captures no time samples",
                w[0], w[1]
            )));
        }
        bins.push((a, b));
    }
    Ok(bins)
}

/// Linearly densify the time axis of every data variable by
/// [`DENSIFY_FACTOR`].
fn densify(ds: &Dataset, time: &[f64]) -> Result<(Vec<f64>, Dataset)> {
    let n = time.len();
    if n < 2 {
        return Err(PostError::dimension(
            "densification needs at least two time steps",
        ));
    }
    let dense_n = (n - 1) * DENSIFY_FACTOR + 1;

    let mut dense_time = Vec::with_capacity(dense_n);
    for k in 0..dense_n {
        let pos = k as f64 / DENSIFY_FACTOR as f64;
        let i = (pos.floor() as usize).min(n - 2);
        let w = pos - i as f64;
        dense_time.push(time[i] * (1.0 - w) + time[i + 1] * w);
    }

    let mut out = clone_coords(ds);
    out.insert("time", time_variable(ds, dense_time.clone()));
    for name in ds.data_names() {
        let var = ds.get(&name).ok_or_else(|| missing(&name))?;
        let sample = sample_len(&var.data, n, &name)?;
        let flat: Vec<f64> = var.data.iter().copied().collect();

        let mut values = Vec::with_capacity(dense_n * sample);
        for k in 0..dense_n {
            let pos = k as f64 / DENSIFY_FACTOR as f64;
            let i = (pos.floor() as usize).min(n - 2);
            let w = pos - i as f64;
            let a = &flat[i * sample..(i + 1) * sample];
            let b = &flat[(i + 1) * sample..(i + 2) * sample];
            values.extend(a.iter().zip(b).map(|(x, y)| x * (1.0 - w) + y * w));
        }

        let mut shape = var.data.shape().to_vec();
        shape[0] = dense_n;
        out.insert(
            name.clone(),
            Variable {
                data: reshape(values, shape)?,
                meta: var.meta.clone(),
            },
        );
    }

    Ok((dense_time, out))
}

/// Bracketing index and interpolation weight for `t` in ascending `time`.
fn bracket(time: &[f64], t: f64) -> (usize, f64) {
    let i = time.partition_point(|&v| v <= t).saturating_sub(1);
    let i = i.min(time.len() - 2);
    let w = (t - time[i]) / (time[i + 1] - time[i]);
    (i, w.clamp(0.0, 1.0))
}

fn time_values(ds: &Dataset) -> Result<Vec<f64>> {
    let time = ds
        .get("time")
        .ok_or_else(|| PostError::dimension("dataset carries no time coordinate"))?;
    if time.data.is_empty() {
        return Err(PostError::dimension("time coordinate is empty"));
    }
    Ok(time.data.iter().copied().collect())
}

fn time_variable(ds: &Dataset, values: Vec<f64>) -> Variable {
    let meta = ds
        .get("time")
        .map(|v| v.meta.clone())
        .unwrap_or_else(|| gcm_common::VarMeta::coordinate("time", "time", "steps"));
    Variable {
        data: ArrayD::from_shape_vec(vec![values.len()], values)
            .unwrap_or_else(|_| ArrayD::zeros(vec![0])),
        meta,
    }
}

fn clone_coords(ds: &Dataset) -> Dataset {
    let mut out = Dataset::new();
    for name in gcm_common::COORD_NAMES {
        if name == "time" {
            continue;
        }
        if let Some(var) = ds.get(name) {
            out.insert(name, var.clone());
        }
    }
    out
}

fn sample_len(data: &ArrayD<f64>, ntime: usize, name: &str) -> Result<usize> {
    if data.shape().first() != Some(&ntime) {
        return Err(PostError::dimension(format!(
            "variable '{name}' does not lead with the {ntime}-step time axis"
        )));
    }
    Ok(data.len() / ntime)
}

fn reshape(values: Vec<f64>, shape: Vec<usize>) -> Result<ArrayD<f64>> {
    ArrayD::from_shape_vec(shape, values)
        .map_err(|e| PostError::dimension(format!("resample reshape failed: {e}")))
}

fn missing(name: &str) -> PostError {
    PostError::dimension(format!("variable '{name}' vanished mid-resample"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcm_common::VarMeta;

    fn test_dataset(ntime: usize, values: impl Fn(usize) -> f64) -> Dataset {
        let mut ds = Dataset::new();
        for name in ["lat", "lon", "lev", "levp"] {
            ds.insert(
                name,
                Variable {
                    data: ArrayD::from_shape_vec(vec![2], vec![0.0, 1.0]).unwrap(),
                    meta: VarMeta::coordinate(name, name, "1"),
                },
            );
        }
        ds.insert(
            "time",
            Variable {
                data: ArrayD::from_shape_vec(
                    vec![ntime],
                    (0..ntime).map(|i| i as f64).collect(),
                )
                .unwrap(),
                meta: VarMeta::coordinate("time", "time", "steps"),
            },
        );
        ds.insert(
            "ts",
            Variable {
                data: ArrayD::from_shape_vec(
                    vec![ntime, 2],
                    (0..ntime).flat_map(|i| [values(i), values(i) + 1.0]).collect(),
                )
                .unwrap(),
                meta: VarMeta {
                    short_name: "ts".into(),
                    long_name: "surface temperature".into(),
                    units: "K".into(),
                    code: Some(139),
                    dims: vec!["time".into(), "lat".into()],
                },
            },
        );
        ds
    }

    #[test]
    fn test_matching_timestamps_pass_through() {
        let ds = test_dataset(4, |i| i as f64);
        let resampler = TimeResampler::new(Interpolation::Linear);
        let out = resampler
            .resample(&ds, &ResampleSpec::Timestamps(vec![0.0, 1.0, 2.0, 3.0]))
            .unwrap();
        assert_eq!(out.get("ts").unwrap().data, ds.get("ts").unwrap().data);
    }

    #[test]
    fn test_linear_interpolation_midpoints() {
        let ds = test_dataset(4, |i| 10.0 * i as f64);
        let resampler = TimeResampler::new(Interpolation::Linear);
        let out = resampler
            .resample(&ds, &ResampleSpec::Timestamps(vec![0.5, 2.5]))
            .unwrap();
        let ts = &out.get("ts").unwrap().data;
        assert_eq!(ts.shape(), &[2, 2]);
        assert!((ts[[0, 0]] - 5.0).abs() < 1e-12);
        assert!((ts[[1, 0]] - 25.0).abs() < 1e-12);
    }

    #[test]
    fn test_nearest_interpolation() {
        let ds = test_dataset(3, |i| i as f64);
        let resampler = TimeResampler::new(Interpolation::Nearest);
        let out = resampler
            .resample(&ds, &ResampleSpec::Timestamps(vec![0.4, 1.6]))
            .unwrap();
        let ts = &out.get("ts").unwrap().data;
        assert!((ts[[0, 0]] - 0.0).abs() < 1e-12);
        assert!((ts[[1, 0]] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_extrapolation_rejected() {
        let ds = test_dataset(3, |i| i as f64);
        let resampler = TimeResampler::new(Interpolation::Linear);
        assert!(matches!(
            resampler.resample(&ds, &ResampleSpec::Timestamps(vec![-0.5])),
            Err(PostError::Dimension(_))
        ));
        assert!(matches!(
            resampler.resample(&ds, &ResampleSpec::Timestamps(vec![2.5])),
            Err(PostError::Dimension(_))
        ));
    }

    #[test]
    fn test_mean_bins_of_constant_series() {
        let ds = test_dataset(12, |_| 7.0);
        let resampler = TimeResampler::new(Interpolation::Linear).with_std(true);
        let out = resampler
            .resample(&ds, &ResampleSpec::MeanBins(4))
            .unwrap();

        let ts = &out.get("ts").unwrap().data;
        assert_eq!(ts.shape(), &[4, 2]);
        for &v in ts.iter() {
            assert!((v - 7.0).abs() < 1e-12 || (v - 8.0).abs() < 1e-12);
        }
        let std = &out.get("ts_std").unwrap().data;
        for &v in std.iter() {
            assert!(v.abs() < 1e-12);
        }
        // Bin midpoints of 12 steps in 4 bins: 1, 4, 7, 10.
        let time = &out.get("time").unwrap().data;
        assert!((time[[0]] - 1.0).abs() < 1e-12);
        assert!((time[[3]] - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_equal_count_partition_spreads_remainder() {
        let bins = equal_count_bins(10, 3).unwrap();
        assert_eq!(bins, vec![(0, 4), (4, 7), (7, 10)]);
        assert!(equal_count_bins(2, 5).is_err());
    }

    #[test]
    fn test_fractional_edges_cover_all_samples() {
        let ds = test_dataset(9, |i| i as f64);
        let resampler = TimeResampler::new(Interpolation::Linear);
        let out = resampler
            .resample(&ds, &ResampleSpec::FractionalEdges(vec![0.0, 0.5, 1.0]))
            .unwrap();
        let ts = &out.get("ts").unwrap().data;
        assert_eq!(ts.shape(), &[2, 2]);
        // Linear series: each bin mean is the bin's time midpoint.
        let time = &out.get("time").unwrap().data;
        assert!((ts[[0, 0]] - time[[0]]).abs() < 0.25);
        assert!((ts[[1, 0]] - time[[1]]).abs() < 0.25);
    }

    #[test]
    fn test_unsorted_time_rejected() {
        let mut ds = test_dataset(3, |i| i as f64);
        ds.get_mut("time").unwrap().data =
            ArrayD::from_shape_vec(vec![3], vec![0.0, 2.0, 1.0]).unwrap();
        let resampler = TimeResampler::new(Interpolation::Linear);
        assert!(matches!(
            resampler.resample(&ds, &ResampleSpec::MeanBins(1)),
            Err(PostError::Unit(_))
        ));
    }
}
