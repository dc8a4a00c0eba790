//! Mixed-radix discrete Fourier transform over the longitude axis.
//!
//! Model grids have longitude counts factorable over radices 2, 3, 4
//! and 8 (T21 through T170). A small planner produces the radix ladder
//! for a given length; anything it cannot factor is a fatal format
//! error. Twiddle factors are precomputed once per plan from
//! `trigs[k] = (cos, sin)(2 pi k / n)`.

use gcm_common::{PostError, Result};

/// Minimal complex value used by the transform kernels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Cpx {
    pub re: f64,
    pub im: f64,
}

impl Cpx {
    pub const ZERO: Cpx = Cpx { re: 0.0, im: 0.0 };

    #[inline]
    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    #[inline]
    pub fn conj(self) -> Self {
        Self::new(self.re, -self.im)
    }

    #[inline]
    pub fn scale(self, s: f64) -> Self {
        Self::new(self.re * s, self.im * s)
    }
}

impl num_traits::Zero for Cpx {
    fn zero() -> Self {
        Self::ZERO
    }

    fn is_zero(&self) -> bool {
        self.re == 0.0 && self.im == 0.0
    }
}

impl std::ops::Add for Cpx {
    type Output = Cpx;
    #[inline]
    fn add(self, rhs: Cpx) -> Cpx {
        Cpx::new(self.re + rhs.re, self.im + rhs.im)
    }
}

impl std::ops::Sub for Cpx {
    type Output = Cpx;
    #[inline]
    fn sub(self, rhs: Cpx) -> Cpx {
        Cpx::new(self.re - rhs.re, self.im - rhs.im)
    }
}

impl std::ops::Mul for Cpx {
    type Output = Cpx;
    #[inline]
    fn mul(self, rhs: Cpx) -> Cpx {
        Cpx::new(
            self.re * rhs.re - self.im * rhs.im,
            self.re * rhs.im + self.im * rhs.re,
        )
    }
}

/// Radix ladder for `n`: greedy over 8, 4, 3, 2.
///
/// Covers every `2^a 3^b` longitude count the supported truncations use
/// (64, 96, 128, 192, 256, 384, 512, ...); lengths with other prime
/// factors are rejected.
pub fn plan_factors(n: usize) -> Result<Vec<usize>> {
    if n < 4 {
        return Err(PostError::format(format!(
            "longitude count {n} is too small for the transform"
        )));
    }
    let mut factors = Vec::new();
    let mut rest = n;
    while rest > 1 {
        let radix = [8, 4, 3, 2]
            .into_iter()
            .find(|r| rest % r == 0)
            .ok_or_else(|| {
                PostError::format(format!(
                    "longitude count {n} does not factor over radices 2/3/4/8"
                ))
            })?;
        factors.push(radix);
        rest /= radix;
    }
    Ok(factors)
}

/// Precomputed transform plan for one longitude count.
#[derive(Debug, Clone)]
pub struct FftPlan {
    n: usize,
    factors: Vec<usize>,
    /// trigs[k] = exp(2 pi i k / n)
    trigs: Vec<Cpx>,
}

impl FftPlan {
    pub fn new(n: usize) -> Result<Self> {
        let factors = plan_factors(n)?;
        let trigs = (0..n)
            .map(|k| {
                let ang = std::f64::consts::TAU * k as f64 / n as f64;
                Cpx::new(ang.cos(), ang.sin())
            })
            .collect();
        Ok(Self { n, factors, trigs })
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Inverse transform (synthesis): `x[j] = sum_k X[k] exp(+2 pi i jk/n)`,
    /// unscaled.
    pub fn inverse(&self, x: &[Cpx]) -> Vec<Cpx> {
        debug_assert_eq!(x.len(), self.n);
        self.transform(x, self.n, 1, &self.factors, 1.0)
    }

    /// Forward transform (analysis): `X[k] = (1/n) sum_j x[j] exp(-2 pi i jk/n)`.
    pub fn forward(&self, x: &[Cpx]) -> Vec<Cpx> {
        debug_assert_eq!(x.len(), self.n);
        let mut out = self.transform(x, self.n, 1, &self.factors, -1.0);
        let scale = 1.0 / self.n as f64;
        for v in &mut out {
            *v = v.scale(scale);
        }
        out
    }

    /// Recursive decimation-in-time over the planned radix ladder.
    fn transform(&self, x: &[Cpx], n: usize, stride: usize, factors: &[usize], sign: f64) -> Vec<Cpx> {
        if n == 1 {
            return vec![x[0]];
        }
        let radix = factors[0];
        let m = n / radix;

        // Sub-transforms over the interleaved sequences x[j], x[j+r], ...
        let subs: Vec<Vec<Cpx>> = (0..radix)
            .map(|j| self.transform(&x[j * stride..], m, stride * radix, &factors[1..], sign))
            .collect();

        match radix {
            2 => self.butterfly(&subs, n, 2, sign),
            3 => self.butterfly(&subs, n, 3, sign),
            4 => self.butterfly(&subs, n, 4, sign),
            8 => self.butterfly(&subs, n, 8, sign),
            _ => unreachable!("planner only emits radices 2/3/4/8"),
        }
    }

    /// Combine `radix` sub-transforms of length n/radix into length n.
    fn butterfly(&self, subs: &[Vec<Cpx>], n: usize, radix: usize, sign: f64) -> Vec<Cpx> {
        let m = n / radix;
        // The plan's table holds exp(2 pi i k / N); the current level
        // needs exp(2 pi i jk / n), i.e. every (N/n)-th entry.
        let step = self.n / n;
        let mut out = vec![Cpx::ZERO; n];
        for (k, slot) in out.iter_mut().enumerate() {
            let mut acc = Cpx::ZERO;
            for (j, sub) in subs.iter().enumerate() {
                let idx = (j * k * step) % self.n;
                let tw = if sign > 0.0 {
                    self.trigs[idx]
                } else {
                    self.trigs[idx].conj()
                };
                acc = acc + tw * sub[k % m];
            }
            *slot = acc;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_dft(x: &[Cpx], sign: f64) -> Vec<Cpx> {
        let n = x.len();
        (0..n)
            .map(|k| {
                let mut acc = Cpx::ZERO;
                for (j, &v) in x.iter().enumerate() {
                    let ang = sign * std::f64::consts::TAU * (j * k) as f64 / n as f64;
                    acc = acc + Cpx::new(ang.cos(), ang.sin()) * v;
                }
                acc
            })
            .collect()
    }

    fn test_signal(n: usize) -> Vec<Cpx> {
        (0..n)
            .map(|j| {
                let t = j as f64;
                Cpx::new((0.3 * t).sin() + 0.1 * t, (0.7 * t).cos())
            })
            .collect()
    }

    #[test]
    fn test_plan_factors_supported_lengths() {
        // Longitude counts of T21..T170 grids.
        for n in [64, 96, 128, 192, 256, 384, 512] {
            let factors = plan_factors(n).unwrap();
            assert_eq!(factors.iter().product::<usize>(), n);
            assert!(factors.iter().all(|f| [2, 3, 4, 8].contains(f)));
        }
    }

    #[test]
    fn test_plan_factors_rejects_other_primes() {
        for n in [5, 20, 320, 70] {
            assert!(matches!(plan_factors(n), Err(PostError::Format(_))), "{n}");
        }
    }

    #[test]
    fn test_inverse_matches_naive_dft() {
        for n in [8, 12, 24, 32, 64, 96] {
            let plan = FftPlan::new(n).unwrap();
            let x = test_signal(n);
            let fast = plan.inverse(&x);
            let slow = naive_dft(&x, 1.0);
            for (a, b) in fast.iter().zip(&slow) {
                assert!((a.re - b.re).abs() < 1e-9, "n={n}");
                assert!((a.im - b.im).abs() < 1e-9, "n={n}");
            }
        }
    }

    #[test]
    fn test_forward_then_inverse_is_identity() {
        for n in [16, 48, 64, 128] {
            let plan = FftPlan::new(n).unwrap();
            let x = test_signal(n);
            let round = plan.inverse(&plan.forward(&x));
            for (a, b) in round.iter().zip(&x) {
                assert!((a.re - b.re).abs() < 1e-9);
                assert!((a.im - b.im).abs() < 1e-9);
            }
        }
    }
}
