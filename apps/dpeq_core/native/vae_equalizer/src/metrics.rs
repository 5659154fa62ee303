//! Symbol error rate on shaped square QAM
//!
//! Blind equalization recovers the constellation only up to its symmetries,
//! so every SER here is the minimum over the 8 symmetries of the square
//! (I/Q swap combined with sign flips of either quadrature).
//!
//! Two decision rules feed the same counter:
//! - [`SoftDemapper`]: arg-max of the level posteriors per quadrature
//! - [`HardConstellation`]: MAP decision on the equalized point with the
//!   current noise variance and the shaping prior

use ndarray::Array3;
use num_complex::Complex64;
use optical_channel::ShapingModel;

use crate::equalizer::level_logit;
use crate::traits::DecisionPath;

/// Level index decided for one symbol, (I, Q)
pub type LevelPair = (usize, usize);

/// Fraction of symbols with any quadrature wrong, minimized over the square symmetries
///
/// Returns 0 for an empty sequence.
pub fn symmetry_ser(decided: &[LevelPair], truth: &[LevelPair], num_lev: usize) -> f64 {
    let n = decided.len().min(truth.len());
    if n == 0 {
        return 0.0;
    }

    let flip = |l: usize| num_lev - 1 - l;
    let mut best = usize::MAX;

    for swap in [false, true] {
        for flip_i in [false, true] {
            for flip_q in [false, true] {
                let errors = decided
                    .iter()
                    .zip(truth)
                    .filter(|&(&(i, q), &t)| {
                        let (mut i, mut q) = if swap { (q, i) } else { (i, q) };
                        if flip_i {
                            i = flip(i);
                        }
                        if flip_q {
                            q = flip(q);
                        }
                        (i, q) != t
                    })
                    .count();
                best = best.min(errors);
            }
        }
    }

    best as f64 / n as f64
}

/// Truth amplitudes (pol, 2, N) mapped to level indices per pol
pub fn truth_levels(truth: &Array3<f64>, shaping: &ShapingModel) -> Vec<Vec<LevelPair>> {
    let (pol, _, n) = truth.dim();
    (0..pol)
        .map(|p| {
            (0..n)
                .map(|k| {
                    (
                        shaping.nearest_level(truth[[p, 0, k]]),
                        shaping.nearest_level(truth[[p, 1, k]]),
                    )
                })
                .collect()
        })
        .collect()
}

fn argmax(values: impl Iterator<Item = f64>) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (i, v) in values.enumerate() {
        if v > best_value {
            best_value = v;
            best = i;
        }
    }
    best
}

/// Soft path: arg-max over level posteriors
#[derive(Debug, Clone, Copy)]
pub struct SoftDemapper<'a> {
    pub shaping: &'a ShapingModel,
}

impl SoftDemapper<'_> {
    pub fn decide(&self, acc: &Array3<f64>) -> Vec<Vec<LevelPair>> {
        let num_lev = self.shaping.num_lev();
        let (pol, _, n) = acc.dim();
        (0..pol)
            .map(|p| {
                (0..n)
                    .map(|k| {
                        let i = argmax((0..num_lev).map(|l| acc[[p, l, k]]));
                        let q = argmax((0..num_lev).map(|l| acc[[p, num_lev + l, k]]));
                        (i, q)
                    })
                    .collect()
            })
            .collect()
    }
}

impl DecisionPath for SoftDemapper<'_> {
    fn label(&self) -> &'static str {
        "soft"
    }

    fn channels(&self) -> usize {
        2 * self.shaping.num_lev()
    }

    /// Posterior mean symbol
    fn symbol_estimates(&self, acc: &Array3<f64>) -> Vec<Vec<Complex64>> {
        let levels = self.shaping.amp_levels();
        let num_lev = levels.len();
        let (pol, _, n) = acc.dim();
        (0..pol)
            .map(|p| {
                (0..n)
                    .map(|k| {
                        let mut m = Complex64::new(0.0, 0.0);
                        for (l, &a) in levels.iter().enumerate() {
                            m.re += acc[[p, l, k]] * a;
                            m.im += acc[[p, num_lev + l, k]] * a;
                        }
                        m
                    })
                    .collect()
            })
            .collect()
    }

    fn ser(&self, acc: &Array3<f64>, truth: &Array3<f64>) -> Vec<f64> {
        let decided = self.decide(acc);
        let truth = truth_levels(truth, self.shaping);
        decided
            .iter()
            .zip(&truth)
            .map(|(d, t)| symmetry_ser(d, t, self.shaping.num_lev()))
            .collect()
    }
}

/// Hard path: MAP slicing of the equalized points
#[derive(Debug, Clone, Copy)]
pub struct HardConstellation<'a> {
    pub shaping: &'a ShapingModel,
    /// Noise variance per pol used by the MAP rule
    pub var: &'a [f64],
}

impl HardConstellation<'_> {
    fn slice(&self, u: f64, var: f64) -> usize {
        let nu_sc = self.shaping.nu_sc();
        argmax(self.shaping.amp_levels().iter().map(|&a| level_logit(u, a, var, nu_sc)))
    }

    pub fn decide(&self, acc: &Array3<f64>) -> Vec<Vec<LevelPair>> {
        let (pol, _, n) = acc.dim();
        (0..pol)
            .map(|p| {
                let var = self.var[p];
                (0..n)
                    .map(|k| (self.slice(acc[[p, 0, k]], var), self.slice(acc[[p, 1, k]], var)))
                    .collect()
            })
            .collect()
    }
}

impl DecisionPath for HardConstellation<'_> {
    fn label(&self) -> &'static str {
        "hard"
    }

    fn channels(&self) -> usize {
        2
    }

    fn symbol_estimates(&self, acc: &Array3<f64>) -> Vec<Vec<Complex64>> {
        let (pol, _, n) = acc.dim();
        (0..pol)
            .map(|p| (0..n).map(|k| Complex64::new(acc[[p, 0, k]], acc[[p, 1, k]])).collect())
            .collect()
    }

    fn ser(&self, acc: &Array3<f64>, truth: &Array3<f64>) -> Vec<f64> {
        let decided = self.decide(acc);
        let truth = truth_levels(truth, self.shaping);
        decided
            .iter()
            .zip(&truth)
            .map(|(d, t)| symmetry_ser(d, t, self.shaping.num_lev()))
            .collect()
    }
}
