//! 2×2 butterfly FIR equalizer
//!
//! ```text
//!   y[X] ──►[w XX]──►(Σ)──► z[X] ──► hard (Re z, Im z)
//!        ╲          ▲           └──► soft softmax over levels
//!         [w YX]   [w XY]
//!        ╱          ▼
//!   y[Y] ──►[w YY]──►(Σ)──► z[Y] ──► ...
//! ```
//!
//! `z[p][n] = Σ_pi Σ_k w[p][pi][k]·y[pi][n·sps + c - k]`, evaluated once per
//! symbol. The soft output is the posterior over the shaped amplitude levels
//! of each quadrature, with Gaussian likelihood of variance `var[p]` and the
//! Maxwell-Boltzmann prior `exp(-nu_sc·a²)`.

use std::sync::Arc;

use ndarray::Array3;
use num_complex::Complex64;
use optical_channel::ShapingModel;

use super::taps::{Parameter, TapBank};
use crate::error::{TrainError, TrainResult};
use crate::traits::Backend;

/// Unnormalized log-posterior of level `a` for the quadrature value `u`
#[inline]
pub fn level_logit(u: f64, a: f64, var: f64, nu_sc: f64) -> f64 {
    let d = u - a;
    -d * d / var - nu_sc * a * a
}

/// Write the level posteriors of `u` into `out` (log-sum-exp normalized)
pub fn level_posteriors(u: f64, var: f64, shaping: &ShapingModel, out: &mut [f64]) {
    let nu_sc = shaping.nu_sc();
    let mut max = f64::NEG_INFINITY;
    for (o, &a) in out.iter_mut().zip(shaping.amp_levels()) {
        *o = level_logit(u, a, var, nu_sc);
        max = max.max(*o);
    }

    let lse = max + out.iter().map(|s| (s - max).exp()).sum::<f64>().ln();
    for o in out.iter_mut() {
        *o = (*o - lse).exp();
    }
}

/// Forward-pass result of one mini-batch
///
/// Keeps the input and the variance the pass ran with, so the backward pass
/// differentiates exactly what was computed.
#[derive(Debug, Clone)]
pub struct EqualizerOutput {
    /// Level posteriors, (pol, 2·num_lev, B), I levels first
    pub soft: Array3<f64>,
    /// Equalized points, (pol, 2, B)
    pub hard: Array3<f64>,
    input: Vec<Vec<Complex64>>,
    var: Vec<f64>,
}

impl EqualizerOutput {
    pub fn batch_len(&self) -> usize {
        self.hard.shape()[2]
    }

    pub fn var(&self) -> &[f64] {
        &self.var
    }
}

/// Trainable butterfly FIR
pub struct ButterflyFir {
    backend: Arc<dyn Backend>,
    sps: usize,
    flex_step: bool,
    weights: Parameter,
}

impl ButterflyFir {
    /// Identity-initialized equalizer with `num_taps` taps per filter
    pub fn new(backend: Arc<dyn Backend>, pol: usize, num_taps: usize, sps: usize, flex_step: bool) -> Self {
        tracing::debug!(pol, num_taps, sps, flex_step, backend = backend.name(), "butterfly FIR created");
        Self {
            backend,
            sps,
            flex_step,
            weights: Parameter::new(TapBank::identity(pol, num_taps)),
        }
    }

    pub fn pol(&self) -> usize {
        self.weights.value.pol()
    }

    pub fn sps(&self) -> usize {
        self.sps
    }

    pub fn flex_step(&self) -> bool {
        self.flex_step
    }

    pub fn weights(&self) -> &Parameter {
        &self.weights
    }

    pub fn weights_mut(&mut self) -> &mut Parameter {
        &mut self.weights
    }

    pub fn zero_grad(&mut self) {
        self.weights.zero_grad();
    }

    /// Symbol-rate butterfly output, (pol)(B)
    pub fn equalize(&self, input: &[Vec<Complex64>]) -> TrainResult<Vec<Vec<Complex64>>> {
        let pol = self.pol();
        if input.len() != pol {
            return Err(TrainError::shape("equalizer input", &[pol], &[input.len()]));
        }
        let num_samples = input[0].len();
        if input.iter().any(|s| s.len() != num_samples) || num_samples % self.sps != 0 {
            let lens: Vec<usize> = input.iter().map(Vec::len).collect();
            return Err(TrainError::shape("equalizer input", &[num_samples; 2], &lens));
        }

        let batch_len = num_samples / self.sps;
        let mut z = vec![vec![Complex64::new(0.0, 0.0); batch_len]; pol];
        for (p, z_p) in z.iter_mut().enumerate() {
            for (pi, y) in input.iter().enumerate() {
                self.backend
                    .fir_decimate(y, self.weights.value.taps(p, pi), self.sps, z_p);
            }
        }
        Ok(z)
    }

    /// Forward pass producing both the soft and the hard output
    pub fn forward(
        &self,
        input: &[Vec<Complex64>],
        var: &[f64],
        shaping: &ShapingModel,
    ) -> TrainResult<EqualizerOutput> {
        let pol = self.pol();
        if var.len() != pol {
            return Err(TrainError::shape("noise variance", &[pol], &[var.len()]));
        }

        let z = self.equalize(input)?;
        let batch_len = z[0].len();
        let num_lev = shaping.num_lev();

        let mut hard = Array3::<f64>::zeros((pol, 2, batch_len));
        let mut soft = Array3::<f64>::zeros((pol, 2 * num_lev, batch_len));
        let mut post = vec![0.0; num_lev];

        for (p, z_p) in z.iter().enumerate() {
            for (n, zn) in z_p.iter().enumerate() {
                hard[[p, 0, n]] = zn.re;
                hard[[p, 1, n]] = zn.im;

                for (d, u) in [zn.re, zn.im].into_iter().enumerate() {
                    level_posteriors(u, var[p], shaping, &mut post);
                    for (l, &q) in post.iter().enumerate() {
                        soft[[p, d * num_lev + l, n]] = q;
                    }
                }
            }
        }

        Ok(EqualizerOutput {
            soft,
            hard,
            input: input.to_vec(),
            var: var.to_vec(),
        })
    }

    /// Accumulate the tap gradient given `∂L/∂soft`
    pub fn backward(
        &mut self,
        output: &EqualizerOutput,
        grad_soft: &Array3<f64>,
        shaping: &ShapingModel,
    ) -> TrainResult<()> {
        if grad_soft.shape() != output.soft.shape() {
            return Err(TrainError::shape("soft gradient", output.soft.shape(), grad_soft.shape()));
        }

        let pol = self.pol();
        let num_lev = shaping.num_lev();
        let levels = shaping.amp_levels();
        let batch_len = output.batch_len();

        // Softmax and logit backward down to G_z = ∂L/∂Re z + j·∂L/∂Im z
        let mut grad_z = vec![vec![Complex64::new(0.0, 0.0); batch_len]; pol];
        for (p, gz_p) in grad_z.iter_mut().enumerate() {
            let var = output.var[p];
            for (n, gz) in gz_p.iter_mut().enumerate() {
                let mut du = [0.0; 2];
                for (d, du_d) in du.iter_mut().enumerate() {
                    let u = output.hard[[p, d, n]];
                    let base = d * num_lev;

                    let dot: f64 = (0..num_lev)
                        .map(|l| output.soft[[p, base + l, n]] * grad_soft[[p, base + l, n]])
                        .sum();

                    *du_d = (0..num_lev)
                        .map(|l| {
                            let q = output.soft[[p, base + l, n]];
                            let g_logit = q * (grad_soft[[p, base + l, n]] - dot);
                            g_logit * (-2.0 * (u - levels[l]) / var)
                        })
                        .sum();
                }
                *gz = Complex64::new(du[0], du[1]);
            }
        }

        for (p, gz_p) in grad_z.iter().enumerate() {
            for (pi, y) in output.input.iter().enumerate() {
                self.backend
                    .fir_decimate_tap_grad(y, gz_p, self.sps, self.weights.grad.taps_mut(p, pi));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use optical_channel::Modulation;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_input(pol: usize, len: usize, seed: u64) -> Vec<Vec<Complex64>> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..pol)
            .map(|_| {
                (0..len)
                    .map(|_| Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
                    .collect()
            })
            .collect()
    }

    fn fir(taps: usize) -> ButterflyFir {
        ButterflyFir::new(Arc::new(CpuBackend), 2, taps, 2, false)
    }

    #[test]
    fn test_identity_passes_symbol_samples() {
        let eq = fir(5);
        let input = random_input(2, 16, 1);
        let z = eq.equalize(&input).unwrap();

        assert_eq!(z[0].len(), 8);
        for p in 0..2 {
            for n in 0..8 {
                assert_eq!(z[p][n], input[p][2 * n]);
            }
        }
    }

    #[test]
    fn test_cross_taps_swap_polarizations() {
        let mut eq = fir(3);
        let w = &mut eq.weights_mut().value;
        w.fill_zero();
        w.taps_mut(0, 1)[1] = Complex64::new(1.0, 0.0);
        w.taps_mut(1, 0)[1] = Complex64::new(0.0, 1.0);

        let input = random_input(2, 8, 2);
        let z = eq.equalize(&input).unwrap();
        assert_eq!(z[0][2], input[1][4]);
        assert_eq!(z[1][2], input[0][4] * Complex64::new(0.0, 1.0));
    }

    #[test]
    fn test_soft_output_is_distribution() {
        let shaping = ShapingModel::new(Modulation::Qam16, 0.05).unwrap();
        let eq = fir(5);
        let out = eq.forward(&random_input(2, 20, 3), &[0.1, 0.2], &shaping).unwrap();

        assert_eq!(out.soft.shape(), &[2, 8, 10]);
        assert_eq!(out.hard.shape(), &[2, 2, 10]);
        for p in 0..2 {
            for n in 0..10 {
                for d in 0..2 {
                    let total: f64 = (0..4).map(|l| out.soft[[p, d * 4 + l, n]]).sum();
                    assert!((total - 1.0).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_soft_output_peaks_at_nearest_level() {
        let shaping = ShapingModel::new(Modulation::Qam16, 0.0).unwrap();
        let mut post = vec![0.0; 4];
        let a = shaping.amp_levels()[2];
        level_posteriors(a + 0.01, 0.01, &shaping, &mut post);

        let best = post
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |acc, (l, &q)| if q > acc.1 { (l, q) } else { acc });
        assert_eq!(best.0, 2);
    }

    #[test]
    fn test_posteriors_stable_for_tiny_variance() {
        let shaping = ShapingModel::new(Modulation::Qam64, 0.02).unwrap();
        let mut post = vec![0.0; 8];
        level_posteriors(5.0, 1e-9, &shaping, &mut post);

        assert!(post.iter().all(|q| q.is_finite()));
        assert!((post[7] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_backward_matches_finite_differences() {
        let shaping = ShapingModel::new(Modulation::Qam16, 0.03).unwrap();
        let input = random_input(2, 12, 4);
        let var = [0.4, 0.6];

        // L = Σ coeff·soft with fixed random coefficients
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let coeff = Array3::from_shape_fn((2, 8, 6), |_| rng.gen_range(-1.0..1.0));
        let loss = |eq: &ButterflyFir| {
            let out = eq.forward(&input, &var, &shaping).unwrap();
            (&out.soft * &coeff).sum()
        };

        let mut eq = fir(3);
        eq.weights_mut().value.taps_mut(0, 1)[0] = Complex64::new(0.2, -0.1);
        eq.weights_mut().value.taps_mut(1, 1)[2] = Complex64::new(-0.1, 0.3);

        let out = eq.forward(&input, &var, &shaping).unwrap();
        eq.zero_grad();
        eq.backward(&out, &coeff, &shaping).unwrap();
        let grad = eq.weights().grad.clone();

        let eps = 1e-6;
        for idx in 0..grad.as_slice().len() {
            let mut perturbed = fir(3);
            perturbed.weights_mut().value = eq.weights().value.clone();

            perturbed.weights_mut().value.as_mut_slice()[idx].re += eps;
            let up = loss(&perturbed);
            perturbed.weights_mut().value.as_mut_slice()[idx].re -= 2.0 * eps;
            let down = loss(&perturbed);
            let d_re = (up - down) / (2.0 * eps);
            perturbed.weights_mut().value.as_mut_slice()[idx].re += eps;

            perturbed.weights_mut().value.as_mut_slice()[idx].im += eps;
            let up = loss(&perturbed);
            perturbed.weights_mut().value.as_mut_slice()[idx].im -= 2.0 * eps;
            let down = loss(&perturbed);
            let d_im = (up - down) / (2.0 * eps);

            let g = grad.as_slice()[idx];
            assert!((g.re - d_re).abs() < 1e-5, "tap {} re: {} vs {}", idx, g.re, d_re);
            assert!((g.im - d_im).abs() < 1e-5, "tap {} im: {} vs {}", idx, g.im, d_im);
        }
    }

    #[test]
    fn test_shape_errors() {
        let shaping = ShapingModel::new(Modulation::Qpsk, 0.0).unwrap();
        let eq = fir(3);

        assert!(matches!(
            eq.forward(&random_input(1, 8, 0), &[0.1, 0.1], &shaping),
            Err(TrainError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            eq.forward(&random_input(2, 7, 0), &[0.1, 0.1], &shaping),
            Err(TrainError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            eq.forward(&random_input(2, 8, 0), &[0.1], &shaping),
            Err(TrainError::ShapeMismatch { .. })
        ));
    }
}
