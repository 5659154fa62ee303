//! Variational loss with a learned channel decoder
//!
//! The equalizer's level posteriors `q` are the encoder. The decoder is the
//! channel estimate `h_est`: it maps the posterior symbol mean back onto the
//! sample grid and compares with what was received.
//!
//! Per input polarization and symbol:
//!
//! ```text
//!   x̄ = Σ_l q_I,l·a_l + j·Σ_l q_Q,l·a_l
//!   v  = Var_qI(a) + Var_qQ(a)
//! ```
//!
//! Per output polarization and sample:
//!
//! ```text
//!   ŷ_p(t) = Σ_pi Σ_k h[p][pi][k]·x̄_up[pi](t - c + k)
//!   V_p(t) = Σ_pi Σ_k |h[p][pi][k]|²·v_up[pi](t - c + k)
//!   E_p    = (1/T)·Σ_t |y_p(t) - ŷ_p(t)|² + V_p(t)
//! ```
//!
//! `loss = Σ_p T·ln E_p + Σ q·ln(q/P)` and `E_p` doubles as the per-pol
//! noise variance estimate.

use std::sync::Arc;

use ndarray::Array3;
use num_complex::Complex64;
use optical_channel::ShapingModel;

use crate::equalizer::TapBank;
use crate::error::{TrainError, TrainResult};
use crate::traits::Backend;

/// Forward pass of the loss, with what the backward pass needs
#[derive(Debug, Clone)]
pub struct LossForward {
    pub loss: f64,
    /// Per-pol residual energy E_p
    pub var_est: Vec<f64>,
    /// Posterior symbol means, (pol)(B)
    mean: Vec<Vec<Complex64>>,
    /// Posterior symbol variances as real-valued complex, (pol)(B)
    spread: Vec<Vec<Complex64>>,
    /// y - ŷ, (pol)(T)
    residual: Vec<Vec<Complex64>>,
}

/// ELBO loss engine
pub struct ElboLoss {
    backend: Arc<dyn Backend>,
    sps: usize,
}

impl ElboLoss {
    pub fn new(backend: Arc<dyn Backend>, sps: usize) -> Self {
        Self { backend, sps }
    }

    pub fn forward(
        &self,
        soft: &Array3<f64>,
        input: &[Vec<Complex64>],
        h_est: &TapBank,
        shaping: &ShapingModel,
    ) -> TrainResult<LossForward> {
        let pol = h_est.pol();
        let num_lev = shaping.num_lev();
        let levels = shaping.amp_levels();
        let batch_len = soft.shape()[2];
        let num_samples = batch_len * self.sps;

        if soft.shape() != [pol, 2 * num_lev, batch_len] {
            return Err(TrainError::shape("soft output", &[pol, 2 * num_lev, batch_len], soft.shape()));
        }
        if input.len() != pol || input.iter().any(|y| y.len() != num_samples) {
            let actual: Vec<usize> = input.iter().map(Vec::len).collect();
            return Err(TrainError::shape("loss input", &vec![num_samples; pol], &actual));
        }

        // Posterior moments
        let mut mean = vec![vec![Complex64::new(0.0, 0.0); batch_len]; pol];
        let mut spread = vec![vec![Complex64::new(0.0, 0.0); batch_len]; pol];
        for pi in 0..pol {
            for n in 0..batch_len {
                let mut m = [0.0; 2];
                let mut v = 0.0;
                for (d, m_d) in m.iter_mut().enumerate() {
                    let (mut first, mut second) = (0.0, 0.0);
                    for (l, &a) in levels.iter().enumerate() {
                        let q = soft[[pi, d * num_lev + l, n]];
                        first += q * a;
                        second += q * a * a;
                    }
                    *m_d = first;
                    v += second - first * first;
                }
                mean[pi][n] = Complex64::new(m[0], m[1]);
                spread[pi][n] = Complex64::new(v, 0.0);
            }
        }

        let mut residual = Vec::with_capacity(pol);
        let mut var_est = Vec::with_capacity(pol);
        for (p, y) in input.iter().enumerate() {
            let mut y_hat = vec![Complex64::new(0.0, 0.0); num_samples];
            let mut v_hat = vec![Complex64::new(0.0, 0.0); num_samples];
            for pi in 0..pol {
                let taps = h_est.taps(p, pi);
                let power = tap_power(taps);
                self.backend.fir_interpolate(&mean[pi], taps, self.sps, &mut y_hat);
                self.backend.fir_interpolate(&spread[pi], &power, self.sps, &mut v_hat);
            }

            let e: Vec<Complex64> = y.iter().zip(&y_hat).map(|(y, yh)| *y - *yh).collect();
            let energy = e.iter().map(|r| r.norm_sqr()).sum::<f64>() + v_hat.iter().map(|v| v.re).sum::<f64>();
            var_est.push(energy / num_samples as f64);
            residual.push(e);
        }

        let reconstruction: f64 = var_est.iter().map(|e| num_samples as f64 * e.ln()).sum();

        let probs = shaping.probs();
        let mut kl = 0.0;
        for ((_, c, _), &q) in soft.indexed_iter() {
            kl += q * (q.max(f64::MIN_POSITIVE) / probs[c % num_lev]).ln();
        }

        Ok(LossForward {
            loss: reconstruction + kl,
            var_est,
            mean,
            spread,
            residual,
        })
    }

    /// Gradient w.r.t. the soft output; accumulates `∂L/∂h_est` into `grad_h`
    pub fn backward(
        &self,
        forward: &LossForward,
        soft: &Array3<f64>,
        h_est: &TapBank,
        shaping: &ShapingModel,
        grad_h: &mut TapBank,
    ) -> TrainResult<Array3<f64>> {
        let pol = h_est.pol();
        let num_lev = shaping.num_lev();
        let levels = shaping.amp_levels();
        let probs = shaping.probs();
        let batch_len = soft.shape()[2];

        let expected = [pol, 2 * num_lev, forward.mean.first().map_or(0, Vec::len)];
        if forward.mean.len() != pol || soft.shape() != expected {
            return Err(TrainError::shape("soft output", &expected, soft.shape()));
        }

        let mut grad_mean = vec![vec![Complex64::new(0.0, 0.0); batch_len]; pol];
        let mut grad_spread = vec![vec![Complex64::new(0.0, 0.0); batch_len]; pol];

        for p in 0..pol {
            // ∂(T·ln E_p)/∂Σ_t(...) = 1/E_p
            let lambda = 1.0 / forward.var_est[p];
            let grad_y_hat: Vec<Complex64> = forward.residual[p].iter().map(|e| *e * (-2.0 * lambda)).collect();
            let grad_v_hat = vec![Complex64::new(lambda, 0.0); grad_y_hat.len()];

            for pi in 0..pol {
                let taps = h_est.taps(p, pi);
                let power = tap_power(taps);

                self.backend
                    .fir_interpolate_adjoint(&grad_y_hat, taps, self.sps, &mut grad_mean[pi]);
                self.backend
                    .fir_interpolate_adjoint(&grad_v_hat, &power, self.sps, &mut grad_spread[pi]);

                let grad_taps = grad_h.taps_mut(p, pi);
                self.backend
                    .fir_interpolate_tap_grad(&forward.mean[pi], &grad_y_hat, self.sps, grad_taps);

                // |h|² term: ∂/∂h = 2h·Σ λ·v
                let mut grad_power = vec![Complex64::new(0.0, 0.0); taps.len()];
                self.backend
                    .fir_interpolate_tap_grad(&forward.spread[pi], &grad_v_hat, self.sps, &mut grad_power);
                for ((g, h), s) in grad_taps.iter_mut().zip(taps).zip(&grad_power) {
                    *g += *h * (2.0 * s.re);
                }
            }
        }

        let mut grad_soft = Array3::<f64>::zeros(soft.raw_dim());
        for pi in 0..pol {
            for n in 0..batch_len {
                let gv = grad_spread[pi][n].re;
                let gm = grad_mean[pi][n];
                let m = forward.mean[pi][n];

                for (d, (g_m, m_d)) in [(gm.re, m.re), (gm.im, m.im)].into_iter().enumerate() {
                    for (l, &a) in levels.iter().enumerate() {
                        let c = d * num_lev + l;
                        let q = soft[[pi, c, n]].max(f64::MIN_POSITIVE);
                        grad_soft[[pi, c, n]] =
                            g_m * a + gv * (a * a - 2.0 * m_d * a) + (q / probs[l]).ln() + 1.0;
                    }
                }
            }
        }

        Ok(grad_soft)
    }
}

fn tap_power(taps: &[Complex64]) -> Vec<Complex64> {
    taps.iter().map(|h| Complex64::new(h.norm_sqr(), 0.0)).collect()
}
