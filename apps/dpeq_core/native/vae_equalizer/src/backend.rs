//! Reference CPU backend
//!
//! Straight loops over the sample lattice. Small filters (tens of taps) and
//! short mini-batches make this faster than an FFT path.

use num_complex::Complex64;

use crate::traits::Backend;

/// Single-threaded CPU implementation of [`Backend`]
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

/// Sample index `n·sps + c - k` if it falls inside `[0, len)`
#[inline]
fn lattice(n: usize, k: usize, sps: usize, center: usize, len: usize) -> Option<usize> {
    let t = (n * sps + center).checked_sub(k)?;
    (t < len).then_some(t)
}

#[inline]
fn center_of(taps: usize) -> usize {
    taps.saturating_sub(1) / 2
}

impl Backend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn fir_decimate(&self, input: &[Complex64], taps: &[Complex64], sps: usize, out: &mut [Complex64]) {
        let c = center_of(taps.len());
        for (n, o) in out.iter_mut().enumerate() {
            let mut acc = Complex64::new(0.0, 0.0);
            for (k, &w) in taps.iter().enumerate() {
                if let Some(t) = lattice(n, k, sps, c, input.len()) {
                    acc += w * input[t];
                }
            }
            *o += acc;
        }
    }

    fn fir_decimate_tap_grad(
        &self,
        input: &[Complex64],
        grad_out: &[Complex64],
        sps: usize,
        grad_taps: &mut [Complex64],
    ) {
        let c = center_of(grad_taps.len());
        for (k, g) in grad_taps.iter_mut().enumerate() {
            let mut acc = Complex64::new(0.0, 0.0);
            for (n, &gz) in grad_out.iter().enumerate() {
                if let Some(t) = lattice(n, k, sps, c, input.len()) {
                    acc += gz * input[t].conj();
                }
            }
            *g += acc;
        }
    }

    fn fir_interpolate(&self, symbols: &[Complex64], taps: &[Complex64], sps: usize, out: &mut [Complex64]) {
        let c = center_of(taps.len());
        let len = out.len();
        for (n, &x) in symbols.iter().enumerate() {
            for (k, &h) in taps.iter().enumerate() {
                if let Some(t) = lattice(n, k, sps, c, len) {
                    out[t] += h * x;
                }
            }
        }
    }

    fn fir_interpolate_adjoint(
        &self,
        grad_out: &[Complex64],
        taps: &[Complex64],
        sps: usize,
        grad_symbols: &mut [Complex64],
    ) {
        let c = center_of(taps.len());
        for (n, g) in grad_symbols.iter_mut().enumerate() {
            let mut acc = Complex64::new(0.0, 0.0);
            for (k, &h) in taps.iter().enumerate() {
                if let Some(t) = lattice(n, k, sps, c, grad_out.len()) {
                    acc += h.conj() * grad_out[t];
                }
            }
            *g += acc;
        }
    }

    fn fir_interpolate_tap_grad(
        &self,
        symbols: &[Complex64],
        grad_out: &[Complex64],
        sps: usize,
        grad_taps: &mut [Complex64],
    ) {
        let c = center_of(grad_taps.len());
        for (k, g) in grad_taps.iter_mut().enumerate() {
            let mut acc = Complex64::new(0.0, 0.0);
            for (n, &x) in symbols.iter().enumerate() {
                if let Some(t) = lattice(n, k, sps, c, grad_out.len()) {
                    acc += grad_out[t] * x.conj();
                }
            }
            *g += acc;
        }
    }
}
