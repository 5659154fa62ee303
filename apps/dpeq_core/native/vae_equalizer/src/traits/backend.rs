//! Backend trait - Sample-lattice FIR kernels
//!
//! Every filtering operation of the equalizer and of the channel-estimate
//! decoder reduces to one index relation between symbol `n`, tap `k` and
//! sample `t`:
//!
//! ```text
//!   t = n·sps + c - k,    c = (taps.len() - 1) / 2
//! ```
//!
//! The decimating FIR reads samples on that lattice, the interpolating FIR
//! writes to it. Samples outside `[0, len)` count as zero.
//!
//! Gradients follow the complex convention `G = ∂L/∂Re + j·∂L/∂Im`. All
//! kernels accumulate into their output (`+=`) so butterfly sums over input
//! polarizations need no scratch buffers.

use num_complex::Complex64;

/// Compute device for the FIR kernels
///
/// Injected into the equalizer and the loss at construction; the training
/// loop never branches on the concrete type.
pub trait Backend: Send + Sync {
    /// Device name for logs
    fn name(&self) -> &'static str;

    /// `out[n] += Σ_k taps[k]·input[n·sps + c - k]`
    fn fir_decimate(&self, input: &[Complex64], taps: &[Complex64], sps: usize, out: &mut [Complex64]);

    /// Tap gradient of [`Backend::fir_decimate`]
    ///
    /// `grad_taps[k] += Σ_n grad_out[n]·conj(input[n·sps + c - k])`
    fn fir_decimate_tap_grad(
        &self,
        input: &[Complex64],
        grad_out: &[Complex64],
        sps: usize,
        grad_taps: &mut [Complex64],
    );

    /// `out[n·sps + c - k] += taps[k]·symbols[n]`
    ///
    /// Equivalent to zero-insert upsampling followed by
    /// `out[t] = Σ_k taps[k]·x_up[t - c + k]`.
    fn fir_interpolate(&self, symbols: &[Complex64], taps: &[Complex64], sps: usize, out: &mut [Complex64]);

    /// Input gradient of [`Backend::fir_interpolate`]
    ///
    /// `grad_symbols[n] += Σ_k conj(taps[k])·grad_out[n·sps + c - k]`
    fn fir_interpolate_adjoint(
        &self,
        grad_out: &[Complex64],
        taps: &[Complex64],
        sps: usize,
        grad_symbols: &mut [Complex64],
    );

    /// Tap gradient of [`Backend::fir_interpolate`]
    ///
    /// `grad_taps[k] += Σ_n grad_out[n·sps + c - k]·conj(symbols[n])`
    fn fir_interpolate_tap_grad(
        &self,
        symbols: &[Complex64],
        grad_out: &[Complex64],
        sps: usize,
        grad_taps: &mut [Complex64],
    );
}
