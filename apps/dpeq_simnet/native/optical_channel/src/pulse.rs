//! Transmit pulse and linear channel impulse responses
//!
//! All responses are real, odd-length, centered and normalized to unit
//! energy, so that a zero-inserted symbol stream convolved with them keeps
//! the mean symbol energy.

use std::f64::consts::PI;

/// RRC roll-off factor (excess bandwidth)
pub const RRC_ALPHA: f64 = 0.35;

/// RRC span in symbols (each side of center)
pub const RRC_SPAN: usize = 6;

/// Symbol-spaced ISI profile of Proakis channel B
pub const PROAKIS_B: [f64; 3] = [0.407, 0.815, 0.407];

/// Root raised cosine taps, unit energy, `2·span·sps + 1` long
pub fn root_raised_cosine(sps: usize, alpha: f64, span: usize) -> Vec<f64> {
    let filter_len = 2 * span * sps + 1;
    let center = (filter_len - 1) as f64 / 2.0;

    let taps: Vec<f64> = (0..filter_len)
        .map(|i| {
            // Time in symbol periods
            let t = (i as f64 - center) / sps as f64;

            if t.abs() < 1e-10 {
                1.0 + alpha * (4.0 / PI - 1.0)
            } else if (t.abs() - 1.0 / (4.0 * alpha)).abs() < 1e-10 {
                let term1 = (1.0 + 2.0 / PI) * (PI * alpha / 4.0).sin();
                let term2 = (1.0 - 2.0 / PI) * (PI * alpha / 4.0).cos();
                alpha / 2.0_f64.sqrt() * (term1 + term2)
            } else {
                let num = (PI * t * (1.0 - alpha)).sin()
                    + 4.0 * alpha * t * (PI * t * (1.0 + alpha)).cos();
                let den = PI * t * (1.0 - (4.0 * alpha * t).powi(2));
                num / den
            }
        })
        .collect();

    normalize_energy(taps)
}

/// Symbol-spaced profile upsampled by `sps` and shaped by the RRC pulse
pub fn shaped_isi(sps: usize, profile: &[f64]) -> Vec<f64> {
    let pulse = root_raised_cosine(sps, RRC_ALPHA, RRC_SPAN);

    let mut upsampled = vec![0.0; (profile.len() - 1) * sps + 1];
    for (k, &h) in profile.iter().enumerate() {
        upsampled[k * sps] = h;
    }

    normalize_energy(convolve_full(&pulse, &upsampled))
}

/// Full linear convolution (length `a.len() + b.len() - 1`)
pub fn convolve_full(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, &x) in a.iter().enumerate() {
        for (j, &y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

fn normalize_energy(mut taps: Vec<f64>) -> Vec<f64> {
    let energy: f64 = taps.iter().map(|x| x * x).sum();
    let norm = energy.sqrt();
    for c in &mut taps {
        *c /= norm;
    }
    taps
}
