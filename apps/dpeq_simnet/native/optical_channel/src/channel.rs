//! Dual-polarization coherent optical channel
//!
//! One call to [`DualPolChannel::generate`] emulates the transmission of a
//! frame of shaped QAM symbols on two polarizations:
//!
//! 1. Draw I and Q amplitude levels from the shaping prior
//! 2. Zero-insert upsample by `sps` and pulse-shape with the impulse response
//! 3. Optical kind only: chromatic dispersion, first-order PMD and receiver
//!    I/Q phase error (frequency domain, one FFT per polarization)
//! 4. Rotate by the carrier phase `theta`
//! 5. Add circular AWGN at the configured SNR
//!
//! Layouts are (pol, 2, len) with axis 1 = (I, Q), matching what the
//! equalizer consumes.

use ndarray::Array3;
use num_complex::Complex64;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rustfft::FftPlanner;
use rustler::{NifStruct, NifUnitEnum};
use std::f64::consts::PI;

use crate::error::{ChannelError, ChannelResult};
use crate::noise::ComplexNoise;
use crate::pulse::{root_raised_cosine, shaped_isi, PROAKIS_B, RRC_ALPHA, RRC_SPAN};
use crate::shaping::{Modulation, ShapingModel};

/// Number of polarizations carried by the channel
pub const POL: usize = 2;

/// Linear channel selection
#[derive(NifUnitEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// RRC pulse only
    Awgn,
    /// RRC pulse with symbol-spaced Proakis-B ISI
    ProakisB,
    /// RRC pulse with CD, PMD and I/Q phase error
    Optical,
}

/// Channel parameters from Elixir
#[derive(NifStruct, Debug, Clone)]
#[module = "DpeqSimnet.Channel.Params"]
pub struct ChannelParams {
    pub modulation: Modulation,
    pub kind: ChannelKind,
    /// Samples per symbol
    pub sps: usize,
    /// Es/N0 in dB
    pub snr_db: f64,
    /// Maxwell-Boltzmann shaping parameter on the integer grid
    pub nu: f64,
    /// Symbol rate in baud
    pub symb_rate: f64,
    /// Accumulated dispersion beta2·L in s²
    pub tau_cd: f64,
    /// Differential group delay in s
    pub tau_pmd: f64,
    /// Receiver I/Q phase error per polarization in rad
    pub phi_iq: (f64, f64),
}

impl Default for ChannelParams {
    fn default() -> Self {
        Self {
            modulation: Modulation::Qam16,
            kind: ChannelKind::Awgn,
            sps: 2,
            snr_db: 20.0,
            nu: 0.0,
            symb_rate: 100e9,
            tau_cd: 0.0,
            tau_pmd: 0.0,
            phi_iq: (0.0, 0.0),
        }
    }
}

impl ChannelParams {
    /// Short-reach link with dispersion, PMD and I/Q skew on both pols
    pub fn optical_link() -> Self {
        Self {
            kind: ChannelKind::Optical,
            nu: 0.0270955,
            tau_cd: -5e-24,
            tau_pmd: 0.1e-12,
            phi_iq: (5.0_f64.to_radians(), -5.0_f64.to_radians()),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> ChannelResult<()> {
        if self.sps == 0 {
            return Err(ChannelError::invalid("sps", "must be at least 1"));
        }
        if !self.snr_db.is_finite() {
            return Err(ChannelError::invalid("snr_db", "must be finite"));
        }
        if self.kind == ChannelKind::Optical && !(self.symb_rate > 0.0) {
            return Err(ChannelError::invalid("symb_rate", "must be positive for the optical channel"));
        }
        if !self.tau_cd.is_finite() || !self.tau_pmd.is_finite() {
            return Err(ChannelError::invalid("tau_cd/tau_pmd", "must be finite"));
        }
        if !self.phi_iq.0.is_finite() || !self.phi_iq.1.is_finite() {
            return Err(ChannelError::invalid("phi_iq", "must be finite"));
        }
        Ok(())
    }

    /// Complex noise variance per sample for unit-power symbols
    pub fn noise_variance(&self, pow_mean: f64) -> f64 {
        pow_mean * 10.0_f64.powf(-self.snr_db / 10.0)
    }

    /// Unit-energy real impulse response for the selected kind
    pub fn impulse_response(&self) -> Vec<f64> {
        match self.kind {
            ChannelKind::Awgn | ChannelKind::Optical => {
                root_raised_cosine(self.sps, RRC_ALPHA, RRC_SPAN)
            }
            ChannelKind::ProakisB => shaped_isi(self.sps, &PROAKIS_B),
        }
    }
}

/// One generated frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// Receive samples, (pol, 2, num_symbols·sps)
    pub rx: Array3<f64>,
    /// Transmitted symbol amplitudes, (pol, 2, num_symbols)
    pub symbols: Array3<f64>,
    /// Noise standard deviation per complex sample
    pub sigma_n: f64,
}

impl Frame {
    pub fn num_symbols(&self) -> usize {
        self.symbols.shape()[2]
    }
}

/// Seeded dual-polarization channel emulator
pub struct DualPolChannel {
    params: ChannelParams,
    shaping: ShapingModel,
    impulse: Vec<f64>,
    level_dist: WeightedIndex<f64>,
    rng: ChaCha8Rng,
    noise: ComplexNoise,
    /// PMD principal-state rotation, drawn once per channel
    pmd_angle: f64,
    frames: u64,
}

impl DualPolChannel {
    pub fn new(params: ChannelParams, seed: u64) -> ChannelResult<Self> {
        params.validate()?;

        let shaping = ShapingModel::new(params.modulation, params.nu)?;
        let level_dist = WeightedIndex::new(shaping.probs().iter().copied())
            .map_err(|e| ChannelError::invalid("nu", e.to_string()))?;

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let noise = ComplexNoise::new(params.noise_variance(shaping.pow_mean()), &mut rng);
        let pmd_angle = rng.gen::<f64>() * PI;

        Ok(Self {
            impulse: params.impulse_response(),
            params,
            shaping,
            level_dist,
            rng,
            noise,
            pmd_angle,
            frames: 0,
        })
    }

    pub fn params(&self) -> &ChannelParams {
        &self.params
    }

    pub fn shaping(&self) -> &ShapingModel {
        &self.shaping
    }

    pub fn impulse_response(&self) -> &[f64] {
        &self.impulse
    }

    pub fn frames_generated(&self) -> u64 {
        self.frames
    }

    /// Emulate one frame of `num_symbols` symbols per polarization
    pub fn generate(&mut self, num_symbols: usize, theta: f64) -> ChannelResult<Frame> {
        if num_symbols == 0 {
            return Err(ChannelError::EmptyFrame);
        }

        let sps = self.params.sps;
        let num_samples = num_symbols * sps;
        let mut symbols = Array3::<f64>::zeros((POL, 2, num_symbols));
        let mut streams: Vec<Vec<Complex64>> = Vec::with_capacity(POL);

        for p in 0..POL {
            let mut tx = Vec::with_capacity(num_symbols);
            for n in 0..num_symbols {
                let i = self.shaping.amp_levels()[self.level_dist.sample(&mut self.rng)];
                let q = self.shaping.amp_levels()[self.level_dist.sample(&mut self.rng)];
                symbols[[p, 0, n]] = i;
                symbols[[p, 1, n]] = q;
                tx.push(Complex64::new(i, q));
            }
            streams.push(pulse_shape(&tx, &self.impulse, sps));
        }

        if self.params.kind == ChannelKind::Optical {
            self.apply_fiber(&mut streams);
            self.apply_iq_error(&mut streams);
        }

        let rotation = Complex64::from_polar(1.0, theta);
        for stream in streams.iter_mut() {
            for s in stream.iter_mut() {
                *s *= rotation;
            }
            self.noise.corrupt(stream);
        }

        let mut rx = Array3::<f64>::zeros((POL, 2, num_samples));
        for (p, stream) in streams.iter().enumerate() {
            for (t, s) in stream.iter().enumerate() {
                rx[[p, 0, t]] = s.re;
                rx[[p, 1, t]] = s.im;
            }
        }

        if rx.iter().any(|x| !x.is_finite()) {
            return Err(ChannelError::NonFinite { theta });
        }

        self.frames += 1;
        tracing::trace!(frame = self.frames, num_symbols, theta, "channel frame generated");

        Ok(Frame {
            rx,
            symbols,
            sigma_n: self.noise.variance().sqrt(),
        })
    }

    /// Chromatic dispersion followed by first-order PMD
    fn apply_fiber(&self, streams: &mut [Vec<Complex64>]) {
        let n = streams[0].len();
        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(n);
        let ifft = planner.plan_fft_inverse(n);

        for stream in streams.iter_mut() {
            fft.process(stream);
        }

        let fs = self.params.symb_rate * self.params.sps as f64;
        let (c, s) = (self.pmd_angle.cos(), self.pmd_angle.sin());
        let half_dgd = self.params.tau_pmd / 2.0;

        for k in 0..n {
            let bin = if k < (n + 1) / 2 { k as f64 } else { k as f64 - n as f64 };
            let omega = 2.0 * PI * bin * fs / n as f64;

            let h_cd = Complex64::from_polar(1.0, -self.params.tau_cd / 2.0 * omega * omega);
            let x = streams[0][k] * h_cd;
            let y = streams[1][k] * h_cd;

            // Rotate into the principal states, delay, rotate back
            let xr = x * c - y * s;
            let yr = x * s + y * c;
            let xd = xr * Complex64::from_polar(1.0, omega * half_dgd);
            let yd = yr * Complex64::from_polar(1.0, -omega * half_dgd);

            streams[0][k] = xd * c + yd * s;
            streams[1][k] = yd * c - xd * s;
        }

        let scale = 1.0 / n as f64;
        for stream in streams.iter_mut() {
            ifft.process(stream);
            for v in stream.iter_mut() {
                *v *= scale;
            }
        }
    }

    /// Q' = Q·cos(φ) + I·sin(φ), per polarization
    fn apply_iq_error(&self, streams: &mut [Vec<Complex64>]) {
        let phis = [self.params.phi_iq.0, self.params.phi_iq.1];
        for (stream, phi) in streams.iter_mut().zip(phis) {
            let (c, s) = (phi.cos(), phi.sin());
            for v in stream.iter_mut() {
                *v = Complex64::new(v.re, v.im * c + v.re * s);
            }
        }
    }
}

/// Zero-insert upsample and convolve ("same" length, centered taps)
pub fn pulse_shape(symbols: &[Complex64], taps: &[f64], sps: usize) -> Vec<Complex64> {
    let num_samples = symbols.len() * sps;
    let center = (taps.len() - 1) / 2;
    let mut out = vec![Complex64::new(0.0, 0.0); num_samples];

    for (n, &x) in symbols.iter().enumerate() {
        for (k, &h) in taps.iter().enumerate() {
            let t = (n * sps + k) as isize - center as isize;
            if t >= 0 && (t as usize) < num_samples {
                out[t as usize] += x * h;
            }
        }
    }

    out
}
