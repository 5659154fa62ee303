//! Training configuration
//!
//! `TrainingConfig` arrives from Elixir as `%DpeqCore.Training.Config{}`.
//! Named presets mirror the usual experiment setups; `validate` runs before
//! anything is allocated.

use std::ops::Range;

use optical_channel::{ChannelKind, ChannelParams, Modulation};
use rustler::NifStruct;

use crate::ambiguity::{score_guard, trim_len, MAX_SHIFT};
use crate::error::{ConfigError, TrainResult};

/// Configuration of one training run
#[derive(NifStruct, Debug, Clone, PartialEq)]
#[module = "DpeqCore.Training.Config"]
pub struct TrainingConfig {
    /// Square QAM format
    pub modulation: Modulation,
    /// Equalizer and channel-estimate taps (odd)
    pub m_est: usize,
    /// Samples per symbol
    pub sps: usize,
    /// Es/N0 of the synthetic channel in dB
    pub snr_db: f64,
    /// Maxwell-Boltzmann shaping parameter
    pub nu: f64,
    /// Carrier phase drift per frame in rad
    pub theta_diff: f64,
    /// Initial carrier phase in rad
    pub theta: f64,
    /// Initial Adam learning rate
    pub lr_optim: f64,
    /// Symbols per mini-batch
    pub batch_len: usize,
    /// Upper bound on symbols per frame
    pub n_frame_max: usize,
    /// Frames to train on
    pub num_frames: usize,
    /// Forwarded to the filter set-up, no effect on the computation
    pub flex_step: bool,
    pub channel: ChannelKind,
    /// Symbol rate in baud
    pub symb_rate: f64,
    /// Accumulated dispersion in s²
    pub tau_cd: f64,
    /// Differential group delay in s
    pub tau_pmd: f64,
    /// Receiver I/Q phase error per polarization in rad
    pub phi_iq: (f64, f64),
    /// Frames between learning-rate halvings
    pub n_lrhalf: usize,
    /// Seed of the channel emulator
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            modulation: Modulation::Qam16,
            m_est: 25,
            sps: 2,
            snr_db: 20.0,
            nu: 0.0270955,
            theta_diff: 0.0,
            theta: 0.0,
            lr_optim: 4e-3,
            batch_len: 200,
            n_frame_max: 10_000,
            num_frames: 50,
            flex_step: false,
            channel: ChannelKind::Awgn,
            symb_rate: 100e9,
            tau_cd: 0.0,
            tau_pmd: 0.0,
            phi_iq: (0.0, 0.0),
            n_lrhalf: 20,
            seed: 0,
        }
    }
}

impl TrainingConfig {
    /// Dispersive link with PMD, I/Q skew and a slowly drifting laser phase
    pub fn optical() -> Self {
        let link = ChannelParams::optical_link();
        Self {
            channel: ChannelKind::Optical,
            m_est: 41,
            theta_diff: 1e-3,
            tau_cd: link.tau_cd,
            tau_pmd: link.tau_pmd,
            phi_iq: link.phi_iq,
            ..Self::default()
        }
    }

    /// Small, fast run used for smoke tests and benchmarks
    pub fn short_run() -> Self {
        Self {
            m_est: 9,
            batch_len: 100,
            n_frame_max: 200,
            num_frames: 3,
            n_lrhalf: 2,
            ..Self::default()
        }
    }

    /// Channel emulator parameters derived from this configuration
    pub fn channel_params(&self) -> ChannelParams {
        ChannelParams {
            modulation: self.modulation,
            kind: self.channel,
            sps: self.sps,
            snr_db: self.snr_db,
            nu: self.nu,
            symb_rate: self.symb_rate,
            tau_cd: self.tau_cd,
            tau_pmd: self.tau_pmd,
            phi_iq: self.phi_iq,
        }
    }

    pub fn geometry(&self) -> Result<FrameGeometry, ConfigError> {
        FrameGeometry::new(self.n_frame_max, self.batch_len, self.sps)
    }

    pub fn validate(&self) -> TrainResult<()> {
        if self.m_est == 0 || self.m_est % 2 == 0 {
            return Err(ConfigError::invalid("m_est", format!("must be odd, got {}", self.m_est)).into());
        }
        if self.n_lrhalf == 0 {
            return Err(ConfigError::invalid("n_lrhalf", "must be at least 1").into());
        }
        if !(self.lr_optim > 0.0) || !self.lr_optim.is_finite() {
            return Err(ConfigError::invalid("lr_optim", format!("must be positive, got {}", self.lr_optim)).into());
        }
        if !self.theta.is_finite() || !self.theta_diff.is_finite() {
            return Err(ConfigError::invalid("theta/theta_diff", "must be finite").into());
        }
        self.geometry()?.check_scoring_window()?;
        self.channel_params().validate()?;
        Ok(())
    }
}

/// Frame partition into mini-batches
///
/// `m_max = n_frame_max / batch_len` and `n_frame = m_max · batch_len`: any
/// remainder past the last full mini-batch is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub batch_len: usize,
    pub m_max: usize,
    pub n_frame: usize,
    pub sps: usize,
}

impl FrameGeometry {
    pub fn new(n_frame_max: usize, batch_len: usize, sps: usize) -> Result<Self, ConfigError> {
        if batch_len == 0 {
            return Err(ConfigError::invalid("batch_len", "must be at least 1"));
        }
        if sps == 0 {
            return Err(ConfigError::invalid("sps", "must be at least 1"));
        }

        let m_max = n_frame_max / batch_len;
        if m_max == 0 {
            return Err(ConfigError::NoMiniBatch { n_frame_max, batch_len });
        }

        Ok(Self {
            batch_len,
            m_max,
            n_frame: m_max * batch_len,
            sps,
        })
    }

    /// Receive samples per mini-batch
    pub fn batch_samples(&self) -> usize {
        self.batch_len * self.sps
    }

    /// Receive samples per frame
    pub fn frame_samples(&self) -> usize {
        self.n_frame * self.sps
    }

    /// Sample range of mini-batch `m` within the frame
    pub fn sample_window(&self, m: usize) -> Range<usize> {
        m * self.batch_samples()..(m + 1) * self.batch_samples()
    }

    /// Symbol range of mini-batch `m` within the frame
    pub fn symbol_window(&self, m: usize) -> Range<usize> {
        m * self.batch_len..(m + 1) * self.batch_len
    }

    /// Reject partitions that cannot be scored for every shift the search may return
    ///
    /// The worst case is `shift = [+MAX_SHIFT, ..]`: it shortens every block the
    /// most and widens the guard the most.
    pub fn check_scoring_window(&self) -> Result<(), ConfigError> {
        let available = self.m_max * trim_len(self.batch_len, MAX_SHIFT);
        let guard = score_guard(&[MAX_SHIFT]);
        if available <= 2 * guard {
            return Err(ConfigError::NoScoringWindow {
                batch_len: self.batch_len,
                m_max: self.m_max,
                max_shift: MAX_SHIFT,
                available,
                guard,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrainError;

    #[test]
    fn test_geometry_exact_fit() {
        let g = FrameGeometry::new(1000, 100, 2).unwrap();
        assert_eq!(g.m_max, 10);
        assert_eq!(g.n_frame, 1000);
        assert_eq!(g.frame_samples(), 2000);
    }

    #[test]
    fn test_geometry_drops_remainder() {
        let g = FrameGeometry::new(1050, 100, 2).unwrap();
        assert_eq!(g.m_max, 10);
        assert_eq!(g.n_frame, 1000);
    }

    #[test]
    fn test_geometry_windows() {
        let g = FrameGeometry::new(300, 100, 4).unwrap();
        assert_eq!(g.sample_window(0), 0..400);
        assert_eq!(g.sample_window(2), 800..1200);
        assert_eq!(g.symbol_window(1), 100..200);
    }

    #[test]
    fn test_geometry_needs_one_batch() {
        assert_eq!(
            FrameGeometry::new(99, 100, 2).unwrap_err(),
            ConfigError::NoMiniBatch { n_frame_max: 99, batch_len: 100 }
        );
    }

    #[test]
    fn test_unscorable_geometry_rejected() {
        let config = TrainingConfig {
            batch_len: 30,
            n_frame_max: 30,
            ..TrainingConfig::short_run()
        };
        assert_eq!(
            config.validate().unwrap_err(),
            TrainError::Config(ConfigError::NoScoringWindow {
                batch_len: 30,
                m_max: 1,
                max_shift: 10,
                available: 10,
                guard: 21,
            })
        );

        // Scorable at shift 0, empty at shift +10
        let config = TrainingConfig {
            batch_len: 50,
            n_frame_max: 50,
            ..TrainingConfig::short_run()
        };
        assert!(matches!(
            config.validate(),
            Err(TrainError::Config(ConfigError::NoScoringWindow { available: 30, .. }))
        ));
    }

    #[test]
    fn test_blocks_shorter_than_cut_rejected() {
        // batch_len - MAX_SHIFT - N_CUT < 0 never reaches the trim
        for batch_len in [5, 15, 20] {
            let geometry = FrameGeometry::new(1000, batch_len, 2).unwrap();
            assert!(geometry.check_scoring_window().is_err(), "batch_len={batch_len}");
        }
    }

    #[test]
    fn test_scoring_window_boundary() {
        // 2 blocks of 41 keep 2·21 = 42 = 2·guard: still empty
        assert!(FrameGeometry::new(82, 41, 2).unwrap().check_scoring_window().is_err());
        // One more block tips it over
        assert!(FrameGeometry::new(123, 41, 2).unwrap().check_scoring_window().is_ok());
    }

    #[test]
    fn test_default_and_presets_validate() {
        TrainingConfig::default().validate().unwrap();
        TrainingConfig::optical().validate().unwrap();
        TrainingConfig::short_run().validate().unwrap();
    }

    #[test]
    fn test_even_taps_rejected() {
        let config = TrainingConfig {
            m_est: 24,
            ..TrainingConfig::default()
        };
        assert!(matches!(config.validate(), Err(TrainError::Config(ConfigError::Invalid { name: "m_est", .. }))));
    }

    #[test]
    fn test_channel_params_forwarded() {
        let config = TrainingConfig::optical();
        let params = config.channel_params();
        assert_eq!(params.kind, ChannelKind::Optical);
        assert_eq!(params.sps, config.sps);
        assert_eq!(params.tau_cd, config.tau_cd);
        assert!(matches!(
            TrainingConfig { sps: 0, ..config }.validate(),
            Err(TrainError::Config(_))
        ));
    }
}
