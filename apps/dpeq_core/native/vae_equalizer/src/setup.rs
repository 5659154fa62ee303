//! Channel and model initialization
//!
//! Builds everything a training run starts from: the shaping model, the
//! channel impulse response, an identity channel estimate, the initial noise
//! variance, the compute backend and the frame source.

use std::sync::Arc;

use optical_channel::{DualPolChannel, ShapingModel, POL};

use crate::backend::CpuBackend;
use crate::config::TrainingConfig;
use crate::equalizer::TapBank;
use crate::error::TrainResult;
use crate::traits::{Backend, FrameSource};

/// Initial state of a training run
pub struct Setup {
    pub shaping: ShapingModel,
    /// Real impulse response the emulator shapes with
    pub h_channel: Vec<f64>,
    pub pol: usize,
    /// Identity butterfly, `m_est` taps
    pub h_est: TapBank,
    /// Noise variance per pol, `pow_mean / 10^(SNR/10)`
    pub var: Vec<f64>,
    pub backend: Arc<dyn Backend>,
    pub source: Box<dyn FrameSource>,
}

impl Setup {
    /// Seeded channel emulator on the CPU backend
    pub fn init(config: &TrainingConfig) -> TrainResult<Self> {
        config.validate()?;
        let channel = DualPolChannel::new(config.channel_params(), config.seed)?;
        let h_channel = channel.impulse_response().to_vec();
        Self::with_source(config, Box::new(channel), h_channel, Arc::new(CpuBackend))
    }

    /// Custom frame source and backend
    pub fn with_source(
        config: &TrainingConfig,
        source: Box<dyn FrameSource>,
        h_channel: Vec<f64>,
        backend: Arc<dyn Backend>,
    ) -> TrainResult<Self> {
        config.validate()?;
        let shaping = source.shaping().clone();
        let noise_var = config.channel_params().noise_variance(shaping.pow_mean());

        tracing::debug!(
            modulation = ?config.modulation,
            num_lev = shaping.num_lev(),
            nu_sc = shaping.nu_sc(),
            noise_var,
            channel_taps = h_channel.len(),
            channel_energy = impulse_energy(&h_channel),
            "training set-up initialized"
        );

        Ok(Self {
            shaping,
            h_channel,
            pol: POL,
            h_est: TapBank::identity(POL, config.m_est),
            var: vec![noise_var; POL],
            backend,
            source,
        })
    }
}

/// Energy of a real impulse response
pub fn impulse_energy(h: &[f64]) -> f64 {
    h.iter().map(|v| v * v).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    #[test]
    fn test_init_defaults() {
        let config = TrainingConfig::default();
        let setup = Setup::init(&config).unwrap();

        assert_eq!(setup.pol, 2);
        assert_eq!(setup.shaping.num_lev(), 4);
        assert!((setup.shaping.pow_mean() - 1.0).abs() < 1e-12);
        assert_eq!(setup.backend.name(), "cpu");

        // 20 dB on unit power
        for v in &setup.var {
            assert!((v - 0.01).abs() < 1e-12);
        }

        assert!((impulse_energy(&setup.h_channel) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_impulse_response_from_emulator() {
        let config = TrainingConfig::short_run();
        let setup = Setup::init(&config).unwrap();
        let channel = DualPolChannel::new(config.channel_params(), config.seed).unwrap();

        assert_eq!(setup.h_channel, channel.impulse_response());
        assert!(!setup.h_channel.is_empty());
    }

    #[test]
    fn test_with_source_keeps_impulse_response() {
        let config = TrainingConfig::short_run();
        let channel = DualPolChannel::new(config.channel_params(), config.seed).unwrap();
        let h = vec![0.6, 0.8];
        let setup = Setup::with_source(&config, Box::new(channel), h.clone(), Arc::new(CpuBackend)).unwrap();

        assert_eq!(setup.h_channel, h);
        assert!((impulse_energy(&setup.h_channel) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_identity_channel_estimate() {
        let config = TrainingConfig::short_run();
        let setup = Setup::init(&config).unwrap();

        assert_eq!(setup.h_est.len(), 9);
        assert_eq!(setup.h_est.taps(1, 1)[4], Complex64::new(1.0, 0.0));
        assert_eq!(setup.h_est.taps(0, 1)[4], Complex64::new(0.0, 0.0));
    }

    #[test]
    fn test_nu_sc_derived_from_nu() {
        let config = TrainingConfig {
            nu: 0.1,
            ..TrainingConfig::default()
        };
        let setup = Setup::init(&config).unwrap();
        let reference = ShapingModel::new(config.modulation, 0.1).unwrap();
        assert_eq!(setup.shaping.nu_sc(), reference.nu_sc());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = TrainingConfig {
            m_est: 4,
            ..TrainingConfig::default()
        };
        assert!(Setup::init(&config).is_err());
    }
}
