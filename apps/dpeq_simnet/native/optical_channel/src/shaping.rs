//! Probabilistic amplitude shaping for square QAM
//!
//! Each quadrature carries one of `sqrt(M)` equidistant amplitude levels.
//! Levels are drawn from a Maxwell-Boltzmann distribution
//!
//!   P(a) ∝ exp(-ν·a²)
//!
//! evaluated on the integer grid a ∈ {-(L-1), ..., -1, 1, ..., L-1}. The grid
//! is then scaled so that the mean complex symbol power is 1. The shaping
//! parameter expressed on the scaled grid is `nu_sc = ν / s²`, so that
//! `exp(-ν·a²) == exp(-nu_sc·(s·a)²)`.

use rustler::NifUnitEnum;

use crate::error::{ChannelError, ChannelResult};

/// Square QAM formats supported by the shaping model
#[derive(NifUnitEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modulation {
    Qpsk,
    Qam16,
    Qam64,
    Qam256,
}

impl Modulation {
    /// Constellation order M
    pub fn order(self) -> usize {
        match self {
            Modulation::Qpsk => 4,
            Modulation::Qam16 => 16,
            Modulation::Qam64 => 64,
            Modulation::Qam256 => 256,
        }
    }

    /// Amplitude levels per quadrature (sqrt(M))
    pub fn levels_per_dim(self) -> usize {
        match self {
            Modulation::Qpsk => 2,
            Modulation::Qam16 => 4,
            Modulation::Qam64 => 8,
            Modulation::Qam256 => 16,
        }
    }
}

/// Shaped per-dimension amplitude alphabet
#[derive(Debug, Clone, PartialEq)]
pub struct ShapingModel {
    modulation: Modulation,
    /// Scaled amplitude levels, ascending and symmetric around zero
    amp_levels: Vec<f64>,
    /// Prior probability of each level
    probs: Vec<f64>,
    /// Shaping parameter on the unscaled integer grid
    nu: f64,
    /// Shaping parameter on the scaled levels
    nu_sc: f64,
    /// Mean complex symbol power
    pow_mean: f64,
}

impl ShapingModel {
    pub fn new(modulation: Modulation, nu: f64) -> ChannelResult<Self> {
        if !nu.is_finite() || nu < 0.0 {
            return Err(ChannelError::invalid("nu", format!("must be finite and >= 0, got {nu}")));
        }

        let num_lev = modulation.levels_per_dim();
        let grid: Vec<f64> = (0..num_lev)
            .map(|l| 2.0 * l as f64 - (num_lev as f64 - 1.0))
            .collect();

        let weights: Vec<f64> = grid.iter().map(|a| (-nu * a * a).exp()).collect();
        let total: f64 = weights.iter().sum();
        if !(total > 0.0) || !total.is_finite() {
            return Err(ChannelError::invalid("nu", format!("shaping weights vanish for nu = {nu}")));
        }
        let probs: Vec<f64> = weights.iter().map(|w| w / total).collect();

        // Complex symbol power = 2 x per-dimension power
        let dim_power: f64 = grid.iter().zip(&probs).map(|(a, p)| p * a * a).sum();
        let scale = 1.0 / (2.0 * dim_power).sqrt();

        let amp_levels: Vec<f64> = grid.iter().map(|a| a * scale).collect();
        let pow_mean = 2.0
            * amp_levels
                .iter()
                .zip(&probs)
                .map(|(a, p)| p * a * a)
                .sum::<f64>();

        Ok(Self {
            modulation,
            amp_levels,
            probs,
            nu,
            nu_sc: nu / (scale * scale),
            pow_mean,
        })
    }

    pub fn modulation(&self) -> Modulation {
        self.modulation
    }

    pub fn amp_levels(&self) -> &[f64] {
        &self.amp_levels
    }

    pub fn probs(&self) -> &[f64] {
        &self.probs
    }

    pub fn num_lev(&self) -> usize {
        self.amp_levels.len()
    }

    pub fn nu(&self) -> f64 {
        self.nu
    }

    pub fn nu_sc(&self) -> f64 {
        self.nu_sc
    }

    pub fn pow_mean(&self) -> f64 {
        self.pow_mean
    }

    /// Index of the level nearest to `amp`
    pub fn nearest_level(&self, amp: f64) -> usize {
        let mut best = 0;
        let mut best_dist = f64::MAX;
        for (l, &a) in self.amp_levels.iter().enumerate() {
            let dist = (amp - a).abs();
            if dist < best_dist {
                best_dist = dist;
                best = l;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_qam16_levels() {
        let model = ShapingModel::new(Modulation::Qam16, 0.0).unwrap();

        assert_eq!(model.num_lev(), 4);
        for p in model.probs() {
            assert!((p - 0.25).abs() < 1e-12);
        }

        // Uniform 16-QAM: per-dim power of {-3,-1,1,3} is 5, so scale = 1/sqrt(10)
        let expected = 3.0 / 10.0_f64.sqrt();
        assert!((model.amp_levels()[3] - expected).abs() < 1e-12);
        assert!((model.nu_sc()).abs() < 1e-15);
    }

    #[test]
    fn test_unit_power_with_shaping() {
        for nu in [0.0, 0.05, 0.2, 0.8] {
            let model = ShapingModel::new(Modulation::Qam64, nu).unwrap();
            assert!((model.pow_mean() - 1.0).abs() < 1e-12, "nu={} pow={}", nu, model.pow_mean());

            let total: f64 = model.probs().iter().sum();
            assert!((total - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_shaping_prefers_inner_levels() {
        let model = ShapingModel::new(Modulation::Qam16, 0.1).unwrap();
        let p = model.probs();

        assert!(p[1] > p[0]);
        assert!((p[0] - p[3]).abs() < 1e-15);
        assert!((p[1] - p[2]).abs() < 1e-15);
    }

    #[test]
    fn test_nu_sc_expresses_same_prior() {
        let model = ShapingModel::new(Modulation::Qam16, 0.1).unwrap();
        let levels = model.amp_levels();

        // Ratio of priors must match on both grids: exp(-nu*(9-1)) for levels 3 vs 1
        let ratio_grid = (-0.1 * (9.0 - 1.0_f64)).exp();
        let ratio_sc = (-model.nu_sc() * (levels[3].powi(2) - levels[2].powi(2))).exp();
        assert!((ratio_grid - ratio_sc).abs() < 1e-12);
        assert!((model.probs()[3] / model.probs()[2] - ratio_grid).abs() < 1e-12);
    }

    #[test]
    fn test_nearest_level() {
        let model = ShapingModel::new(Modulation::Qpsk, 0.0).unwrap();
        assert_eq!(model.nearest_level(-0.9), 0);
        assert_eq!(model.nearest_level(0.01), 1);
    }

    #[test]
    fn test_negative_nu_rejected() {
        assert!(ShapingModel::new(Modulation::Qam16, -1.0).is_err());
    }
}
