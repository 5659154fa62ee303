//! Circular complex AWGN generator
//!
//! Box-Muller transform; one uniform pair yields the I and Q components of
//! one complex sample.

use num_complex::Complex64;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::f64::consts::PI;

/// Complex AWGN with a configurable total (I + Q) variance
pub struct ComplexNoise {
    /// Standard deviation per quadrature, sqrt(variance / 2)
    std_dev: f64,

    rng: ChaCha8Rng,
}

impl ComplexNoise {
    /// `variance` is E|n|², split evenly between I and Q
    pub fn new(variance: f64, seed_rng: &mut ChaCha8Rng) -> Self {
        // Derived seed keeps the noise stream independent of symbol draws
        let seed: u64 = seed_rng.gen();

        Self {
            std_dev: (variance / 2.0).sqrt(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn variance(&self) -> f64 {
        2.0 * self.std_dev * self.std_dev
    }

    pub fn next_sample(&mut self) -> Complex64 {
        let u1: f64 = self.rng.gen();
        let u2: f64 = self.rng.gen();

        // Avoid log(0)
        let u1 = u1.max(1e-300);

        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * PI * u2;

        Complex64::new(r * theta.cos(), r * theta.sin()) * self.std_dev
    }

    /// Add noise in place
    pub fn corrupt(&mut self, samples: &mut [Complex64]) {
        for s in samples {
            *s += self.next_sample();
        }
    }
}
