//! Trainable butterfly equalizer
//!
//! The encoder half of the VAE: maps receive samples to level posteriors
//! (soft) and equalized constellation points (hard).

mod butterfly;
mod taps;

pub use butterfly::{level_logit, level_posteriors, ButterflyFir, EqualizerOutput};
pub use taps::{Parameter, TapBank};
