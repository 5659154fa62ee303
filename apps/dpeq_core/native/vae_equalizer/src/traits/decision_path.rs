//! DecisionPath trait - One way of turning equalizer output into decisions
//!
//! The equalizer produces two accumulators per frame: posterior level
//! probabilities (soft) and constellation points (hard). Ambiguity
//! resolution and scoring are identical for both apart from three things,
//! which this trait captures.

use ndarray::Array3;
use num_complex::Complex64;

/// Strategy for post-processing one accumulator
pub trait DecisionPath {
    /// Short label for logs
    fn label(&self) -> &'static str;

    /// Channels on axis 1 of the accumulator
    fn channels(&self) -> usize;

    /// Complex symbol estimate per polarization, shape (pol)(N)
    fn symbol_estimates(&self, acc: &Array3<f64>) -> Vec<Vec<Complex64>>;

    /// Per-polarization symbol error rate against `truth` (pol, 2, N)
    fn ser(&self, acc: &Array3<f64>, truth: &Array3<f64>) -> Vec<f64>;
}
