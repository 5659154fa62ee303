//! Caller-owned mini-batch buffer
//!
//! One buffer lives for the whole run. Each fill overwrites it completely,
//! so nothing from the previous mini-batch can leak into the next.

use std::ops::Range;

use ndarray::{s, Array3};
use num_complex::Complex64;

use crate::error::{TrainError, TrainResult};

/// Receive samples of one mini-batch, (pol, 2, batch_len·sps)
#[derive(Debug, Clone)]
pub struct MiniBatch {
    samples: Array3<f64>,
    /// Same samples as complex streams, (pol)(batch_len·sps)
    streams: Vec<Vec<Complex64>>,
}

impl MiniBatch {
    pub fn new(pol: usize, num_samples: usize) -> Self {
        Self {
            samples: Array3::zeros((pol, 2, num_samples)),
            streams: vec![vec![Complex64::new(0.0, 0.0); num_samples]; pol],
        }
    }

    pub fn num_samples(&self) -> usize {
        self.samples.shape()[2]
    }

    /// Copy `rx[:, :, window]` into the buffer
    pub fn fill(&mut self, rx: &Array3<f64>, window: Range<usize>) -> TrainResult<()> {
        let (pol, _, num_samples) = self.samples.dim();
        if rx.shape()[0] != pol || rx.shape()[1] != 2 || window.len() != num_samples || window.end > rx.shape()[2] {
            return Err(TrainError::shape(
                "mini-batch window",
                &[pol, 2, window.end],
                rx.shape(),
            ));
        }

        self.samples.assign(&rx.slice(s![.., .., window]));
        for (p, stream) in self.streams.iter_mut().enumerate() {
            for (t, v) in stream.iter_mut().enumerate() {
                *v = Complex64::new(self.samples[[p, 0, t]], self.samples[[p, 1, t]]);
            }
        }
        Ok(())
    }

    pub fn samples(&self) -> &Array3<f64> {
        &self.samples
    }

    pub fn streams(&self) -> &[Vec<Complex64>] {
        &self.streams
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_overwrites() {
        let rx = Array3::from_shape_fn((2, 2, 12), |(p, c, t)| (100 * p + 10 * c + t) as f64);
        let mut batch = MiniBatch::new(2, 4);

        batch.fill(&rx, 0..4).unwrap();
        assert_eq!(batch.samples()[[1, 1, 3]], 113.0);

        batch.fill(&rx, 8..12).unwrap();
        assert_eq!(batch.samples()[[0, 0, 0]], 8.0);
        assert_eq!(batch.streams()[1][2], Complex64::new(110.0, 120.0));
    }

    #[test]
    fn test_fill_rejects_bad_window() {
        let rx = Array3::<f64>::zeros((2, 2, 10));
        let mut batch = MiniBatch::new(2, 4);

        assert!(batch.fill(&rx, 0..3).is_err());
        assert!(batch.fill(&rx, 8..12).is_err());
        assert!(batch.fill(&Array3::zeros((1, 2, 10)), 0..4).is_err());
    }
}
