//! Per-frame result tensors
//!
//! `SER_valid` (4 × frames) and `Var_est` (pol × frames) grow by one column
//! per frame. Columns are written once, in frame order.

use ndarray::Array2;

use crate::error::{TrainError, TrainResult};

/// SER rows: hard path per pol, then soft path per pol
pub const SER_ROWS: usize = 4;

#[derive(Debug, Clone)]
pub struct ResultTable {
    pol: usize,
    capacity: usize,
    ser: Vec<[f64; SER_ROWS]>,
    var_est: Vec<Vec<f64>>,
}

impl ResultTable {
    pub fn new(pol: usize, num_frames: usize) -> Self {
        Self {
            pol,
            capacity: num_frames,
            ser: Vec::with_capacity(num_frames),
            var_est: Vec::with_capacity(num_frames),
        }
    }

    /// Frames written so far
    pub fn len(&self) -> usize {
        self.ser.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ser.is_empty()
    }

    /// Append the column of `frame`
    pub fn push(&mut self, frame: usize, ser: [f64; SER_ROWS], var_est: &[f64]) -> TrainResult<()> {
        let expected = self.len();
        if frame != expected || frame >= self.capacity {
            return Err(TrainError::ResultOutOfOrder { frame, expected });
        }
        if var_est.len() != self.pol {
            return Err(TrainError::shape("variance column", &[self.pol], &[var_est.len()]));
        }

        self.ser.push(ser);
        self.var_est.push(var_est.to_vec());
        Ok(())
    }

    /// SER_valid, (4, frames written)
    pub fn ser_valid(&self) -> Array2<f64> {
        Array2::from_shape_fn((SER_ROWS, self.len()), |(row, col)| self.ser[col][row])
    }

    /// Var_est, (pol, frames written)
    pub fn var_est(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.pol, self.len()), |(p, col)| self.var_est[col][p])
    }
}
