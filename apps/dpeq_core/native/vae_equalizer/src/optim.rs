//! Adam optimizer over complex tap banks
//!
//! Real and imaginary parts are independent real parameters with their own
//! moment estimates, so the update matches a real-valued Adam over the
//! interleaved (re, im) vector. Defaults and bias correction follow the
//! common deep-learning convention (β1 = 0.9, β2 = 0.999, ε = 1e-8).

use num_complex::Complex64;

use crate::equalizer::Parameter;
use crate::error::{TrainError, TrainResult};

pub const BETA1: f64 = 0.9;
pub const BETA2: f64 = 0.999;
pub const EPSILON: f64 = 1e-8;

/// Parameter group of the equalizer taps (scheduled learning rate)
pub const EQUALIZER_GROUP: usize = 0;
/// Parameter group of the channel estimate (fixed learning rate)
pub const CHANNEL_GROUP: usize = 1;

#[derive(Debug, Clone)]
struct GroupState {
    lr: f64,
    step: u64,
    /// First moments, re and im stored in the matching component
    m: Vec<Complex64>,
    /// Second moments, same layout
    v: Vec<Complex64>,
}

/// Adam with one state per parameter group
#[derive(Debug, Clone)]
pub struct Adam {
    groups: Vec<GroupState>,
}

impl Adam {
    /// One group per `(num_params, lr)` entry, in group order
    pub fn new(groups: &[(usize, f64)]) -> Self {
        Self {
            groups: groups
                .iter()
                .map(|&(len, lr)| GroupState {
                    lr,
                    step: 0,
                    m: vec![Complex64::new(0.0, 0.0); len],
                    v: vec![Complex64::new(0.0, 0.0); len],
                })
                .collect(),
        }
    }

    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    pub fn lr(&self, group: usize) -> f64 {
        self.groups[group].lr
    }

    pub fn set_lr(&mut self, group: usize, lr: f64) {
        self.groups[group].lr = lr;
    }

    /// Steps taken by `group`
    pub fn step_count(&self, group: usize) -> u64 {
        self.groups[group].step
    }

    /// One update of every group from its accumulated gradient
    ///
    /// `params[g]` belongs to group `g`. Gradients are left in place; the
    /// caller zeroes them before the next accumulation.
    pub fn step(&mut self, params: &mut [&mut Parameter]) -> TrainResult<()> {
        if params.len() != self.groups.len() {
            return Err(TrainError::shape("optimizer groups", &[self.groups.len()], &[params.len()]));
        }

        for (state, param) in self.groups.iter_mut().zip(params.iter_mut()) {
            let values = param.value.as_mut_slice();
            if values.len() != state.m.len() {
                return Err(TrainError::shape("optimizer group", &[state.m.len()], &[values.len()]));
            }

            state.step += 1;
            let bias1 = 1.0 - BETA1.powi(state.step as i32);
            let bias2 = 1.0 - BETA2.powi(state.step as i32);

            for (((w, g), m), v) in values
                .iter_mut()
                .zip(param.grad.as_slice())
                .zip(state.m.iter_mut())
                .zip(state.v.iter_mut())
            {
                w.re -= adam_delta(g.re, &mut m.re, &mut v.re, state.lr, bias1, bias2);
                w.im -= adam_delta(g.im, &mut m.im, &mut v.im, state.lr, bias1, bias2);
            }
        }

        Ok(())
    }
}

#[inline]
fn adam_delta(g: f64, m: &mut f64, v: &mut f64, lr: f64, bias1: f64, bias2: f64) -> f64 {
    *m = BETA1 * *m + (1.0 - BETA1) * g;
    *v = BETA2 * *v + (1.0 - BETA2) * g * g;

    let m_hat = *m / bias1;
    let v_hat = *v / bias2;
    lr * m_hat / (v_hat.sqrt() + EPSILON)
}

/// Step-wise learning-rate decay of the equalizer group
///
/// The rate halves at every frame that is a nonzero multiple of `n_lrhalf`.
/// Halvings accumulate and are never undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LrSchedule {
    n_lrhalf: usize,
}

impl LrSchedule {
    pub fn new(n_lrhalf: usize) -> Self {
        Self {
            n_lrhalf: n_lrhalf.max(1),
        }
    }

    pub fn halves_at(&self, frame: usize) -> bool {
        frame != 0 && frame % self.n_lrhalf == 0
    }

    /// Learning rate in effect during `frame`
    pub fn lr_at(&self, lr0: f64, frame: usize) -> f64 {
        lr0 * 0.5_f64.powi((frame / self.n_lrhalf) as i32)
    }

    /// Apply the schedule at the start of `frame`; returns the new rate if it changed
    pub fn apply(&self, frame: usize, optimizer: &mut Adam) -> Option<f64> {
        if !self.halves_at(frame) {
            return None;
        }
        let lr = optimizer.lr(EQUALIZER_GROUP) * 0.5;
        optimizer.set_lr(EQUALIZER_GROUP, lr);
        Some(lr)
    }
}
