//! Online training loop
//!
//! ```text
//! for frame in 0..num_frames:
//!     halve equalizer LR at nonzero multiples of n_lrhalf
//!     frame data  ◄── source(N_frame, theta);  theta += theta_diff
//!     for m in 0..m_max:
//!         batch ◄── rx[m-th window]
//!         soft, hard = equalizer(batch)          ──► accumulators
//!         loss, var_est = elbo(soft, batch, h_est)
//!         backward; Adam step
//!     var ◄── mean var_est;  SNR_est = pow_mean / mean var_est
//!     soft accumulator ──► align, trim, SER ──► rows 2-3
//!     hard accumulator ──► align, trim, SER ──► rows 0-1
//! ```
//!
//! Mini-batches run strictly in order: the weights after step `m` are the
//! weights step `m + 1` starts from.

mod minibatch;
mod results;


use ndarray::{s, Array2, Array3};
use optical_channel::ShapingModel;

use crate::ambiguity::{resolve_and_score, PathScore};
use crate::config::{FrameGeometry, TrainingConfig};
use crate::equalizer::{ButterflyFir, Parameter};
use crate::error::{TrainError, TrainResult};
use crate::loss::ElboLoss;
use crate::metrics::{HardConstellation, SoftDemapper};
use crate::optim::{Adam, LrSchedule, CHANNEL_GROUP, EQUALIZER_GROUP};
use crate::setup::Setup;
use crate::traits::FrameSource;
use crate::utils::math::{lin_to_db, wrap_phase};

pub use minibatch::MiniBatch;
pub use results::{ResultTable, SER_ROWS};

/// Outcome of one mini-batch step
#[derive(Debug, Clone, PartialEq)]
pub struct MinibatchStep {
    pub loss: f64,
    pub var_est: Vec<f64>,
}

/// Summary of one trained frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub frame: usize,
    /// Loss of the last mini-batch
    pub loss: f64,
    /// Hard-path time shift per pol
    pub shift: Vec<isize>,
    /// Hard-path polarization roll
    pub r: usize,
    /// Linear SNR estimate, pow_mean / mean(var_est)
    pub snr_est: f64,
    /// Hard SER per pol, then soft SER per pol
    pub ser: [f64; SER_ROWS],
    /// Equalizer learning rate used during the frame
    pub lr: f64,
}

/// Everything a finished run returns
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    /// (4, num_frames)
    pub ser_valid: Array2<f64>,
    /// (pol, num_frames)
    pub var_est: Array2<f64>,
    /// Noise variance in effect at the end of the run
    pub var: Vec<f64>,
    pub reports: Vec<FrameReport>,
}

/// Training orchestrator
pub struct Trainer {
    config: TrainingConfig,
    geometry: FrameGeometry,
    shaping: ShapingModel,
    source: Box<dyn FrameSource>,
    equalizer: ButterflyFir,
    channel_est: Parameter,
    loss: ElboLoss,
    optimizer: Adam,
    schedule: LrSchedule,
    var: Vec<f64>,
    theta: f64,
    batch: MiniBatch,
    results: ResultTable,
    reports: Vec<FrameReport>,
}

impl Trainer {
    /// Trainer on the seeded channel emulator
    pub fn new(config: TrainingConfig) -> TrainResult<Self> {
        let setup = Setup::init(&config)?;
        Self::with_setup(config, setup)
    }

    pub fn with_setup(config: TrainingConfig, setup: Setup) -> TrainResult<Self> {
        config.validate()?;
        let geometry = config.geometry()?;

        let equalizer = ButterflyFir::new(
            setup.backend.clone(),
            setup.pol,
            config.m_est,
            config.sps,
            config.flex_step,
        );
        let channel_est = Parameter::new(setup.h_est);
        let optimizer = Adam::new(&[
            (equalizer.weights().value.as_slice().len(), config.lr_optim),
            (channel_est.value.as_slice().len(), config.lr_optim),
        ]);

        tracing::info!(
            backend = setup.backend.name(),
            m_max = geometry.m_max,
            n_frame = geometry.n_frame,
            batch_len = geometry.batch_len,
            num_frames = config.num_frames,
            flex_step = config.flex_step,
            "trainer ready"
        );

        Ok(Self {
            loss: ElboLoss::new(setup.backend, config.sps),
            schedule: LrSchedule::new(config.n_lrhalf),
            batch: MiniBatch::new(setup.pol, geometry.batch_samples()),
            results: ResultTable::new(setup.pol, config.num_frames),
            reports: Vec::with_capacity(config.num_frames),
            theta: config.theta,
            var: setup.var,
            shaping: setup.shaping,
            source: setup.source,
            geometry,
            equalizer,
            channel_est,
            optimizer,
            config,
        })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn geometry(&self) -> &FrameGeometry {
        &self.geometry
    }

    /// Carrier phase the next frame will be generated with
    pub fn theta(&self) -> f64 {
        self.theta
    }

    pub fn var(&self) -> &[f64] {
        &self.var
    }

    pub fn equalizer(&self) -> &ButterflyFir {
        &self.equalizer
    }

    pub fn channel_estimate(&self) -> &Parameter {
        &self.channel_est
    }

    /// Current equalizer learning rate
    pub fn learning_rate(&self) -> f64 {
        self.optimizer.lr(EQUALIZER_GROUP)
    }

    pub fn channel_learning_rate(&self) -> f64 {
        self.optimizer.lr(CHANNEL_GROUP)
    }

    pub fn frames_done(&self) -> usize {
        self.results.len()
    }

    pub fn reports(&self) -> &[FrameReport] {
        &self.reports
    }

    /// Train on all remaining frames
    pub fn run(mut self) -> TrainResult<TrainingOutcome> {
        while self.frames_done() < self.config.num_frames {
            self.run_frame()?;
        }

        Ok(TrainingOutcome {
            ser_valid: self.results.ser_valid(),
            var_est: self.results.var_est(),
            var: self.var,
            reports: self.reports,
        })
    }

    /// Train on the next frame and score it
    pub fn run_frame(&mut self) -> TrainResult<FrameReport> {
        let frame = self.frames_done();

        if let Some(lr) = self.schedule.apply(frame, &mut self.optimizer) {
            tracing::debug!(frame, lr, "equalizer learning rate halved");
        }

        let data = self.source.next_frame(self.geometry.n_frame, self.theta)?;
        self.theta += self.config.theta_diff;

        let pol = self.var.len();
        let expected = [pol, 2, self.geometry.frame_samples()];
        if data.rx.shape() != expected {
            return Err(TrainError::shape("frame samples", &expected, data.rx.shape()));
        }

        let n_frame = self.geometry.n_frame;
        let mut out_train = Array3::<f64>::zeros((pol, 2 * self.shaping.num_lev(), n_frame));
        let mut out_const = Array3::<f64>::zeros((pol, 2, n_frame));
        let mut var_sum = vec![0.0; pol];
        let mut last_loss = f64::NAN;

        for m in 0..self.geometry.m_max {
            let step = self.train_minibatch(&data.rx, m, &mut out_train, &mut out_const)?;
            for (acc, v) in var_sum.iter_mut().zip(&step.var_est) {
                *acc += v;
            }
            last_loss = step.loss;
        }

        let var_frame: Vec<f64> = var_sum.iter().map(|v| v / self.geometry.m_max as f64).collect();
        let var_mean = var_frame.iter().sum::<f64>() / pol as f64;
        let snr_est = self.shaping.pow_mean() / var_mean;
        self.var = var_frame;

        let soft = resolve_and_score(
            &SoftDemapper { shaping: &self.shaping },
            &out_train,
            &data.symbols,
            &self.geometry,
        )?;
        let hard = resolve_and_score(
            &HardConstellation {
                shaping: &self.shaping,
                var: &self.var,
            },
            &out_const,
            &data.symbols,
            &self.geometry,
        )?;

        let ser = ser_column(&hard, &soft);
        self.results.push(frame, ser, &self.var)?;

        let report = FrameReport {
            frame,
            loss: last_loss,
            shift: hard.alignment.shift.clone(),
            r: hard.alignment.r,
            snr_est,
            ser,
            lr: self.optimizer.lr(EQUALIZER_GROUP),
        };

        tracing::info!(
            frame,
            loss = report.loss,
            shift = ?report.shift,
            r = report.r,
            snr_db = lin_to_db(snr_est),
            theta = wrap_phase(self.theta),
            ser_x = ser[0],
            ser_y = ser[1],
            ser_soft_x = ser[2],
            ser_soft_y = ser[3],
            "frame trained"
        );

        self.reports.push(report.clone());
        Ok(report)
    }

    /// One mini-batch: fill, forward, loss, backward, Adam step
    ///
    /// Both outputs are copied into the frame accumulators at symbol offset
    /// `m·batch_len`. A non-finite loss aborts before any weight changes.
    pub fn train_minibatch(
        &mut self,
        rx: &Array3<f64>,
        m: usize,
        out_train: &mut Array3<f64>,
        out_const: &mut Array3<f64>,
    ) -> TrainResult<MinibatchStep> {
        self.batch.fill(rx, self.geometry.sample_window(m))?;
        self.equalizer.zero_grad();
        self.channel_est.zero_grad();

        let output = self.equalizer.forward(self.batch.streams(), &self.var, &self.shaping)?;

        let symbols = self.geometry.symbol_window(m);
        out_train
            .slice_mut(s![.., .., symbols.clone()])
            .assign(&output.soft);
        out_const.slice_mut(s![.., .., symbols]).assign(&output.hard);

        let forward = self.loss.forward(
            &output.soft,
            self.batch.streams(),
            &self.channel_est.value,
            &self.shaping,
        )?;
        if !forward.loss.is_finite() || forward.var_est.iter().any(|v| !v.is_finite()) {
            return Err(TrainError::NonFinite {
                what: "loss",
                frame: self.frames_done(),
                minibatch: m,
            });
        }

        let grad_soft = self.loss.backward(
            &forward,
            &output.soft,
            &self.channel_est.value,
            &self.shaping,
            &mut self.channel_est.grad,
        )?;
        self.equalizer.backward(&output, &grad_soft, &self.shaping)?;

        self.optimizer
            .step(&mut [self.equalizer.weights_mut(), &mut self.channel_est])?;

        tracing::trace!(m, loss = forward.loss, var_est = ?forward.var_est, "mini-batch step");

        Ok(MinibatchStep {
            loss: forward.loss,
            var_est: forward.var_est,
        })
    }
}

/// Rows 0-1 from the hard path, rows 2-3 from the soft path
fn ser_column(hard: &PathScore, soft: &PathScore) -> [f64; SER_ROWS] {
    let at = |score: &PathScore, p: usize| score.ser.get(p).copied().unwrap_or(f64::NAN);
    [at(hard, 0), at(hard, 1), at(soft, 0), at(soft, 1)]
}
