//! VAE Equalizer - blind dual-polarization equalization for coherent links
//!
//! A 2×2 butterfly FIR equalizer trained online by maximizing an ELBO under a
//! probabilistically shaped QAM prior. Frames come from the `optical_channel`
//! emulator (or any [`FrameSource`]), every mini-batch takes one Adam step, and
//! each frame is scored by symbol error rate after resolving the
//! polarization swap and time-shift ambiguity.
//!
//! The Elixir side drives runs through [`nif`]; everything else is plain Rust
//! and usable without the BEAM.

use rustler::{Env, Term};

pub mod ambiguity;
pub mod backend;
pub mod config;
pub mod equalizer;
pub mod error;
pub mod loss;
pub mod metrics;
pub mod nif;
pub mod optim;
pub mod plot;
pub mod setup;
pub mod trainer;
pub mod traits;
mod utils;

// Re-export core types for convenience
pub use backend::CpuBackend;
pub use config::{FrameGeometry, TrainingConfig};
pub use equalizer::{ButterflyFir, EqualizerOutput, Parameter, TapBank};
pub use error::{ConfigError, TrainError, TrainResult};
pub use loss::{ElboLoss, LossForward};
pub use optim::{Adam, LrSchedule};
pub use setup::Setup;
pub use trainer::{FrameReport, Trainer, TrainingOutcome};
pub use traits::{Backend, DecisionPath, FrameSource};

fn on_load(_env: Env, _info: Term) -> bool {
    // RUST_LOG controls verbosity; a subscriber installed by the host wins
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    true
}

rustler::init!("Elixir.DpeqCore.Equalizer.Nif", load = on_load);
