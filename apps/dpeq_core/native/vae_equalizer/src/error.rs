//! Equalizer and training error types

use optical_channel::ChannelError;
use thiserror::Error;

/// Result type for training operations
pub type TrainResult<T> = Result<T, TrainError>;

/// Rejected configuration values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A parameter is outside its valid range
    #[error("invalid `{name}`: {reason}")]
    Invalid { name: &'static str, reason: String },

    /// N_frame_max is too short to hold a single mini-batch
    #[error("n_frame_max ({n_frame_max}) is shorter than one mini-batch ({batch_len})")]
    NoMiniBatch { n_frame_max: usize, batch_len: usize },

    /// Worst-case alignment leaves nothing to score
    #[error(
        "{m_max} mini-batch(es) of {batch_len} symbols keep {available} symbols at shift +{max_shift}, \
         not enough for a guard of {guard} per side"
    )]
    NoScoringWindow {
        batch_len: usize,
        m_max: usize,
        max_shift: isize,
        available: usize,
        guard: usize,
    },
}

impl ConfigError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            name,
            reason: reason.into(),
        }
    }
}

/// Errors that abort a training run
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrainError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Array dimensions disagree with the configured geometry
    #[error("shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Loss or variance estimate became NaN or Inf
    #[error("non-finite {what} at frame {frame}, mini-batch {minibatch}")]
    NonFinite {
        what: &'static str,
        frame: usize,
        minibatch: usize,
    },

    /// Guard bands consumed the whole scoring window
    #[error("scoring window is empty: {available} symbols left, {guard} dropped per side")]
    EmptyScoringWindow { available: usize, guard: usize },

    /// A result column was written out of frame order
    #[error("result for frame {frame} written out of order (next expected {expected})")]
    ResultOutOfOrder { frame: usize, expected: usize },
}

impl TrainError {
    pub(crate) fn shape(what: &'static str, expected: &[usize], actual: &[usize]) -> Self {
        TrainError::ShapeMismatch {
            what,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}
