//! Channel emulator error types

use thiserror::Error;

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors raised while building or running the channel emulator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChannelError {
    /// A parameter is outside its valid range
    #[error("invalid channel parameter `{name}`: {reason}")]
    InvalidParam { name: &'static str, reason: String },

    /// A frame of zero symbols was requested
    #[error("frame length must be at least one symbol")]
    EmptyFrame,

    /// Generated samples contain NaN or Inf
    #[error("channel produced non-finite samples (theta = {theta})")]
    NonFinite { theta: f64 },
}

impl ChannelError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        ChannelError::InvalidParam {
            name,
            reason: reason.into(),
        }
    }
}
