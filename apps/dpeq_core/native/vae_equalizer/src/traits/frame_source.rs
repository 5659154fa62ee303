//! FrameSource trait - Where training frames come from
//!
//! The trainer only asks for "the next frame of N symbols at phase theta".
//! The channel emulator is the production source; tests substitute scripted
//! ones.

use optical_channel::{ChannelError, DualPolChannel, Frame, ShapingModel};

/// Producer of receive frames with known transmitted symbols
pub trait FrameSource: Send {
    /// Shaping model the transmitted symbols are drawn from
    fn shaping(&self) -> &ShapingModel;

    /// Generate the next frame
    ///
    /// # Arguments
    /// * `num_symbols` - Symbols per polarization
    /// * `theta` - Carrier phase applied to the whole frame, in rad
    fn next_frame(&mut self, num_symbols: usize, theta: f64) -> Result<Frame, ChannelError>;
}

impl FrameSource for DualPolChannel {
    fn shaping(&self) -> &ShapingModel {
        DualPolChannel::shaping(self)
    }

    fn next_frame(&mut self, num_symbols: usize, theta: f64) -> Result<Frame, ChannelError> {
        self.generate(num_symbols, theta)
    }
}
