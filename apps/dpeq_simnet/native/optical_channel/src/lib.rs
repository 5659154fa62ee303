//! Optical channel emulator for DPEQ SimNet
//!
//! Emulates a dual-polarization coherent optical link carrying
//! probabilistically shaped square QAM: RRC pulse shaping, optional ISI,
//! chromatic dispersion, first-order PMD, I/Q phase error, carrier phase and
//! AWGN.
//!
//! The parameter types derive the Rustler codecs so they cross the BEAM
//! boundary unchanged; the NIF entry points themselves are registered by the
//! `vae_equalizer` library, which links this crate.

pub mod channel;
pub mod error;
pub mod noise;
pub mod pulse;
pub mod shaping;

pub use channel::{ChannelKind, ChannelParams, DualPolChannel, Frame, POL};
pub use error::{ChannelError, ChannelResult};
pub use shaping::{Modulation, ShapingModel};
