//! Seams of the training engine
//!
//! Each trait is one orthogonal axis of the trainer. `Backend` and
//! `FrameSource` are injected at set-up; `DecisionPath` selects the soft or
//! hard post-processing of a frame.

mod backend;
mod decision_path;
mod frame_source;

pub use backend::Backend;
pub use decision_path::DecisionPath;
pub use frame_source::FrameSource;
