//! Small numeric helpers for trainer logging

pub mod math;
