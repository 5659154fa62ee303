//! Power and phase helpers

use std::f64::consts::PI;

/// Power ratio to dB
#[inline]
pub fn lin_to_db(linear: f64) -> f64 {
    10.0 * linear.log10()
}

/// Wrap a phase to [-π, π)
#[inline]
pub fn wrap_phase(angle: f64) -> f64 {
    (angle + PI).rem_euclid(2.0 * PI) - PI
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_db() {
        assert!((lin_to_db(100.0) - 20.0).abs() < 1e-10);
        assert!((lin_to_db(0.5) + 3.0103).abs() < 1e-4);
    }

    #[test]
    fn test_wrap_phase() {
        assert!((wrap_phase(0.0)).abs() < 1e-12);
        assert!((wrap_phase(2.0 * PI + 0.1) - 0.1).abs() < 1e-12);
        assert!((wrap_phase(-PI - 0.1) - (PI - 0.1)).abs() < 1e-12);
        assert!((wrap_phase(PI) + PI).abs() < 1e-12);
    }
}
