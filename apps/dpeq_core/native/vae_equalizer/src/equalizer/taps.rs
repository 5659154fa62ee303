//! Butterfly tap banks
//!
//! A `TapBank` stores `pol × pol` complex FIR filters of equal length,
//! indexed (out-pol, in-pol, tap). Both the equalizer and the channel
//! estimate use this layout.

use num_complex::Complex64;

/// `pol × pol × len` complex taps, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct TapBank {
    pol: usize,
    len: usize,
    data: Vec<Complex64>,
}

impl TapBank {
    pub fn zeros(pol: usize, len: usize) -> Self {
        Self {
            pol,
            len,
            data: vec![Complex64::new(0.0, 0.0); pol * pol * len],
        }
    }

    /// Identity butterfly: unit center tap on the diagonal, zeros elsewhere
    pub fn identity(pol: usize, len: usize) -> Self {
        let mut bank = Self::zeros(pol, len);
        let center = bank.center();
        for p in 0..pol {
            bank.taps_mut(p, p)[center] = Complex64::new(1.0, 0.0);
        }
        bank
    }

    pub fn pol(&self) -> usize {
        self.pol
    }

    /// Taps per filter
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Index of the center tap, (len - 1) / 2
    pub fn center(&self) -> usize {
        self.len.saturating_sub(1) / 2
    }

    /// Filter from input pol `p_in` to output pol `p_out`
    pub fn taps(&self, p_out: usize, p_in: usize) -> &[Complex64] {
        let start = (p_out * self.pol + p_in) * self.len;
        &self.data[start..start + self.len]
    }

    pub fn taps_mut(&mut self, p_out: usize, p_in: usize) -> &mut [Complex64] {
        let start = (p_out * self.pol + p_in) * self.len;
        &mut self.data[start..start + self.len]
    }

    pub fn as_slice(&self) -> &[Complex64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [Complex64] {
        &mut self.data
    }

    pub fn fill_zero(&mut self) {
        self.data.fill(Complex64::new(0.0, 0.0));
    }

    /// Σ |w|² over all filters
    pub fn energy(&self) -> f64 {
        self.data.iter().map(|w| w.norm_sqr()).sum()
    }
}

/// Trainable tap bank with its gradient accumulator
#[derive(Debug, Clone)]
pub struct Parameter {
    pub value: TapBank,
    /// `∂L/∂Re + j·∂L/∂Im`, accumulated until `zero_grad`
    pub grad: TapBank,
}

impl Parameter {
    pub fn new(value: TapBank) -> Self {
        let grad = TapBank::zeros(value.pol(), value.len());
        Self { value, grad }
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill_zero();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_center_taps() {
        let bank = TapBank::identity(2, 5);
        assert_eq!(bank.center(), 2);

        for p_out in 0..2 {
            for p_in in 0..2 {
                for (k, w) in bank.taps(p_out, p_in).iter().enumerate() {
                    let expected = if p_out == p_in && k == 2 { 1.0 } else { 0.0 };
                    assert_eq!(*w, Complex64::new(expected, 0.0));
                }
            }
        }
        assert!((bank.energy() - 2.0).abs() < 1e-15);
    }

    #[test]
    fn test_taps_are_disjoint() {
        let mut bank = TapBank::zeros(2, 3);
        bank.taps_mut(0, 1)[0] = Complex64::new(1.0, 0.0);
        bank.taps_mut(1, 0)[2] = Complex64::new(0.0, 1.0);

        assert_eq!(bank.as_slice()[3], Complex64::new(1.0, 0.0));
        assert_eq!(bank.as_slice()[8], Complex64::new(0.0, 1.0));
        assert_eq!(bank.taps(0, 0), &[Complex64::new(0.0, 0.0); 3]);
    }

    #[test]
    fn test_zero_grad() {
        let mut param = Parameter::new(TapBank::identity(2, 3));
        param.grad.as_mut_slice()[4] = Complex64::new(2.0, -1.0);
        param.zero_grad();

        assert_eq!(param.grad.energy(), 0.0);
        assert_eq!(param.value, TapBank::identity(2, 3));
    }
}
