//! Polarization and timing ambiguity resolution
//!
//! A blind equalizer may converge with its outputs swapped between
//! polarizations and delayed by a few symbols. Before scoring, each frame is
//! aligned to the transmitted symbols:
//!
//! 1. Cross-correlate the symbol estimates with the truth over
//!    shifts -10..=10 for every polarization roll `r`
//! 2. Roll the accumulator by `r` along the polarization axis, then roll
//!    each polarization in time by `-shift[p]`
//! 3. Truncate every mini-batch block to `batch_len - shift[0] - N_CUT`
//!    symbols, since the circular roll wraps garbage into the block edges
//! 4. Drop `11 + max|shift|` symbols at both ends and score the rest

use ndarray::{s, Array3};
use num_complex::Complex64;

use crate::config::FrameGeometry;
use crate::error::{TrainError, TrainResult};
use crate::traits::DecisionPath;

/// Candidate shifts searched on each side of zero
pub const MAX_SHIFT: isize = 10;
/// Width of the shift search window in symbols
pub const SHIFT_WINDOW: usize = 2 * MAX_SHIFT as usize + 1;
/// Symbols cut from the end of every mini-batch block
pub const N_CUT: usize = 10;
/// Symbols always dropped from each end of the scoring window
pub const GUARD_BASE: usize = 11;

/// Resolved ambiguity of one accumulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alignment {
    /// Time shift per polarization, in symbols
    pub shift: Vec<isize>,
    /// Polarization roll
    pub r: usize,
}

/// SER of one decision path after alignment
#[derive(Debug, Clone, PartialEq)]
pub struct PathScore {
    pub ser: Vec<f64>,
    pub alignment: Alignment,
    /// Symbols kept per mini-batch block, shared by all pols
    pub keep: usize,
    /// Symbols dropped from each end of the trimmed stream
    pub guard: usize,
}

/// `max(|Σ e[(n+s) mod N]·conj(d[n])|, |Σ e[(n+s) mod N]·d[n]|)`
pub fn correlation(est: &[Complex64], truth: &[Complex64], shift: isize) -> f64 {
    let n = est.len().min(truth.len());
    if n == 0 {
        return 0.0;
    }

    let mut direct = Complex64::new(0.0, 0.0);
    let mut mirrored = Complex64::new(0.0, 0.0);
    for (k, d) in truth.iter().take(n).enumerate() {
        let e = est[(k as isize + shift).rem_euclid(n as isize) as usize];
        direct += e * d.conj();
        mirrored += e * d;
    }
    direct.norm().max(mirrored.norm())
}

/// Best shift in -MAX_SHIFT..=MAX_SHIFT and its score; ties keep the first
pub fn best_shift(est: &[Complex64], truth: &[Complex64]) -> (isize, f64) {
    let mut best = (-MAX_SHIFT, f64::NEG_INFINITY);
    for s in -MAX_SHIFT..=MAX_SHIFT {
        let score = correlation(est, truth, s);
        if score > best.1 {
            best = (s, score);
        }
    }
    best
}

/// Search polarization roll and per-pol shift
///
/// For roll `r` polarization `p` is compared against estimate
/// `(p - r) mod pol`, which is where `roll_pol(·, r)` moves it. The roll
/// with the largest summed score wins; ties keep the smallest `r`.
pub fn find_shift(estimates: &[Vec<Complex64>], truth: &[Vec<Complex64>]) -> Alignment {
    let pol = truth.len();
    let mut best: Option<(f64, Alignment)> = None;

    for r in 0..pol {
        let mut total = 0.0;
        let mut shift = Vec::with_capacity(pol);
        for (p, d) in truth.iter().enumerate() {
            let (s, score) = best_shift(&estimates[(p + pol - r) % pol], d);
            shift.push(s);
            total += score;
        }

        if best.as_ref().map_or(true, |(score, _)| total > *score) {
            best = Some((total, Alignment { shift, r }));
        }
    }

    best.map(|(_, a)| a).unwrap_or(Alignment { shift: Vec::new(), r: 0 })
}

/// Circular roll along the polarization axis: `out[(p + r) mod pol] = x[p]`
pub fn roll_pol(x: &Array3<f64>, r: usize) -> Array3<f64> {
    let pol = x.shape()[0];
    if pol == 0 {
        return x.clone();
    }
    let r = r % pol;
    Array3::from_shape_fn(x.raw_dim(), |(p, c, t)| x[[(p + pol - r) % pol, c, t]])
}

/// Circular time roll of one polarization by `-shift`: `out[t] = x[(t + shift) mod N]`
pub fn roll_time(x: &mut Array3<f64>, p: usize, shift: isize) {
    let n = x.shape()[2];
    if n == 0 {
        return;
    }
    let offset = shift.rem_euclid(n as isize) as usize;
    for mut row in x.slice_mut(s![p, .., ..]).rows_mut() {
        let copy = row.to_vec();
        for (t, v) in row.iter_mut().enumerate() {
            *v = copy[(t + offset) % n];
        }
    }
}

/// Apply a resolved alignment: polarization roll first, then time rolls
pub fn align(x: &Array3<f64>, alignment: &Alignment) -> Array3<f64> {
    let mut out = roll_pol(x, alignment.r);
    for (p, &s) in alignment.shift.iter().enumerate() {
        roll_time(&mut out, p, s);
    }
    out
}

/// Symbols kept per mini-batch block: `batch_len - shift0 - N_CUT`, clamped to `[0, batch_len]`
///
/// A negative length is clamped to zero rather than wrapped from the block
/// end. Validated configurations never get there: `check_scoring_window`
/// requires `batch_len > MAX_SHIFT + N_CUT`.
pub fn trim_len(batch_len: usize, shift0: isize) -> usize {
    let keep = batch_len as isize - shift0 - N_CUT as isize;
    keep.clamp(0, batch_len as isize) as usize
}

/// Symbols dropped from each end of the scoring window
pub fn score_guard(shift: &[isize]) -> usize {
    GUARD_BASE + shift.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0)
}

/// Keep the first `keep` symbols of every `batch_len` block and concatenate
pub fn trim_blocks(x: &Array3<f64>, m_max: usize, batch_len: usize, keep: usize) -> Array3<f64> {
    let (pol, channels, _) = x.dim();
    Array3::from_shape_fn((pol, channels, m_max * keep), |(p, c, i)| {
        x[[p, c, (i / keep) * batch_len + i % keep]]
    })
}

/// Truth amplitudes (pol, 2, N) as complex symbols
pub fn truth_symbols(truth: &Array3<f64>) -> Vec<Vec<Complex64>> {
    let (pol, _, n) = truth.dim();
    (0..pol)
        .map(|p| (0..n).map(|k| Complex64::new(truth[[p, 0, k]], truth[[p, 1, k]])).collect())
        .collect()
}

/// Align, trim and score one accumulator
///
/// # Arguments
/// * `path` - Decision rule of the accumulator
/// * `acc` - Accumulator (pol, path.channels(), N_frame)
/// * `truth` - Transmitted amplitudes (pol, 2, N_frame)
/// * `geometry` - Mini-batch partition of the frame
pub fn resolve_and_score<D: DecisionPath>(
    path: &D,
    acc: &Array3<f64>,
    truth: &Array3<f64>,
    geometry: &FrameGeometry,
) -> TrainResult<PathScore> {
    let pol = truth.shape()[0];
    let n_frame = geometry.n_frame;
    if acc.shape() != [pol, path.channels(), n_frame] {
        return Err(TrainError::shape(path.label(), &[pol, path.channels(), n_frame], acc.shape()));
    }
    if truth.shape() != [pol, 2, n_frame] {
        return Err(TrainError::shape("truth symbols", &[pol, 2, n_frame], truth.shape()));
    }

    let alignment = find_shift(&path.symbol_estimates(acc), &truth_symbols(truth));
    let aligned = align(acc, &alignment);

    // One truncation length for both pols, taken from pol 0
    let keep = trim_len(geometry.batch_len, alignment.shift.first().copied().unwrap_or(0));
    let acc_trim = trim_blocks(&aligned, geometry.m_max, geometry.batch_len, keep);
    let truth_trim = trim_blocks(truth, geometry.m_max, geometry.batch_len, keep);

    let guard = score_guard(&alignment.shift);
    let available = acc_trim.shape()[2];
    if available <= 2 * guard {
        return Err(TrainError::EmptyScoringWindow { available, guard });
    }

    let end = available - guard;
    let ser = path.ser(
        &acc_trim.slice(s![.., .., guard..end]).to_owned(),
        &truth_trim.slice(s![.., .., guard..end]).to_owned(),
    );

    tracing::debug!(
        path = path.label(),
        r = alignment.r,
        shift = ?alignment.shift,
        keep,
        guard,
        ?ser,
        "ambiguity resolved"
    );

    Ok(PathScore {
        ser,
        alignment,
        keep,
        guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::HardConstellation;
    use optical_channel::{Modulation, ShapingModel};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn qam16_truth(n: usize, seed: u64) -> (ShapingModel, Array3<f64>) {
        let shaping = ShapingModel::new(Modulation::Qam16, 0.0).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let levels = shaping.amp_levels().to_vec();
        let truth = Array3::from_shape_fn((2, 2, n), |_| levels[rng.gen_range(0..4)]);
        (shaping, truth)
    }

    /// Accumulator that `align` maps back onto `truth` for the given ambiguity
    fn scrambled(truth: &Array3<f64>, r: usize, shift: [isize; 2]) -> Array3<f64> {
        let n = truth.shape()[2] as isize;
        Array3::from_shape_fn(truth.raw_dim(), |(q, c, t)| {
            let p = (q + r) % 2;
            let src = (t as isize - shift[p]).rem_euclid(n) as usize;
            truth[[p, c, src]]
        })
    }

    #[test]
    fn test_window_constants() {
        assert_eq!(SHIFT_WINDOW, 21);
        assert_eq!(N_CUT, 10);
    }

    #[test]
    fn test_trim_len() {
        assert_eq!(trim_len(100, 2), 88);
        assert_eq!(trim_len(100, -3), 93);
        assert_eq!(trim_len(100, -20), 100);
        assert_eq!(trim_len(15, 8), 0);
    }

    #[test]
    fn test_score_guard() {
        assert_eq!(score_guard(&[2, -3]), 14);
        assert_eq!(score_guard(&[0, 0]), 11);
    }

    #[test]
    fn test_roll_pol_semantics() {
        let x = Array3::from_shape_fn((2, 1, 3), |(p, _, t)| (10 * p + t) as f64);
        let rolled = roll_pol(&x, 1);
        assert_eq!(rolled[[1, 0, 2]], x[[0, 0, 2]]);
        assert_eq!(rolled[[0, 0, 0]], x[[1, 0, 0]]);
        assert_eq!(roll_pol(&x, 2), x);
    }

    #[test]
    fn test_roll_time_semantics() {
        let mut x = Array3::from_shape_fn((2, 2, 5), |(p, c, t)| (100 * p + 10 * c + t) as f64);
        roll_time(&mut x, 1, 2);

        assert_eq!(x[[1, 0, 0]], 102.0);
        assert_eq!(x[[1, 1, 4]], 111.0);
        // Other polarization untouched
        assert_eq!(x[[0, 1, 3]], 13.0);

        roll_time(&mut x, 1, -2);
        assert_eq!(x[[1, 0, 0]], 100.0);
    }

    #[test]
    fn test_trim_blocks() {
        let x = Array3::from_shape_fn((1, 1, 6), |(_, _, t)| t as f64);
        let trimmed = trim_blocks(&x, 2, 3, 2);
        assert_eq!(trimmed.iter().copied().collect::<Vec<_>>(), vec![0.0, 1.0, 3.0, 4.0]);
        assert_eq!(trim_blocks(&x, 2, 3, 0).shape(), &[1, 1, 0]);
    }

    #[test]
    fn test_find_shift_recovers_swap_and_delay() {
        let (_, truth) = qam16_truth(200, 1);
        let acc = scrambled(&truth, 1, [3, -4]);

        let est = HardConstellation {
            shaping: &ShapingModel::new(Modulation::Qam16, 0.0).unwrap(),
            var: &[0.1, 0.1],
        }
        .symbol_estimates(&acc);
        let alignment = find_shift(&est, &truth_symbols(&truth));

        assert_eq!(alignment, Alignment { shift: vec![3, -4], r: 1 });
        assert_eq!(align(&acc, &alignment), truth);
    }

    #[test]
    fn test_find_shift_identity() {
        let (_, truth) = qam16_truth(120, 2);
        let d = truth_symbols(&truth);
        assert_eq!(find_shift(&d, &d), Alignment { shift: vec![0, 0], r: 0 });
    }

    #[test]
    fn test_correlation_accepts_conjugate() {
        let (_, truth) = qam16_truth(64, 3);
        let d = truth_symbols(&truth);
        let conj: Vec<Complex64> = d[0].iter().map(|x| x.conj()).collect();

        let energy: f64 = d[0].iter().map(|x| x.norm_sqr()).sum();
        assert!((correlation(&conj, &d[0], 0) - energy).abs() < 1e-9);
    }

    #[test]
    fn test_resolve_and_score_perfect_frame() {
        let (shaping, truth) = qam16_truth(100, 4);
        let geometry = FrameGeometry::new(100, 50, 2).unwrap();
        let acc = scrambled(&truth, 1, [2, -3]);

        let var = [0.05, 0.05];
        let path = HardConstellation { shaping: &shaping, var: &var };
        let score = resolve_and_score(&path, &acc, &truth, &geometry).unwrap();

        assert_eq!(score.alignment, Alignment { shift: vec![2, -3], r: 1 });
        assert_eq!(score.ser, vec![0.0, 0.0]);
        assert_eq!(score.keep, 50 - 2 - 10);
        assert_eq!(score.guard, 14);
    }

    #[test]
    fn test_trim_follows_first_pol_shift() {
        let (shaping, truth) = qam16_truth(300, 7);
        let geometry = FrameGeometry::new(300, 100, 2).unwrap();
        let var = [0.05, 0.05];
        let path = HardConstellation { shaping: &shaping, var: &var };

        for shift in [[-4, 6], [6, -4], [0, 9]] {
            let acc = scrambled(&truth, 0, shift);
            let score = resolve_and_score(&path, &acc, &truth, &geometry).unwrap();

            assert_eq!(score.alignment.shift, shift.to_vec());
            assert_eq!(score.keep, trim_len(100, shift[0]), "shift={shift:?}");
            assert_ne!(score.keep, trim_len(100, shift[1]));
            assert_eq!(score.guard, score_guard(&shift));
        }
    }

    #[test]
    fn test_resolve_and_score_empty_window() {
        let (shaping, truth) = qam16_truth(30, 5);
        let geometry = FrameGeometry::new(30, 30, 2).unwrap();

        let var = [0.05, 0.05];
        let path = HardConstellation { shaping: &shaping, var: &var };
        assert_eq!(
            resolve_and_score(&path, &truth, &truth, &geometry).unwrap_err(),
            TrainError::EmptyScoringWindow { available: 20, guard: 11 }
        );
    }

    #[test]
    fn test_resolve_and_score_shape_check() {
        let (shaping, truth) = qam16_truth(100, 6);
        let geometry = FrameGeometry::new(100, 50, 2).unwrap();
        let var = [0.05, 0.05];
        let path = HardConstellation { shaping: &shaping, var: &var };

        let wrong = Array3::<f64>::zeros((2, 3, 100));
        assert!(matches!(
            resolve_and_score(&path, &wrong, &truth, &geometry),
            Err(TrainError::ShapeMismatch { .. })
        ));
    }
}
