//! Equalizer forward pass benchmarks

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use num_complex::Complex64;
use optical_channel::{Modulation, ShapingModel};
use vae_equalizer::*;

fn streams(num_samples: usize) -> Vec<Vec<Complex64>> {
    (0..2)
        .map(|p| {
            (0..num_samples)
                .map(|t| Complex64::from_polar(1.0, 0.1 * (t + p) as f64))
                .collect()
        })
        .collect()
}

fn benchmark_butterfly_equalize(c: &mut Criterion) {
    let eq = ButterflyFir::new(Arc::new(CpuBackend), 2, 41, 2, false);
    let input = streams(400);

    c.bench_function("butterfly_41_taps_200_symbols", |b| {
        b.iter(|| black_box(eq.equalize(&input)))
    });
}

fn benchmark_qam64_forward(c: &mut Criterion) {
    let eq = ButterflyFir::new(Arc::new(CpuBackend), 2, 41, 2, false);
    let shaping = ShapingModel::new(Modulation::Qam64, 0.0270955).unwrap();
    let input = streams(400);
    let var = [0.01, 0.01];

    c.bench_function("qam64_forward_200_symbols", |b| {
        b.iter(|| black_box(eq.forward(&input, &var, &shaping)))
    });
}

criterion_group!(benches, benchmark_butterfly_equalize, benchmark_qam64_forward);
criterion_main!(benches);
