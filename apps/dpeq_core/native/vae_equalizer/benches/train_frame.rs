//! Training loop benchmarks

use criterion::{criterion_group, criterion_main, Criterion};
use vae_equalizer::*;

fn benchmark_short_run_frame(c: &mut Criterion) {
    let config = TrainingConfig::short_run();
    let mut trainer = Trainer::new(config.clone()).unwrap();

    c.bench_function("short_run_one_frame", |b| {
        b.iter(|| {
            if trainer.frames_done() == config.num_frames {
                trainer = Trainer::new(config.clone()).unwrap();
            }
            trainer.run_frame().unwrap()
        })
    });
}

criterion_group!(benches, benchmark_short_run_frame);
criterion_main!(benches);
