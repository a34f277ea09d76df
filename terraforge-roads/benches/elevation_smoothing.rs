use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use terraforge_roads::smooth::{box_filter, butterworth_zero_phase, enforce_max_slope};

fn noisy_profile(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| (i as f32 * 0.05).sin() * 8.0 + ((i * 7919) % 13) as f32 * 0.3)
        .collect()
}

fn bench_filters(c: &mut Criterion) {
    let profile = noisy_profile(10_000);

    c.bench_function("butterworth_order4_10k", |b| {
        b.iter(|| {
            let mut data = profile.clone();
            butterworth_zero_phase(black_box(&mut data), 4, 21);
            data
        })
    });

    c.bench_function("box_filter_10k", |b| {
        b.iter(|| {
            let mut data = profile.clone();
            box_filter(black_box(&mut data), 21);
            data
        })
    });

    c.bench_function("slope_clamp_10k", |b| {
        let distances: Vec<f32> = (0..10_000).map(|i| i as f32 * 4.0).collect();
        b.iter(|| {
            let mut data = profile.clone();
            enforce_max_slope(black_box(&mut data), &distances, 7.0);
            data
        })
    });
}

criterion_group!(benches, bench_filters);
criterion_main!(benches);
