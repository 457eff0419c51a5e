//! Benchmarks the candidate-scoring hot path (§4.C8) at slate sizes on either side
//! of the rayon parallel-scoring threshold.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dispatch_core::config::DispatchConfig;
use dispatch_core::dispatch::score_candidate;
use dispatch_core::models::{Driver, DriverStatus};
use rayon::prelude::*;
use uuid::Uuid;

fn driver(i: usize) -> Driver {
    Driver {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        status: DriverStatus::Online,
        service_type: if i % 2 == 0 { "economy".into() } else { "premium".into() },
        plate_number: format!("BENCH-{i}"),
        credit_balance: 10,
        credit_expires_at: None,
        base_fare: 2.0,
        per_km_rate: 1.0,
        city: "city".into(),
        province: "province".into(),
        stripe_account_id: None,
        rating: 3.0 + (i % 3) as f64,
        acceptance_rate: 0.5,
        last_accepted_at: None,
        suspended_until: None,
    }
}

fn bench_scoring(c: &mut Criterion) {
    let config = DispatchConfig::default();
    let mut group = c.benchmark_group("candidate_scoring");

    for &size in &[16usize, 64, 256, 1000] {
        let drivers: Vec<Driver> = (0..size).map(driver).collect();

        group.bench_with_input(BenchmarkId::new("sequential", size), &size, |b, _| {
            b.iter(|| {
                let scored: Vec<_> = drivers
                    .iter()
                    .map(|d| score_candidate(d, 3.5, Some("economy"), &config))
                    .collect();
                black_box(scored);
            });
        });

        group.bench_with_input(BenchmarkId::new("rayon", size), &size, |b, _| {
            b.iter(|| {
                let scored: Vec<_> = drivers
                    .par_iter()
                    .map(|d| score_candidate(d, 3.5, Some("economy"), &config))
                    .collect();
                black_box(scored);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_scoring);
criterion_main!(benches);
