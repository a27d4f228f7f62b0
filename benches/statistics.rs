//! Statistics engine benchmarks
//!
//! Friedman, pairwise Wilcoxon, Shapiro-Wilk and the REML learning-curve fit
//! at study sizes (tens of participants) and a few larger ones.
//!
//! Toyota Way: Genchi Genbutsu (measure, don't guess)
//!
//! Run with: cargo bench --bench statistics

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use trial_analysis::config::PairwiseMode;
use trial_analysis::stats::{fit_learning_curve, friedman, pairwise_tests, shapiro_wilk};
use trial_analysis::trial::{Condition, Measure, TrialRecord, TrialTable};

const SIZES: [usize; 3] = [10, 40, 200];

fn study(participants: usize) -> TrialTable {
    let mut rng = StdRng::seed_from_u64(0xbe7c);
    let mut records = Vec::with_capacity(participants * 3);
    for p in 0..participants {
        let pid = format!("{:02}", p + 1);
        for c in 0..3u8 {
            let trial = u8::try_from((p + usize::from(c)) % 3 + 1).unwrap_or(1);
            records.push(
                TrialRecord::new(
                    pid.clone(),
                    Condition::new(c),
                    rng.gen_range(100.0..200.0),
                    rng.gen_range(500.0..1500.0),
                )
                .with_trial_index(trial),
            );
        }
    }
    TrialTable::new(records)
}

fn bench_friedman(c: &mut Criterion) {
    let mut group = c.benchmark_group("friedman");
    for n in SIZES {
        let wide = study(n).wide(Measure::Time, &Condition::ALL);
        group.bench_with_input(BenchmarkId::from_parameter(n), &wide, |b, wide| {
            b.iter(|| friedman(black_box(wide), "time"));
        });
    }
    group.finish();
}

fn bench_pairwise(c: &mut Criterion) {
    let mut group = c.benchmark_group("pairwise_wilcoxon_holm");
    for n in SIZES {
        let wide = study(n).wide(Measure::Error, &Condition::ALL);
        group.bench_with_input(BenchmarkId::from_parameter(n), &wide, |b, wide| {
            b.iter(|| pairwise_tests(black_box(wide), "error", PairwiseMode::NonParametric));
        });
    }
    group.finish();
}

fn bench_shapiro(c: &mut Criterion) {
    let mut group = c.benchmark_group("shapiro_wilk");
    let mut rng = StdRng::seed_from_u64(7);
    for n in [30, 300, 3000] {
        let values: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &values, |b, values| {
            b.iter(|| shapiro_wilk(black_box(values)));
        });
    }
    group.finish();
}

fn bench_learning_curve(c: &mut Criterion) {
    let mut group = c.benchmark_group("learning_curve_reml");
    group.sample_size(10);
    for n in [10, 40] {
        let table = study(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &table, |b, table| {
            b.iter(|| fit_learning_curve(black_box(table), Measure::Time, &Condition::ALL, 0.05));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_friedman,
    bench_pairwise,
    bench_shapiro,
    bench_learning_curve
);
criterion_main!(benches);
