use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use harvest_automl::preprocessing::{FeatureSet, OutlierConfig, OutlierFilter, PivotedRecord};
use harvest_automl::training::{ModelKind, Regressor, TrainEngine, TrainedModel, TrainingConfig};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn create_features(n_rows: usize) -> FeatureSet {
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    let x = Array2::from_shape_fn((n_rows, 2), |(_, c)| match c {
        0 => rng.gen_range(100.0..10_000.0),
        _ => rng.gen_range(10_000.0..80_000.0),
    });
    let y: Array1<f64> = x
        .rows()
        .into_iter()
        .map(|row| row[0] * row[1] / 10_000.0 * (1.0 + 0.05 * (rng.gen::<f64>() - 0.5)))
        .collect();

    FeatureSet { x, y }
}

fn create_records(n_rows: usize) -> Vec<PivotedRecord> {
    let features = create_features(n_rows);
    (0..n_rows)
        .map(|i| {
            PivotedRecord::new(
                format!("Area {}", i % 50),
                1961 + (i / 50) as i64,
                "Wheat",
                features.x[[i, 0]],
                features.x[[i, 1]],
                features.y[i],
            )
        })
        .collect()
}

fn bench_roster(c: &mut Criterion) {
    let mut group = c.benchmark_group("roster");
    group.sample_size(10); // Fewer samples for training benchmarks

    for n_rows in [500, 2000].iter() {
        let features = create_features(*n_rows);

        group.bench_with_input(BenchmarkId::new("train", n_rows), &features, |b, features| {
            b.iter(|| {
                let engine = TrainEngine::new(TrainingConfig::default());
                engine.train(black_box(features)).unwrap()
            })
        });
    }

    group.finish();
}

fn bench_candidates(c: &mut Criterion) {
    let mut group = c.benchmark_group("candidate_fit");
    group.sample_size(10);

    let features = create_features(2000);
    for kind in ModelKind::ALL {
        group.bench_with_input(BenchmarkId::new("fit", kind.id()), &features, |b, features| {
            b.iter(|| {
                let mut model = TrainedModel::for_kind(kind, 42);
                model.fit(black_box(&features.x), black_box(&features.y)).unwrap();
                model
            })
        });
    }

    group.finish();
}

fn bench_outlier_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("outlier_filter");

    for n_rows in [1_000, 10_000, 100_000].iter() {
        let records = create_records(*n_rows);
        let filter = OutlierFilter::new(OutlierConfig::default());

        group.bench_with_input(BenchmarkId::new("sequential", n_rows), &records, |b, records| {
            b.iter(|| filter.filter(black_box(records)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_roster, bench_candidates, bench_outlier_filter);
criterion_main!(benches);
