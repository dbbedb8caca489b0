use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kolosal_autotab::prelude::*;
use kolosal_autotab::space::SearchSpace;
use ndarray::Array1;
use polars::prelude::*;
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::sync::Arc;

fn create_classification_data(n_rows: usize, n_features: usize) -> (DataFrame, Array1<f64>) {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
    let columns: Vec<Vec<f64>> = (0..n_features)
        .map(|_| (0..n_rows).map(|_| rng.gen::<f64>() * 10.0).collect())
        .collect();
    let y: Vec<f64> = (0..n_rows)
        .map(|i| {
            let sum: f64 = columns.iter().map(|c| c[i]).sum();
            if sum > 5.0 * n_features as f64 { 1.0 } else { 0.0 }
        })
        .collect();
    let series: Vec<Column> = columns
        .into_iter()
        .enumerate()
        .map(|(i, values)| Column::new(format!("feature_{}", i).into(), values))
        .collect();
    (DataFrame::new(series).unwrap(), Array1::from(y))
}

fn create_space(x: &DataFrame, restrictions: &StageRestrictions) -> SearchSpace {
    let profile = DatasetProfile::from_frame(x, TaskType::Classification);
    let candidates = StageCandidates::resolve(
        &Registries::default(),
        &profile,
        restrictions,
        &CandidatePolicy::default(),
    )
    .unwrap();
    build_space(&candidates, &default_templates(), TaskType::Classification).unwrap()
}

fn bench_codec(c: &mut Criterion) {
    let (x, _) = create_classification_data(200, 5);
    let space = create_space(&x, &StageRestrictions::default());
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
    let points: Vec<ConfigPoint> = (0..64).map(|_| space.sample(&mut rng)).collect();

    let mut group = c.benchmark_group("codec");
    group.bench_function("sample", |b| {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        b.iter(|| space.sample(black_box(&mut rng)))
    });
    group.bench_function("decode_encode", |b| {
        b.iter(|| {
            for point in &points {
                encode(&decode(black_box(point))).unwrap();
            }
        })
    });
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    group.sample_size(10);

    let restrictions = StageRestrictions::new()
        .with(Stage::Balancer, Restriction::only(["no_processing"]))
        .with(Stage::Model, Restriction::only(["LogisticRegression", "GaussianNB"]));

    for n_rows in [500, 2000].iter() {
        let (x, y) = create_classification_data(*n_rows, 8);
        let space = create_space(&x, &restrictions);
        let evaluator = TrialObjective::new(
            Arc::new(x),
            Arc::new(y),
            Arc::new(Registries::default()),
            TaskType::Classification,
        )
        .unwrap();

        group.bench_with_input(BenchmarkId::new("trials_8", n_rows), &space, |b, space| {
            b.iter(|| {
                let config = SearchConfig::new()
                    .with_num_trials(8)
                    .with_plateau(None)
                    .with_checkpoint(false);
                SearchController::new(config)
                    .unwrap()
                    .run(black_box(space), &evaluator)
                    .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_codec, bench_search);
criterion_main!(benches);
