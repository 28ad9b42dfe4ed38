//! Benchmarks for global and independent fits over several buffers.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array1;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use savuka::synthetic::synthesize;
use savuka::{Dataset, FitConfig, FitDriver, FitMode, ModelRegistry, ParameterSet};

fn gaussian_buffers(count: usize, points: usize) -> Vec<Dataset> {
    let model = ModelRegistry::with_builtins().resolve("gaussian_1d").unwrap();
    let x = Array1::linspace(0.0, 10.0, points);
    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    (0..count)
        .map(|i| {
            let amp = 10.0 + i as f64;
            synthesize(&model, &[("amp", amp), ("cen", 5.0), ("wid", 1.0)], &x, 0.05, &mut rng)
                .unwrap()
        })
        .collect()
}

fn starting_params(count: usize) -> ParameterSet {
    let model = ModelRegistry::with_builtins().resolve("gaussian_1d").unwrap();
    let mut params = ParameterSet::create_default(&model, count);
    for buffer in 0..count {
        for (name, value) in [("amp", 8.0), ("cen", 4.7), ("wid", 1.2)] {
            params
                .get_mut(&savuka::QualifiedName::new(name, buffer))
                .unwrap()
                .set_value(value)
                .unwrap();
        }
    }
    params
}

fn bench_global(c: &mut Criterion) {
    let model = ModelRegistry::with_builtins().resolve("gaussian_1d").unwrap();
    let driver = FitDriver::new().with_config(FitConfig::default().with_uncertainties(false));
    let mut group = c.benchmark_group("global_fit");

    for count in [1, 4, 16] {
        let buffers = gaussian_buffers(count, 201);
        let mut params = starting_params(count);
        params.share("cen").unwrap();
        params.share("wid").unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(count), &buffers, |b, buffers| {
            b.iter(|| {
                driver
                    .fit(black_box(buffers), model.clone(), Some(&params), FitMode::Global)
                    .unwrap()
            })
        });
    }
    group.finish();
}

fn bench_independent(c: &mut Criterion) {
    let model = ModelRegistry::with_builtins().resolve("gaussian_1d").unwrap();
    let mut group = c.benchmark_group("independent_fit");

    for parallel in [false, true] {
        let driver = FitDriver::new().with_config(FitConfig::default().with_parallel(parallel));
        let buffers = gaussian_buffers(16, 201);
        let params = starting_params(16);
        let label = if parallel { "parallel" } else { "sequential" };
        group.bench_function(label, |b| {
            b.iter(|| {
                driver
                    .fit(black_box(&buffers), model.clone(), Some(&params), FitMode::Independent)
                    .unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_global, bench_independent);
criterion_main!(benches);
