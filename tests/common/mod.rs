//! Shared helpers for the integration tests.

#![allow(dead_code)]

use ndarray::Array1;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use savuka::synthetic::synthesize;
use savuka::{Dataset, ModelRegistry};

pub fn rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Noisy straight line `slope * x + intercept` on `points` samples of `[0, 10]`.
pub fn noisy_line(slope: f64, intercept: f64, points: usize, sigma: f64, seed: u64) -> Dataset {
    let model = ModelRegistry::with_builtins().resolve("linear").unwrap();
    let x = Array1::linspace(0.0, 10.0, points);
    synthesize(
        &model,
        &[("slope", slope), ("intercept", intercept)],
        &x,
        sigma,
        &mut rng(seed),
    )
    .unwrap()
}

/// Noisy Gaussian peak on 101 samples of `[0, 10]`.
pub fn noisy_gaussian(amp: f64, cen: f64, wid: f64, sigma: f64, seed: u64) -> Dataset {
    let model = ModelRegistry::with_builtins().resolve("gaussian_1d").unwrap();
    let x = Array1::linspace(0.0, 10.0, 101);
    synthesize(
        &model,
        &[("amp", amp), ("cen", cen), ("wid", wid)],
        &x,
        sigma,
        &mut rng(seed),
    )
    .unwrap()
}
