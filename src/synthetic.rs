//! Synthetic datasets for tests, benchmarks and demonstrations.

use ndarray::Array1;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::dataset::Dataset;
use crate::error::{Result, SavukaError};
use crate::models::Model;
use crate::parameters::ParameterError;

/// Evaluate `model` at `x` and add Gaussian noise of standard deviation
/// `noise_sigma`.
///
/// Parameters take the model defaults except those named in `overrides`.
/// A `noise_sigma` of zero yields the exact curve.
///
/// ```
/// use ndarray::Array1;
/// use rand::SeedableRng;
/// use savuka::models::ModelRegistry;
/// use savuka::synthetic::synthesize;
///
/// let model = ModelRegistry::with_builtins().resolve("linear").unwrap();
/// let x = Array1::linspace(0.0, 1.0, 3);
/// let mut rng = rand::rngs::StdRng::seed_from_u64(7);
/// let data = synthesize(&model, &[("slope", 2.0)], &x, 0.0, &mut rng).unwrap();
/// assert_eq!(data.y().to_vec(), vec![0.0, 1.0, 2.0]);
/// ```
pub fn synthesize<R: Rng + ?Sized>(
    model: &Model,
    overrides: &[(&str, f64)],
    x: &Array1<f64>,
    noise_sigma: f64,
    rng: &mut R,
) -> Result<Dataset> {
    let mut values: Vec<f64> = model.defaults().iter().map(|(_, v)| *v).collect();
    for (name, value) in overrides {
        let index = model
            .parameter_names()
            .iter()
            .position(|p| p == name)
            .ok_or_else(|| ParameterError::ParameterNotFound {
                name: name.to_string(),
            })?;
        values[index] = *value;
    }

    let mut y = model.eval(x, &values)?;
    if noise_sigma > 0.0 {
        let normal = Normal::new(0.0, noise_sigma)
            .map_err(|e| SavukaError::InvalidInput(format!("noise distribution: {e}")))?;
        y.mapv_inplace(|v| v + normal.sample(rng));
    } else if noise_sigma != 0.0 {
        return Err(SavukaError::InvalidInput(format!(
            "noise_sigma must be a non-negative number, got {noise_sigma}"
        )));
    }

    Dataset::new(x.clone(), y)
}
