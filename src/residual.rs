//! Residual engine.
//!
//! Builds per-buffer model curves from a [`ParameterSet`] and flattens
//! `observed - predicted` across every buffer of a fit into the single vector
//! the minimizer works on. Residuals are plain differences: no weighting and
//! no normalisation.

use std::ops::Range;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::{Result, SavukaError};
use crate::models::Model;
use crate::parameters::ParameterSet;

/// What to do when a jointly fitted buffer's length differs from the first
/// (canonical) buffer's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResamplePolicy {
    /// Interpolate onto the canonical x-axis, log a warning and record the
    /// buffer in [`FitData::resampled`].
    #[default]
    Resample,
    /// Refuse with [`SavukaError::DimensionMismatch`].
    Reject,
}

/// Observed data of one fit, aligned on a single canonical x-axis.
#[derive(Debug, Clone, PartialEq)]
pub struct FitData {
    x: Array1<f64>,
    ys: Vec<Array1<f64>>,
    sources: Vec<usize>,
    resampled: Vec<usize>,
}

impl FitData {
    /// Align `datasets` on the first dataset's x-axis.
    ///
    /// Position `i` in the fit corresponds to `datasets[i]`; its session
    /// buffer index defaults to `i` and can be overridden with
    /// [`with_sources`](Self::with_sources).
    pub fn from_datasets(datasets: &[Dataset], policy: ResamplePolicy) -> Result<Self> {
        let Some(canonical) = datasets.first() else {
            return Err(SavukaError::InvalidInput(
                "a fit needs at least one buffer".to_string(),
            ));
        };
        if let Some(position) = datasets.iter().position(Dataset::is_empty) {
            return Err(SavukaError::InvalidInput(format!(
                "buffer at fit position {position} holds no data"
            )));
        }

        let x = canonical.x().clone();
        let mut ys = Vec::with_capacity(datasets.len());
        let mut resampled = Vec::new();

        for (position, dataset) in datasets.iter().enumerate() {
            if dataset.len() == x.len() {
                ys.push(dataset.y().clone());
                continue;
            }
            match policy {
                ResamplePolicy::Reject => {
                    return Err(SavukaError::DimensionMismatch(format!(
                        "buffer at fit position {position} has {} points, the canonical x-axis has {}",
                        dataset.len(),
                        x.len()
                    )));
                }
                ResamplePolicy::Resample => {
                    log::warn!(
                        "buffer at fit position {} has {} points instead of {}; \
                         interpolating its y-values onto the first buffer's x-axis",
                        position,
                        dataset.len(),
                        x.len()
                    );
                    ys.push(dataset.resampled_onto(&x)?);
                    resampled.push(position);
                }
            }
        }

        Ok(Self {
            x,
            ys,
            sources: (0..datasets.len()).collect(),
            resampled,
        })
    }

    /// Record which session buffer each fit position came from.
    pub fn with_sources(mut self, sources: Vec<usize>) -> Result<Self> {
        if sources.len() != self.ys.len() {
            return Err(SavukaError::DimensionMismatch(format!(
                "{} source indices for {} buffers",
                sources.len(),
                self.ys.len()
            )));
        }
        self.sources = sources;
        Ok(self)
    }

    /// Canonical x-axis shared by every buffer.
    pub fn x(&self) -> &Array1<f64> {
        &self.x
    }

    /// Observed y-values of fit position `buffer`.
    pub fn y(&self, buffer: usize) -> Option<&Array1<f64>> {
        self.ys.get(buffer)
    }

    pub fn buffer_count(&self) -> usize {
        self.ys.len()
    }

    /// Session buffer index of each fit position.
    pub fn sources(&self) -> &[usize] {
        &self.sources
    }

    /// Fit positions whose y-values were interpolated.
    pub fn resampled(&self) -> &[usize] {
        &self.resampled
    }

    /// Total number of residuals.
    pub fn ndata(&self) -> usize {
        self.x.len() * self.ys.len()
    }

    /// Slice of the flattened residual vector belonging to `buffer`.
    pub fn segment(&self, buffer: usize) -> Range<usize> {
        let n = self.x.len();
        buffer * n..(buffer + 1) * n
    }

    /// Single-buffer view of fit position `buffer`, for independent fits.
    pub fn single(&self, buffer: usize) -> Option<FitData> {
        let y = self.ys.get(buffer)?.clone();
        Some(FitData {
            x: self.x.clone(),
            ys: vec![y],
            sources: vec![self.sources[buffer]],
            resampled: if self.resampled.contains(&buffer) {
                vec![0]
            } else {
                Vec::new()
            },
        })
    }
}

/// Model curve for one buffer.
///
/// Selects the records keyed exactly `(name, buffer)` for every model
/// parameter, resolving links, and evaluates the model at `x`.
pub fn generate_curve(
    params: &ParameterSet,
    buffer: usize,
    x: &Array1<f64>,
    model: &Model,
) -> Result<Array1<f64>> {
    let values = params.values_for_buffer(model.parameter_names(), buffer)?;
    model.eval(x, &values)
}

/// Flattened `observed - predicted` over every buffer, in buffer order.
pub fn residuals(params: &ParameterSet, data: &FitData, model: &Model) -> Result<Array1<f64>> {
    let mut out = Vec::with_capacity(data.ndata());
    for (buffer, observed) in data.ys.iter().enumerate() {
        let predicted = generate_curve(params, buffer, &data.x, model)?;
        out.extend(observed.iter().zip(predicted.iter()).map(|(o, p)| o - p));
    }
    Ok(Array1::from(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelRegistry;
    use crate::parameters::QualifiedName;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn line() -> std::sync::Arc<Model> {
        ModelRegistry::with_builtins().resolve("linear").unwrap()
    }

    #[test]
    fn test_generate_curve_uses_exact_buffer() {
        let model = line();
        let mut params = ParameterSet::new();
        for buffer in [1, 10] {
            params.add_param("intercept", buffer, 0.0).unwrap();
            params.add_param("slope", buffer, buffer as f64).unwrap();
        }
        let x = array![1.0, 2.0];
        assert_eq!(generate_curve(&params, 1, &x, &model).unwrap().to_vec(), vec![1.0, 2.0]);
        assert_eq!(generate_curve(&params, 10, &x, &model).unwrap().to_vec(), vec![10.0, 20.0]);
        assert!(generate_curve(&params, 0, &x, &model).is_err());
    }

    #[test]
    fn test_residuals_flatten_in_buffer_order() {
        let model = line();
        let mut params = ParameterSet::create_default(&model, 2);
        params
            .get_mut(&QualifiedName::new("intercept", 1))
            .unwrap()
            .set_value(1.0)
            .unwrap();
        let datasets = vec![
            Dataset::from_pairs(&[(0.0, 0.0), (1.0, 2.0)]),
            Dataset::from_pairs(&[(0.0, 5.0), (1.0, 5.0)]),
        ];
        let data = FitData::from_datasets(&datasets, ResamplePolicy::Resample).unwrap();
        let r = residuals(&params, &data, &model).unwrap();
        // buffer 0: y - x, buffer 1: y - (x + 1)
        assert_eq!(r.to_vec(), vec![0.0, 1.0, 4.0, 3.0]);
        assert_eq!(data.segment(1), 2..4);
        assert_eq!(data.ndata(), 4);
    }

    #[test]
    fn test_linked_records_drive_curves() {
        let model = line();
        let mut params = ParameterSet::create_default(&model, 2);
        params
            .get_mut(&QualifiedName::new("slope", 0))
            .unwrap()
            .set_value(3.0)
            .unwrap();
        params.link_names("slope_1", "slope_0").unwrap();
        let y = generate_curve(&params, 1, &array![2.0], &model).unwrap();
        assert_relative_eq!(y[0], 6.0);
    }

    #[test]
    fn test_length_mismatch_resamples() {
        let first = Dataset::new(Array1::linspace(0.0, 10.0, 101), Array1::linspace(0.0, 10.0, 101)).unwrap();
        let x2 = Array1::linspace(0.0, 10.0, 51);
        let second = Dataset::new(x2.clone(), x2.mapv(|v| 2.0 * v)).unwrap();
        let datasets = vec![first, second];

        let data = FitData::from_datasets(&datasets, ResamplePolicy::Resample).unwrap();
        assert_eq!(data.resampled(), &[1]);
        assert_eq!(data.y(1).unwrap().len(), 101);
        assert_relative_eq!(data.y(1).unwrap()[37], 7.4, epsilon = 1e-12);

        assert!(matches!(
            FitData::from_datasets(&datasets, ResamplePolicy::Reject),
            Err(SavukaError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(FitData::from_datasets(&[], ResamplePolicy::Resample).is_err());
        let empty = Dataset::from_pairs(&[]);
        assert!(FitData::from_datasets(&[empty], ResamplePolicy::Resample).is_err());
    }

    #[test]
    fn test_single_view_keeps_source() {
        let datasets = vec![
            Dataset::from_pairs(&[(0.0, 1.0), (1.0, 2.0)]),
            Dataset::from_pairs(&[(0.0, 3.0)]),
        ];
        let data = FitData::from_datasets(&datasets, ResamplePolicy::Resample)
            .unwrap()
            .with_sources(vec![4, 7])
            .unwrap();
        let single = data.single(1).unwrap();
        assert_eq!(single.sources(), &[7]);
        assert_eq!(single.resampled(), &[0]);
        assert_eq!(single.buffer_count(), 1);
        assert!(data.single(2).is_none());
    }
}
