//! In-memory datasets ("buffers").

use std::collections::BTreeMap;

use ndarray::Array1;

use crate::error::{Result, SavukaError};
use crate::utils::interp;

/// Which column an elementwise transform applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// Positionally aligned x/y samples plus named scalar metadata
/// (concentration, temperature, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    x: Array1<f64>,
    y: Array1<f64>,
    pub metadata: BTreeMap<String, f64>,
    pub label: Option<String>,
}

impl Dataset {
    /// Create a dataset. `x` and `y` must have equal length.
    pub fn new(x: Array1<f64>, y: Array1<f64>) -> Result<Self> {
        if x.len() != y.len() {
            return Err(SavukaError::DimensionMismatch(format!(
                "dataset has {} x-values but {} y-values",
                x.len(),
                y.len()
            )));
        }
        Ok(Self {
            x,
            y,
            metadata: BTreeMap::new(),
            label: None,
        })
    }

    pub fn from_pairs(pairs: &[(f64, f64)]) -> Self {
        Self {
            x: pairs.iter().map(|p| p.0).collect(),
            y: pairs.iter().map(|p| p.1).collect(),
            metadata: BTreeMap::new(),
            label: None,
        }
    }

    pub fn with_metadata(mut self, key: &str, value: f64) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn x(&self) -> &Array1<f64> {
        &self.x
    }

    pub fn y(&self) -> &Array1<f64> {
        &self.y
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    fn column_mut(&mut self, axis: Axis) -> &mut Array1<f64> {
        match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
        }
    }

    /// Add `amount` to every value on `axis`.
    pub fn shift(&mut self, axis: Axis, amount: f64) {
        self.column_mut(axis).mapv_inplace(|v| v + amount);
    }

    /// Multiply every value on `axis` by `factor`.
    pub fn scale(&mut self, axis: Axis, factor: f64) {
        self.column_mut(axis).mapv_inplace(|v| v * factor);
    }

    /// Raise every value on `axis` to `exponent`.
    pub fn pow(&mut self, axis: Axis, exponent: f64) {
        self.column_mut(axis).mapv_inplace(|v| v.powf(exponent));
    }

    /// This dataset's y-values linearly interpolated at `x`.
    pub fn resampled_onto(&self, x: &Array1<f64>) -> Result<Array1<f64>> {
        interp(x, &self.x, &self.y)
    }

    /// Same shape: equal length and identical x-values.
    pub fn shares_axis_with(&self, other: &Dataset) -> bool {
        self.x == other.x
    }

    /// Elementwise `self.y += other.y`, with `other` interpolated onto this x-axis.
    pub fn add_from(&mut self, other: &Dataset) -> Result<()> {
        let other_y = self.aligned(other)?;
        self.y += &other_y;
        Ok(())
    }

    /// Elementwise `self.y *= other.y`, with `other` interpolated onto this x-axis.
    pub fn multiply_from(&mut self, other: &Dataset) -> Result<()> {
        let other_y = self.aligned(other)?;
        self.y *= &other_y;
        Ok(())
    }

    fn aligned(&self, other: &Dataset) -> Result<Array1<f64>> {
        if self.shares_axis_with(other) {
            Ok(other.y.clone())
        } else {
            other.resampled_onto(&self.x)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_new_validates_lengths() {
        assert!(Dataset::new(array![1.0, 2.0], array![1.0]).is_err());
        let ds = Dataset::new(array![1.0, 2.0], array![3.0, 4.0]).unwrap();
        assert_eq!(ds.len(), 2);
        assert!(!ds.is_empty());
    }

    #[test]
    fn test_elementwise_transforms() {
        let mut ds = Dataset::from_pairs(&[(1.0, 2.0), (2.0, 3.0)]);
        ds.shift(Axis::X, 1.0);
        ds.scale(Axis::Y, 2.0);
        assert_eq!(ds.x().to_vec(), vec![2.0, 3.0]);
        assert_eq!(ds.y().to_vec(), vec![4.0, 6.0]);
        ds.pow(Axis::Y, 0.5);
        assert_relative_eq!(ds.y()[0], 2.0);
    }

    #[test]
    fn test_add_interpolates_other_buffer() {
        let mut a = Dataset::from_pairs(&[(0.0, 1.0), (1.0, 1.0), (2.0, 1.0)]);
        let b = Dataset::from_pairs(&[(0.0, 0.0), (2.0, 4.0)]);
        a.add_from(&b).unwrap();
        assert_eq!(a.y().to_vec(), vec![1.0, 3.0, 5.0]);

        a.multiply_from(&Dataset::from_pairs(&[(0.0, 2.0), (1.0, 2.0), (2.0, 2.0)]))
            .unwrap();
        assert_eq!(a.y().to_vec(), vec![2.0, 6.0, 10.0]);
    }

    #[test]
    fn test_metadata() {
        let ds = Dataset::from_pairs(&[(0.0, 0.0)])
            .with_metadata("temperature", 298.15)
            .with_label("urea_0M");
        assert_eq!(ds.metadata["temperature"], 298.15);
        assert_eq!(ds.label.as_deref(), Some("urea_0M"));
    }
}
