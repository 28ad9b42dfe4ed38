//! Piecewise-linear interpolation onto a new x-axis.

use ndarray::Array1;

use crate::error::{Result, SavukaError};

/// Interpolate the samples `(xp, fp)` at every point of `x`.
///
/// Samples are sorted by `xp` first, so unsorted buffers are accepted. Points
/// left of the first sample take the first value and points right of the last
/// sample take the last value; nothing is extrapolated.
///
/// ```
/// use ndarray::array;
/// use savuka::utils::interp;
///
/// let y = interp(&array![0.5, 3.0, -1.0], &array![2.0, 0.0, 1.0], &array![20.0, 0.0, 10.0]).unwrap();
/// assert_eq!(y.to_vec(), vec![5.0, 20.0, 0.0]);
/// ```
pub fn interp(x: &Array1<f64>, xp: &Array1<f64>, fp: &Array1<f64>) -> Result<Array1<f64>> {
    if xp.len() != fp.len() {
        return Err(SavukaError::DimensionMismatch(format!(
            "interpolation samples have {} x-values but {} y-values",
            xp.len(),
            fp.len()
        )));
    }
    if xp.is_empty() {
        return Err(SavukaError::InvalidInput(
            "cannot interpolate from an empty buffer".to_string(),
        ));
    }
    if xp.iter().any(|v| v.is_nan()) {
        return Err(SavukaError::InvalidInput(
            "interpolation x-values contain NaN".to_string(),
        ));
    }

    let mut samples: Vec<(f64, f64)> = xp.iter().copied().zip(fp.iter().copied()).collect();
    samples.sort_by(|a, b| a.0.total_cmp(&b.0));

    Ok(x.mapv(|xi| interp_point(&samples, xi)))
}

fn interp_point(samples: &[(f64, f64)], xi: f64) -> f64 {
    let (first_x, first_y) = samples[0];
    let (last_x, last_y) = samples[samples.len() - 1];
    if xi.is_nan() {
        return f64::NAN;
    }
    if xi <= first_x {
        return first_y;
    }
    if xi >= last_x {
        return last_y;
    }

    // first index whose x exceeds xi; 1..len because of the range checks above
    let hi = samples.partition_point(|&(sx, _)| sx <= xi);
    let (x0, y0) = samples[hi - 1];
    let (x1, y1) = samples[hi];
    if x1 == x0 {
        return y1;
    }
    y0 + (xi - x0) * (y1 - y0) / (x1 - x0)
}
