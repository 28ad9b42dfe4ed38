//! A fitting session: loaded buffers, registries, the fit driver and the
//! history of completed fits.

use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use crate::dataset::{Axis, Dataset};
use crate::error::{Result, SavukaError};
use crate::fit::{
    error_landscape, CancellationToken, ErrorLandscape, FitDriver, FitHistory, FitMode,
    FitResult, LandscapeConfig, PlotSeries,
};
use crate::formats::FormatRegistry;
use crate::models::ModelRegistry;
use crate::parameters::ParameterSet;

/// Owns everything a fitting workflow touches.
///
/// Buffers are addressed by index in load order. Fits append to the history;
/// result-dependent operations take `nth`, counting back from the most
/// recent fit (`0` is the latest).
#[derive(Debug, Default)]
pub struct Session {
    buffers: Vec<Dataset>,
    names: BTreeMap<String, Vec<usize>>,
    registry: ModelRegistry,
    formats: FormatRegistry,
    driver: FitDriver,
    history: FitHistory,
}

impl Session {
    /// Session with the built-in models and the default driver.
    pub fn new() -> Self {
        Self {
            registry: ModelRegistry::with_builtins(),
            ..Self::default()
        }
    }

    pub fn with_driver(mut self, driver: FitDriver) -> Self {
        self.driver = driver;
        self
    }

    pub fn with_formats(mut self, formats: FormatRegistry) -> Self {
        self.formats = formats;
        self
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ModelRegistry {
        &mut self.registry
    }

    pub fn formats_mut(&mut self) -> &mut FormatRegistry {
        &mut self.formats
    }

    pub fn driver(&self) -> &FitDriver {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut FitDriver {
        &mut self.driver
    }

    pub fn history(&self) -> &FitHistory {
        &self.history
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.driver.cancel_token()
    }

    /// Read `path` with the reader registered for `format` and append the
    /// buffers it yields. Returns their indices.
    pub fn read<P: AsRef<Path>>(&mut self, path: P, format: &str) -> Result<Range<usize>> {
        let path = path.as_ref();
        let datasets = self.formats.read(path, format)?;
        let start = self.buffers.len();
        self.buffers.extend(datasets);
        log::info!(
            "read {} buffer(s) from {} as {}",
            self.buffers.len() - start,
            path.display(),
            format
        );
        Ok(start..self.buffers.len())
    }

    /// Append a buffer and return its index.
    pub fn add_buffer(&mut self, dataset: Dataset) -> usize {
        self.buffers.push(dataset);
        self.buffers.len() - 1
    }

    pub fn buffer(&self, index: usize) -> Result<&Dataset> {
        let len = self.buffers.len();
        self.buffers
            .get(index)
            .ok_or(SavukaError::BufferNotFound { index, len })
    }

    pub fn buffer_mut(&mut self, index: usize) -> Result<&mut Dataset> {
        let len = self.buffers.len();
        self.buffers
            .get_mut(index)
            .ok_or(SavukaError::BufferNotFound { index, len })
    }

    pub fn buffers(&self) -> &[Dataset] {
        &self.buffers
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    fn check_indices(&self, indices: &[usize]) -> Result<()> {
        match indices.iter().find(|&&i| i >= self.buffers.len()) {
            Some(&index) => Err(SavukaError::BufferNotFound {
                index,
                len: self.buffers.len(),
            }),
            None => Ok(()),
        }
    }

    /// Give `name` to the buffers at `indices`, replacing any earlier use of the name.
    pub fn set_name(&mut self, name: &str, indices: &[usize]) -> Result<()> {
        self.check_indices(indices)?;
        self.names.insert(name.to_string(), indices.to_vec());
        Ok(())
    }

    /// Buffer indices carrying `name`.
    pub fn buffers_named(&self, name: &str) -> Result<&[usize]> {
        self.names
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| SavukaError::BufferNameNotFound(name.to_string()))
    }

    /// Names given to buffers, with their indices.
    pub fn names(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.names.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    fn transform(&mut self, indices: &[usize], f: impl Fn(&mut Dataset)) -> Result<()> {
        self.check_indices(indices)?;
        for &i in indices {
            f(&mut self.buffers[i]);
        }
        Ok(())
    }

    pub fn shift(&mut self, indices: &[usize], axis: Axis, amount: f64) -> Result<()> {
        self.transform(indices, |ds| ds.shift(axis, amount))
    }

    pub fn scale(&mut self, indices: &[usize], axis: Axis, factor: f64) -> Result<()> {
        self.transform(indices, |ds| ds.scale(axis, factor))
    }

    pub fn pow(&mut self, indices: &[usize], axis: Axis, exponent: f64) -> Result<()> {
        self.transform(indices, |ds| ds.pow(axis, exponent))
    }

    /// `y[dst] += y[src]`, interpolating `src` onto `dst`'s x-axis when they differ.
    pub fn add_buffers(&mut self, src: usize, dst: usize) -> Result<()> {
        let other = self.buffer(src)?.clone();
        self.buffer_mut(dst)?.add_from(&other)
    }

    /// `y[dst] *= y[src]`, interpolating `src` onto `dst`'s x-axis when they differ.
    pub fn multiply_buffers(&mut self, src: usize, dst: usize) -> Result<()> {
        let other = self.buffer(src)?.clone();
        self.buffer_mut(dst)?.multiply_from(&other)
    }

    /// Default parameter set of `model` for `buffer_count` buffers, to edit
    /// (bounds, links, fixed values) before a fit.
    pub fn default_parameters(&self, model: &str, buffer_count: usize) -> Result<ParameterSet> {
        let model = self.registry.resolve(model)?;
        Ok(ParameterSet::create_default(&model, buffer_count))
    }

    /// Fit `model` to the buffers at `indices` and append the results to the
    /// history.
    ///
    /// Parameter buffer indices refer to positions in `indices`, not to
    /// session buffer numbers. The model name is resolved before anything
    /// else, so an unknown model never reaches the minimizer.
    pub fn fit(
        &mut self,
        indices: &[usize],
        model: &str,
        mode: FitMode,
        params: Option<&ParameterSet>,
    ) -> Result<Vec<Arc<FitResult>>> {
        let model = self.registry.resolve(model)?;
        if indices.is_empty() {
            return Err(SavukaError::InvalidInput(
                "a fit needs at least one buffer".to_string(),
            ));
        }
        self.check_indices(indices)?;

        let datasets: Vec<Dataset> = indices.iter().map(|&i| self.buffers[i].clone()).collect();
        let results = self
            .driver
            .fit_sources(&datasets, indices, Arc::clone(&model), params, mode)?;
        let results: Vec<Arc<FitResult>> = results
            .into_iter()
            .map(|result| self.history.push(result))
            .collect();
        log::info!(
            "{} fit of '{}' on buffers {:?}: {} result(s), history holds {}",
            mode,
            model.name(),
            indices,
            results.len(),
            self.history.len()
        );
        Ok(results)
    }

    /// Fit the buffers carrying `name`.
    pub fn fit_named(
        &mut self,
        name: &str,
        model: &str,
        mode: FitMode,
        params: Option<&ParameterSet>,
    ) -> Result<Vec<Arc<FitResult>>> {
        let indices = self.buffers_named(name)?.to_vec();
        self.fit(&indices, model, mode, params)
    }

    /// The `nth` most recent result.
    pub fn result(&self, nth: usize) -> Result<Arc<FitResult>> {
        self.history.nth_recent(nth)
    }

    /// Re-run the `nth` most recent fit from its starting parameters and
    /// append the new result.
    pub fn replay(&mut self, nth: usize) -> Result<Arc<FitResult>> {
        let previous = self.history.nth_recent(nth)?;
        let result = self.driver.replay(&previous)?;
        Ok(self.history.push(result))
    }

    /// Error landscape of `parameter` around the `nth` most recent fit.
    pub fn error_landscape(
        &self,
        parameter: &str,
        config: &LandscapeConfig,
        nth: usize,
    ) -> Result<ErrorLandscape> {
        let result = self.history.nth_recent(nth)?;
        error_landscape(&self.driver, &result, parameter, config)
    }

    /// Plot series of every buffer in the `nth` most recent fit.
    pub fn plot_series(&self, nth: usize) -> Result<Vec<PlotSeries>> {
        self.history.nth_recent(nth)?.plot_all()
    }

    /// Text report of the `nth` most recent fit.
    pub fn report(&self, nth: usize) -> Result<String> {
        Ok(self.history.nth_recent(nth)?.report())
    }
}
