//! Integration tests for the error-landscape analyzer.

mod common;

use approx::assert_relative_eq;
use savuka::fit::error_landscape;
use savuka::{
    FitDriver, FitMode, FitState, LandscapeConfig, ModelRegistry, ParameterSet, QualifiedName,
    SavukaError,
};

fn fitted_gaussian() -> (FitDriver, savuka::FitResult) {
    let data = common::noisy_gaussian(10.0, 5.0, 1.0, 0.05, 17);
    let model = ModelRegistry::with_builtins().resolve("gaussian_1d").unwrap();
    let mut params = ParameterSet::create_default(&model, 1);
    for (name, value) in [("amp", 8.0), ("cen", 4.8), ("wid", 1.1)] {
        params
            .get_mut(&QualifiedName::new(name, 0))
            .unwrap()
            .set_value(value)
            .unwrap();
    }
    let driver = FitDriver::new();
    let result = driver
        .fit(&[data], model, Some(&params), FitMode::Global)
        .unwrap()
        .remove(0);
    assert!(result.success(), "{}", result.message);
    (driver, result)
}

#[test]
fn test_profile_is_minimal_at_fitted_value() {
    let (driver, result) = fitted_gaussian();
    let before = result.params.to_json().unwrap();

    let landscape =
        error_landscape(&driver, &result, "amp", &LandscapeConfig::new(5, 0.05)).unwrap();

    assert_eq!(landscape.parameter, "amp");
    assert_eq!(landscape.len(), 5);
    for i in 0..5 {
        assert_eq!(landscape.offsets[i], -landscape.offsets[4 - i]);
    }
    assert_eq!(landscape.offsets[2], 0.0);
    assert_relative_eq!(landscape.chi_square[2], result.chisqr, max_relative = 1e-4);
    assert!(landscape.chi_square[0] > landscape.chi_square[2]);
    assert!(landscape.chi_square[4] > landscape.chi_square[2]);
    assert_eq!(landscape.best_offset(), Some(0.0));
    assert!(landscape.states.iter().all(|s| *s == FitState::Converged));

    // the analyzed result is left untouched
    assert_eq!(result.params.to_json().unwrap(), before);
}

#[test]
fn test_invalid_requests_fail_before_refitting() {
    let (driver, result) = fitted_gaussian();
    assert!(matches!(
        error_landscape(&driver, &result, "amp", &LandscapeConfig::new(0, 0.1)),
        Err(SavukaError::InvalidInput(_))
    ));
    assert!(matches!(
        error_landscape(&driver, &result, "height", &LandscapeConfig::default()),
        Err(SavukaError::Parameter(_))
    ));
}

#[test]
fn test_cancelled_landscape() {
    let (driver, result) = fitted_gaussian();
    driver.cancel_token().cancel();
    assert!(matches!(
        error_landscape(&driver, &result, "wid", &LandscapeConfig::default()),
        Err(SavukaError::Cancelled)
    ));
}

fn fitted_lines(params: Option<&ParameterSet>) -> (FitDriver, savuka::FitResult) {
    let data = [
        common::noisy_line(2.0, 1.0, 41, 0.1, 21),
        common::noisy_line(2.5, -1.0, 41, 0.1, 22),
    ];
    let model = ModelRegistry::with_builtins().resolve("linear").unwrap();
    let driver = FitDriver::new();
    let result = driver
        .fit(&data, model, params, FitMode::Global)
        .unwrap()
        .remove(0);
    assert!(result.success(), "{}", result.message);
    (driver, result)
}

fn value(result: &savuka::FitResult, name: &str) -> f64 {
    result.params.get_by_name(name).unwrap().value()
}

#[test]
fn test_every_buffer_record_is_fixed() {
    let (driver, result) = fitted_lines(None);
    let slopes = [value(&result, "slope_0"), value(&result, "slope_1")];

    let landscape =
        error_landscape(&driver, &result, "slope", &LandscapeConfig::new(5, 0.1)).unwrap();
    assert_relative_eq!(landscape.chi_square[2], result.chisqr, max_relative = 1e-6);
    for i in 0..2 {
        assert_relative_eq!(
            landscape.chi_square[i],
            landscape.chi_square[4 - i],
            max_relative = 1e-6
        );
        assert!(landscape.chi_square[i] > landscape.chi_square[i + 1]);
    }

    // each sample is the refit with both slopes scaled by the same offset
    for (offset, chisqr) in landscape.offsets.iter().zip(&landscape.chi_square) {
        let mut params = result.params.deep_copy();
        for (buffer, slope) in slopes.iter().enumerate() {
            params
                .fix(&QualifiedName::new("slope", buffer), slope * (1.0 + offset))
                .unwrap();
        }
        let refit = driver.refit(&result, &params).unwrap();
        assert_relative_eq!(refit.chisqr, *chisqr, max_relative = 1e-12);
        assert_eq!(refit.nvarys, 2);
    }
}

#[test]
fn test_linked_records_follow_the_fixed_one() {
    let model = ModelRegistry::with_builtins().resolve("linear").unwrap();
    let mut shared = ParameterSet::create_default(&model, 2);
    shared.share("slope").unwrap();
    let (driver, result) = fitted_lines(Some(&shared));
    let slope = value(&result, "slope_0");

    let config = LandscapeConfig::new(3, 0.1);
    let landscape = error_landscape(&driver, &result, "slope", &config).unwrap();
    assert_eq!(landscape.len(), 3);

    for (offset, chisqr) in landscape.offsets.iter().zip(&landscape.chi_square) {
        let mut params = result.params.deep_copy();
        params
            .fix(&QualifiedName::new("slope", 0), slope * (1.0 + offset))
            .unwrap();
        let refit = driver.refit(&result, &params).unwrap();
        assert_relative_eq!(refit.chisqr, *chisqr, max_relative = 1e-12);
        assert_relative_eq!(
            refit.params.effective_value(&QualifiedName::new("slope", 1)).unwrap(),
            slope * (1.0 + offset)
        );
    }
}

#[test]
fn test_fully_linked_parameter_rejected() {
    let model = ModelRegistry::with_builtins().resolve("linear").unwrap();
    let mut params = ParameterSet::create_default(&model, 2);
    params.link_names("slope_0", "intercept_0").unwrap();
    params.link_names("slope_1", "intercept_1").unwrap();
    let (driver, result) = fitted_lines(Some(&params));

    assert!(matches!(
        error_landscape(&driver, &result, "slope", &LandscapeConfig::default()),
        Err(SavukaError::InvalidInput(_))
    ));
    assert!(error_landscape(&driver, &result, "intercept", &LandscapeConfig::new(3, 0.1)).is_ok());
}
