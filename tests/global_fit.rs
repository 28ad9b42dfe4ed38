//! Integration tests for global (shared-parameter) fits.

mod common;

use approx::assert_relative_eq;
use ndarray::Array1;
use savuka::synthetic::synthesize;
use savuka::{FitDriver, FitMode, ModelRegistry, ParameterSet, QualifiedName, SavukaError};

#[test]
fn test_linear_recovery_with_noise() {
    let sigma = 0.1;
    let data = common::noisy_line(2.0, 1.0, 201, sigma, 11);
    let model = ModelRegistry::with_builtins().resolve("linear").unwrap();

    let result = FitDriver::new()
        .fit(&[data], model, None, FitMode::Global)
        .unwrap()
        .remove(0);

    assert!(result.success(), "{}", result.message);
    let slope = result.params.get_by_name("slope_0").unwrap();
    let intercept = result.params.get_by_name("intercept_0").unwrap();
    assert!((slope.value() - 2.0).abs() < 0.05);
    assert!((intercept.value() - 1.0).abs() < 0.05);

    // reduced chi-square estimates the noise variance
    let ratio = result.redchi / (sigma * sigma);
    assert!((0.6..1.4).contains(&ratio), "redchi / sigma^2 = {ratio}");

    let slope_err = slope.stderr.unwrap();
    assert!(slope_err > 0.0 && slope_err < 0.01);
    assert!((slope.value() - 2.0).abs() < 5.0 * slope_err);
}

#[test]
fn test_fully_linked_fit_matches_single_buffer_fit() {
    let data = common::noisy_line(-1.5, 4.0, 51, 0.2, 3);
    let model = ModelRegistry::with_builtins().resolve("linear").unwrap();
    let driver = FitDriver::new();

    let single = driver
        .fit(&[data.clone()], model.clone(), None, FitMode::Global)
        .unwrap()
        .remove(0);

    let mut params = ParameterSet::create_default(&model, 2);
    params.share("slope").unwrap();
    params.share("intercept").unwrap();
    let joint = driver
        .fit(&[data.clone(), data], model, Some(&params), FitMode::Global)
        .unwrap()
        .remove(0);

    assert_eq!(joint.nvarys, 2);
    assert_eq!(joint.ndata, 2 * single.ndata);
    for name in ["slope", "intercept"] {
        let a = single.params.get(&QualifiedName::new(name, 0)).unwrap().value();
        let b = joint.params.get(&QualifiedName::new(name, 0)).unwrap().value();
        let c = joint.params.get(&QualifiedName::new(name, 1)).unwrap().value();
        assert_relative_eq!(a, b, epsilon = 1e-6);
        assert_eq!(b, c);
    }
    assert_relative_eq!(joint.chisqr, 2.0 * single.chisqr, max_relative = 1e-6);
}

#[test]
fn test_shared_slope_with_separate_intercepts() {
    let a = common::noisy_line(0.75, 2.0, 101, 0.05, 21);
    let b = common::noisy_line(0.75, -6.0, 101, 0.05, 22);
    let model = ModelRegistry::with_builtins().resolve("linear").unwrap();
    let mut params = ParameterSet::create_default(&model, 2);
    params.link_names("slope_1", "slope_0").unwrap();

    let result = FitDriver::new()
        .fit(&[a, b], model, Some(&params), FitMode::Global)
        .unwrap()
        .remove(0);

    assert_eq!(result.nvarys, 3);
    assert!((result.params.get_by_name("slope_1").unwrap().value() - 0.75).abs() < 0.01);
    assert!((result.params.get_by_name("intercept_0").unwrap().value() - 2.0).abs() < 0.05);
    assert!((result.params.get_by_name("intercept_1").unwrap().value() + 6.0).abs() < 0.05);
    assert_eq!(result.residuals_for(1).unwrap().len(), 101);
    assert!(result.residuals_for(2).is_err());
}

#[test]
fn test_global_denaturation_shares_free_energy() {
    let model = ModelRegistry::with_builtins()
        .resolve("two_state")
        .unwrap();
    let x = Array1::linspace(0.0, 6.0, 61);
    let truth = [
        ("deltag", 5.0),
        ("m", -1.8),
        ("nativeyint", 0.0),
        ("unfoldedyint", 1.0),
        ("nativeyslope", 0.0),
        ("unfoldedyslope", 0.0),
        ("temperature", 298.15),
    ];
    let mut rng = common::rng(5);
    let first = synthesize(&model, &truth, &x, 0.0, &mut rng).unwrap();
    let mut second_truth = truth;
    second_truth[3] = ("unfoldedyint", 2.0);
    let second = synthesize(&model, &second_truth, &x, 0.0, &mut rng).unwrap();

    let mut params = ParameterSet::create_default(&model, 2);
    for buffer in 0..2 {
        for (name, value) in truth.iter().skip(2) {
            params.fix(&QualifiedName::new(*name, buffer), *value).unwrap();
        }
        params
            .get_mut(&QualifiedName::new("deltag", buffer))
            .unwrap()
            .set_value(4.5)
            .unwrap();
        params
            .get_mut(&QualifiedName::new("m", buffer))
            .unwrap()
            .set_value(-1.6)
            .unwrap();
    }
    params.fix(&QualifiedName::new("unfoldedyint", 1), 2.0).unwrap();
    params.share("deltag").unwrap();
    params.share("m").unwrap();

    let result = FitDriver::new()
        .fit(&[first, second], model, Some(&params), FitMode::Global)
        .unwrap()
        .remove(0);

    assert!(result.success(), "{}", result.message);
    assert_eq!(result.nvarys, 2);
    assert_relative_eq!(result.params.get_by_name("deltag_1").unwrap().value(), 5.0, epsilon = 1e-4);
    assert_relative_eq!(result.params.get_by_name("m_1").unwrap().value(), -1.8, epsilon = 1e-4);
}

#[test]
fn test_bounds_are_respected() {
    let data = common::noisy_line(2.0, 1.0, 51, 0.05, 8);
    let model = ModelRegistry::with_builtins().resolve("linear").unwrap();
    let mut params = ParameterSet::create_default(&model, 1);
    params
        .get_mut(&QualifiedName::new("slope", 0))
        .unwrap()
        .set_bounds(0.0, 1.5)
        .unwrap();

    let result = FitDriver::new()
        .fit(&[data], model, Some(&params), FitMode::Global)
        .unwrap()
        .remove(0);
    let slope = result.params.get_by_name("slope_0").unwrap().value();
    assert!((0.0..=1.5).contains(&slope));
    assert_relative_eq!(slope, 1.5, epsilon = 1e-3);
}

#[test]
fn test_report_lists_links_and_statistics() {
    let model = ModelRegistry::with_builtins().resolve("linear").unwrap();
    let mut params = ParameterSet::create_default(&model, 2);
    params.link_names("slope_1", "slope_0").unwrap();
    params.fix(&QualifiedName::new("intercept", 1), 0.0).unwrap();
    let result = FitDriver::new()
        .fit(
            &[common::noisy_line(1.0, 0.0, 21, 0.1, 1), common::noisy_line(1.0, 0.0, 21, 0.1, 2)],
            model,
            Some(&params),
            FitMode::Global,
        )
        .unwrap()
        .remove(0);

    let report = result.report();
    assert!(report.contains("[[Fit Statistics]]"));
    assert!(report.contains("# data points      = 42"));
    assert!(report.contains("slope_1:"));
    assert!(report.contains("(linked to slope_0)"));
    assert!(report.contains("(fixed)"));
    assert!(report.contains("+/-"));
}

#[test]
fn test_failed_fit_is_a_result_not_an_error() {
    let data = common::noisy_gaussian(10.0, 5.0, 1.0, 0.05, 4);
    let model = ModelRegistry::with_builtins().resolve("gaussian").unwrap();
    let mut params = ParameterSet::create_default(&model, 1);
    params.get_mut(&QualifiedName::new("cen", 0)).unwrap().set_value(4.0).unwrap();

    let config = savuka::FitConfig::default()
        .with_minimizer(savuka::MinimizerOptions::default().with_max_evaluations(5));
    let result = FitDriver::new()
        .with_config(config)
        .fit(&[data], model, Some(&params), FitMode::Global)
        .unwrap()
        .remove(0);

    assert_eq!(result.state, savuka::FitState::Failed);
    assert!(matches!(
        result.ensure_converged(),
        Err(SavukaError::NonConvergence(_))
    ));
}
