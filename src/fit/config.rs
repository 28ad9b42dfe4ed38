//! Fit driver configuration.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SavukaError};
use crate::minimizer::MinimizerOptions;
use crate::residual::ResamplePolicy;

/// How the buffers of one fit request share parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    /// One minimization over every buffer; records may be linked across buffers.
    #[default]
    Global,
    /// One minimization per buffer, no sharing.
    Independent,
}

impl FromStr for FitMode {
    type Err = SavukaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" | "g" => Ok(FitMode::Global),
            "independent" | "i" => Ok(FitMode::Independent),
            other => Err(SavukaError::InvalidInput(format!(
                "unknown fit mode '{other}'; expected global or independent"
            ))),
        }
    }
}

impl fmt::Display for FitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitMode::Global => write!(f, "global"),
            FitMode::Independent => write!(f, "independent"),
        }
    }
}

/// Settings applied to every fit a [`FitDriver`](super::FitDriver) runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Options handed to the minimizer
    pub minimizer: MinimizerOptions,

    /// Handling of buffers whose length differs from the first buffer's. Default: Resample
    pub resample: ResamplePolicy,

    /// Run independent fits on the rayon pool when the `parallel` feature is on. Default: true
    pub parallel: bool,

    /// Estimate covariance and standard errors after each fit. Default: true
    pub compute_uncertainties: bool,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            minimizer: MinimizerOptions::default(),
            resample: ResamplePolicy::default(),
            parallel: true,
            compute_uncertainties: true,
        }
    }
}

impl FitConfig {
    pub fn with_minimizer(mut self, minimizer: MinimizerOptions) -> Self {
        self.minimizer = minimizer;
        self
    }

    pub fn with_resample(mut self, resample: ResamplePolicy) -> Self {
        self.resample = resample;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_uncertainties(mut self, compute: bool) -> Self {
        self.compute_uncertainties = compute;
        self
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: FitConfig = serde_json::from_str(json)?;
        config.minimizer.validate()?;
        Ok(config)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: FitConfig = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        config.minimizer.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minimizer::NanPolicy;

    #[test]
    fn test_fit_mode_parsing() {
        assert_eq!("Global".parse::<FitMode>().unwrap(), FitMode::Global);
        assert_eq!("independent".parse::<FitMode>().unwrap(), FitMode::Independent);
        assert!("joint".parse::<FitMode>().is_err());
        assert_eq!(FitMode::Independent.to_string(), "independent");
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = FitConfig::default()
            .with_resample(ResamplePolicy::Reject)
            .with_parallel(false)
            .with_minimizer(MinimizerOptions::default().with_nan_policy(NanPolicy::Propagate));
        let json = config.to_json().unwrap();
        let back = FitConfig::from_json(&json).unwrap();
        assert_eq!(back.resample, ResamplePolicy::Reject);
        assert!(!back.parallel);
        assert_eq!(back.minimizer.nan_policy, NanPolicy::Propagate);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = FitConfig::from_json(r#"{"minimizer": {"max_evaluations": 50}}"#).unwrap();
        assert_eq!(config.minimizer.max_evaluations, 50);
        assert_eq!(config.resample, ResamplePolicy::Resample);
        assert!(config.compute_uncertainties);

        assert!(FitConfig::from_json(r#"{"minimizer": {"ftol": -1.0}}"#).is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let path = std::env::temp_dir().join(format!("savuka-fit-config-{}.json", std::process::id()));
        FitConfig::default().with_uncertainties(false).save_json(&path).unwrap();
        let loaded = FitConfig::load_json(&path).unwrap();
        assert!(!loaded.compute_uncertainties);
        std::fs::remove_file(&path).unwrap();
    }
}
