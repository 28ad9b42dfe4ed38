//! Fitting: the driver, its configuration, results, history and the
//! error-landscape analyzer.

pub mod cancel;
pub mod config;
pub mod driver;
pub mod history;
pub mod landscape;
pub mod result;

pub use cancel::CancellationToken;
pub use config::{FitConfig, FitMode};
pub use driver::FitDriver;
pub use history::FitHistory;
pub use landscape::{analyze as error_landscape, ErrorLandscape, LandscapeConfig};
pub use result::{FitResult, FitState, PlotSeries};
