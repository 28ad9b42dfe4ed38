use thiserror::Error;

use crate::parameters::parameter::ParameterError;

/// Error types for the savuka library.
#[derive(Error, Debug)]
pub enum SavukaError {
    /// A model name or alias that is not in the registry.
    #[error("Unknown model '{name}'; available models: {}", available.join(", "))]
    UnknownModel { name: String, available: Vec<String> },

    /// A model whose canonical name or alias is already registered.
    #[error("Model '{0}' is already registered")]
    DuplicateModel(String),

    /// A dataset format that no reader is registered for.
    #[error("Unknown format '{name}'; available formats: {}", available.join(", "))]
    UnknownFormat { name: String, available: Vec<String> },

    /// A minimization method name that is not recognised.
    #[error("Unknown minimization method '{name}'; available methods: {}", available.join(", "))]
    UnknownMethod { name: String, available: Vec<String> },

    /// Error indicating a mismatch in array lengths.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Result-dependent operation requested with too few fits in the history.
    #[error("No prior fit: requested result {requested} but the history holds {available}")]
    NoPriorFit { requested: usize, available: usize },

    /// Parameter set errors (links, lookups, bounds).
    #[error(transparent)]
    Parameter(#[from] ParameterError),

    /// Raised only on explicit request; a failed fit is otherwise returned as a result.
    #[error("Minimizer did not converge: {0}")]
    NonConvergence(String),

    /// The residual vector contained NaN or infinite entries under the `raise` policy.
    #[error("Residual vector contains {count} non-finite value(s)")]
    NonFiniteResidual { count: usize },

    /// Buffer index outside the session.
    #[error("Buffer {index} does not exist; the session holds {len} buffer(s)")]
    BufferNotFound { index: usize, len: usize },

    /// No buffer carries the given name.
    #[error("No buffer named '{0}'")]
    BufferNameNotFound(String),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Linear algebra error.
    #[error("Linear algebra error: {0}")]
    LinearAlgebra(String),

    /// A cancellation token was triggered between sub-fits.
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<crate::parameters::bounds::BoundsError> for SavukaError {
    fn from(err: crate::parameters::bounds::BoundsError) -> Self {
        SavukaError::Parameter(ParameterError::from(err))
    }
}

/// Result type alias for savuka operations.
pub type Result<T> = std::result::Result<T, SavukaError>;
