//! Error types for path_optimizer

use thiserror::Error;

use crate::common::types::State;
use crate::optimizer::solver::SolverStatus;

/// Main error type for the path optimization pipeline
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Reference input or smoothed reference is empty
    #[error("Empty reference input")]
    EmptyInput,

    /// Vehicle heading differs too much from the reference heading
    #[error("Initial heading error of {:.1} deg is too large", .0.to_degrees())]
    Misaligned(f64),

    /// Reference smoothing could not produce a usable curve
    #[error("Reference smoothing failed: {0}")]
    SmoothingFailed(String),

    /// QP solver did not return a solution
    #[error("QP solve failed: {0:?}")]
    QpFailed(SolverStatus),

    /// Output was truncated by a collision before reaching a usable length
    #[error("Output path truncated by collision at {length:.2} m")]
    PathTooShort { length: f64, path: Vec<State> },

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Numerical computation failed (interpolation, factorization, etc.)
    #[error("Numerical error: {0}")]
    NumericalError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config error: {0}")]
    ConfigError(#[from] toml::de::Error),
}

/// Result type alias for path optimization
pub type OptimizerResult<T> = Result<T, OptimizerError>;
