//! Error types for batch setup and the linear solver backends.
//!
//! Numerical trouble inside a single scenario solve (non-convergence, singular
//! reduced Jacobian) is *not* an error: it is recorded in
//! [`SolveStatus`](crate::basic::pf::SolveStatus) so a batch never stops on it.
//! Only problems detected before the scenario loop starts surface as
//! [`ConfigError`].

use thiserror::Error;

/// Fatal configuration problems. Raised before any scenario is processed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The network has no buses left after island filtering.
    #[error("network has no buses to solve")]
    EmptyNetwork,

    /// A branch or profile column references a bus that does not exist.
    #[error("bus index {bus} out of range (network has {n_bus} buses)")]
    BusOutOfRange { bus: usize, n_bus: usize },

    /// Unknown solver-type selector.
    #[error("unsupported solver type '{0}'")]
    UnsupportedSolver(String),

    /// Bus kinds the selected solver cannot represent.
    #[error("island {island}: {reason}")]
    IncompatibleIsland { island: usize, reason: String },

    /// Scenario data does not match the network dimensions.
    #[error("scenario dimension mismatch: expected {expected} buses, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Malformed configuration document.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// Malformed profile data.
    #[error("invalid profile: {0}")]
    Profile(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Invalid(err.to_string())
    }
}

impl From<csv::Error> for ConfigError {
    fn from(err: csv::Error) -> Self {
        ConfigError::Profile(err.to_string())
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

/// Failures reported by a [`Solve`](crate::basic::solver::Solve) backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinearSolveError {
    #[error("symbolic analysis failed: {0}")]
    Symbolic(&'static str),

    #[error("LU factorization failed: {0}")]
    Factorization(&'static str),

    /// The factorization went through but produced NaN/inf.
    #[error("linear solve produced a non-finite solution")]
    NonFinite,
}
