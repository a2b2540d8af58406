//! Error kinds for the C/GMRES core.
//!
//! Every fallible entry point returns `Result<T, _>` instead of
//! panicking. Configuration and usage errors are meant to be caught at
//! construction/arming time; a `Numerical` error returned from
//! `update()` poisons the solver (see `solver::Solver`).

use thiserror::Error;

/// Errors produced by the MPC core.
#[derive(Debug, Error)]
pub enum McpError {
    /// Invalid dimensions, horizon, or Krylov configuration caught at
    /// construction time.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A public operation was called out of order against the solver's
    /// state machine (e.g. `update()` before arming).
    #[error("usage error: {0}")]
    Usage(String),

    /// NaN/Inf encountered in a residual, Jacobian-vector product, or
    /// Krylov basis vector. The solver that raised this is poisoned
    /// until explicitly re-armed.
    #[error("numerical failure: {0}")]
    Numerical(String),

    /// The OCP evaluator wrote an output of the wrong length, or its
    /// declared dimensions disagree with the solver's. Detected once,
    /// at construction/arming time.
    #[error("OCP contract violation: {0}")]
    Contract(String),
}

/// Non-fatal information returned alongside a successful result.
///
/// A slow initializer is a warning, not an error: closed-loop control
/// must not stop because one sample converged poorly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceWarning {
    pub opterr: f64,
    pub iterations: usize,
}

pub type McpResult<T> = Result<T, McpError>;
