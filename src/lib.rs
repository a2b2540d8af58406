//! Numerical core of a Continuation/GMRES (C/GMRES) nonlinear MPC
//! engine with multiple shooting.
//!
//! The core solves, once per sampling instant, the first-order
//! optimality conditions of a finite-horizon optimal control problem
//! and returns a feedback control input. It never owns the OCP
//! description, the forward-simulation driver, or any I/O — see
//! [`ocp::OcpModel`] for the one interface it consumes, and
//! [`solver::Solver`] for the entry point.
//!
//! Single-threaded, hard real-time oriented: once armed, `update()`
//! never suspends and its internal scratch state (Krylov basis,
//! residual trajectories, perturbation buffers) is sized once at
//! construction and reused every call — the only allocation left on
//! that path is the `Vec<f64>` handed back to the caller in
//! [`ControlOutput`] (see `solver` and `continuation`).

pub mod continuation;
pub mod error;
pub mod fb;
pub mod gmres;
pub mod horizon;
pub mod init;
pub mod ocp;
pub mod residual;
pub mod solver;
pub mod types;

#[cfg(test)]
pub(crate) mod fixtures;

pub use continuation::ControlOutput;
pub use error::{ConvergenceWarning, McpError, McpResult};
pub use horizon::HorizonConfig;
pub use ocp::OcpModel;
pub use solver::Solver;
pub use types::{Decision, Dims, SolverOptions};
