//! Shared data model: dimensions, solver configuration, and the
//! decision-vector layout.

use crate::error::{McpError, McpResult};
use ndarray::{Array1, ArrayView1};

/// Compile-known-at-arming-time problem dimensions.
///
/// Everything downstream (workspace buffers, Krylov basis, decision
/// vector) is sized once from this struct and never resized, so arming
/// is the only place allocation for a run happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dims {
    pub nx: usize,
    pub nu: usize,
    pub nc: usize,
    pub nh: usize,
    pub nub: usize,
    pub n_stages: usize,
    pub k_max: usize,
}

impl Dims {
    /// `nu + nc`: control plus equality-multiplier width.
    pub fn nuc(&self) -> usize {
        self.nu + self.nc
    }

    /// Per-stage unknown count: `nuc + 2*nub` (control/multipliers,
    /// dummy input, slack multiplier).
    pub fn m_stage(&self) -> usize {
        self.nuc() + 2 * self.nub
    }

    /// Total decision-vector length `N * m_stage`.
    pub fn dim_u(&self) -> usize {
        self.n_stages * self.m_stage()
    }

    /// Validates the structural invariants a configuration error would
    /// otherwise only surface deep in the hot loop.
    pub fn validate(&self) -> McpResult<()> {
        if self.nx == 0 {
            return Err(McpError::Configuration("nx must be > 0".into()));
        }
        if self.nu == 0 {
            return Err(McpError::Configuration("nu must be > 0".into()));
        }
        if self.n_stages == 0 {
            return Err(McpError::Configuration("horizon stage count N must be > 0".into()));
        }
        if self.k_max == 0 {
            return Err(McpError::Configuration("k_max must be > 0".into()));
        }
        if self.nh != self.nub {
            return Err(McpError::Configuration(format!(
                "this core only transforms bound constraints via Fischer-Burmeister; \
                 nh ({}) must equal nub ({})",
                self.nh, self.nub
            )));
        }
        Ok(())
    }
}

/// Solver tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverOptions {
    /// Sampling / continuation time step `h`. Exposed under both a
    /// field name and a `sampling_time()` accessor, since callers know
    /// it by either name.
    pub dt: f64,
    /// Continuation stabilization gain `zeta`.
    pub zeta: f64,
    /// Finite-difference step `epsilon` for the matrix-free Jacobian.
    pub finite_difference_epsilon: f64,
    /// `eps_FB` inside the Fischer-Burmeister function.
    pub fb_epsilon: f64,
    /// Initializer Newton iteration cap.
    pub max_iter: usize,
    /// Initializer convergence threshold on `||F||`.
    pub opterr_tol: f64,
    /// 0 = silent, 1 = per-sample summary, 2 = per-iteration detail.
    pub verbose_level: u8,
}

impl SolverOptions {
    /// `sampling_time` is the same field as `dt`.
    pub fn sampling_time(&self) -> f64 {
        self.dt
    }

    pub fn validate(&self) -> McpResult<()> {
        if !(self.dt > 0.0) {
            return Err(McpError::Configuration(format!(
                "sampling time dt must be > 0, got {}",
                self.dt
            )));
        }
        if !(self.zeta > 0.0) {
            return Err(McpError::Configuration(format!(
                "zeta must be > 0, got {}",
                self.zeta
            )));
        }
        if !(self.finite_difference_epsilon > 0.0) {
            return Err(McpError::Configuration(
                "finite_difference_epsilon must be > 0".into(),
            ));
        }
        if self.max_iter == 0 {
            return Err(McpError::Configuration("max_iter must be > 0".into()));
        }
        if !(self.opterr_tol > 0.0) {
            return Err(McpError::Configuration("opterr_tol must be > 0".into()));
        }
        // zeta*dt < 2 keeps the continuation law's implied discrete
        // decay stable; violating it is a tuning mistake worth
        // flagging, not a hard configuration error.
        if self.zeta * self.dt >= 2.0 {
            tracing::warn!(
                zeta = self.zeta,
                dt = self.dt,
                product = self.zeta * self.dt,
                "zeta * dt >= 2.0; continuation law may be unstable"
            );
        }
        Ok(())
    }
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            dt: 0.001,
            zeta: 1000.0,
            finite_difference_epsilon: 1e-8,
            fb_epsilon: 1e-10,
            max_iter: 50,
            opterr_tol: 1e-8,
            verbose_level: 0,
        }
    }
}

/// A view over the decision vector's per-stage blocks.
///
/// Layout: stage `i` occupies `[i*m_stage, i*m_stage + m_stage)` as
/// `[u (nuc), v (nub), mu (nub)]`, interleaved per stage rather than
/// grouped by kind across the whole horizon (see DESIGN.md for why).
#[derive(Debug, Clone)]
pub struct Decision {
    pub u: Array1<f64>,
    dims: Dims,
}

impl Decision {
    pub fn zeros(dims: Dims) -> Self {
        Self {
            u: Array1::zeros(dims.dim_u()),
            dims,
        }
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    fn stage_offset(&self, stage: usize) -> usize {
        stage * self.dims.m_stage()
    }

    pub fn uc_block(&self, stage: usize) -> ArrayView1<f64> {
        let off = self.stage_offset(stage);
        self.u.slice(ndarray::s![off..off + self.dims.nuc()])
    }

    pub fn v_block(&self, stage: usize) -> ArrayView1<f64> {
        let off = self.stage_offset(stage) + self.dims.nuc();
        self.u.slice(ndarray::s![off..off + self.dims.nub])
    }

    pub fn mu_block(&self, stage: usize) -> ArrayView1<f64> {
        let off = self.stage_offset(stage) + self.dims.nuc() + self.dims.nub;
        self.u.slice(ndarray::s![off..off + self.dims.nub])
    }

    pub fn uc_block_mut(&mut self, stage: usize) -> ndarray::ArrayViewMut1<f64> {
        let off = self.stage_offset(stage);
        let nuc = self.dims.nuc();
        self.u.slice_mut(ndarray::s![off..off + nuc])
    }

    pub fn v_block_mut(&mut self, stage: usize) -> ndarray::ArrayViewMut1<f64> {
        let off = self.stage_offset(stage) + self.dims.nuc();
        let nub = self.dims.nub;
        self.u.slice_mut(ndarray::s![off..off + nub])
    }

    pub fn mu_block_mut(&mut self, stage: usize) -> ndarray::ArrayViewMut1<f64> {
        let off = self.stage_offset(stage) + self.dims.nuc() + self.dims.nub;
        let nub = self.dims.nub;
        self.u.slice_mut(ndarray::s![off..off + nub])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_dims() -> Dims {
        Dims { nx: 2, nu: 1, nc: 0, nh: 1, nub: 1, n_stages: 3, k_max: 5 }
    }

    #[test]
    fn dims_derive_widths() {
        let d = toy_dims();
        assert_eq!(d.nuc(), 1);
        assert_eq!(d.m_stage(), 3); // nuc(1) + 2*nub(1)
        assert_eq!(d.dim_u(), 9);
    }

    #[test]
    fn decision_blocks_are_disjoint_and_cover_stage() {
        let d = toy_dims();
        let mut dec = Decision::zeros(d);
        dec.uc_block_mut(1)[0] = 1.0;
        dec.v_block_mut(1)[0] = 2.0;
        dec.mu_block_mut(1)[0] = 3.0;
        let stage1 = dec.u.slice(ndarray::s![d.m_stage()..2 * d.m_stage()]);
        assert_eq!(stage1.to_vec(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn validate_rejects_nh_nub_mismatch() {
        let mut d = toy_dims();
        d.nh = 2;
        assert!(d.validate().is_err());
    }

    #[test]
    fn solver_options_warns_on_unstable_product_but_does_not_error() {
        let opts = SolverOptions { zeta: 3000.0, dt: 0.001, ..SolverOptions::default() };
        assert!(opts.validate().is_ok());
    }
}
