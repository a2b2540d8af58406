//! C/GMRES continuation stepper.
//!
//! Rather than solving `F(U) = 0` from scratch every sample, this
//! drives `U` so that `dF/dt = -zeta * F` along the closed-loop
//! trajectory: a linear solve for `dU/dt`, integrated by forward Euler.
//! Residual decay is exponential at rate `zeta` without per-sample
//! Newton iteration.

use ndarray::Array1;

use crate::error::McpResult;
use crate::gmres::{gmres, GmresResult, KrylovWorkspace};
use crate::horizon::HorizonConfig;
use crate::ocp::OcpModel;
use crate::residual::{eval_residual, Workspace};
use crate::types::{Decision, Dims, SolverOptions};

/// Result of one `update()` continuation step.
#[derive(Debug, Clone)]
pub struct ControlOutput {
    /// The stage-0 control to apply now.
    pub u0: Vec<f64>,
    /// `||F(U, t, x)||` before this step's update, for diagnostics.
    pub residual_norm: f64,
    pub gmres_iterations: usize,
    pub gmres_breakdown: bool,
}

/// Owns the scratch buffers a continuation step needs beyond the
/// residual workspace: the two residual snapshots `F_cur`/`F_next`, a
/// copy of the unperturbed decision vector, the predicted next state,
/// the perturbed decision vector for the matrix-free directional
/// derivative, the solved update `delta`, and the Krylov workspace.
/// None of these are resized after construction, so `step()` performs
/// no heap allocation beyond the `Vec<f64>` handed back to the caller
/// in `ControlOutput`.
pub struct ContinuationStepper {
    residual_ws: Workspace,
    krylov: KrylovWorkspace,
    u_pert: Decision,
    u_base: Array1<f64>,
    f_cur: Array1<f64>,
    f_next: Array1<f64>,
    b: Array1<f64>,
    delta: Array1<f64>,
    dx: Vec<f64>,
    x_pred: Vec<f64>,
}

impl ContinuationStepper {
    pub fn new(dims: Dims) -> Self {
        Self {
            residual_ws: Workspace::new(dims),
            krylov: KrylovWorkspace::new(dims.dim_u(), dims.k_max),
            u_pert: Decision::zeros(dims),
            u_base: Array1::zeros(dims.dim_u()),
            f_cur: Array1::zeros(dims.dim_u()),
            f_next: Array1::zeros(dims.dim_u()),
            b: Array1::zeros(dims.dim_u()),
            delta: Array1::zeros(dims.dim_u()),
            dx: vec![0.0; dims.nx],
            x_pred: vec![0.0; dims.nx],
        }
    }

    /// Gives read access to the last rebuilt trajectories, e.g. for a
    /// caller wanting to inspect the predicted state rollout.
    pub fn workspace(&self) -> &Workspace {
        &self.residual_ws
    }

    /// Mutable access to the residual workspace, for the facade's
    /// one-time post-arming rollout in `init_x_lmd`.
    pub(crate) fn workspace_mut(&mut self) -> &mut Workspace {
        &mut self.residual_ws
    }

    /// One continuation step: evaluate the residual and its
    /// forward-predicted counterpart, solve the stabilization law's
    /// linear system via matrix-free GMRES, then advance `U`.
    /// `synchronize()` is the facade's responsibility, called before
    /// this so the zero-horizon initializer's own Newton variant can
    /// reuse this step without double-synchronizing.
    pub fn step<O: OcpModel>(
        &mut self,
        ocp: &O,
        dims: &Dims,
        horizon: &HorizonConfig,
        opts: &SolverOptions,
        t: f64,
        x: &[f64],
        u: &mut Decision,
    ) -> McpResult<ControlOutput> {
        let h = opts.dt;

        // F_cur = F(U, t, x).
        eval_residual(ocp, dims, horizon, opts, t, x, u, &mut self.residual_ws)?;
        self.f_cur.assign(&self.residual_ws.f);
        let residual_norm = self.f_cur.dot(&self.f_cur).sqrt();

        // Predict x' and evaluate F_next = F(U, t+h, x').
        let nu = dims.nu;
        let u0 = u.uc_block(0).slice(ndarray::s![..nu]).to_vec();
        ocp.eval_f(t, x, &u0, &mut self.dx);
        for k in 0..dims.nx {
            self.x_pred[k] = x[k] + h * self.dx[k];
        }

        eval_residual(ocp, dims, horizon, opts, t + h, &self.x_pred, u, &mut self.residual_ws)?;
        self.f_next.assign(&self.residual_ws.f);

        // b = -zeta*F_cur - (F_next - F_cur)/h.
        for k in 0..self.b.len() {
            self.b[k] = -opts.zeta * self.f_cur[k] - (self.f_next[k] - self.f_cur[k]) / h;
        }

        // A.delta ~= (F(U+eps*delta, t+h, x') - F_next)/eps, solved via
        // GMRES(k_max); the closure writes the directional derivative
        // directly into the buffer GMRES hands it, so this performs no
        // per-iteration allocation.
        let eps = opts.finite_difference_epsilon;
        self.u_base.assign(&u.u);
        let u_base = &self.u_base;
        let f_next = &self.f_next;
        let u_pert = &mut self.u_pert;
        let residual_ws = &mut self.residual_ws;
        let x_pred = &self.x_pred;

        let result: GmresResult = gmres(
            |delta, out: &mut Array1<f64>| {
                u_pert.u.assign(u_base);
                u_pert.u.scaled_add(eps, &delta);
                eval_residual(ocp, dims, horizon, opts, t + h, x_pred, u_pert, residual_ws)?;
                for k in 0..out.len() {
                    out[k] = (residual_ws.f[k] - f_next[k]) / eps;
                }
                Ok(())
            },
            &self.b,
            &mut self.krylov,
            1e-12,
            &mut self.delta,
        )?;

        // U <- U + h*delta.
        u.u.scaled_add(h, &self.delta);

        if opts.verbose_level >= 2 {
            tracing::trace!(
                t,
                residual_norm,
                gmres_iterations = result.iterations,
                gmres_breakdown = result.breakdown,
                "continuation step"
            );
        } else if opts.verbose_level >= 1 {
            tracing::debug!(t, residual_norm, "continuation step");
        }
        if result.breakdown {
            tracing::warn!(t, iterations = result.iterations, "GMRES breakdown; using partial solution");
        }

        Ok(ControlOutput {
            u0,
            residual_norm,
            gmres_iterations: result.iterations,
            gmres_breakdown: result.breakdown,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::ScalarBoundedOcp;

    fn setup(n_stages: usize) -> (ScalarBoundedOcp, Dims, HorizonConfig, SolverOptions) {
        let ocp = ScalarBoundedOcp::new(-1.0, 1.0, 0.1);
        let dims = Dims { nx: 1, nu: 1, nc: 0, nh: 1, nub: 1, n_stages, k_max: 4 };
        let horizon = HorizonConfig::new(0.5, 0.0, 0.0).unwrap();
        let opts = SolverOptions { dt: 0.01, zeta: 50.0, ..SolverOptions::default() };
        (ocp, dims, horizon, opts)
    }

    #[test]
    fn residual_norm_is_finite_and_nonnegative() {
        let (ocp, dims, horizon, opts) = setup(5);
        let mut stepper = ContinuationStepper::new(dims);
        let mut u = Decision::zeros(dims);
        let out = stepper.step(&ocp, &dims, &horizon, &opts, 0.0, &[0.3], &mut u).unwrap();
        assert!(out.residual_norm.is_finite());
        assert!(out.residual_norm >= 0.0);
        assert_eq!(out.u0.len(), dims.nu);
    }

    #[test]
    fn step_is_deterministic_given_identical_inputs() {
        // Two independently constructed steppers, fed bit-identical
        // state, must produce bit-identical control output: no hidden
        // source of nondeterminism (uninitialized memory, hash-order
        // iteration, etc.) in the hot path.
        let (ocp, dims, horizon, opts) = setup(5);

        let mut stepper_a = ContinuationStepper::new(dims);
        let mut u_a = Decision::zeros(dims);
        let out_a = stepper_a.step(&ocp, &dims, &horizon, &opts, 0.0, &[0.3], &mut u_a).unwrap();

        let mut stepper_b = ContinuationStepper::new(dims);
        let mut u_b = Decision::zeros(dims);
        let out_b = stepper_b.step(&ocp, &dims, &horizon, &opts, 0.0, &[0.3], &mut u_b).unwrap();

        assert_eq!(out_a.u0, out_b.u0);
        assert_eq!(out_a.residual_norm, out_b.residual_norm);
        assert_eq!(out_a.gmres_iterations, out_b.gmres_iterations);
        assert_eq!(u_a.u.as_slice(), u_b.u.as_slice());
    }

    #[test]
    fn restarted_gmres_solve_agrees_with_first_solve_on_a_frozen_problem() {
        // Same U and b (same t, x, decision vector) fed through two
        // independent GMRES(k_max) solves should yield deltas differing
        // only by finite-difference noise, not by restart-order effects.
        let (ocp, dims, horizon, opts) = setup(5);
        let eps_fd = opts.finite_difference_epsilon;

        let mut stepper_a = ContinuationStepper::new(dims);
        let mut u_a = Decision::zeros(dims);
        u_a.uc_block_mut(0)[0] = 0.1;
        let mut u_snapshot = u_a.clone();
        let out_a = stepper_a.step(&ocp, &dims, &horizon, &opts, 0.0, &[0.3], &mut u_a).unwrap();

        let mut stepper_b = ContinuationStepper::new(dims);
        let out_b = stepper_b
            .step(&ocp, &dims, &horizon, &opts, 0.0, &[0.3], &mut u_snapshot)
            .unwrap();

        for (a, b) in out_a.u0.iter().zip(out_b.u0.iter()) {
            assert!(
                (a - b).abs() <= 10.0 * eps_fd,
                "restarted solve diverged: {a} vs {b}"
            );
        }
    }

    #[test]
    fn repeated_steps_do_not_blow_up() {
        let (ocp, dims, horizon, opts) = setup(5);
        let mut stepper = ContinuationStepper::new(dims);
        let mut u = Decision::zeros(dims);
        let mut x = 0.3_f64;
        let mut t = 0.0;
        for _ in 0..20 {
            let out = stepper.step(&ocp, &dims, &horizon, &opts, t, &[x], &mut u).unwrap();
            assert!(out.u0[0].is_finite());
            let mut dx = [0.0];
            ocp.eval_f(t, &[x], &out.u0, &mut dx);
            x += opts.dt * dx[0];
            t += opts.dt;
        }
        assert!(x.is_finite());
    }
}
