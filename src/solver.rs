//! Solver facade: the state machine driving one solver instance through
//! construction, arming, and repeated continuation steps.
//!
//! ```text
//! [constructed] -> set_uc(u0) -> solve(t,x) -> init_x_lmd(t,x)
//!               -> init_dummy_mu() -> [armed] -> update(t,x)* -> [running]
//! ```
//!
//! Calling `update()` before arming, or reusing a poisoned instance
//! without re-arming, is a usage error.

use ndarray::Array1;

use crate::continuation::{ContinuationStepper, ControlOutput};
use crate::error::{ConvergenceWarning, McpError, McpResult};
use crate::fb::init_dummy_mu_pair;
use crate::horizon::HorizonConfig;
use crate::init::solve_zero_horizon;
use crate::ocp::OcpModel;
use crate::types::{Decision, Dims, SolverOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Constructed,
    UcSeeded,
    Solved,
    TrajectoriesInit,
    Armed,
    Poisoned,
}

/// Drives one MPC instance end to end. Owns `U`, the trajectory
/// buffers, and the GMRES workspace; the OCP is held by shared
/// reference only.
pub struct Solver<'a, O: OcpModel> {
    ocp: &'a O,
    dims: Dims,
    horizon: HorizonConfig,
    opts: SolverOptions,
    stage: Stage,

    uc_seed: Vec<f64>,
    uc_opt: Vec<f64>,
    v_opt: Vec<f64>,
    mu_opt: Vec<f64>,
    last_warning: Option<ConvergenceWarning>,

    u: Decision,
    stepper: ContinuationStepper,
    last_residual_norm: f64,
}

impl<'a, O: OcpModel> Solver<'a, O> {
    /// Validates dimensions and configuration, then constructs a fresh,
    /// unarmed solver. Configuration errors fail here, at the
    /// boundary, not inside the hot loop.
    pub fn new(ocp: &'a O, dims: Dims, horizon: HorizonConfig, opts: SolverOptions) -> McpResult<Self> {
        dims.validate()?;
        opts.validate()?;
        if ocp.nx() != dims.nx || ocp.nu() != dims.nu || ocp.nc() != dims.nc {
            return Err(McpError::Contract(format!(
                "OCP dims (nx={}, nu={}, nc={}) do not match solver dims (nx={}, nu={}, nc={})",
                ocp.nx(), ocp.nu(), ocp.nc(), dims.nx, dims.nu, dims.nc
            )));
        }
        if ocp.nub() != dims.nub || ocp.nh() != dims.nh {
            return Err(McpError::Contract(format!(
                "OCP bound dims (nub={}, nh={}) do not match solver dims (nub={}, nh={})",
                ocp.nub(), ocp.nh(), dims.nub, dims.nh
            )));
        }
        if ocp.ubound_indices().len() != dims.nub
            || ocp.umin().len() != dims.nub
            || ocp.umax().len() != dims.nub
            || ocp.dummy_weight().len() != dims.nub
        {
            return Err(McpError::Contract(
                "ubound_indices/umin/umax/dummy_weight must each have length nub".into(),
            ));
        }

        Ok(Self {
            ocp,
            dims,
            horizon,
            opts,
            stage: Stage::Constructed,
            uc_seed: vec![0.0; dims.nuc()],
            uc_opt: vec![0.0; dims.nuc()],
            v_opt: vec![1.0; dims.nub],
            mu_opt: vec![0.0; dims.nub],
            last_warning: None,
            u: Decision::zeros(dims),
            stepper: ContinuationStepper::new(dims),
            last_residual_norm: f64::INFINITY,
        })
    }

    /// Seeds the zero-horizon initializer's decision vector.
    pub fn set_uc(&mut self, uc0: &[f64]) -> McpResult<()> {
        if uc0.len() != self.dims.nuc() {
            return Err(McpError::Usage(format!(
                "set_uc expected length {}, got {}",
                self.dims.nuc(),
                uc0.len()
            )));
        }
        self.uc_seed.copy_from_slice(uc0);
        self.stage = Stage::UcSeeded;
        Ok(())
    }

    /// Runs the zero-horizon Newton-C/GMRES initializer to convergence
    /// (or `max_iter`), seeding `ucopt()`.
    pub fn solve(&mut self, t: f64, x0: &[f64]) -> McpResult<()> {
        if self.stage != Stage::UcSeeded {
            return Err(McpError::Usage(
                "solve() must be called after set_uc() and before init_x_lmd()".into(),
            ));
        }
        if x0.len() != self.dims.nx {
            return Err(McpError::Usage(format!(
                "solve expected state of length {}, got {}",
                self.dims.nx,
                x0.len()
            )));
        }
        self.ocp.synchronize();
        let (uc, v, mu, warning) = solve_zero_horizon(
            self.ocp,
            &self.dims,
            &self.opts,
            t,
            x0,
            self.uc_seed.clone(),
            self.v_opt.clone(),
            self.mu_opt.clone(),
        )?;
        self.uc_opt = uc;
        self.v_opt = v;
        self.mu_opt = mu;
        self.last_warning = warning;
        self.stage = Stage::Solved;
        Ok(())
    }

    /// Last converged decision from the zero-horizon initializer.
    pub fn ucopt(&self) -> &[f64] {
        &self.uc_opt
    }

    /// A convergence warning from the last `solve()`, if the
    /// initializer did not reach `opterr_tol` within `max_iter`:
    /// informational, never an error.
    pub fn last_warning(&self) -> Option<ConvergenceWarning> {
        self.last_warning
    }

    /// Rolls out the initial state/costate trajectories with a uniform
    /// `ucopt()` applied at every stage.
    pub fn init_x_lmd(&mut self, t: f64, x0: &[f64]) -> McpResult<()> {
        if self.stage != Stage::Solved {
            return Err(McpError::Usage(
                "init_x_lmd() must be called after solve()".into(),
            ));
        }
        if x0.len() != self.dims.nx {
            return Err(McpError::Usage(format!(
                "init_x_lmd expected state of length {}, got {}",
                self.dims.nx,
                x0.len()
            )));
        }
        for i in 0..self.dims.n_stages {
            self.u
                .uc_block_mut(i)
                .assign(&Array1::from_vec(self.uc_opt.clone()));
        }
        // Rebuild the trajectories once so the facade can report a
        // sensible residual norm before the first continuation step.
        crate::residual::eval_residual(
            self.ocp,
            &self.dims,
            &self.horizon,
            &self.opts,
            t,
            x0,
            &self.u,
            self.stepper.workspace_mut(),
        )?;
        self.stage = Stage::TrajectoriesInit;
        Ok(())
    }

    /// Seeds the dummy input `v` and multiplier `mu` per stage and
    /// bound by solving `{FB(a,b)=0, 2 v mu - w = 0}` for each, so
    /// `F ~= 0` at arming time.
    pub fn init_dummy_mu(&mut self) -> McpResult<()> {
        if self.stage != Stage::TrajectoriesInit {
            return Err(McpError::Usage(
                "init_dummy_mu() must be called after init_x_lmd()".into(),
            ));
        }
        let ubound_idx = self.ocp.ubound_indices().to_vec();
        let umin = self.ocp.umin().to_vec();
        let umax = self.ocp.umax().to_vec();
        let weight = self.ocp.dummy_weight().to_vec();

        for i in 0..self.dims.n_stages {
            let uc_i = self.u.uc_block(i).to_owned();
            let mut v_vals = vec![0.0; self.dims.nub];
            let mut mu_vals = vec![0.0; self.dims.nub];
            for (j, &uidx) in ubound_idx.iter().enumerate() {
                let a = (umax[j] - uc_i[uidx]) * (uc_i[uidx] - umin[j]);
                let (v, mu, degraded) = init_dummy_mu_pair(a, weight[j], 1e-12);
                if degraded {
                    tracing::warn!(stage = i, bound = j, "init_dummy_mu: control outside bounds, clamped");
                }
                v_vals[j] = v;
                mu_vals[j] = mu;
            }
            self.u.v_block_mut(i).assign(&Array1::from_vec(v_vals));
            self.u.mu_block_mut(i).assign(&Array1::from_vec(mu_vals));
        }
        self.stage = Stage::Armed;
        Ok(())
    }

    /// One C/GMRES continuation step: advances `U` by `h . delta` and
    /// returns the control to apply now.
    ///
    /// A `McpError::Numerical` poisons the instance; the caller must
    /// re-arm (`set_uc` -> `solve` -> `init_x_lmd` -> `init_dummy_mu`)
    /// before calling `update()` again.
    pub fn update(&mut self, t: f64, x: &[f64]) -> McpResult<ControlOutput> {
        match self.stage {
            Stage::Armed => {}
            Stage::Poisoned => {
                return Err(McpError::Usage(
                    "solver is poisoned by a prior numerical failure; re-arm before calling update()".into(),
                ));
            }
            _ => {
                return Err(McpError::Usage(
                    "update() called before the solver was armed".into(),
                ));
            }
        }
        if x.len() != self.dims.nx {
            return Err(McpError::Usage(format!(
                "update expected state of length {}, got {}",
                self.dims.nx,
                x.len()
            )));
        }

        self.ocp.synchronize();
        let result = self
            .stepper
            .step(self.ocp, &self.dims, &self.horizon, &self.opts, t, x, &mut self.u);

        match result {
            Ok(out) => {
                self.last_residual_norm = out.residual_norm;
                Ok(out)
            }
            Err(e @ McpError::Numerical(_)) => {
                self.stage = Stage::Poisoned;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// The `N` stage-0-indexed optimal control inputs currently held in
    /// `U`; index 0 is what should be applied right now.
    pub fn uopt(&self) -> Vec<Vec<f64>> {
        (0..self.dims.n_stages)
            .map(|i| self.u.uc_block(i).slice(ndarray::s![..self.dims.nu]).to_vec())
            .collect()
    }

    /// `||F(U, t, x)||` as of the last successful `update()` (or the
    /// post-arming rollout if `update()` has not yet been called).
    pub fn last_residual_norm(&self) -> f64 {
        self.last_residual_norm
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }
}
