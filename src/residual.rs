//! Multiple-shooting KKT residual F(U; t, x).
//!
//! The central object: given the current decision vector and plant
//! state, rolls out the state and costate trajectories and composes
//! the stationarity/complementarity residual for every stage. All
//! buffers are pre-sized in `Workspace` and reused across calls: the
//! rollout and residual assembly below write into those buffers in
//! place rather than allocating per stage.

use ndarray::{Array1, Array2};

use crate::error::{McpError, McpResult};
use crate::fb::{dummy_stationarity, fb, fb_a, fb_b};
use crate::horizon::HorizonConfig;
use crate::ocp::OcpModel;
use crate::types::{Decision, Dims, SolverOptions};

/// Reusable scratch space for one residual evaluation.
///
/// Owned once by the solver facade and threaded through every `eval`
/// call, including the finite-difference perturbations GMRES performs
/// internally.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub x_trajectory: Array2<f64>,
    pub lambda_trajectory: Array2<f64>,
    pub f: Array1<f64>,
    dx: Array1<f64>,
    phix: Array1<f64>,
    hx: Array1<f64>,
    hu: Array1<f64>,
    uc_i: Array1<f64>,
}

impl Workspace {
    pub fn new(dims: Dims) -> Self {
        Self {
            x_trajectory: Array2::zeros((dims.n_stages + 1, dims.nx)),
            lambda_trajectory: Array2::zeros((dims.n_stages + 1, dims.nx)),
            f: Array1::zeros(dims.dim_u()),
            dx: Array1::zeros(dims.nx),
            phix: Array1::zeros(dims.nx),
            hx: Array1::zeros(dims.nx),
            hu: Array1::zeros(dims.nuc()),
            uc_i: Array1::zeros(dims.nuc()),
        }
    }
}

/// Evaluates `F(U; t, x0)` into `workspace.f`, rebuilding the state and
/// costate trajectories along the way.
///
/// Non-finite entries anywhere in the rollout or the residual are
/// reported as `McpError::Numerical` rather than silently propagated.
pub fn eval_residual<O: OcpModel>(
    ocp: &O,
    dims: &Dims,
    horizon: &HorizonConfig,
    opts: &SolverOptions,
    t: f64,
    x0: &[f64],
    u: &Decision,
    ws: &mut Workspace,
) -> McpResult<()> {
    let n = dims.n_stages;
    let dtau = horizon.horizon_at(t) / n as f64;

    // Forward state roll-out: x_{i+1} = x_i + dtau * f(t_i, x_i, u_i).
    ws.x_trajectory.row_mut(0).assign(&ndarray::ArrayView1::from(x0));
    for i in 0..n {
        let ti = t + i as f64 * dtau;
        ws.uc_i.assign(&u.uc_block(i));
        {
            let xi = ws.x_trajectory.row(i);
            let ui = ws.uc_i.slice(ndarray::s![..dims.nu]);
            ocp.eval_f(ti, xi.as_slice().unwrap(), ui.as_slice().unwrap(), ws.dx.as_slice_mut().unwrap());
        }
        check_finite(ws.dx.as_slice().unwrap(), "eval_f output")?;
        for k in 0..dims.nx {
            let x_next = ws.x_trajectory[[i, k]] + dtau * ws.dx[k];
            ws.x_trajectory[[i + 1, k]] = x_next;
        }
    }

    // Backward costate roll-out: lambda_N = phix, lambda_i = lambda_{i+1} + dtau * hx.
    let t_n = t + n as f64 * dtau;
    {
        let x_n = ws.x_trajectory.row(n);
        ocp.eval_phix(t_n, x_n.as_slice().unwrap(), ws.phix.as_slice_mut().unwrap());
    }
    check_finite(ws.phix.as_slice().unwrap(), "eval_phix output")?;
    ws.lambda_trajectory.row_mut(n).assign(&ws.phix);

    for i in (0..n).rev() {
        let ti = t + i as f64 * dtau;
        ws.uc_i.assign(&u.uc_block(i));
        {
            let xi = ws.x_trajectory.row(i);
            let lambda_next = ws.lambda_trajectory.row(i + 1);
            ocp.eval_hx(
                ti,
                xi.as_slice().unwrap(),
                ws.uc_i.as_slice().unwrap(),
                lambda_next.as_slice().unwrap(),
                ws.hx.as_slice_mut().unwrap(),
            );
        }
        check_finite(ws.hx.as_slice().unwrap(), "eval_hx output")?;
        for k in 0..dims.nx {
            let lambda_i = ws.lambda_trajectory[[i + 1, k]] + dtau * ws.hx[k];
            ws.lambda_trajectory[[i, k]] = lambda_i;
        }
    }

    // Per-stage residual blocks, flattened in stage order.
    let ubound_idx = ocp.ubound_indices();
    let umin = ocp.umin();
    let umax = ocp.umax();
    let weight = ocp.dummy_weight();

    for i in 0..n {
        let ti = t + i as f64 * dtau;
        ws.uc_i.assign(&u.uc_block(i));
        {
            let xi = ws.x_trajectory.row(i);
            let lambda_next = ws.lambda_trajectory.row(i + 1);
            ocp.eval_hu(
                ti,
                xi.as_slice().unwrap(),
                ws.uc_i.as_slice().unwrap(),
                lambda_next.as_slice().unwrap(),
                ws.hu.as_slice_mut().unwrap(),
            );
        }
        check_finite(ws.hu.as_slice().unwrap(), "eval_hu output")?;

        // F_u is exactly H_u: the mu-multiplied bound term is part of the
        // OCP's own Hamiltonian, so its stationarity contribution is
        // already folded into eval_hu's output.
        let stage_off = i * dims.m_stage();
        ws.f.slice_mut(ndarray::s![stage_off..stage_off + dims.nuc()]).assign(&ws.hu);

        let v_off = stage_off + dims.nuc();
        let mu_off = v_off + dims.nub;
        for (j, &uidx) in ubound_idx.iter().enumerate() {
            let v_ij = u.v_block(i)[j];
            let mu_ij = u.mu_block(i)[j];
            ws.f[v_off + j] = dummy_stationarity(v_ij, mu_ij, weight[j]);
            let a = fb_a(ws.uc_i[uidx], umin[j], umax[j], mu_ij);
            let b = fb_b(v_ij);
            ws.f[mu_off + j] = fb(a, b, opts.fb_epsilon);
        }
    }

    check_finite(ws.f.as_slice().unwrap(), "residual F")?;
    Ok(())
}

fn check_finite(v: &[f64], what: &str) -> McpResult<()> {
    if v.iter().any(|x| !x.is_finite()) {
        return Err(McpError::Numerical(format!("non-finite value in {what}")));
    }
    Ok(())
}
