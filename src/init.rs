//! Zero-horizon initializer.
//!
//! A reduced single-stage variant (`N=1`, `Δτ=0`) whose decision vector
//! is just `(u, v, mu)`, dimension `m_stage`. Since `Δτ=0`, the state
//! rollout is trivial (`x_1 == x_0`) and the costate is exactly the
//! terminal cost gradient: `lambda == phix(t, x_0)`. Iterated with a
//! full Newton-like C/GMRES update until `||F|| < opterr_tol` or
//! `max_iter` is hit. Its converged decision seeds every stage of the
//! multiple-shooting `U`.

use ndarray::Array1;

use crate::error::{ConvergenceWarning, McpError, McpResult};
use crate::fb::{dummy_stationarity, fb, fb_a, fb_b};
use crate::gmres::{gmres, KrylovWorkspace};
use crate::ocp::OcpModel;
use crate::types::{Dims, SolverOptions};

/// Evaluates the zero-horizon residual `F(uc, v, mu; t, x0)` into `f`.
/// Layout matches a single multiple-shooting stage: `[uc, v, mu]`.
fn eval_zero_horizon<O: OcpModel>(
    ocp: &O,
    dims: &Dims,
    opts: &SolverOptions,
    t: f64,
    x0: &[f64],
    uc: &[f64],
    v: &[f64],
    mu: &[f64],
    f: &mut Array1<f64>,
) -> McpResult<()> {
    let mut phix = vec![0.0; dims.nx];
    ocp.eval_phix(t, x0, &mut phix);
    if phix.iter().any(|x| !x.is_finite()) {
        return Err(McpError::Numerical("non-finite eval_phix output".into()));
    }

    let mut hu = vec![0.0; dims.nuc()];
    ocp.eval_hu(t, x0, uc, &phix, &mut hu);
    if hu.iter().any(|x| !x.is_finite()) {
        return Err(McpError::Numerical("non-finite eval_hu output".into()));
    }
    f.slice_mut(ndarray::s![0..dims.nuc()])
        .assign(&Array1::from_vec(hu));

    let ubound_idx = ocp.ubound_indices();
    let umin = ocp.umin();
    let umax = ocp.umax();
    let weight = ocp.dummy_weight();

    let v_off = dims.nuc();
    let mu_off = v_off + dims.nub;
    for (j, &uidx) in ubound_idx.iter().enumerate() {
        f[v_off + j] = dummy_stationarity(v[j], mu[j], weight[j]);
        let a = fb_a(uc[uidx], umin[j], umax[j], mu[j]);
        let b = fb_b(v[j]);
        f[mu_off + j] = fb(a, b, opts.fb_epsilon);
    }

    if f.iter().any(|x| !x.is_finite()) {
        return Err(McpError::Numerical("non-finite zero-horizon residual".into()));
    }
    Ok(())
}

/// Newton-C/GMRES loop: iterates `uc, v, mu <- uc, v, mu - A^-1 F`
/// (matrix-free, GMRES(k_max)) until convergence or `max_iter`.
///
/// Returns the converged `(uc, v, mu)` plus a `ConvergenceWarning` when
/// `opterr_tol` was not reached within `max_iter` — this is reported,
/// not raised as an error, since continuation may still be viable from
/// a partially converged seed.
pub fn solve_zero_horizon<O: OcpModel>(
    ocp: &O,
    dims: &Dims,
    opts: &SolverOptions,
    t: f64,
    x0: &[f64],
    mut uc: Vec<f64>,
    mut v: Vec<f64>,
    mut mu: Vec<f64>,
) -> McpResult<(Vec<f64>, Vec<f64>, Vec<f64>, Option<ConvergenceWarning>)> {
    let m_stage = dims.m_stage();
    let nuc = dims.nuc();
    let nub = dims.nub;
    let eps = opts.finite_difference_epsilon;

    let mut f = Array1::zeros(m_stage);
    let mut f_base = Array1::zeros(m_stage);
    let mut neg_f = Array1::zeros(m_stage);
    let mut delta = Array1::zeros(m_stage);
    let mut uc_p = vec![0.0; nuc];
    let mut v_p = vec![0.0; nub];
    let mut mu_p = vec![0.0; nub];
    let mut f_pert = Array1::zeros(m_stage);
    let mut krylov = KrylovWorkspace::new(m_stage, dims.k_max.min(m_stage).max(1));

    let mut opterr = f64::INFINITY;
    let mut iterations = 0usize;

    for iter in 0..opts.max_iter {
        iterations = iter + 1;
        eval_zero_horizon(ocp, dims, opts, t, x0, &uc, &v, &mu, &mut f)?;
        opterr = f.dot(&f).sqrt();
        if opterr < opts.opterr_tol {
            return Ok((uc, v, mu, None));
        }

        f_base.assign(&f);
        neg_f.assign(&f);
        neg_f.mapv_inplace(|x| -x);
        let uc0 = &uc;
        let v0 = &v;
        let mu0 = &mu;

        let result = gmres(
            |delta, out: &mut Array1<f64>| {
                uc_p.copy_from_slice(uc0);
                v_p.copy_from_slice(v0);
                mu_p.copy_from_slice(mu0);
                for k in 0..nuc {
                    uc_p[k] += eps * delta[k];
                }
                for k in 0..nub {
                    v_p[k] += eps * delta[nuc + k];
                    mu_p[k] += eps * delta[nuc + nub + k];
                }
                eval_zero_horizon(ocp, dims, opts, t, x0, &uc_p, &v_p, &mu_p, &mut f_pert)?;
                for k in 0..out.len() {
                    out[k] = (f_pert[k] - f_base[k]) / eps;
                }
                Ok(())
            },
            &neg_f,
            &mut krylov,
            1e-12,
            &mut delta,
        )?;

        if result.breakdown {
            tracing::warn!(
                iteration = iter,
                gmres_iterations = result.iterations,
                "GMRES breakdown in zero-horizon initializer; using partial solution"
            );
        }

        for k in 0..nuc {
            uc[k] += delta[k];
        }
        for k in 0..nub {
            v[k] += delta[nuc + k];
            mu[k] += delta[nuc + nub + k];
        }
    }

    Ok((
        uc,
        v,
        mu,
        Some(ConvergenceWarning { opterr, iterations }),
    ))
}
