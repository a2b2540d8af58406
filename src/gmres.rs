//! Matrix-free GMRES(k_max).
//!
//! Arnoldi process with Givens-rotation least squares, restricted to a
//! very small Krylov dimension. No reorthogonalization: `k_max` is
//! small enough (typically <= 10) that classical Gram-Schmidt is
//! adequate.

use ndarray::{Array1, Array2, ArrayView1};

use crate::error::{McpError, McpResult};

/// Reusable Krylov workspace: basis `V`, upper-Hessenberg `H`, the
/// accumulated Givens rotation state, and the scratch buffers the
/// Arnoldi loop and back-substitution write into. Sized once from
/// `dim` and `k_max`, then reused every call — `gmres` performs no
/// heap allocation of its own once this workspace exists.
#[derive(Debug, Clone)]
pub struct KrylovWorkspace {
    v: Array2<f64>,
    h: Array2<f64>,
    cs: Vec<f64>,
    sn: Vec<f64>,
    g: Vec<f64>,
    /// Candidate Arnoldi vector, written by the caller's operator and
    /// then orthogonalized in place.
    w: Array1<f64>,
    /// Back-substitution unknowns, valid in `0..k_eff`.
    y: Vec<f64>,
    k_max: usize,
}

impl KrylovWorkspace {
    pub fn new(dim: usize, k_max: usize) -> Self {
        Self {
            v: Array2::zeros((dim, k_max + 1)),
            h: Array2::zeros((k_max + 1, k_max)),
            cs: vec![0.0; k_max],
            sn: vec![0.0; k_max],
            g: vec![0.0; k_max + 1],
            w: Array1::zeros(dim),
            y: vec![0.0; k_max],
            k_max,
        }
    }
}

/// Outcome of one GMRES(k_max) solve. The solution itself is written
/// into the caller-supplied `delta_out` buffer rather than owned here.
#[derive(Debug, Clone)]
pub struct GmresResult {
    pub residual_norm: f64,
    pub iterations: usize,
    /// Set when the Arnoldi process broke down before `k_max` and the
    /// solution was truncated to the current subspace.
    pub breakdown: bool,
}

/// Solves `A . delta = b` via GMRES(k_max), warm-started at `delta = 0`,
/// writing the solution into `delta_out`.
///
/// `apply_a` computes a directional Jacobian-vector product, writing
/// its result into the output buffer it is given; the core supplies a
/// finite-difference closure that reuses its own scratch state across
/// calls so this solve performs no per-iteration heap allocation.
pub fn gmres<F>(
    mut apply_a: F,
    b: &Array1<f64>,
    ws: &mut KrylovWorkspace,
    breakdown_floor: f64,
    delta_out: &mut Array1<f64>,
) -> McpResult<GmresResult>
where
    F: FnMut(ArrayView1<f64>, &mut Array1<f64>) -> McpResult<()>,
{
    let k_max = ws.k_max;
    let beta = b.dot(b).sqrt();

    if !beta.is_finite() {
        return Err(McpError::Numerical("non-finite RHS norm in GMRES".into()));
    }

    if beta < breakdown_floor {
        // b ~ 0: delta = 0 already solves it.
        delta_out.fill(0.0);
        return Ok(GmresResult {
            residual_norm: beta,
            iterations: 0,
            breakdown: false,
        });
    }

    ws.v.column_mut(0).assign(b);
    ws.v.column_mut(0).mapv_inplace(|x| x / beta);
    ws.g[0] = beta;
    for g in ws.g.iter_mut().skip(1) {
        *g = 0.0;
    }

    let mut k_eff = k_max;
    let mut breakdown = false;

    for j in 0..k_max {
        apply_a(ws.v.column(j), &mut ws.w)?;
        if ws.w.iter().any(|x| !x.is_finite()) {
            return Err(McpError::Numerical("non-finite Jacobian-vector product in GMRES".into()));
        }

        // Modified Gram-Schmidt against the existing basis.
        for i in 0..=j {
            let vi = ws.v.column(i);
            let hij = ws.w.dot(&vi);
            ws.h[[i, j]] = hij;
            ws.w.scaled_add(-hij, &vi);
        }
        let h_next = ws.w.dot(&ws.w).sqrt();
        ws.h[[j + 1, j]] = h_next;

        if h_next < breakdown_floor {
            k_eff = j + 1;
            breakdown = true;
            break;
        }
        ws.v.column_mut(j + 1).assign(&ws.w);
        ws.v.column_mut(j + 1).mapv_inplace(|x| x / h_next);

        // Apply previously stored Givens rotations to column j.
        for i in 0..j {
            let (c, s) = (ws.cs[i], ws.sn[i]);
            let h_i = ws.h[[i, j]];
            let h_ip1 = ws.h[[i + 1, j]];
            ws.h[[i, j]] = c * h_i + s * h_ip1;
            ws.h[[i + 1, j]] = -s * h_i + c * h_ip1;
        }

        // New rotation zeroing H[j+1, j].
        let hjj = ws.h[[j, j]];
        let hj1j = ws.h[[j + 1, j]];
        let denom = (hjj * hjj + hj1j * hj1j).sqrt();
        let (c, s) = if denom < f64::EPSILON {
            (1.0, 0.0)
        } else {
            (hjj / denom, hj1j / denom)
        };
        ws.cs[j] = c;
        ws.sn[j] = s;
        ws.h[[j, j]] = c * hjj + s * hj1j;
        ws.h[[j + 1, j]] = 0.0;

        let g_j = ws.g[j];
        let g_j1 = ws.g[j + 1];
        ws.g[j] = c * g_j + s * g_j1;
        ws.g[j + 1] = -s * g_j + c * g_j1;
    }

    let residual_norm = ws.g[k_eff].abs();

    // Back-solve the k_eff x k_eff upper-triangular system H . y = g.
    for i in (0..k_eff).rev() {
        let mut sum = ws.g[i];
        for j in (i + 1)..k_eff {
            sum -= ws.h[[i, j]] * ws.y[j];
        }
        let diag = ws.h[[i, i]];
        ws.y[i] = if diag.abs() > f64::EPSILON { sum / diag } else { 0.0 };
    }

    delta_out.fill(0.0);
    for i in 0..k_eff {
        delta_out.scaled_add(ws.y[i], &ws.v.column(i));
    }

    Ok(GmresResult {
        residual_norm,
        iterations: k_eff,
        breakdown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    /// Dense SPD matvec for tests; GMRES itself never sees the matrix.
    fn spd_matvec(a: &Array2<f64>, v: ArrayView1<f64>, out: &mut Array1<f64>) -> McpResult<()> {
        out.assign(&a.dot(&v));
        Ok(())
    }

    #[test]
    fn converges_on_small_spd_system() {
        let a = array![[4.0, 1.0, 0.0], [1.0, 3.0, 1.0], [0.0, 1.0, 2.0]];
        let x_true = array![1.0, -2.0, 0.5];
        let b = a.dot(&x_true);

        let mut ws = KrylovWorkspace::new(3, 3);
        let mut delta = Array1::zeros(3);
        let result = gmres(|v, out| spd_matvec(&a, v, out), &b, &mut ws, 1e-13, &mut delta).unwrap();

        let residual = &a.dot(&delta) - &b;
        let rnorm = residual.dot(&residual).sqrt();
        assert!(rnorm < 1e-8 * b.dot(&b).sqrt().max(1.0), "residual too large: {rnorm}");
        assert_relative_eq!(delta[0], x_true[0], epsilon = 1e-6);
        assert_relative_eq!(delta[1], x_true[1], epsilon = 1e-6);
        assert_relative_eq!(delta[2], x_true[2], epsilon = 1e-6);
        assert_eq!(result.iterations.min(3), result.iterations);
    }

    #[test]
    fn zero_rhs_returns_zero_delta() {
        let a = array![[2.0, 0.0], [0.0, 2.0]];
        let b = array![0.0, 0.0];
        let mut ws = KrylovWorkspace::new(2, 2);
        let mut delta = array![9.0, 9.0];
        let result = gmres(|v, out| spd_matvec(&a, v, out), &b, &mut ws, 1e-12, &mut delta).unwrap();
        assert_eq!(result.iterations, 0);
        assert_eq!(delta, array![0.0, 0.0]);
    }

    #[test]
    fn rank_deficient_operator_breaks_down_gracefully() {
        // Rank-1 operator: Krylov subspace collapses after one step.
        let a = array![[1.0, 0.0], [0.0, 0.0]];
        let b = array![3.0, 0.0];
        let mut ws = KrylovWorkspace::new(2, 4);
        let mut delta = Array1::zeros(2);
        let result = gmres(|v, out| spd_matvec(&a, v, out), &b, &mut ws, 1e-10, &mut delta).unwrap();
        assert!(delta[0].is_finite());
        assert!(result.iterations <= 4);
    }

    #[test]
    fn rejects_nonfinite_operator_output() {
        let b = array![1.0, 0.0];
        let mut ws = KrylovWorkspace::new(2, 2);
        let mut delta = Array1::zeros(2);
        let result = gmres(
            |_v, out: &mut Array1<f64>| {
                out.assign(&array![f64::NAN, 0.0]);
                Ok(())
            },
            &b,
            &mut ws,
            1e-12,
            &mut delta,
        );
        assert!(result.is_err());
    }
}
