//! Tiny synthetic OCPs used only by this crate's own unit and
//! integration tests. Not part of the public API — just enough surface
//! to exercise the residual, continuation, and facade machinery end to
//! end.

use crate::ocp::OcpModel;

/// Scalar stable linear system `dx/dt = -x + u` with quadratic control
/// cost `0.5 u^2`, terminal cost `0.5 x^2`, and one bounded control.
pub struct ScalarBoundedOcp {
    umin: [f64; 1],
    umax: [f64; 1],
    weight: [f64; 1],
    ubound_indices: [usize; 1],
}

impl ScalarBoundedOcp {
    pub fn new(umin: f64, umax: f64, weight: f64) -> Self {
        Self {
            umin: [umin],
            umax: [umax],
            weight: [weight],
            ubound_indices: [0],
        }
    }
}

impl OcpModel for ScalarBoundedOcp {
    fn nx(&self) -> usize {
        1
    }
    fn nu(&self) -> usize {
        1
    }
    fn nc(&self) -> usize {
        0
    }
    fn nh(&self) -> usize {
        1
    }
    fn nub(&self) -> usize {
        1
    }

    fn ubound_indices(&self) -> &[usize] {
        &self.ubound_indices
    }
    fn umin(&self) -> &[f64] {
        &self.umin
    }
    fn umax(&self) -> &[f64] {
        &self.umax
    }
    fn dummy_weight(&self) -> &[f64] {
        &self.weight
    }

    fn synchronize(&self) {}

    fn eval_f(&self, _t: f64, x: &[f64], u: &[f64], dx: &mut [f64]) {
        dx[0] = -x[0] + u[0];
    }

    fn eval_phix(&self, _t: f64, x: &[f64], phix: &mut [f64]) {
        phix[0] = x[0];
    }

    fn eval_hx(&self, _t: f64, _x: &[f64], _uc: &[f64], lambda: &[f64], hx: &mut [f64]) {
        hx[0] = -lambda[0];
    }

    fn eval_hu(&self, _t: f64, _x: &[f64], uc: &[f64], lambda: &[f64], hu: &mut [f64]) {
        hu[0] = uc[0] + lambda[0];
    }
}
