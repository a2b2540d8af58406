//! The external collaborator: the user-supplied optimal control problem.
//!
//! This is the only interface the core consumes. The core never owns
//! simulation, logging, or serialization concerns — those live outside
//! this crate.

/// Capability set an optimal control problem must supply.
///
/// All evaluators write into caller-provided output slices so the hot
/// path performs no allocation. `synchronize` is the one documented
/// side effect: it may mutate whatever the OCP holds by shared
/// reference (e.g. a reference trajectory updated from another
/// thread) but must complete before `eval_*` is called for that
/// sample. Implementors that need interior mutation for `synchronize`
/// should reach for `RefCell`/`Cell` to mutate state behind a `&self`
/// trait method.
pub trait OcpModel {
    /// State dimension.
    fn nx(&self) -> usize;
    /// Control dimension.
    fn nu(&self) -> usize;
    /// Equality-constraint multiplier dimension.
    fn nc(&self) -> usize;
    /// Number of general inequality rows the OCP declares. This core
    /// only transforms bound constraints on controls via
    /// Fischer-Burmeister, so `nh` must equal `nub`; constructing a
    /// `Solver` validates this.
    fn nh(&self) -> usize;
    /// Number of bounded control slots.
    fn nub(&self) -> usize;

    /// Indices into the `nu`-length control vector that are bounded.
    fn ubound_indices(&self) -> &[usize];
    /// Lower bounds, parallel to `ubound_indices`.
    fn umin(&self) -> &[f64];
    /// Upper bounds, parallel to `ubound_indices`.
    fn umax(&self) -> &[f64];
    /// Dummy-input cost weight `w_j`, parallel to `ubound_indices`.
    fn dummy_weight(&self) -> &[f64];

    /// Side-effectful hook called once per `update()`, before any
    /// residual evaluation for that sample.
    fn synchronize(&self);

    /// Writes `dx = f(t, x, u)`, the state derivative.
    fn eval_f(&self, t: f64, x: &[f64], u: &[f64], dx: &mut [f64]);

    /// Writes `phix = d(phi)/dx(t_N, x_N)`, the terminal cost gradient.
    fn eval_phix(&self, t: f64, x: &[f64], phix: &mut [f64]);

    /// Writes `hx = dH/dx(t, x, uc, lambda)`.
    ///
    /// `uc` is the concatenation of control and equality-constraint
    /// multipliers, length `nu + nc`.
    fn eval_hx(&self, t: f64, x: &[f64], uc: &[f64], lambda: &[f64], hx: &mut [f64]);

    /// Writes `hu = dH/duc(t, x, uc, lambda)`.
    fn eval_hu(&self, t: f64, x: &[f64], uc: &[f64], lambda: &[f64], hu: &mut [f64]);
}
