//! Horizon schedule T(t).
//!
//! Lets the prediction horizon grow from 0 into its nominal length so
//! the very first continuation steps solve a well-posed, near-trivial
//! problem instead of a cold, full-length one.

use crate::error::{McpError, McpResult};

/// Configuration for the horizon length schedule `T(t)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HorizonConfig {
    /// Nominal (asymptotic) horizon length, `T_f > 0`.
    t_f: f64,
    /// Growth rate. `alpha == 0.0` disables growth: `T(t) == t_f` always.
    alpha: f64,
    /// Anchor time at which growth starts (`T(t_0) == 0` when `alpha > 0`).
    t0: f64,
}

impl HorizonConfig {
    /// Builds a horizon schedule, validating `T_f > 0` and `alpha >= 0`
    /// eagerly so a misconfiguration fails loudly at construction,
    /// never inside the hot loop.
    pub fn new(t_f: f64, alpha: f64, t0: f64) -> McpResult<Self> {
        if !(t_f > 0.0) {
            return Err(McpError::Configuration(format!(
                "horizon T_f must be > 0, got {t_f}"
            )));
        }
        if alpha < 0.0 {
            return Err(McpError::Configuration(format!(
                "horizon growth rate alpha must be >= 0, got {alpha}"
            )));
        }
        Ok(Self { t_f, alpha, t0 })
    }

    /// Nominal horizon length.
    pub fn t_f(&self) -> f64 {
        self.t_f
    }

    /// Horizon length at time `t`: monotone non-decreasing, bounded by
    /// `T_f`, equal to 0 at `t == t0` when `alpha > 0`.
    pub fn horizon_at(&self, t: f64) -> f64 {
        if self.alpha > 0.0 {
            self.t_f * (1.0 - (-self.alpha * (t - self.t0)).exp())
        } else {
            self.t_f
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn flat_horizon_is_constant() {
        let h = HorizonConfig::new(2.0, 0.0, 0.0).unwrap();
        assert_eq!(h.horizon_at(0.0), 2.0);
        assert_eq!(h.horizon_at(100.0), 2.0);
    }

    #[test]
    fn horizon_matches_exponential_growth_formula() {
        let h = HorizonConfig::new(2.0, 1.0, 0.0).unwrap();
        assert_relative_eq!(h.horizon_at(0.0), 0.0, epsilon = 1e-12);
        assert_relative_eq!(h.horizon_at(1.0), 2.0 * (1.0 - (-1.0_f64).exp()), epsilon = 1e-12);
        assert_relative_eq!(h.horizon_at(1000.0), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn monotone_non_decreasing() {
        let h = HorizonConfig::new(2.0, 0.7, -3.0).unwrap();
        let mut prev = h.horizon_at(-3.0);
        let mut t = -3.0;
        for _ in 0..50 {
            t += 0.1;
            let cur = h.horizon_at(t);
            assert!(cur + 1e-12 >= prev, "horizon decreased: {prev} -> {cur}");
            assert!(cur <= h.t_f() + 1e-12);
            prev = cur;
        }
    }

    #[test]
    fn rejects_nonpositive_tf() {
        assert!(HorizonConfig::new(0.0, 0.0, 0.0).is_err());
        assert!(HorizonConfig::new(-1.0, 0.0, 0.0).is_err());
    }

    #[test]
    fn rejects_negative_alpha() {
        assert!(HorizonConfig::new(1.0, -0.1, 0.0).is_err());
    }
}
