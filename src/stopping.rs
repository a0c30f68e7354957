use ndarray::{Array1, Zip};

use crate::env::TabularEnv;

/// Stopping rule for synchronous value iteration.
///
/// A run stops when the last sweep barely moved the values, or when the
/// contraction bound alone guarantees the remaining error is below
/// `precision`, whichever happens first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoppingRule {
    pub precision: f64,
    pub discount: f64,
    /// Largest absolute reward in the model
    pub rmax: f64,
}

impl StoppingRule {
    pub fn new(precision: f64, discount: f64, rmax: f64) -> StoppingRule {
        StoppingRule { precision, discount, rmax }
    }

    /// Rule for `env`, with `rmax` taken from its reward tensor. A NaN reward
    /// makes `rmax` NaN, so the worst-case bound can never fire.
    pub fn for_env<E: TabularEnv>(env: &E, precision: f64) -> StoppingRule {
        let rmax = env.rewards().iter().map(|r| r.abs()).fold(0.0, nan_max);
        StoppingRule::new(precision, env.discount(), rmax)
    }

    /// Largest per-state change allowed for the residual test.
    ///
    /// Note the denominator is `2γ/(1-γ)`, not its inverse. It is infinite
    /// when `γ = 0`.
    pub fn residual_threshold(&self) -> f64 {
        self.precision / (2.0 * self.discount / (1.0 - self.discount))
    }

    /// Bound on the error left after `iteration` sweeps from any start.
    pub fn worst_case_error(&self, iteration: usize) -> f64 {
        self.discount.powi(saturating_i32(iteration)) * self.rmax / (1.0 - self.discount)
    }

    /// First iteration at which the worst-case bound drops below `precision`,
    /// or `None` when the bound never drops that far.
    pub fn certified_iteration(&self) -> Option<usize> {
        let start = self.worst_case_error(0);
        if !start.is_finite() || !(self.precision > 0.0) {
            return None;
        }
        if start < self.precision {
            return Some(0);
        }
        if self.discount == 0.0 {
            return Some(1);
        }
        // Estimate from logs, then settle against the exact test so rounding
        // never shifts the answer.
        let estimate = ((self.precision / start).ln() / self.discount.ln()).floor();
        let mut n = if estimate.is_finite() && estimate > 0.0 { estimate as usize } else { 0 };
        while n > 0 && self.worst_case_error(n - 1) < self.precision {
            n -= 1;
        }
        while !(self.worst_case_error(n) < self.precision) {
            n += 1;
        }
        Some(n)
    }

    /// Sup-norm of the change made by the last sweep.
    pub fn residual(next_v: &Array1<f64>, v: &Array1<f64>) -> f64 {
        Zip::from(next_v).and(v).fold(0.0, |acc, a, b| nan_max(acc, (a - b).abs()))
    }

    /// `next_v` is `None` before the first sweep, when only the worst-case
    /// bound can stop the run.
    pub fn is_converged(&self, iteration: usize, next_v: Option<&Array1<f64>>, v: &Array1<f64>) -> bool {
        let small_residual = match next_v {
            Some(next_v) => StoppingRule::residual(next_v, v) < self.residual_threshold(),
            None => false,
        };
        let bounded = self.worst_case_error(iteration) < self.precision;
        log::debug!(
            "iteration {iteration}: small residual {small_residual}, bounded {bounded}"
        );
        small_residual || bounded
    }
}

/// `f64::max` that reports NaN instead of skipping it.
fn nan_max(acc: f64, x: f64) -> f64 {
    if acc.is_nan() || x.is_nan() { f64::NAN } else { acc.max(x) }
}

fn saturating_i32(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}
