use ndarray::{Array2, ArrayView1};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::error::{check_shape, Error, Result};

/// Tabular stochastic policy.
///
/// Row `s` holds the action-selection probabilities in state `s`. A
/// deterministic policy is stored as one-hot rows.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularPolicy {
    /// Indexes: state, action
    probs: Array2<f64>,
}

impl TabularPolicy {
    /// Policy with every row zero. Not usable for sampling until updated.
    pub fn zeros(num_states: usize, num_actions: usize) -> TabularPolicy {
        TabularPolicy { probs: Array2::<f64>::zeros((num_states, num_actions)) }
    }

    pub fn uniform(num_states: usize, num_actions: usize) -> TabularPolicy {
        let p = 1.0 / num_actions as f64;
        TabularPolicy { probs: Array2::<f64>::from_elem((num_states, num_actions), p) }
    }

    pub fn num_states(&self) -> usize {
        self.probs.dim().0
    }

    pub fn num_actions(&self) -> usize {
        self.probs.dim().1
    }

    pub fn probs(&self) -> &Array2<f64> {
        &self.probs
    }

    pub fn action_probs(&self, state: usize) -> Result<ArrayView1<'_, f64>> {
        self.check_state(state)?;
        Ok(self.probs.row(state))
    }

    /// Replace the whole table.
    pub fn update(&mut self, probs: Array2<f64>) -> Result<()> {
        check_shape("policy", self.probs.shape(), probs.shape())?;
        self.probs = probs;
        Ok(())
    }

    /// Most probable action, lowest index on ties.
    pub fn greedy_action(&self, state: usize) -> Result<usize> {
        let row = self.action_probs(state)?;
        let mut best = 0;
        for (a, p) in row.iter().enumerate() {
            if *p > row[best] {
                best = a;
            }
        }
        Ok(best)
    }

    /// Draw an action from the row of `state`.
    pub fn sample_action<R: Rng + ?Sized>(&self, state: usize, rng: &mut R) -> Result<usize> {
        let row = self.action_probs(state)?;
        let dist = WeightedIndex::<f64>::new(row.iter())
            .map_err(|e| Error::PolicyRow { state, reason: e.to_string() })?;
        Ok(dist.sample(rng))
    }

    fn check_state(&self, state: usize) -> Result<()> {
        if state >= self.num_states() {
            return Err(Error::UnknownState { state, num_states: self.num_states() });
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn build_default_policy() {
        // Act
        let pi = TabularPolicy::zeros(5, 3);
        // Assert
        assert_eq!(pi.probs().dim(), (5, 3));
        assert_eq!(pi.probs()[[0, 0]], 0.0);
    }

    #[test]
    fn uniform_rows_sum_to_one() {
        let pi = TabularPolicy::uniform(3, 4);
        for row in pi.probs().rows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn update_rejects_wrong_shape() {
        // Arrange
        let mut pi = TabularPolicy::zeros(2, 2);
        // Act
        let result = pi.update(Array2::<f64>::zeros((2, 3)));
        // Assert
        assert!(matches!(result, Err(Error::Shape { name: "policy", .. })));
    }

    #[test]
    fn greedy_action_prefers_lowest_index() {
        // Arrange
        let mut pi = TabularPolicy::zeros(2, 3);
        pi.update(array![[0.2, 0.4, 0.4], [1.0, 0.0, 0.0]]).unwrap();
        // Act / Assert
        assert_eq!(pi.greedy_action(0).unwrap(), 1);
        assert_eq!(pi.greedy_action(1).unwrap(), 0);
    }

    #[test]
    fn sample_one_hot_row() {
        // Arrange
        let mut pi = TabularPolicy::zeros(1, 3);
        pi.update(array![[0.0, 0.0, 1.0]]).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        // Act / Assert
        for _ in 0..20 {
            assert_eq!(pi.sample_action(0, &mut rng).unwrap(), 2);
        }
    }

    #[test]
    fn sample_all_zero_row_fails() {
        let pi = TabularPolicy::zeros(1, 2);
        let mut rng = StdRng::seed_from_u64(0);
        let result = pi.sample_action(0, &mut rng);
        assert!(matches!(result, Err(Error::PolicyRow { state: 0, .. })));
    }

    #[test]
    fn unknown_state_fails() {
        let pi = TabularPolicy::uniform(2, 2);
        assert!(matches!(pi.greedy_action(2), Err(Error::UnknownState { .. })));
    }
}
