use ndarray::s;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use statrs::statistics::Statistics;

use crate::config::RolloutConfig;
use crate::env::TabularEnv;
use crate::error::{Error, Result};
use crate::policy::TabularPolicy;
use crate::render::{Frame, GridLayout};

/// Outcome of evaluating a policy with a batch of episodes.
#[derive(Debug, Clone, PartialEq)]
pub struct RolloutResult {
    pub average_return: f64,
    /// Rendered steps. Empty when rendering was off.
    pub frames: Vec<Frame>,
}

/// Runs episodes of `policy` in `env`.
pub trait Rollout<E: TabularEnv> {
    fn rollout(
        &mut self, env: &E, policy: &TabularPolicy, render: bool, num_rollouts: usize, iteration: usize,
    ) -> Result<RolloutResult>;
}

/// Samples episodes straight from the transition tensor.
///
/// Episodes start at `env.initial_state()` and last `horizon` steps. The
/// return of an episode is its undiscounted reward sum.
pub struct MonteCarloRollout {
    horizon: usize,
    rng: StdRng,
    /// Board used to draw the agent when rendering is requested
    layout: Option<GridLayout>,
}

impl MonteCarloRollout {
    pub fn new(config: &RolloutConfig) -> MonteCarloRollout {
        MonteCarloRollout {
            horizon: config.horizon,
            rng: StdRng::seed_from_u64(config.seed),
            layout: None,
        }
    }

    /// Draw the first episode of each rendered batch on `layout`.
    pub fn with_layout(mut self, layout: GridLayout) -> MonteCarloRollout {
        self.layout = Some(layout);
        self
    }

    fn episode<E: TabularEnv>(
        &mut self, env: &E, policy: &TabularPolicy, mut frames: Option<&mut Vec<Frame>>,
    ) -> Result<f64> {
        let mut state = env.initial_state();
        let mut total = 0.0;
        for _ in 0..self.horizon {
            if let (Some(frames), Some(layout)) = (frames.as_deref_mut(), self.layout) {
                frames.push(draw_agent(&layout, state));
            }
            let action = policy.sample_action(state, &mut self.rng)?;
            let row = env.transitions().slice(s![state, action, ..]);
            let next = WeightedIndex::<f64>::new(row.iter())
                .map_err(|_| Error::NotStochastic { state, action, sum: row.sum() })?
                .sample(&mut self.rng);
            total += env.rewards()[[state, action, next]];
            state = next;
        }
        Ok(total)
    }
}

impl<E: TabularEnv> Rollout<E> for MonteCarloRollout {
    fn rollout(
        &mut self, env: &E, policy: &TabularPolicy, render: bool, num_rollouts: usize, iteration: usize,
    ) -> Result<RolloutResult> {
        let mut frames = Vec::new();
        let mut returns = Vec::with_capacity(num_rollouts);
        for i in 0..num_rollouts {
            let sink = if render && i == 0 { Some(&mut frames) } else { None };
            returns.push(self.episode(env, policy, sink)?);
        }
        let average_return = returns.iter().mean();
        log::debug!(
            "iteration {iteration}: {num_rollouts} rollouts, return {average_return:.4} +/- {:.4}",
            returns.iter().std_dev()
        );
        Ok(RolloutResult { average_return, frames })
    }
}

fn draw_agent(layout: &GridLayout, agent: usize) -> Frame {
    layout.paint(|s| if s == agent { [255, 255, 255] } else { [32, 32, 32] })
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::TabularMdp;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn config(horizon: usize) -> RolloutConfig {
        RolloutConfig { horizon, seed: 42 }
    }

    #[test]
    fn chain_return_is_reward_once() {
        // Arrange
        let mdp = TabularMdp::chain(3, 2.0, 0.9).unwrap();
        let policy = TabularPolicy::uniform(3, 1);
        let mut rollout = MonteCarloRollout::new(&config(10));
        // Act
        let result = rollout.rollout(&mdp, &policy, false, 5, 0).unwrap();
        // Assert
        assert_abs_diff_eq!(result.average_return, 2.0, epsilon = 1e-12);
        assert!(result.frames.is_empty());
    }

    #[test]
    fn horizon_shorter_than_chain_earns_nothing() {
        let mdp = TabularMdp::chain(5, 1.0, 0.9).unwrap();
        let policy = TabularPolicy::uniform(5, 1);
        let mut rollout = MonteCarloRollout::new(&config(2));
        let result = rollout.rollout(&mdp, &policy, false, 3, 0).unwrap();
        assert_eq!(result.average_return, 0.0);
    }

    #[test]
    fn greedy_grid_policy_reaches_goal() {
        // Arrange: on a 1x3 corridor "right" always reaches the goal.
        let mdp = TabularMdp::grid_world(1, 3, 0.0, 1.0, 0.9).unwrap();
        let mut policy = TabularPolicy::zeros(3, 4);
        let mut probs = ndarray::Array2::<f64>::zeros((3, 4));
        probs.column_mut(1).fill(1.0);
        policy.update(probs).unwrap();
        let mut rollout = MonteCarloRollout::new(&config(20));
        // Act
        let result = rollout.rollout(&mdp, &policy, false, 4, 0).unwrap();
        // Assert
        assert_abs_diff_eq!(result.average_return, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn rendering_records_first_episode() {
        // Arrange
        let mdp = TabularMdp::chain(2, 1.0, 0.9).unwrap();
        let policy = TabularPolicy::uniform(2, 1);
        let layout = GridLayout::new(1, 2, 1);
        let mut rollout = MonteCarloRollout::new(&config(3)).with_layout(layout);
        // Act
        let result = rollout.rollout(&mdp, &policy, true, 4, 0).unwrap();
        // Assert
        assert_eq!(result.frames.len(), 3);
        assert_eq!(result.frames[0], array![[[255u8, 255, 255], [32, 32, 32]]]);
        assert_eq!(result.frames[1], array![[[32u8, 32, 32], [255, 255, 255]]]);
    }

    #[test]
    fn rendering_without_layout_has_no_frames() {
        let mdp = TabularMdp::chain(2, 1.0, 0.9).unwrap();
        let policy = TabularPolicy::uniform(2, 1);
        let mut rollout = MonteCarloRollout::new(&config(3));
        let result = rollout.rollout(&mdp, &policy, true, 1, 0).unwrap();
        assert!(result.frames.is_empty());
    }

    #[test]
    fn unset_policy_fails() {
        let mdp = TabularMdp::chain(2, 1.0, 0.9).unwrap();
        let policy = TabularPolicy::zeros(2, 1);
        let mut rollout = MonteCarloRollout::new(&config(3));
        let result = rollout.rollout(&mdp, &policy, false, 1, 0);
        assert!(matches!(result, Err(Error::PolicyRow { state: 0, .. })));
    }
}
