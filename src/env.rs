use ndarray::{Array3, Axis};
use serde::Deserialize;

use crate::error::{check_shape, Error, Result};

/// Tolerance for checking that a transition row sums to one.
const ROW_TOLERANCE: f64 = 1e-6;

/// Finite MDP model consumed by the value iteration engine.
///
/// Transition and reward tensors are indexed `[state, action, next state]`.
pub trait TabularEnv {
    fn transitions(&self) -> &Array3<f64>;

    fn rewards(&self) -> &Array3<f64>;

    fn discount(&self) -> f64;

    /// Time step of one environment transition. Only used to pick a video
    /// frame rate.
    fn dt(&self) -> f64 {
        0.1
    }

    /// State every rollout starts from.
    fn initial_state(&self) -> usize {
        0
    }

    fn num_states(&self) -> usize {
        self.transitions().dim().0
    }

    fn num_actions(&self) -> usize {
        self.transitions().dim().1
    }
}

/// Validated tabular MDP.
#[derive(Debug, Clone)]
pub struct TabularMdp {
    /// Transition probabilities. Indexes: state, action, next state
    transitions: Array3<f64>,
    /// Transition rewards. Indexes: state, action, next state
    rewards: Array3<f64>,
    /// Discount rate
    discount: f64,
    /// Seconds per step
    dt: f64,
    initial_state: usize,
}

impl TabularMdp {
    pub fn new(transitions: Array3<f64>, rewards: Array3<f64>, discount: f64) -> Result<TabularMdp> {
        let (n_s, n_a, n_next) = transitions.dim();
        if n_s == 0 || n_a == 0 {
            return Err(Error::InvalidConfig(String::from(
                "an MDP needs at least one state and one action",
            )));
        }
        check_shape("transitions", &[n_s, n_a, n_s], &[n_s, n_a, n_next])?;
        check_shape("rewards", transitions.shape(), rewards.shape())?;
        if !(0.0..1.0).contains(&discount) {
            return Err(Error::InvalidDiscount(discount));
        }
        for ((s, a), row) in transitions
            .lanes(Axis(2))
            .into_iter()
            .enumerate()
            .map(|(i, row)| ((i / n_a, i % n_a), row))
        {
            let sum = row.sum();
            // NaN fails both comparisons, so it is rejected here as well.
            let in_range = row.iter().all(|p| *p >= 0.0);
            if !in_range || !((sum - 1.0).abs() <= ROW_TOLERANCE) {
                return Err(Error::NotStochastic { state: s, action: a, sum });
            }
        }
        // NaN rewards are kept and show up in the values.
        if let Some(((s, a, next), _)) = rewards.indexed_iter().find(|(_, r)| r.is_infinite()) {
            return Err(Error::InfiniteReward { state: s, action: a, next_state: next });
        }
        Ok(TabularMdp {
            transitions,
            rewards,
            discount,
            dt: 0.1,
            initial_state: 0,
        })
    }

    /// Set the time step used for video frame rates.
    pub fn with_dt(mut self, dt: f64) -> Result<TabularMdp> {
        if !(dt > 0.0) {
            return Err(Error::InvalidConfig(format!("dt must be positive, got {dt}")));
        }
        self.dt = dt;
        Ok(self)
    }

    pub fn with_initial_state(mut self, state: usize) -> Result<TabularMdp> {
        let num_states = self.num_states();
        if state >= num_states {
            return Err(Error::UnknownState { state, num_states });
        }
        self.initial_state = state;
        Ok(self)
    }

    /// Corridor of `length` states with a single "advance" action.
    ///
    /// Stepping from the second to last state into the last one pays `reward`.
    /// The last state is absorbing and pays nothing. `chain(2, 1.0, 0.9)` has
    /// the fixed point `[1.0, 0.0]`.
    pub fn chain(length: usize, reward: f64, discount: f64) -> Result<TabularMdp> {
        if length < 2 {
            return Err(Error::InvalidConfig(format!(
                "a chain needs at least two states, got {length}"
            )));
        }
        let last = length - 1;
        let mut transitions = Array3::<f64>::zeros((length, 1, length));
        let mut rewards = Array3::<f64>::zeros((length, 1, length));
        for s in 0..length {
            let next = (s + 1).min(last);
            transitions[[s, 0, next]] = 1.0;
            if s + 1 == last {
                rewards[[s, 0, next]] = reward;
            }
        }
        TabularMdp::new(transitions, rewards, discount)
    }

    /// Grid world with four actions: up, right, down, left.
    ///
    /// States are numbered row-major. A move succeeds with probability
    /// `1 - slip`, otherwise the agent stays put. Bumping into a wall also
    /// stays put. The bottom-right cell is an absorbing goal and entering it
    /// pays `goal_reward`.
    pub fn grid_world(
        rows: usize, cols: usize, slip: f64, goal_reward: f64, discount: f64,
    ) -> Result<TabularMdp> {
        if rows == 0 || cols == 0 || rows * cols < 2 {
            return Err(Error::InvalidConfig(format!(
                "a grid needs at least two cells, got {rows}x{cols}"
            )));
        }
        if !(0.0..=1.0).contains(&slip) {
            return Err(Error::InvalidConfig(format!("slip must lie in [0, 1], got {slip}")));
        }
        let n_s = rows * cols;
        let goal = n_s - 1;
        let mut transitions = Array3::<f64>::zeros((n_s, 4, n_s));
        let mut rewards = Array3::<f64>::zeros((n_s, 4, n_s));
        for s in 0..n_s {
            let (r, c) = (s / cols, s % cols);
            for a in 0..4 {
                if s == goal {
                    transitions[[s, a, s]] = 1.0;
                    continue;
                }
                let next = match a {
                    0 if r > 0 => s - cols,
                    1 if c + 1 < cols => s + 1,
                    2 if r + 1 < rows => s + cols,
                    3 if c > 0 => s - 1,
                    _ => s,
                };
                transitions[[s, a, next]] += 1.0 - slip;
                transitions[[s, a, s]] += slip;
                if next == goal {
                    rewards[[s, a, next]] = goal_reward;
                }
            }
        }
        TabularMdp::new(transitions, rewards, discount)
    }
}

impl TabularEnv for TabularMdp {
    fn transitions(&self) -> &Array3<f64> {
        &self.transitions
    }

    fn rewards(&self) -> &Array3<f64> {
        &self.rewards
    }

    fn discount(&self) -> f64 {
        self.discount
    }

    fn dt(&self) -> f64 {
        self.dt
    }

    fn initial_state(&self) -> usize {
        self.initial_state
    }
}

/// Environment description read from a configuration file.
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnvSpec {
    Chain {
        length: usize,
        #[serde(default = "default_reward")]
        reward: f64,
        discount: f64,
    },
    Grid {
        rows: usize,
        cols: usize,
        #[serde(default)]
        slip: f64,
        #[serde(default = "default_reward")]
        goal_reward: f64,
        discount: f64,
    },
    /// Nested `[state][action][next state]` tables.
    Explicit {
        transitions: Vec<Vec<Vec<f64>>>,
        rewards: Vec<Vec<Vec<f64>>>,
        discount: f64,
        #[serde(default)]
        initial_state: usize,
        dt: Option<f64>,
    },
}

fn default_reward() -> f64 {
    1.0
}

impl EnvSpec {
    /// Rows and columns used to draw the states.
    pub fn board(&self) -> (usize, usize) {
        match self {
            EnvSpec::Chain { length, .. } => (1, *length),
            EnvSpec::Grid { rows, cols, .. } => (*rows, *cols),
            EnvSpec::Explicit { transitions, .. } => (1, transitions.len()),
        }
    }

    pub fn build(&self) -> Result<TabularMdp> {
        match self {
            EnvSpec::Chain { length, reward, discount } => {
                TabularMdp::chain(*length, *reward, *discount)
            }
            EnvSpec::Grid { rows, cols, slip, goal_reward, discount } => {
                TabularMdp::grid_world(*rows, *cols, *slip, *goal_reward, *discount)
            }
            EnvSpec::Explicit { transitions, rewards, discount, initial_state, dt } => {
                let t = nested_to_array("transitions", transitions)?;
                let r = nested_to_array("rewards", rewards)?;
                let mdp = TabularMdp::new(t, r, *discount)?.with_initial_state(*initial_state)?;
                match dt {
                    Some(dt) => mdp.with_dt(*dt),
                    None => Ok(mdp),
                }
            }
        }
    }
}

/// Convert ragged nested vectors into a dense tensor, rejecting ragged input.
fn nested_to_array(name: &'static str, nested: &[Vec<Vec<f64>>]) -> Result<Array3<f64>> {
    let n_s = nested.len();
    let n_a = nested.first().map_or(0, |actions| actions.len());
    let n_next = nested
        .first()
        .and_then(|actions| actions.first())
        .map_or(0, |row| row.len());
    let mut array = Array3::<f64>::zeros((n_s, n_a, n_next));
    for (s, actions) in nested.iter().enumerate() {
        for (a, row) in actions.iter().enumerate() {
            check_shape(name, &[n_s, n_a, n_next], &[n_s, actions.len(), row.len()])?;
            for (next, p) in row.iter().enumerate() {
                array[[s, a, next]] = *p;
            }
        }
        // An empty action list never enters the loop above.
        check_shape(name, &[n_s, n_a, n_next], &[n_s, actions.len(), n_next])?;
    }
    Ok(array)
}
