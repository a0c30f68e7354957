use thiserror::Error;

/// Errors raised while building or running a value iteration problem.
///
/// Everything is checked when the pieces are constructed. Once an engine
/// exists, the Bellman backups themselves never fail.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown policy type '{0}', expected 'deterministic' or 'max_ent'")]
    UnknownPolicyType(String),

    #[error("temperature must be positive, got {0}")]
    InvalidTemperature(f64),

    #[error("discount must lie in [0, 1), got {0}")]
    InvalidDiscount(f64),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{name} has shape {found:?}, expected {expected:?}")]
    Shape {
        name: &'static str,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("transition row (state {state}, action {action}) is not a distribution (sum {sum})")]
    NotStochastic { state: usize, action: usize, sum: f64 },

    #[error("reward of (state {state}, action {action}, next state {next_state}) is infinite")]
    InfiniteReward { state: usize, action: usize, next_state: usize },

    #[error("state {state} is out of range for {num_states} states")]
    UnknownState { state: usize, num_states: usize },

    #[error("cannot sample from the policy row of state {state}: {reason}")]
    PolicyRow { state: usize, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    ConfigFile(#[from] config_file::ConfigFileError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Fail with [`Error::Shape`] when `found` differs from `expected`.
pub(crate) fn check_shape(name: &'static str, expected: &[usize], found: &[usize]) -> Result<()> {
    if expected != found {
        return Err(Error::Shape {
            name,
            expected: expected.to_vec(),
            found: found.to_vec(),
        });
    }
    Ok(())
}
