use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::engine::Backup;
use crate::env::EnvSpec;
use crate::error::{Error, Result};

/// Which Bellman backup and policy extraction the engine uses.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PolicyType {
    /// Hard max over actions, one-hot greedy policy.
    Deterministic,
    /// Temperature-scaled log-sum-exp, softmax policy.
    MaxEnt,
}

impl FromStr for PolicyType {
    type Err = Error;

    fn from_str(s: &str) -> Result<PolicyType> {
        match s {
            "deterministic" => Ok(PolicyType::Deterministic),
            "max_ent" => Ok(PolicyType::MaxEnt),
            other => Err(Error::UnknownPolicyType(other.to_string())),
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PolicyType::Deterministic => write!(f, "deterministic"),
            PolicyType::MaxEnt => write!(f, "max_ent"),
        }
    }
}

/// Settings of one value iteration run.
///
/// Every field has a default, so an empty `[engine]` table is valid.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Tolerance on the final values
    pub precision: f64,
    /// Iterations between policy refreshes, rollouts and log records
    pub log_itr: usize,
    /// Iterations between rendered frames
    pub render_itr: usize,
    /// "deterministic" or "max_ent", checked when the engine is built
    pub policy_type: String,
    pub max_itr: usize,
    pub render: bool,
    pub num_rollouts: usize,
    /// Softmax temperature. Ignored by deterministic runs.
    pub temperature: f64,
}

impl Default for EngineConfig {
    fn default() -> EngineConfig {
        EngineConfig {
            precision: 1e-3,
            log_itr: 1,
            render_itr: 2,
            policy_type: PolicyType::Deterministic.to_string(),
            max_itr: 50,
            render: true,
            num_rollouts: 20,
            temperature: 1.0,
        }
    }
}

impl EngineConfig {
    pub fn policy_type(&self) -> Result<PolicyType> {
        self.policy_type.parse()
    }

    /// Check every field and resolve the backup mode.
    pub fn backup(&self) -> Result<Backup> {
        if !(self.precision > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "precision must be positive, got {}", self.precision
            )));
        }
        if self.log_itr == 0 {
            return Err(Error::InvalidConfig(String::from("log_itr must be at least 1")));
        }
        if self.render_itr == 0 {
            return Err(Error::InvalidConfig(String::from("render_itr must be at least 1")));
        }
        if self.num_rollouts == 0 {
            return Err(Error::InvalidConfig(String::from("num_rollouts must be at least 1")));
        }
        match self.policy_type()? {
            PolicyType::Deterministic => Ok(Backup::Max),
            PolicyType::MaxEnt => {
                if !(self.temperature > 0.0) {
                    return Err(Error::InvalidTemperature(self.temperature));
                }
                Ok(Backup::Soft { temperature: self.temperature })
            }
        }
    }
}

/// Settings of the sampling rollout collector.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RolloutConfig {
    /// Steps per episode
    pub horizon: usize,
    pub seed: u64,
}

impl Default for RolloutConfig {
    fn default() -> RolloutConfig {
        RolloutConfig { horizon: 100, seed: 0 }
    }
}

/// Where progress files go.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> OutputConfig {
        OutputConfig { dir: PathBuf::from("data") }
    }
}

/// Contents of a run configuration file.
#[derive(Deserialize, Debug, Clone)]
pub struct RunConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub rollout: RolloutConfig,
    #[serde(default)]
    pub output: OutputConfig,
    pub env: EnvSpec,
}


#[cfg(test)]
mod tests {
    use super::*;
    use config_file::FromConfigFile;
    use std::path::Path;
    use test_case::test_case;

    #[test]
    fn defaults() {
        // Act
        let config = EngineConfig::default();
        // Assert
        assert_eq!(config.precision, 1e-3);
        assert_eq!(config.log_itr, 1);
        assert_eq!(config.render_itr, 2);
        assert_eq!(config.policy_type().unwrap(), PolicyType::Deterministic);
        assert_eq!(config.max_itr, 50);
        assert!(config.render);
        assert_eq!(config.num_rollouts, 20);
        assert_eq!(config.temperature, 1.0);
        assert_eq!(config.backup().unwrap(), Backup::Max);
    }

    #[test_case("deterministic", PolicyType::Deterministic; "Deterministic policy")]
    #[test_case("max_ent", PolicyType::MaxEnt; "Maximum entropy policy")]
    fn parse_policy_type(name: &str, expected: PolicyType) {
        assert_eq!(name.parse::<PolicyType>().unwrap(), expected);
        assert_eq!(expected.to_string(), name);
    }

    #[test_case("stochastic"; "Unknown name")]
    #[test_case("MaxEnt"; "Wrong case")]
    #[test_case(""; "Empty name")]
    fn reject_unknown_policy_type(name: &str) {
        // Arrange
        let config = EngineConfig { policy_type: name.to_string(), ..EngineConfig::default() };
        // Act
        let result = config.backup();
        // Assert
        assert!(matches!(result, Err(Error::UnknownPolicyType(_))));
    }

    #[test]
    fn max_ent_carries_temperature() {
        let config = EngineConfig {
            policy_type: String::from("max_ent"),
            temperature: 0.5,
            ..EngineConfig::default()
        };
        assert_eq!(config.backup().unwrap(), Backup::Soft { temperature: 0.5 });
    }

    #[test_case(0.0; "Zero temperature")]
    #[test_case(-1.0; "Negative temperature")]
    #[test_case(f64::NAN; "NaN temperature")]
    fn reject_bad_temperature(temperature: f64) {
        let config = EngineConfig {
            policy_type: String::from("max_ent"),
            temperature,
            ..EngineConfig::default()
        };
        assert!(matches!(config.backup(), Err(Error::InvalidTemperature(_))));
    }

    #[test]
    fn deterministic_ignores_temperature() {
        let config = EngineConfig { temperature: -3.0, ..EngineConfig::default() };
        assert_eq!(config.backup().unwrap(), Backup::Max);
    }

    #[test_case(EngineConfig { log_itr: 0, ..EngineConfig::default() }; "Zero log interval")]
    #[test_case(EngineConfig { render_itr: 0, ..EngineConfig::default() }; "Zero render interval")]
    #[test_case(EngineConfig { precision: 0.0, ..EngineConfig::default() }; "Zero precision")]
    #[test_case(EngineConfig { num_rollouts: 0, ..EngineConfig::default() }; "No rollouts")]
    fn reject_invalid_settings(config: EngineConfig) {
        assert!(matches!(config.backup(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn load_grid_config() {
        // Arrange
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("configs/grid.toml");
        // Act
        let config = RunConfig::from_config_file(&path).unwrap();
        // Assert
        assert_eq!(config.engine, EngineConfig::default());
        assert_eq!(config.rollout, RolloutConfig { horizon: 50, seed: 7 });
        assert_eq!(config.output.dir, PathBuf::from("data/grid"));
        assert_eq!(config.env.board(), (4, 4));
    }

    #[test]
    fn load_partial_config_fills_defaults() {
        // Arrange
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("configs/chain_max_ent.toml");
        // Act
        let config = RunConfig::from_config_file(&path).unwrap();
        let mdp = config.env.build().unwrap();
        // Assert
        assert_eq!(config.engine.backup().unwrap(), Backup::Soft { temperature: 0.5 });
        assert_eq!(config.engine.max_itr, 50);
        assert_eq!(config.rollout, RolloutConfig::default());
        assert_eq!(crate::env::TabularEnv::num_states(&mdp), 2);
    }
}
