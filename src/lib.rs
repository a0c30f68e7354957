//! Tabular value iteration for finite Markov decision processes.
//!
//! [`engine::ValueIteration`] runs synchronous Bellman backups, either the
//! hard max or the temperature-scaled soft max, over a [`env::TabularEnv`]
//! and writes the results into caller-owned [`value::TabularValueFun`] and
//! [`policy::TabularPolicy`] containers. Rollouts, rendering and progress
//! files are collaborators passed to [`engine::ValueIteration::train`].

pub mod config;
pub mod engine;
pub mod env;
pub mod error;
pub mod logger;
pub mod policy;
pub mod render;
pub mod rollout;
pub mod stopping;
pub mod value;

pub use config::{EngineConfig, PolicyType};
pub use engine::{Backup, TrainReport, ValueIteration};
pub use env::{TabularEnv, TabularMdp};
pub use error::{Error, Result};
pub use policy::TabularPolicy;
pub use value::TabularValueFun;
