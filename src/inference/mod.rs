//! Batched neural-network inference: tensor plumbing, input generators,
//! output appliers, and the model runner that glues them to a policy.

pub mod appliers;
pub mod generators;
pub mod model;
pub mod policy;
pub mod runner;
pub mod scripted;
pub mod tensor;

#[cfg(feature = "rl")]
pub mod burn_engine;

use thiserror::Error;

/// Failures of the inference pipeline. Configuration mismatches between a
/// model and the agent wiring are fatal; they never degrade silently.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("unknown tensor expected as input: {0}")]
    UnknownInputTensor(String),

    #[error("unknown tensor expected as output: {0}")]
    UnknownOutputTensor(String),

    #[error("model reports unsupported api version {0}")]
    UnsupportedApiVersion(i64),

    #[error("model declares no output for its {0} actions")]
    MissingActionOutput(&'static str),

    #[error("sensor {name} has unsupported observation rank {rank}")]
    InvalidSensorRank { name: String, rank: usize },

    #[error(transparent)]
    MixedActionSpec(#[from] crate::actions::MixedActionSpecError),

    #[error("engine execution failed: {0}")]
    Engine(String),
}
