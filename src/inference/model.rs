//! Model metadata and the engine abstraction the runner executes against.

use std::rc::Rc;

use super::InferenceError;
use super::tensor::{TensorProxy, names};

/// Contract generation a model was exported under. The two generations
/// differ in observation naming and in how discrete actions come out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    /// Legacy contract: shared vector observation input, discrete output
    /// is a flat block of branch logits the applier must sample from.
    MlAgents1_0,
    /// Per-sensor observation inputs, discrete output carries already
    /// sampled action indices.
    MlAgents2_0,
}

impl ApiVersion {
    pub fn from_version_tag(tag: i64) -> Result<Self, InferenceError> {
        match tag {
            1 => Ok(ApiVersion::MlAgents1_0),
            2 => Ok(ApiVersion::MlAgents2_0),
            other => Err(InferenceError::UnsupportedApiVersion(other)),
        }
    }
}

/// One named model input and its batch-first shape.
#[derive(Debug, Clone, PartialEq)]
pub struct InputDescriptor {
    pub name: String,
    pub shape: Vec<i64>,
}

impl InputDescriptor {
    pub fn new(name: impl Into<String>, shape: Vec<i64>) -> Self {
        Self { name: name.into(), shape }
    }
}

/// Everything the pipeline needs to know about a model without running it.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub api_version: ApiVersion,
    pub inputs: Vec<InputDescriptor>,
    pub output_names: Vec<String>,
    /// Recurrent state width, zero for feed-forward models.
    pub memory_size: usize,
    pub continuous_output_size: usize,
    /// Total discrete output width: summed branch logits for the legacy
    /// contract, one index per branch otherwise.
    pub discrete_output_size: usize,
}

impl ModelInfo {
    pub fn has_continuous_outputs(&self) -> bool {
        self.continuous_output_size > 0
    }

    pub fn has_discrete_outputs(&self) -> bool {
        self.discrete_output_size > 0
    }

    /// Whether one model may emit both action kinds at once.
    pub fn supports_continuous_and_discrete(&self) -> bool {
        self.api_version == ApiVersion::MlAgents2_0
    }

    pub fn continuous_output_name(&self) -> &'static str {
        match self.api_version {
            ApiVersion::MlAgents1_0 => names::ACTION_DEPRECATED,
            ApiVersion::MlAgents2_0 => names::CONTINUOUS_ACTIONS,
        }
    }

    pub fn discrete_output_name(&self) -> &'static str {
        match self.api_version {
            ApiVersion::MlAgents1_0 => names::ACTION_DEPRECATED,
            ApiVersion::MlAgents2_0 => names::DISCRETE_ACTIONS,
        }
    }

    /// Validates internal consistency. A model that advertises actions or
    /// memories but lacks the matching tensors is misconfigured.
    pub fn check(&self) -> Result<(), InferenceError> {
        if self.has_discrete_outputs()
            && !self.output_names.iter().any(|n| n == self.discrete_output_name())
        {
            return Err(InferenceError::MissingActionOutput("discrete"));
        }
        if self.has_continuous_outputs()
            && !self.output_names.iter().any(|n| n == self.continuous_output_name())
        {
            return Err(InferenceError::MissingActionOutput("continuous"));
        }
        if self.memory_size > 0 {
            let has_in = self.inputs.iter().any(|i| i.name == names::RECURRENT_IN);
            let has_out = self.output_names.iter().any(|n| n == names::RECURRENT_OUT);
            if !has_in || !has_out {
                return Err(InferenceError::UnknownInputTensor(
                    names::RECURRENT_IN.to_owned(),
                ));
            }
        }
        Ok(())
    }
}

/// A loaded network ready to run one batch at a time. Engines keep their
/// outputs available until the next `execute`.
pub trait InferenceEngine {
    fn execute(&mut self, inputs: &[TensorProxy]) -> Result<(), InferenceError>;

    fn output(&self, name: &str) -> Result<TensorProxy, InferenceError>;
}

/// A model asset. Cheap to clone by handle; runners compare handles by
/// pointer identity when deciding whether they can be shared.
pub trait Model {
    fn info(&self) -> &ModelInfo;

    fn spawn_engine(&self) -> Result<Box<dyn InferenceEngine>, InferenceError>;
}

pub type ModelHandle = Rc<dyn Model>;

/// Identity, not equality: two separately loaded copies of the same
/// weights are different models for hot-swap purposes.
pub fn same_model(a: &ModelHandle, b: &ModelHandle) -> bool {
    Rc::ptr_eq(a, b)
}
