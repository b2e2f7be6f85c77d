//! Burn-backed policy network. A feed-forward MLP over the stacked
//! observation vector, exported under the legacy action contract so the
//! rest of the pipeline treats it exactly like a loaded asset.

use std::collections::HashMap;

use burn::module::Module;
use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;

use crate::actions::AGENT_BRANCH_SIZES;

use super::InferenceError;
use super::model::{ApiVersion, InferenceEngine, InputDescriptor, Model, ModelInfo};
use super::tensor::{TensorProxy, names};

/// Network width settings for the policy MLP.
#[derive(Debug, Config)]
pub struct MlpPolicyConfig {
    /// Hidden layer size.
    #[config(default = 128)]
    pub hidden_size: usize,
    /// Number of hidden layers.
    #[config(default = 2)]
    pub num_layers: usize,
}

/// Branch-logit policy head. Input is one observation row, output is the
/// flat block of discrete branch logits.
#[derive(Module, Debug)]
pub struct MlpPolicy<B: Backend> {
    input: Linear<B>,
    hidden: Vec<Linear<B>>,
    output: Linear<B>,
    activation: Relu,
}

impl<B: Backend> MlpPolicy<B> {
    pub fn new(device: &B::Device, obs_size: usize, config: &MlpPolicyConfig) -> Self {
        let total_logits: usize = AGENT_BRANCH_SIZES.iter().sum();
        let input = LinearConfig::new(obs_size, config.hidden_size).init(device);
        let mut hidden = Vec::new();
        for _ in 0..config.num_layers.saturating_sub(1) {
            hidden.push(LinearConfig::new(config.hidden_size, config.hidden_size).init(device));
        }
        let output = LinearConfig::new(config.hidden_size, total_logits).init(device);
        Self { input, hidden, output, activation: Relu::new() }
    }

    pub fn forward(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = self.activation.forward(self.input.forward(obs));
        for layer in &self.hidden {
            x = self.activation.forward(layer.forward(x));
        }
        self.output.forward(x)
    }
}

/// Wraps an [`MlpPolicy`] as a [`Model`] under the legacy contract.
pub struct BurnModel<B: Backend> {
    info: ModelInfo,
    policy: MlpPolicy<B>,
    device: B::Device,
    obs_size: usize,
}

impl<B: Backend> BurnModel<B> {
    pub fn new(device: B::Device, obs_size: usize, config: &MlpPolicyConfig) -> Self {
        let total_logits: usize = AGENT_BRANCH_SIZES.iter().sum();
        let info = ModelInfo {
            api_version: ApiVersion::MlAgents1_0,
            inputs: vec![
                InputDescriptor::new(names::VECTOR_OBSERVATION, vec![-1, obs_size as i64]),
                InputDescriptor::new(names::ACTION_MASK, vec![-1, total_logits as i64]),
            ],
            output_names: vec![names::ACTION_DEPRECATED.to_owned()],
            memory_size: 0,
            continuous_output_size: 0,
            discrete_output_size: total_logits,
        };
        let policy = MlpPolicy::new(&device, obs_size, config);
        Self { info, policy, device, obs_size }
    }
}

impl<B: Backend> Model for BurnModel<B> {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn spawn_engine(&self) -> Result<Box<dyn InferenceEngine>, InferenceError> {
        Ok(Box::new(BurnEngine {
            policy: self.policy.clone(),
            device: self.device.clone(),
            obs_size: self.obs_size,
            outputs: HashMap::new(),
        }))
    }
}

struct BurnEngine<B: Backend> {
    policy: MlpPolicy<B>,
    device: B::Device,
    obs_size: usize,
    outputs: HashMap<String, TensorProxy>,
}

impl<B: Backend> InferenceEngine for BurnEngine<B> {
    fn execute(&mut self, inputs: &[TensorProxy]) -> Result<(), InferenceError> {
        let obs = inputs
            .iter()
            .find(|t| t.name == names::VECTOR_OBSERVATION)
            .ok_or_else(|| {
                InferenceError::Engine("missing vector_observation input".to_owned())
            })?;
        let batch_size = obs.batch_size();

        let obs_tensor: Tensor<B, 2> =
            Tensor::<B, 1>::from_floats(obs.data.as_slice(), &self.device)
                .reshape([batch_size as i32, self.obs_size as i32]);
        let logits = self.policy.forward(obs_tensor);
        let flat = logits
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| InferenceError::Engine(format!("logit readback failed: {e:?}")))?;

        let width: usize = AGENT_BRANCH_SIZES.iter().sum();
        let mut action = TensorProxy::new(names::ACTION_DEPRECATED, vec![-1, width as i64]);
        action.resize_batch(batch_size);
        action.data.copy_from_slice(&flat);

        self.outputs.clear();
        self.outputs.insert(action.name.clone(), action);
        Ok(())
    }

    fn output(&self, name: &str) -> Result<TensorProxy, InferenceError> {
        self.outputs
            .get(name)
            .cloned()
            .ok_or_else(|| InferenceError::Engine(format!("no output named {name}")))
    }
}
