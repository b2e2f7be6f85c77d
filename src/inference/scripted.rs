//! A weightless model that always prefers one fixed action. It exercises
//! the whole pipeline (tensors, masks, sessions) without trained weights,
//! and serves as the fallback policy when no network asset is configured.

use std::collections::HashMap;

use crate::actions::{ActionVector, AGENT_BRANCH_SIZES};

use super::InferenceError;
use super::model::{ApiVersion, InferenceEngine, InputDescriptor, Model, ModelInfo};
use super::tensor::{TensorProxy, names};

/// Legacy-contract model whose action output is a constant logit row
/// favoring one action vector.
pub struct ScriptedModel {
    info: ModelInfo,
    logits: Vec<f32>,
}

impl ScriptedModel {
    /// Builds a model over `obs_size` observation floats that prefers
    /// `action` on every branch. Masked branches fall back through the
    /// applier as usual.
    pub fn preferring(obs_size: usize, action: ActionVector) -> Self {
        let total_logits: usize = AGENT_BRANCH_SIZES.iter().sum();
        let mut logits = vec![0.0; total_logits];
        let discrete = action.to_discrete();
        let mut offset = 0;
        for (branch, &size) in AGENT_BRANCH_SIZES.iter().enumerate() {
            logits[offset + discrete[branch] as usize] = 5.0;
            offset += size;
        }

        let info = ModelInfo {
            api_version: ApiVersion::MlAgents1_0,
            inputs: vec![
                InputDescriptor::new(names::VECTOR_OBSERVATION, vec![-1, obs_size as i64]),
                InputDescriptor::new(names::ACTION_MASK, vec![-1, total_logits as i64]),
            ],
            output_names: vec![
                names::ACTION_DEPRECATED.to_owned(),
                names::VALUE_ESTIMATE.to_owned(),
            ],
            memory_size: 0,
            continuous_output_size: 0,
            discrete_output_size: total_logits,
        };
        Self { info, logits }
    }
}

impl Model for ScriptedModel {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn spawn_engine(&self) -> Result<Box<dyn InferenceEngine>, InferenceError> {
        Ok(Box::new(ScriptedEngine {
            logits: self.logits.clone(),
            outputs: HashMap::new(),
        }))
    }
}

struct ScriptedEngine {
    logits: Vec<f32>,
    outputs: HashMap<String, TensorProxy>,
}

impl InferenceEngine for ScriptedEngine {
    fn execute(&mut self, inputs: &[TensorProxy]) -> Result<(), InferenceError> {
        let batch_size = inputs
            .iter()
            .find(|t| t.name == names::VECTOR_OBSERVATION)
            .map(|t| t.batch_size())
            .ok_or_else(|| {
                InferenceError::Engine("missing vector_observation input".to_owned())
            })?;

        let width = self.logits.len() as i64;
        let mut action = TensorProxy::new(names::ACTION_DEPRECATED, vec![-1, width]);
        action.resize_batch(batch_size);
        for row in 0..batch_size {
            action.row_mut(row).copy_from_slice(&self.logits);
        }

        let mut value = TensorProxy::new(names::VALUE_ESTIMATE, vec![-1, 1]);
        value.resize_batch(batch_size);

        self.outputs.clear();
        self.outputs.insert(action.name.clone(), action);
        self.outputs.insert(value.name.clone(), value);
        Ok(())
    }

    fn output(&self, name: &str) -> Result<TensorProxy, InferenceError> {
        self.outputs
            .get(name)
            .cloned()
            .ok_or_else(|| InferenceError::Engine(format!("no output named {name}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ForwardAxis;

    #[test]
    fn preferred_action_dominates_each_branch() {
        let action = ActionVector {
            forward: ForwardAxis::Backward,
            shoot: true,
            ..ActionVector::NOOP
        };
        let model = ScriptedModel::preferring(4, action);
        // forward branch: index 2 wins; rotate: 0; shoot: 1.
        assert_eq!(model.logits[0..3], [0.0, 0.0, 5.0]);
        assert_eq!(model.logits[3..6], [5.0, 0.0, 0.0]);
        assert_eq!(model.logits[6..8], [0.0, 5.0]);
        model.info().check().unwrap();
    }

    #[test]
    fn engine_repeats_logits_across_the_batch() {
        let model = ScriptedModel::preferring(2, ActionVector::NOOP);
        let mut engine = model.spawn_engine().unwrap();
        let mut obs = TensorProxy::new(names::VECTOR_OBSERVATION, vec![-1, 2]);
        obs.resize_batch(3);
        engine.execute(&[obs]).unwrap();
        let out = engine.output(names::ACTION_DEPRECATED).unwrap();
        assert_eq!(out.batch_size(), 3);
        assert_eq!(out.row(0), out.row(2));
    }
}
