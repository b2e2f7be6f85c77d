//! Output-side tensor application. Each applier reads one named output
//! tensor and updates the per-episode sessions, in the order the agents
//! submitted observations.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::actions::ActionSpec;

use super::InferenceError;
use super::model::{ApiVersion, ModelInfo};
use super::runner::{EpisodeId, SessionsHandle};
use super::tensor::{TensorProxy, names};

pub trait Applier {
    /// Applies one output tensor to the sessions of `episode_ids`, which
    /// are ordered like the tensor's batch rows.
    fn apply(&mut self, tensor: &TensorProxy, episode_ids: &[EpisodeId]);
}

/// Copies continuous action rows straight into the sessions.
struct ContinuousActionOutputApplier {
    num_continuous: usize,
    sessions: SessionsHandle,
}

impl Applier for ContinuousActionOutputApplier {
    fn apply(&mut self, tensor: &TensorProxy, episode_ids: &[EpisodeId]) {
        let mut sessions = self.sessions.borrow_mut();
        for (agent_index, id) in episode_ids.iter().enumerate() {
            let Some(session) = sessions.get_mut(id) else {
                continue;
            };
            let row = tensor.row(agent_index);
            session.last_action.continuous.clear();
            session
                .last_action
                .continuous
                .extend_from_slice(&row[..self.num_continuous.min(row.len())]);
        }
    }
}

/// Legacy discrete output: one flat row of branch logits per agent. The
/// applier masks prohibited choices, then either takes the argmax or
/// draws from the softmax with a seeded generator.
struct LegacyDiscreteActionOutputApplier {
    branch_sizes: Vec<usize>,
    rng: StdRng,
    deterministic: bool,
    sessions: SessionsHandle,
}

impl LegacyDiscreteActionOutputApplier {
    fn choose(&mut self, logits: &[f32], mask: Option<&[bool]>, mask_offset: usize) -> i32 {
        let masked: Vec<f32> = logits
            .iter()
            .enumerate()
            .map(|(i, &logit)| {
                let prohibited = mask
                    .map(|m| m.get(mask_offset + i).copied().unwrap_or(false))
                    .unwrap_or(false);
                if prohibited { f32::NEG_INFINITY } else { logit }
            })
            .collect();

        if self.deterministic {
            return argmax(&masked);
        }

        // Softmax sampling, numerically centered on the row maximum.
        let max = masked.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        if !max.is_finite() {
            return 0;
        }
        let weights: Vec<f32> = masked.iter().map(|&l| (l - max).exp()).collect();
        let total: f32 = weights.iter().sum();
        let mut draw: f32 = self.rng.random::<f32>() * total;
        for (i, w) in weights.iter().enumerate() {
            draw -= w;
            if draw <= 0.0 {
                return i as i32;
            }
        }
        (weights.len() - 1) as i32
    }
}

impl Applier for LegacyDiscreteActionOutputApplier {
    fn apply(&mut self, tensor: &TensorProxy, episode_ids: &[EpisodeId]) {
        let branch_sizes = self.branch_sizes.clone();
        for (agent_index, id) in episode_ids.iter().enumerate() {
            let row = tensor.row(agent_index).to_vec();
            let mask = {
                let sessions = self.sessions.borrow();
                sessions.get(id).and_then(|s| s.mask.clone())
            };
            if !self.sessions.borrow().contains_key(id) {
                continue;
            }
            let mut discrete = Vec::with_capacity(branch_sizes.len());
            let mut offset = 0;
            for &size in &branch_sizes {
                let logits = &row[offset..offset + size];
                discrete.push(self.choose(logits, mask.as_deref(), offset));
                offset += size;
            }
            let mut sessions = self.sessions.borrow_mut();
            if let Some(session) = sessions.get_mut(id) {
                session.last_action.discrete = discrete;
            }
        }
    }
}

/// Current discrete output: the model already sampled, rows hold one
/// action index per branch.
struct DiscreteActionOutputApplier {
    num_branches: usize,
    sessions: SessionsHandle,
}

impl Applier for DiscreteActionOutputApplier {
    fn apply(&mut self, tensor: &TensorProxy, episode_ids: &[EpisodeId]) {
        let mut sessions = self.sessions.borrow_mut();
        for (agent_index, id) in episode_ids.iter().enumerate() {
            let Some(session) = sessions.get_mut(id) else {
                continue;
            };
            let row = tensor.row(agent_index);
            session.last_action.discrete =
                row.iter().take(self.num_branches).map(|&v| v as i32).collect();
        }
    }
}

/// Stores recurrent output rows back into the sessions for the next step.
struct MemoryOutputApplier {
    sessions: SessionsHandle,
}

impl Applier for MemoryOutputApplier {
    fn apply(&mut self, tensor: &TensorProxy, episode_ids: &[EpisodeId]) {
        let mut sessions = self.sessions.borrow_mut();
        for (agent_index, id) in episode_ids.iter().enumerate() {
            let Some(session) = sessions.get_mut(id) else {
                continue;
            };
            session.memory = tensor.row(agent_index).to_vec();
        }
    }
}

/// Discards an output nobody consumes, such as the value estimate.
struct IgnoredOutputApplier;

impl Applier for IgnoredOutputApplier {
    fn apply(&mut self, _: &TensorProxy, _: &[EpisodeId]) {}
}

/// Name-keyed dispatch over every output the model produces.
pub struct TensorApplier {
    map: HashMap<String, Box<dyn Applier>>,
}

impl TensorApplier {
    pub fn new(
        action_spec: &ActionSpec,
        seed: u64,
        sessions: SessionsHandle,
        info: &ModelInfo,
        deterministic: bool,
    ) -> Result<Self, InferenceError> {
        if !info.supports_continuous_and_discrete() {
            action_spec.check_all_continuous_or_discrete()?;
        }

        let mut map: HashMap<String, Box<dyn Applier>> = HashMap::new();
        if action_spec.num_continuous() > 0 {
            map.insert(
                info.continuous_output_name().to_owned(),
                Box::new(ContinuousActionOutputApplier {
                    num_continuous: action_spec.num_continuous(),
                    sessions: sessions.clone(),
                }),
            );
        }
        if action_spec.num_discrete() > 0 {
            let name = info.discrete_output_name().to_owned();
            match info.api_version {
                ApiVersion::MlAgents1_0 => {
                    map.insert(
                        name,
                        Box::new(LegacyDiscreteActionOutputApplier {
                            branch_sizes: action_spec.branch_sizes().to_vec(),
                            rng: StdRng::seed_from_u64(seed),
                            deterministic,
                            sessions: sessions.clone(),
                        }),
                    );
                }
                ApiVersion::MlAgents2_0 => {
                    map.insert(
                        name,
                        Box::new(DiscreteActionOutputApplier {
                            num_branches: action_spec.num_discrete(),
                            sessions: sessions.clone(),
                        }),
                    );
                }
            }
        }
        map.insert(
            names::RECURRENT_OUT.to_owned(),
            Box::new(MemoryOutputApplier { sessions }),
        );
        map.insert(names::VALUE_ESTIMATE.to_owned(), Box::new(IgnoredOutputApplier));

        Ok(Self { map })
    }

    /// Applies every fetched output. An output with no applier is a
    /// model/agent contract mismatch and fails hard.
    pub fn apply_tensors(
        &mut self,
        tensors: &[TensorProxy],
        episode_ids: &[EpisodeId],
    ) -> Result<(), InferenceError> {
        for tensor in tensors {
            let Some(applier) = self.map.get_mut(&tensor.name) else {
                return Err(InferenceError::UnknownOutputTensor(tensor.name.clone()));
            };
            applier.apply(tensor, episode_ids);
        }
        Ok(())
    }
}

fn argmax(values: &[f32]) -> i32 {
    let mut best = 0;
    let mut best_value = f32::NEG_INFINITY;
    for (i, &v) in values.iter().enumerate() {
        if v > best_value {
            best_value = v;
            best = i;
        }
    }
    best as i32
}
