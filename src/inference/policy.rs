//! The per-agent face of the inference pipeline. A policy either routes
//! decisions through a shared [`ModelRunner`] or is explicitly disabled;
//! there is no null model to trip over.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use crate::actions::{ActionBuffers, ActionSpec};
use crate::sensors::SensorHandle;

use super::InferenceError;
use super::model::ModelHandle;
use super::runner::{AgentInfo, EpisodeId, ModelRunner};

pub enum NetworkPolicy {
    /// No network configured. Requests are dropped and decisions come
    /// back empty, which callers translate to the do-nothing action.
    Disabled,
    Active {
        runner: Rc<RefCell<ModelRunner>>,
        episode_id: EpisodeId,
    },
}

impl NetworkPolicy {
    pub fn disabled() -> Self {
        NetworkPolicy::Disabled
    }

    /// Spawns a private runner over `model`.
    pub fn active(
        model: ModelHandle,
        action_spec: &ActionSpec,
        seed: u64,
        deterministic: bool,
        episode_id: EpisodeId,
    ) -> Result<Self, InferenceError> {
        let runner = ModelRunner::new(model, action_spec, seed, deterministic)?;
        Ok(NetworkPolicy::Active {
            runner: Rc::new(RefCell::new(runner)),
            episode_id,
        })
    }

    pub fn is_active(&self) -> bool {
        matches!(self, NetworkPolicy::Active { .. })
    }

    /// The model backing this policy, if any.
    pub fn model(&self) -> Option<ModelHandle> {
        match self {
            NetworkPolicy::Disabled => None,
            NetworkPolicy::Active { runner, .. } => Some(runner.borrow().model().clone()),
        }
    }

    /// Submits this agent's observations for the next batch.
    pub fn request_decision(&mut self, info: AgentInfo, sensors: Vec<SensorHandle>) {
        match self {
            NetworkPolicy::Disabled => {
                debug!("decision requested on a disabled policy, dropping");
            }
            NetworkPolicy::Active { runner, .. } => {
                runner.borrow_mut().put_observations(info, sensors);
            }
        }
    }

    /// Flushes the pending batch and returns this agent's action.
    pub fn decide_action(&mut self) -> Result<ActionBuffers, InferenceError> {
        match self {
            NetworkPolicy::Disabled => Ok(ActionBuffers::empty()),
            NetworkPolicy::Active { runner, episode_id } => {
                let mut runner = runner.borrow_mut();
                runner.decide_batch()?;
                Ok(runner.action_for(*episode_id))
            }
        }
    }
}
