//! Batched decision making. Agents submit observations during a tick;
//! `decide_batch` runs the model once over everything submitted and
//! stores the results per episode.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::actions::{ActionBuffers, ActionSpec};
use crate::sensors::SensorHandle;

use super::InferenceError;
use super::appliers::TensorApplier;
use super::generators::TensorGenerator;
use super::model::{Model, ModelHandle, same_model};
use super::tensor::TensorProxy;

/// Identifies one episode of one agent. Supplied by the agent's owner at
/// construction; a new episode means a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EpisodeId(pub u32);

/// What an agent reports about itself when submitting observations.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentInfo {
    pub episode_id: EpisodeId,
    /// A done agent's sensors may be stale; its submission only serves to
    /// close the session.
    pub done: bool,
    /// Action the agent executed last step, fed back as model input.
    pub stored_actions: ActionBuffers,
    /// Per-logit prohibition flags, `true` meaning the choice is illegal.
    pub discrete_action_masks: Option<Vec<bool>>,
}

#[derive(Clone)]
pub struct AgentInfoSensorsPair {
    pub info: AgentInfo,
    pub sensors: Vec<SensorHandle>,
}

/// Per-episode state the pipeline carries across decisions: the latest
/// decided action, recurrent memory, and the most recent action mask.
/// Created on an episode's first submission, dropped when it reports done.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpisodeSession {
    pub last_action: ActionBuffers,
    pub memory: Vec<f32>,
    pub mask: Option<Vec<bool>>,
}

pub type SessionsHandle = Rc<RefCell<HashMap<EpisodeId, EpisodeSession>>>;

pub fn new_sessions() -> SessionsHandle {
    Rc::new(RefCell::new(HashMap::new()))
}

/// Owns one engine spawned from a model and the session bookkeeping for
/// every episode deciding through it. Multiple policies may share one
/// runner as long as they use the same model handle.
pub struct ModelRunner {
    model: ModelHandle,
    engine: Box<dyn super::model::InferenceEngine>,
    inputs: Vec<TensorProxy>,
    output_names: Vec<String>,
    generator: TensorGenerator,
    applier: TensorApplier,
    sessions: SessionsHandle,
    pending: Vec<AgentInfoSensorsPair>,
    ordered_episodes: Vec<EpisodeId>,
    observations_initialized: bool,
}

impl ModelRunner {
    pub fn new(
        model: Rc<dyn Model>,
        action_spec: &ActionSpec,
        seed: u64,
        deterministic: bool,
    ) -> Result<Self, InferenceError> {
        let info = model.info().clone();
        info.check()?;
        let engine = model.spawn_engine()?;

        let sessions = new_sessions();
        let inputs = info
            .inputs
            .iter()
            .map(|d| TensorProxy::new(d.name.clone(), d.shape.clone()))
            .collect();
        let generator = TensorGenerator::new(seed, sessions.clone(), &info);
        let applier = TensorApplier::new(action_spec, seed, sessions.clone(), &info, deterministic)?;

        Ok(Self {
            model,
            engine,
            inputs,
            output_names: info.output_names,
            generator,
            applier,
            sessions,
            pending: Vec::new(),
            ordered_episodes: Vec::new(),
            observations_initialized: false,
        })
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    /// Whether this runner serves the given model instance.
    pub fn has_model(&self, other: &ModelHandle) -> bool {
        same_model(&self.model, other)
    }

    /// Queues one agent for the next batch. Submission order is decision
    /// order. A `done` submission closes the episode's session.
    pub fn put_observations(&mut self, info: AgentInfo, sensors: Vec<SensorHandle>) {
        let episode_id = info.episode_id;
        {
            let mut sessions = self.sessions.borrow_mut();
            if info.done {
                sessions.remove(&episode_id);
            } else {
                let session = sessions.entry(episode_id).or_default();
                session.mask = info.discrete_action_masks.clone();
            }
        }
        self.ordered_episodes.push(episode_id);
        self.pending.push(AgentInfoSensorsPair { info, sensors });
    }

    /// Runs the model over every queued submission and stores the decided
    /// actions in the sessions. A no-op on an empty queue.
    pub fn decide_batch(&mut self) -> Result<(), InferenceError> {
        let batch_size = self.pending.len();
        if batch_size == 0 {
            return Ok(());
        }
        if !self.observations_initialized {
            // Any queued agent is representative; all agents deciding
            // through one model carry identically shaped sensor lists.
            let first = &self.pending[0];
            self.generator.initialize_observations(&first.sensors)?;
            self.observations_initialized = true;
        }

        debug!(batch_size, "running inference batch");

        self.generator
            .generate_tensors(&mut self.inputs, batch_size, &self.pending)?;
        self.engine.execute(&self.inputs)?;

        let mut outputs = Vec::with_capacity(self.output_names.len());
        for name in &self.output_names {
            outputs.push(self.engine.output(name)?);
        }
        self.applier.apply_tensors(&outputs, &self.ordered_episodes)?;

        self.pending.clear();
        self.ordered_episodes.clear();
        Ok(())
    }

    /// Latest decided action for an episode; empty when the episode has
    /// no session or has not been decided yet.
    pub fn action_for(&self, episode_id: EpisodeId) -> ActionBuffers {
        self.sessions
            .borrow()
            .get(&episode_id)
            .map(|s| s.last_action.clone())
            .unwrap_or_else(ActionBuffers::empty)
    }

    #[cfg(test)]
    pub(crate) fn session_count(&self) -> usize {
        self.sessions.borrow().len()
    }
}
