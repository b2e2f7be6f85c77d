//! Input-side tensor population. Each generator fills one named tensor
//! from the batched agent submissions; the [`TensorGenerator`] dispatches
//! by tensor name.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::sensors::{ObservationWriter, SensorHandle};

use super::InferenceError;
use super::model::{ApiVersion, ModelInfo};
use super::runner::{AgentInfoSensorsPair, SessionsHandle};
use super::tensor::{TensorProxy, names};

pub trait Generator {
    /// Reshapes `tensor` for the batch and fills it from the submissions.
    fn generate(
        &mut self,
        tensor: &mut TensorProxy,
        batch_size: usize,
        infos: &[AgentInfoSensorsPair],
    );
}

/// Scalar input holding the current batch size.
struct BatchSizeGenerator;

impl Generator for BatchSizeGenerator {
    fn generate(&mut self, tensor: &mut TensorProxy, batch_size: usize, _: &[AgentInfoSensorsPair]) {
        tensor.shape = vec![1];
        tensor.data = vec![batch_size as f32];
    }
}

/// Scalar input fixed at 1: recurrent models predict one step at a time.
struct SequenceLengthGenerator;

impl Generator for SequenceLengthGenerator {
    fn generate(&mut self, tensor: &mut TensorProxy, _: usize, _: &[AgentInfoSensorsPair]) {
        tensor.shape = vec![1];
        tensor.data = vec![1.0];
    }
}

/// [batch x memory] recurrent state, zero for episodes without a session.
struct RecurrentInputGenerator {
    sessions: SessionsHandle,
}

impl Generator for RecurrentInputGenerator {
    fn generate(
        &mut self,
        tensor: &mut TensorProxy,
        batch_size: usize,
        infos: &[AgentInfoSensorsPair],
    ) {
        tensor.resize_batch(batch_size);
        let memory_size = tensor.feature_len();
        let sessions = self.sessions.borrow();
        for (agent_index, pair) in infos.iter().enumerate() {
            let Some(session) = sessions.get(&pair.info.episode_id) else {
                continue;
            };
            let row = tensor.row_mut(agent_index);
            for (j, value) in session.memory.iter().take(memory_size).enumerate() {
                row[j] = *value;
            }
        }
    }
}

/// [batch x branches] discrete action each agent took last step.
struct PreviousActionInputGenerator;

impl Generator for PreviousActionInputGenerator {
    fn generate(
        &mut self,
        tensor: &mut TensorProxy,
        batch_size: usize,
        infos: &[AgentInfoSensorsPair],
    ) {
        tensor.resize_batch(batch_size);
        let action_size = tensor.feature_len();
        for (agent_index, pair) in infos.iter().enumerate() {
            let past = &pair.info.stored_actions.discrete;
            if past.is_empty() {
                continue;
            }
            let row = tensor.row_mut(agent_index);
            for j in 0..action_size.min(past.len()) {
                row[j] = past[j] as f32;
            }
        }
    }
}

/// [batch x total logits] legality mask: 1.0 permitted, 0.0 prohibited.
struct ActionMaskInputGenerator;

impl Generator for ActionMaskInputGenerator {
    fn generate(
        &mut self,
        tensor: &mut TensorProxy,
        batch_size: usize,
        infos: &[AgentInfoSensorsPair],
    ) {
        tensor.resize_batch(batch_size);
        let mask_size = tensor.feature_len();
        for (agent_index, pair) in infos.iter().enumerate() {
            let mask = pair.info.discrete_action_masks.as_deref();
            let row = tensor.row_mut(agent_index);
            for j in 0..mask_size {
                let prohibited = mask.map(|m| m.get(j).copied().unwrap_or(false)).unwrap_or(false);
                row[j] = if prohibited { 0.0 } else { 1.0 };
            }
        }
    }
}

/// [batch x size] standard-normal noise for stochastic continuous policies.
struct RandomNormalInputGenerator {
    normal: RandomNormal,
}

impl Generator for RandomNormalInputGenerator {
    fn generate(&mut self, tensor: &mut TensorProxy, batch_size: usize, _: &[AgentInfoSensorsPair]) {
        tensor.resize_batch(batch_size);
        for value in tensor.data.iter_mut() {
            *value = self.normal.next();
        }
    }
}

/// Box-Muller standard-normal source over a seeded generator, so batches
/// replay identically for a given seed.
pub(crate) struct RandomNormal {
    rng: StdRng,
    spare: Option<f32>,
}

impl RandomNormal {
    pub(crate) fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed), spare: None }
    }

    pub(crate) fn next(&mut self) -> f32 {
        if let Some(v) = self.spare.take() {
            return v;
        }
        let u1: f64 = loop {
            let u: f64 = self.rng.random();
            if u > f64::EPSILON {
                break u;
            }
        };
        let u2: f64 = self.rng.random();
        let radius = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * std::f64::consts::PI * u2;
        self.spare = Some((radius * theta.sin()) as f32);
        (radius * theta.cos()) as f32
    }
}

/// Fills an observation input from one or more sensors, written
/// consecutively per agent. Done agents get an all-zero row because their
/// sensors may already be stale.
struct ObservationInputGenerator {
    sensor_indices: Vec<usize>,
}

impl ObservationInputGenerator {
    fn new() -> Self {
        Self { sensor_indices: Vec::new() }
    }

    fn add_sensor_index(&mut self, index: usize) {
        self.sensor_indices.push(index);
    }
}

impl Generator for ObservationInputGenerator {
    fn generate(
        &mut self,
        tensor: &mut TensorProxy,
        batch_size: usize,
        infos: &[AgentInfoSensorsPair],
    ) {
        tensor.resize_batch(batch_size);
        for (agent_index, pair) in infos.iter().enumerate() {
            if pair.info.done {
                tensor.fill_row(agent_index, 0.0);
                continue;
            }
            let row = tensor.row_mut(agent_index);
            let mut writer = ObservationWriter::new(row);
            for &sensor_index in &self.sensor_indices {
                pair.sensors[sensor_index].borrow_mut().write(&mut writer);
            }
        }
    }
}

/// Reshapes a model-output tensor for the batch without filling it; the
/// engine overwrites the contents.
struct BatchResizeGenerator;

impl Generator for BatchResizeGenerator {
    fn generate(&mut self, tensor: &mut TensorProxy, batch_size: usize, _: &[AgentInfoSensorsPair]) {
        tensor.resize_batch(batch_size);
    }
}

/// Name-keyed dispatch over every input a model may ask for. Observation
/// generators are installed lazily once a representative sensor list is
/// known.
pub struct TensorGenerator {
    api_version: ApiVersion,
    map: HashMap<String, Box<dyn Generator>>,
}

impl TensorGenerator {
    pub fn new(seed: u64, sessions: SessionsHandle, info: &ModelInfo) -> Self {
        let mut map: HashMap<String, Box<dyn Generator>> = HashMap::new();
        map.insert(names::BATCH_SIZE.to_owned(), Box::new(BatchSizeGenerator));
        map.insert(names::SEQUENCE_LENGTH.to_owned(), Box::new(SequenceLengthGenerator));
        map.insert(
            names::RECURRENT_IN.to_owned(),
            Box::new(RecurrentInputGenerator { sessions }),
        );
        map.insert(
            names::PREVIOUS_ACTION.to_owned(),
            Box::new(PreviousActionInputGenerator),
        );
        map.insert(names::ACTION_MASK.to_owned(), Box::new(ActionMaskInputGenerator));
        map.insert(
            names::RANDOM_NORMAL_EPSILON.to_owned(),
            Box::new(RandomNormalInputGenerator { normal: RandomNormal::new(seed) }),
        );

        if info.has_continuous_outputs() {
            map.insert(info.continuous_output_name().to_owned(), Box::new(BatchResizeGenerator));
        }
        if info.has_discrete_outputs() {
            map.insert(info.discrete_output_name().to_owned(), Box::new(BatchResizeGenerator));
        }
        map.insert(names::RECURRENT_OUT.to_owned(), Box::new(BatchResizeGenerator));
        map.insert(names::VALUE_ESTIMATE.to_owned(), Box::new(BatchResizeGenerator));

        Self { api_version: info.api_version, map }
    }

    /// Binds observation inputs to a representative agent's sensor list.
    ///
    /// Legacy models concatenate every rank-1 sensor into the shared
    /// vector observation; higher ranks get indexed inputs. Current models
    /// give every sensor its own indexed input.
    pub fn initialize_observations(
        &mut self,
        sensors: &[SensorHandle],
    ) -> Result<(), InferenceError> {
        match self.api_version {
            ApiVersion::MlAgents1_0 => {
                let mut vector_gen: Option<ObservationInputGenerator> = None;
                let mut visual_index = 0;
                for (sensor_index, sensor) in sensors.iter().enumerate() {
                    let rank = sensor.borrow().rank();
                    match rank {
                        1 => {
                            vector_gen
                                .get_or_insert_with(ObservationInputGenerator::new)
                                .add_sensor_index(sensor_index);
                        }
                        2 => {
                            let mut g = ObservationInputGenerator::new();
                            g.add_sensor_index(sensor_index);
                            self.map.insert(names::observation(sensor_index), Box::new(g));
                        }
                        3 => {
                            let mut g = ObservationInputGenerator::new();
                            g.add_sensor_index(sensor_index);
                            self.map
                                .insert(names::visual_observation(visual_index), Box::new(g));
                            visual_index += 1;
                        }
                        rank => {
                            return Err(InferenceError::InvalidSensorRank {
                                name: sensor.borrow().name().to_owned(),
                                rank,
                            });
                        }
                    }
                }
                if let Some(g) = vector_gen {
                    self.map.insert(names::VECTOR_OBSERVATION.to_owned(), Box::new(g));
                }
            }
            ApiVersion::MlAgents2_0 => {
                for sensor_index in 0..sensors.len() {
                    let mut g = ObservationInputGenerator::new();
                    g.add_sensor_index(sensor_index);
                    self.map.insert(names::observation(sensor_index), Box::new(g));
                }
            }
        }
        Ok(())
    }

    /// Fills every input tensor for the batch. A tensor with no generator
    /// is a model/agent contract mismatch and fails hard.
    pub fn generate_tensors(
        &mut self,
        tensors: &mut [TensorProxy],
        batch_size: usize,
        infos: &[AgentInfoSensorsPair],
    ) -> Result<(), InferenceError> {
        for tensor in tensors.iter_mut() {
            let Some(generator) = self.map.get_mut(&tensor.name) else {
                return Err(InferenceError::UnknownInputTensor(tensor.name.clone()));
            };
            generator.generate(tensor, batch_size, infos);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionBuffers;
    use crate::inference::runner::{AgentInfo, EpisodeId, EpisodeSession, new_sessions};
    use crate::sensors::VectorSensor;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn pair(episode: u32, done: bool) -> AgentInfoSensorsPair {
        let sensor = Rc::new(RefCell::new(VectorSensor::new("VectorSensor", 2)));
        sensor.borrow_mut().add(1.5);
        sensor.borrow_mut().add(2.5);
        let handle: SensorHandle = sensor;
        AgentInfoSensorsPair {
            info: AgentInfo {
                episode_id: EpisodeId(episode),
                done,
                stored_actions: ActionBuffers { continuous: vec![], discrete: vec![2, 1] },
                discrete_action_masks: Some(vec![false, true, false]),
            },
            sensors: vec![handle],
        }
    }

    #[test]
    fn mask_generator_inverts_prohibitions() {
        let mut tensor = TensorProxy::new(names::ACTION_MASK, vec![-1, 3]);
        ActionMaskInputGenerator.generate(&mut tensor, 1, &[pair(1, false)]);
        assert_eq!(tensor.data, vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn recurrent_generator_zero_fills_unknown_episodes() {
        let sessions = new_sessions();
        sessions.borrow_mut().insert(
            EpisodeId(1),
            EpisodeSession { memory: vec![0.5, 0.25], ..EpisodeSession::default() },
        );
        let mut generator = RecurrentInputGenerator { sessions };
        let mut tensor = TensorProxy::new(names::RECURRENT_IN, vec![-1, 2]);
        generator.generate(&mut tensor, 2, &[pair(1, false), pair(7, false)]);
        assert_eq!(tensor.row(0), &[0.5, 0.25]);
        assert_eq!(tensor.row(1), &[0.0, 0.0]);
    }

    #[test]
    fn observation_generator_blanks_done_agents() {
        let mut generator = ObservationInputGenerator::new();
        generator.add_sensor_index(0);
        let mut tensor = TensorProxy::new(names::VECTOR_OBSERVATION, vec![-1, 2]);
        generator.generate(&mut tensor, 2, &[pair(1, false), pair(2, true)]);
        assert_eq!(tensor.row(0), &[1.5, 2.5]);
        assert_eq!(tensor.row(1), &[0.0, 0.0]);
    }

    #[test]
    fn seeded_noise_replays_identically() {
        let mut a = RandomNormal::new(17);
        let mut b = RandomNormal::new(17);
        for _ in 0..32 {
            assert_eq!(a.next(), b.next());
        }
    }

    #[test]
    fn unknown_input_tensor_is_fatal() {
        let sessions = new_sessions();
        let info = ModelInfo {
            api_version: ApiVersion::MlAgents1_0,
            inputs: vec![],
            output_names: vec![],
            memory_size: 0,
            continuous_output_size: 0,
            discrete_output_size: 0,
        };
        let mut generator = TensorGenerator::new(0, sessions, &info);
        let mut tensors = [TensorProxy::new("no_such_input", vec![-1, 1])];
        let err = generator.generate_tensors(&mut tensors, 1, &[]).unwrap_err();
        assert!(matches!(err, InferenceError::UnknownInputTensor(name) if name == "no_such_input"));
    }
}
