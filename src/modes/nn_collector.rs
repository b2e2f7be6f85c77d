//! Network-driven collector. Builds the stacked sensor suite the trained
//! models were fitted against, serializes the 59-float agent observation,
//! and turns batched policy output back into discrete actions.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::info;

use crate::actions::{ActionBuffers, ActionSpec, ActionVector};
use crate::geom::Vec2;
use crate::inference::model::ModelHandle;
use crate::inference::policy::NetworkPolicy;
use crate::inference::runner::{AgentInfo, EpisodeId};
use crate::inference::InferenceError;
use crate::sensors::{
    sort_by_name, RayPerceptionSensor, Sensor, SensorHandle, StackingSensor, VectorSensor,
};
use crate::world::{HitTag, TargetState, WorldSnapshot};

use super::{AgentMode, ComponentAgent};

/// Flat length of one vector observation. Part of the model contract.
pub const VECTOR_OBSERVATION_SIZE: usize = 59;
/// Past observations presented per sensor.
pub const NUM_STACKED: usize = 3;
/// Target slots serialized into the vector observation, free or not.
const TARGET_SLOTS: usize = 9;

const RAYS_PER_DIRECTION: usize = 5;
const RAY_MAX_DEGREES: f32 = 180.0;
const RAY_LENGTH: f32 = 62.0;

/// Short wall feelers baked into the vector observation, separate from
/// the ray perception sensor.
const WALL_RAY_DISTANCE: f32 = 10.0;
const WALL_RAY_ANGLES: [f32; 8] = [0.0, 45.0, 90.0, 135.0, 180.0, -135.0, -90.0, -45.0];

pub struct NeuralCollectorAgent {
    policy: NetworkPolicy,
    episode_id: EpisodeId,
    seed: u64,
    deterministic: bool,
    sensors: Vec<SensorHandle>,
    vector_sensor: Rc<RefCell<VectorSensor>>,
    previous_action: ActionBuffers,
    decision_requested: bool,
    action_requested: bool,
}

impl NeuralCollectorAgent {
    pub fn new(episode_id: EpisodeId, seed: u64, deterministic: bool) -> Self {
        Self {
            policy: NetworkPolicy::disabled(),
            episode_id,
            seed,
            deterministic,
            sensors: Vec::new(),
            vector_sensor: Rc::new(RefCell::new(VectorSensor::new(
                "VectorSensor",
                VECTOR_OBSERVATION_SIZE,
            ))),
            previous_action: ActionBuffers::for_spec(&ActionSpec::agent_default()),
            decision_requested: false,
            action_requested: false,
        }
    }

    pub fn episode_id(&self) -> EpisodeId {
        self.episode_id
    }

    /// Flat observation width of the enabled sensor suite, the size a
    /// model must accept.
    pub fn observation_size(&self) -> usize {
        crate::sensors::total_observation_size(&self.sensors)
    }

    /// The model currently driving this agent, if any.
    pub fn model(&self) -> Option<ModelHandle> {
        self.policy.model()
    }

    /// Rebuilds the policy over a new model. The running episode keeps
    /// its id; stacked observations carry over.
    pub fn set_model(&mut self, model: ModelHandle) -> Result<(), InferenceError> {
        self.policy = NetworkPolicy::active(
            model,
            &ActionSpec::agent_default(),
            self.seed,
            self.deterministic,
            self.episode_id,
        )?;
        Ok(())
    }

    /// Marks the next `compute_action` as a decision step. A decision
    /// step always applies its action too.
    pub fn request_decision(&mut self) {
        self.decision_requested = true;
        self.action_requested = true;
    }

    /// Marks the next `compute_action` as repeating the last decision.
    pub fn request_action(&mut self) {
        self.action_requested = true;
    }

    /// Closes the running episode and starts the next one. The backing
    /// session is torn down on the next batch submission.
    pub fn end_episode(&mut self) {
        let info = AgentInfo {
            episode_id: self.episode_id,
            done: true,
            stored_actions: self.previous_action.clone(),
            discrete_action_masks: None,
        };
        self.policy.request_decision(info, self.sensors.clone());
        self.previous_action = ActionBuffers::for_spec(&ActionSpec::agent_default());
    }

    fn build_sensors(&mut self) {
        let ray = RayPerceptionSensor::new(
            "RayPerceptionSensor",
            RAYS_PER_DIRECTION,
            RAY_MAX_DEGREES,
            RAY_LENGTH,
            vec![
                HitTag::Enemy,
                HitTag::Wall,
                HitTag::Target,
                HitTag::MyBase,
                HitTag::TheirBase,
            ],
        );
        let ray_handle: SensorHandle = Rc::new(RefCell::new(ray));
        let vector_handle: SensorHandle = self.vector_sensor.clone();
        let mut sensors: Vec<SensorHandle> = vec![
            Rc::new(RefCell::new(StackingSensor::new(ray_handle, NUM_STACKED))),
            Rc::new(RefCell::new(StackingSensor::new(vector_handle, NUM_STACKED))),
        ];
        sort_by_name(&mut sensors);
        self.sensors = sensors;
    }

    /// Serializes the vector observation. Field order is fixed by the
    /// trained models.
    fn write_observations(&self, world: &WorldSnapshot) {
        let mut sensor = self.vector_sensor.borrow_mut();
        sensor.clear();

        let (vel_x, vel_z) = local_frame(world, world.me.velocity);
        sensor.add(vel_x);
        sensor.add(vel_z);
        sensor.add(world.time_remaining);
        // Quaternion y component of the yaw rotation.
        sensor.add((world.me.pose.heading_deg.to_radians() / 2.0).sin());
        sensor.add(world.yaw_to(world.my_base));
        sensor.add(world.me.pose.position.distance(world.my_base));

        for slot in 0..TARGET_SLOTS {
            match world.targets.get(slot) {
                Some(target) => add_target(&mut sensor, world, target),
                None => {
                    for _ in 0..4 {
                        sensor.add(0.0);
                    }
                }
            }
        }

        sensor.add_bool(world.me.frozen);

        let (fwd_x, fwd_z) = local_frame(world, world.enemy.pose.forward());
        sensor.add(fwd_x);
        sensor.add(fwd_z);
        sensor.add(world.yaw_to(world.enemy.pose.position));
        sensor.add(world.distance_to_enemy());
        let (enemy_vel_x, enemy_vel_z) = local_frame(world, world.enemy.velocity);
        sensor.add(enemy_vel_x);
        sensor.add(enemy_vel_z);
        sensor.add_bool(world.enemy.frozen);
        sensor.add_bool(world.enemy.laser_on && !world.enemy.frozen);

        // Eight short feelers flag nearby walls. Only a wall as the first
        // hit counts; anything else in the way reads as clear.
        for angle in WALL_RAY_ANGLES {
            let heading = world.me.pose.heading_deg + angle;
            let wall = world
                .raycast(heading, WALL_RAY_DISTANCE)
                .map(|hit| hit.tag == HitTag::Wall)
                .unwrap_or(false);
            sensor.add_bool(wall);
        }
    }
}

fn add_target(sensor: &mut VectorSensor, world: &WorldSnapshot, target: &TargetState) {
    sensor.add(world.yaw_to(target.position));
    sensor.add(world.me.pose.position.distance(target.position));
    sensor.add_bool(target.carried_by.is_some());
    sensor.add_bool(target.in_base.is_some());
}

/// A world-space direction expressed in the agent's frame, right and
/// forward components in that order.
fn local_frame(world: &WorldSnapshot, v: Vec2) -> (f32, f32) {
    let forward = world.me.pose.forward();
    let right = forward.rotated_deg(90.0);
    (v.dot(right), v.dot(forward))
}

impl ComponentAgent for NeuralCollectorAgent {
    fn mode(&self) -> AgentMode {
        AgentMode::NeuralCollector
    }

    fn on_enable(&mut self) {
        self.build_sensors();
        info!(mode = %self.mode(), sensors = self.sensors.len(), "enabled");
    }

    fn on_disable(&mut self) {
        // Drop the runner with the sensors so no engine-side handles
        // outlive the mode.
        self.policy = NetworkPolicy::disabled();
        self.sensors.clear();
    }

    fn compute_action(&mut self, world: &WorldSnapshot) -> Result<ActionVector, InferenceError> {
        if self.decision_requested {
            for sensor in &self.sensors {
                sensor.borrow_mut().update(world);
            }
            self.write_observations(world);
            let info = AgentInfo {
                episode_id: self.episode_id,
                done: false,
                stored_actions: self.previous_action.clone(),
                discrete_action_masks: None,
            };
            self.policy.request_decision(info, self.sensors.clone());
            let decided = self.policy.decide_action()?;
            if !decided.is_empty() {
                self.previous_action = decided;
            }
        }

        let action = if self.action_requested && self.policy.is_active() {
            ActionVector::from_discrete(&self.previous_action.discrete)
        } else {
            ActionVector::NOOP
        };
        self.decision_requested = false;
        self.action_requested = false;
        Ok(action)
    }

    fn as_neural_mut(&mut self) -> Option<&mut NeuralCollectorAgent> {
        Some(self)
    }
}
