//! Grab one target, bring it home, repeat.

use crate::actions::ActionVector;
use crate::inference::InferenceError;
use crate::world::WorldSnapshot;

use super::{AgentMode, ComponentAgent};

#[derive(Debug, Default)]
pub struct CollectAgent;

impl CollectAgent {
    pub fn new() -> Self {
        Self
    }
}

impl ComponentAgent for CollectAgent {
    fn mode(&self) -> AgentMode {
        AgentMode::Collect
    }

    fn compute_action(&mut self, world: &WorldSnapshot) -> Result<ActionVector, InferenceError> {
        let mut action = ActionVector::NOOP;
        if world.me.carrying == 0 {
            // Nothing to carry home and nothing left to fetch: hold
            // position instead of spinning after a stale waypoint.
            if world.nearest_free_target().is_some() {
                action.go_to_target = true;
            }
        } else {
            action.go_to_base = true;
        }
        Ok(action)
    }
}
