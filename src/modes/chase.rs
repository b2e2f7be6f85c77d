//! Pursue the enemy head-on; once they freeze, tuck in behind them and
//! keep facing them so the laser override can do its work.

use crate::actions::ActionVector;
use crate::inference::InferenceError;
use crate::steering::{how_to_turn_or_go, which_way_to_turn};
use crate::world::WorldSnapshot;

use super::{AgentMode, ComponentAgent};

/// Hold point distance behind the enemy's back.
const BEHIND_ENEMY_DISTANCE: f32 = 5.0;
/// Within this range of the hold point the agent stops and just tracks.
const HOLD_POINT_THRESHOLD: f32 = 2.0;

#[derive(Debug, Default)]
pub struct ChaseAgent;

impl ChaseAgent {
    pub fn new() -> Self {
        Self
    }
}

impl ComponentAgent for ChaseAgent {
    fn mode(&self) -> AgentMode {
        AgentMode::Chase
    }

    fn compute_action(&mut self, world: &WorldSnapshot) -> Result<ActionVector, InferenceError> {
        let mut action = ActionVector::NOOP;
        let behind = world.point_behind_enemy(BEHIND_ENEMY_DISTANCE);

        if !world.enemy.frozen && !world.enemy_is_facing_away() {
            // They see us coming; charge straight at them.
            let (forward, rotate) =
                how_to_turn_or_go(world.yaw_to(world.enemy.pose.position), true, false);
            action.forward = forward;
            action.rotate = rotate;
        } else if !world.enemy.frozen {
            // Their back is turned; aim for the spot behind them.
            let (forward, rotate) = how_to_turn_or_go(world.yaw_to(behind), true, false);
            action.forward = forward;
            action.rotate = rotate;
        } else if world.me.pose.position.distance(behind) > HOLD_POINT_THRESHOLD {
            let (forward, rotate) = how_to_turn_or_go(world.yaw_to(behind), false, false);
            action.forward = forward;
            action.rotate = rotate;
        } else {
            // Parked behind a frozen enemy: keep them in the sights.
            action.rotate = which_way_to_turn(world.yaw_to(world.enemy.pose.position), true);
        }

        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ForwardAxis, RotateAxis};
    use crate::geom::Vec2;
    use crate::world::testutil;

    #[test]
    fn charges_an_enemy_that_faces_us() {
        // Enemy dead ahead, facing us; expect straight pursuit.
        let snap = testutil::snapshot();
        let action = ChaseAgent::new().compute_action(&snap).unwrap();
        assert_eq!(action.forward, ForwardAxis::Forward);
        assert_eq!(action.rotate, RotateAxis::Hold);
    }

    #[test]
    fn aims_behind_an_enemy_facing_away() {
        let mut snap = testutil::snapshot();
        // Enemy now faces +y, away from us; the hold point sits at y=15,
        // still straight ahead.
        snap.enemy.pose.heading_deg = 0.0;
        let action = ChaseAgent::new().compute_action(&snap).unwrap();
        assert_eq!(action.forward, ForwardAxis::Forward);
        assert_eq!(action.rotate, RotateAxis::Hold);
    }

    #[test]
    fn parks_behind_a_frozen_enemy_and_tracks() {
        let mut snap = testutil::snapshot();
        snap.enemy.frozen = true;
        snap.enemy.pose.heading_deg = 0.0;
        // Hold point is at (0, 15); stand right on it, enemy to our left.
        snap.me.pose.position = Vec2::new(0.0, 15.0);
        snap.me.pose.heading_deg = 90.0;
        let action = ChaseAgent::new().compute_action(&snap).unwrap();
        assert_eq!(action.forward, ForwardAxis::Hold);
        assert_eq!(action.rotate, RotateAxis::Left);
    }

    #[test]
    fn walks_toward_the_hold_point_when_far_from_a_frozen_enemy() {
        let mut snap = testutil::snapshot();
        snap.enemy.frozen = true;
        snap.enemy.pose.heading_deg = 0.0;
        // Hold point (0, 15) is 35 ahead of us at (0, -20).
        let action = ChaseAgent::new().compute_action(&snap).unwrap();
        assert_eq!(action.forward, ForwardAxis::Forward);
        assert_eq!(action.rotate, RotateAxis::Hold);
    }
}
