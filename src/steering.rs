//! Turns a discrete [`ActionVector`] into a concrete movement command,
//! including the turn-or-go heading logic shared by every heuristic and
//! the on-sight laser override.

use tracing::trace;

use crate::actions::{ActionVector, ForwardAxis, RotateAxis};
use crate::geom::Vec2;
use crate::world::WorldSnapshot;

/// Reach of the laser beam.
pub const LASER_LENGTH: f32 = 20.0;
/// Seconds between shots, so the agent cannot lock itself into firing.
pub const LASER_COOLDOWN: f32 = 0.5;
/// Heading error under which the enemy counts as "right in front".
const ON_SIGHT_CONE_DEG: f32 = 5.0;

/// Picks a rotation for a signed heading error `yaw` (degrees, negative =
/// target to the right).
///
/// With `face_direction` the agent keeps turning until the error is inside
/// the 5 degree dead zone. Without it, errors near 180 are left alone so
/// the caller can walk backward instead of turning all the way around.
pub fn which_way_to_turn(yaw: f32, face_direction: bool) -> RotateAxis {
    if face_direction {
        if -180.0 < yaw && yaw < -5.0 {
            RotateAxis::Right
        } else if 5.0 < yaw && yaw < 180.0 {
            RotateAxis::Left
        } else {
            RotateAxis::Hold
        }
    } else if (-175.0 < yaw && yaw < -90.0) || (5.0 < yaw && yaw < 90.0) {
        RotateAxis::Left
    } else if (-90.0 < yaw && yaw < -5.0) || (90.0 < yaw && yaw < 175.0) {
        RotateAxis::Right
    } else {
        RotateAxis::Hold
    }
}

/// Combined forward and rotate choice for a heading error.
///
/// Without `face_direction` the agent moves while it turns: it drives
/// forward once the error drops out of the turning bands, and walks
/// backward when the target sits almost directly behind (within 5 degrees
/// of 180). `do_both` forces movement even while still turning.
pub fn how_to_turn_or_go(
    yaw: f32,
    face_direction: bool,
    do_both: bool,
) -> (ForwardAxis, RotateAxis) {
    let rotate = which_way_to_turn(yaw, face_direction);
    let may_go = do_both || rotate == RotateAxis::Hold;

    let forward = if face_direction {
        if may_go && -5.0 < yaw && yaw < 5.0 {
            ForwardAxis::Forward
        } else {
            ForwardAxis::Hold
        }
    } else if may_go && ((-180.0 < yaw && yaw < -175.0) || (175.0 < yaw && yaw < 180.0)) {
        ForwardAxis::Backward
    } else if may_go {
        ForwardAxis::Forward
    } else {
        ForwardAxis::Hold
    };

    (forward, rotate)
}

/// World-space movement produced from one action vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveCommand {
    /// Unit direction to translate along, or zero to stand still.
    pub dir_to_go: Vec2,
    /// Turn rate sign: positive is clockwise (right), zero holds heading.
    pub turn: f32,
    pub laser_on: bool,
}

impl MoveCommand {
    pub const HOLD: MoveCommand = MoveCommand {
        dir_to_go: Vec2::ZERO,
        turn: 0.0,
        laser_on: false,
    };
}

/// Laser override behavior: fire automatically when the enemy crosses the
/// sights and suppress fire everywhere else.
#[derive(Debug, Clone, Copy)]
pub struct ShootConfig {
    pub shoot_on_sight: bool,
    pub hold_fire_otherwise: bool,
}

impl Default for ShootConfig {
    fn default() -> Self {
        Self { shoot_on_sight: true, hold_fire_otherwise: true }
    }
}

/// Stateful action-to-movement translator. One per agent; the state is the
/// laser cooldown clock.
#[derive(Debug)]
pub struct Steering {
    config: ShootConfig,
    /// Match clock reading (seconds remaining) at the last shot.
    last_shot_at: Option<f32>,
}

impl Steering {
    pub fn new(config: ShootConfig) -> Self {
        Self { config, last_shot_at: None }
    }

    /// Resolves an action vector against the current world state. The
    /// go-to-target and go-to-base axes override plain movement with a
    /// turn-and-go toward the respective point; the shoot axis may be
    /// overridden by the on-sight gate.
    pub fn apply_action(&mut self, snap: &WorldSnapshot, action: ActionVector) -> MoveCommand {
        let mut shoot = action.shoot;
        if self.on_sight_gate_open(snap) {
            shoot = true;
            self.last_shot_at = Some(snap.time_remaining);
            trace!(tick = snap.tick, "laser override: enemy on sight");
        } else if self.config.hold_fire_otherwise {
            shoot = false;
        }

        let (forward, rotate) = if action.go_to_target {
            match snap.nearest_free_target() {
                Some(target) => {
                    let yaw = snap.yaw_to(target.position);
                    how_to_turn_or_go(yaw, false, false)
                }
                None => (ForwardAxis::Hold, RotateAxis::Hold),
            }
        } else if action.go_to_base {
            how_to_turn_or_go(snap.yaw_to(snap.my_base), false, false)
        } else {
            (action.forward, action.rotate)
        };

        let dir_to_go = match forward {
            ForwardAxis::Hold => Vec2::ZERO,
            ForwardAxis::Forward => snap.me.pose.forward(),
            ForwardAxis::Backward => snap.me.pose.forward().scaled(-1.0),
        };
        let turn = match rotate {
            RotateAxis::Hold => 0.0,
            RotateAxis::Right => 1.0,
            RotateAxis::Left => -1.0,
        };

        MoveCommand { dir_to_go, turn, laser_on: shoot }
    }

    fn on_sight_gate_open(&self, snap: &WorldSnapshot) -> bool {
        if !self.config.shoot_on_sight {
            return false;
        }
        let cooled = match self.last_shot_at {
            // The match clock counts down, so elapsed time is the drop.
            Some(at) => at - snap.time_remaining >= LASER_COOLDOWN,
            None => true,
        };
        cooled
            && !snap.enemy.frozen
            && snap.yaw_to(snap.enemy.pose.position).abs() < ON_SIGHT_CONE_DEG
            && snap.distance_to_enemy() < LASER_LENGTH
    }
}
