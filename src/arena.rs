//! Headless arena. A kinematic stand-in for the host engine, good enough
//! to drive two controllers against each other: movement integration,
//! laser freezes, target pickup and capture, and the shaped reward
//! bookkeeping trained policies were fitted against.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::geom::{Pose, Vec2};
use crate::steering::{MoveCommand, LASER_LENGTH};
use crate::world::{
    AgentState, FieldBounds, Side, TargetState, WorldSnapshot, ENTITY_RADIUS,
};

/// Seconds of match time per simulation tick.
pub const TICK_SECONDS: f32 = 0.1;
/// Full match length on the countdown clock.
pub const MATCH_SECONDS: f32 = 120.0;
/// Seconds an agent stays frozen after a laser hit.
const FREEZE_SECONDS: f32 = 4.0;

const MOVE_SPEED: f32 = 6.0;
const TURN_RATE_DEG: f32 = 120.0;
/// Heading error under which a firing laser connects.
const LASER_CONE_DEG: f32 = 5.0;
const PICKUP_RADIUS: f32 = 2.0;
const BASE_RADIUS: f32 = 8.0;

const HALF_FIELD: f32 = 50.0;
const NUM_TARGETS: usize = 9;

/// Shaped reward weights, the values the collector policies trained on.
#[derive(Debug, Clone, Copy)]
pub struct RewardTable {
    pub hit_enemy: f32,
    pub frozen: f32,
    pub shooting_laser: f32,
    pub dropped_one_target: f32,
    pub carry_one_target_back_to_base: f32,
    pub pick_up_target: f32,
    pub bump_into_wall: f32,
    pub enemy_stole_one_target: f32,
    pub bonus_stealing_from_enemy: f32,
    pub bonus_per_target_made_drop: f32,
}

impl Default for RewardTable {
    fn default() -> Self {
        let laser_hit = 0.0075;
        let pick_up = 0.0075;
        let stealing = 0.0075;
        Self {
            hit_enemy: laser_hit,
            frozen: -laser_hit,
            shooting_laser: -0.0001,
            dropped_one_target: -laser_hit,
            carry_one_target_back_to_base: 0.01,
            pick_up_target: pick_up,
            bump_into_wall: -0.005,
            enemy_stole_one_target: -(stealing + pick_up),
            bonus_stealing_from_enemy: stealing,
            bonus_per_target_made_drop: laser_hit,
        }
    }
}

#[derive(Debug)]
struct AgentBody {
    pose: Pose,
    velocity: Vec2,
    /// Match clock reading at which the freeze lifts, if frozen.
    frozen_until: Option<f32>,
    carrying: usize,
    captured: usize,
    reward: f32,
    laser_on: bool,
}

impl AgentBody {
    fn new(position: Vec2, heading_deg: f32) -> Self {
        Self {
            pose: Pose { position, heading_deg },
            velocity: Vec2::ZERO,
            frozen_until: None,
            carrying: 0,
            captured: 0,
            reward: 0.0,
            laser_on: false,
        }
    }

    fn frozen(&self, clock: f32) -> bool {
        // The clock counts down; the freeze lifts once it drops past the
        // stored reading.
        matches!(self.frozen_until, Some(until) if clock > until)
    }
}

#[derive(Debug, Clone, Copy)]
struct ArenaTarget {
    position: Vec2,
    carried_by: Option<usize>,
    in_base: Option<usize>,
}

/// Final scoreboard of a finished match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchScore {
    pub captured: [usize; 2],
    pub reward: [f32; 2],
}

pub struct Arena {
    tick: u64,
    time_remaining: f32,
    agents: [AgentBody; 2],
    bases: [Vec2; 2],
    targets: Vec<ArenaTarget>,
    field: FieldBounds,
    rewards: RewardTable,
}

impl Arena {
    /// Builds a fresh match with targets scattered across the midfield.
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let targets = (0..NUM_TARGETS)
            .map(|_| ArenaTarget {
                position: Vec2::new(
                    rng.random_range(-HALF_FIELD * 0.8..HALF_FIELD * 0.8),
                    rng.random_range(-HALF_FIELD * 0.5..HALF_FIELD * 0.5),
                ),
                carried_by: None,
                in_base: None,
            })
            .collect();
        Self {
            tick: 0,
            time_remaining: MATCH_SECONDS,
            agents: [
                AgentBody::new(Vec2::new(0.0, -HALF_FIELD * 0.4), 0.0),
                AgentBody::new(Vec2::new(0.0, HALF_FIELD * 0.4), 180.0),
            ],
            bases: [
                Vec2::new(0.0, -HALF_FIELD * 0.9),
                Vec2::new(0.0, HALF_FIELD * 0.9),
            ],
            targets,
            field: FieldBounds {
                min: Vec2::new(-HALF_FIELD, -HALF_FIELD),
                max: Vec2::new(HALF_FIELD, HALF_FIELD),
            },
            rewards: RewardTable::default(),
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn is_over(&self) -> bool {
        self.time_remaining <= 0.0
    }

    pub fn score(&self) -> MatchScore {
        MatchScore {
            captured: [self.agents[0].captured, self.agents[1].captured],
            reward: [self.agents[0].reward, self.agents[1].reward],
        }
    }

    /// The world as agent `index` sees it.
    pub fn snapshot_for(&self, index: usize) -> WorldSnapshot {
        let other = 1 - index;
        let clock = self.time_remaining;
        let me = &self.agents[index];
        let enemy = &self.agents[other];
        let targets = self
            .targets
            .iter()
            .map(|t| TargetState {
                position: t.position,
                carried_by: t.carried_by.map(|owner| side_for(index, owner)),
                in_base: t.in_base.map(|owner| side_for(index, owner)),
            })
            .collect();
        WorldSnapshot {
            tick: self.tick,
            time_remaining: clock,
            me: AgentState {
                pose: me.pose,
                velocity: me.velocity,
                frozen: me.frozen(clock),
                laser_on: me.laser_on,
                carrying: me.carrying,
            },
            enemy: AgentState {
                pose: enemy.pose,
                velocity: enemy.velocity,
                frozen: enemy.frozen(clock),
                laser_on: enemy.laser_on,
                carrying: enemy.carrying,
            },
            my_base: self.bases[index],
            their_base: self.bases[other],
            my_captured: me.captured,
            their_captured: enemy.captured,
            targets,
            field: self.field,
        }
    }

    /// Advances the match by one tick under the given movement commands,
    /// agent 0 first.
    pub fn step(&mut self, commands: [MoveCommand; 2]) {
        self.tick += 1;
        // Derive the clock from the tick count so the final tick lands on
        // exactly zero instead of drifting from accumulated subtraction.
        self.time_remaining = (MATCH_SECONDS - self.tick as f32 * TICK_SECONDS).max(0.0);
        let clock = self.time_remaining;

        for index in 0..2 {
            self.integrate(index, &commands[index], clock);
        }
        for index in 0..2 {
            self.fire_laser(index, clock);
        }
        for index in 0..2 {
            self.pick_up_targets(index, clock);
            self.bank_targets(index);
        }
        for index in 0..2 {
            if self.agents[index].frozen(clock) {
                self.agents[index].reward += self.rewards.frozen;
            }
        }
    }

    fn integrate(&mut self, index: usize, command: &MoveCommand, clock: f32) {
        let body = &mut self.agents[index];
        if body.frozen(clock) {
            body.velocity = Vec2::ZERO;
            body.laser_on = false;
            return;
        }
        body.laser_on = command.laser_on;
        if command.laser_on {
            body.reward += self.rewards.shooting_laser;
        }
        body.pose.heading_deg = crate::geom::wrap_deg(
            body.pose.heading_deg + command.turn * TURN_RATE_DEG * TICK_SECONDS,
        );
        body.velocity = command.dir_to_go.scaled(MOVE_SPEED);
        let next = body.pose.position.add(body.velocity.scaled(TICK_SECONDS));
        let clamped = self.field.clamp(next);
        if clamped != next {
            body.reward += self.rewards.bump_into_wall;
            debug!(agent = index, tick = self.tick, "bumped into the wall");
        }
        body.pose.position = clamped;

        // Carried targets ride along.
        for target in self.targets.iter_mut() {
            if target.carried_by == Some(index) {
                target.position = clamped;
            }
        }
    }

    fn fire_laser(&mut self, index: usize, clock: f32) {
        let other = 1 - index;
        if !self.agents[index].laser_on || self.agents[index].frozen(clock) {
            return;
        }
        let shooter_pose = self.agents[index].pose;
        let enemy_pos = self.agents[other].pose.position;
        let yaw = shooter_pose.yaw_to(enemy_pos);
        let dist = shooter_pose.position.distance(enemy_pos);
        let hit = yaw.abs() < LASER_CONE_DEG
            && dist < LASER_LENGTH + ENTITY_RADIUS
            && !self.agents[other].frozen(clock);
        if !hit {
            return;
        }

        info!(shooter = index, tick = self.tick, "laser hit, enemy frozen");
        self.agents[other].frozen_until = Some(clock - FREEZE_SECONDS);
        let dropped = self.agents[other].carrying;
        self.agents[other].carrying = 0;
        for target in self.targets.iter_mut() {
            if target.carried_by == Some(other) {
                target.carried_by = None;
            }
        }
        self.agents[index].reward += self.rewards.hit_enemy
            + self.rewards.bonus_per_target_made_drop * dropped as f32;
        self.agents[other].reward += self.rewards.dropped_one_target * dropped as f32;
    }

    fn pick_up_targets(&mut self, index: usize, clock: f32) {
        if self.agents[index].frozen(clock) {
            return;
        }
        let other = 1 - index;
        let position = self.agents[index].pose.position;
        let mut picked = 0;
        let mut stolen = 0;
        for target in self.targets.iter_mut() {
            let free = target.carried_by.is_none() && target.in_base != Some(index);
            if free && target.position.distance(position) < PICKUP_RADIUS {
                if target.in_base == Some(other) {
                    stolen += 1;
                    self.agents[other].captured =
                        self.agents[other].captured.saturating_sub(1);
                }
                target.carried_by = Some(index);
                target.in_base = None;
                picked += 1;
            }
        }
        if picked > 0 {
            self.agents[index].carrying += picked;
            self.agents[index].reward += self.rewards.pick_up_target * picked as f32
                + self.rewards.bonus_stealing_from_enemy * stolen as f32;
            self.agents[other].reward +=
                self.rewards.enemy_stole_one_target * stolen as f32;
            debug!(agent = index, picked, stolen, tick = self.tick, "picked up targets");
        }
    }

    fn bank_targets(&mut self, index: usize) {
        let body = &mut self.agents[index];
        if body.carrying == 0 || body.pose.position.distance(self.bases[index]) > BASE_RADIUS {
            return;
        }
        let banked = body.carrying;
        body.carrying = 0;
        body.captured += banked;
        body.reward += self.rewards.carry_one_target_back_to_base * banked as f32;
        for target in self.targets.iter_mut() {
            if target.carried_by == Some(index) {
                target.carried_by = None;
                target.in_base = Some(index);
                target.position = self.bases[index];
            }
        }
        info!(agent = index, banked, total = body.captured, tick = self.tick, "banked targets");
    }
}

/// Maps an absolute agent index to a side relative to `viewer`.
fn side_for(viewer: usize, owner: usize) -> Side {
    if owner == viewer {
        Side::Mine
    } else {
        Side::Theirs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn still() -> MoveCommand {
        MoveCommand::HOLD
    }

    fn forward_for(arena: &Arena, index: usize) -> MoveCommand {
        MoveCommand {
            dir_to_go: arena.snapshot_for(index).me.pose.forward(),
            turn: 0.0,
            laser_on: false,
        }
    }

    #[test]
    fn clock_counts_down_to_the_end_of_the_match() {
        let mut arena = Arena::new(1);
        let ticks = (MATCH_SECONDS / TICK_SECONDS) as usize;
        for _ in 0..ticks {
            assert!(!arena.is_over());
            arena.step([still(), still()]);
        }
        assert!(arena.is_over());
        assert_eq!(arena.tick(), ticks as u64);
        // The clock must land on exactly zero, not drift past the match
        // end from repeated subtraction.
        assert_eq!(arena.time_remaining, 0.0);
    }

    #[test]
    fn a_laser_hit_freezes_and_strips_the_enemy() {
        let mut arena = Arena::new(2);
        // Stage agent 1 carrying a target right in front of agent 0.
        arena.targets[0].carried_by = Some(1);
        arena.agents[1].carrying = 1;
        arena.agents[1].pose.position = Vec2::new(0.0, -10.0);
        arena.agents[0].pose.position = Vec2::new(0.0, -15.0);
        arena.agents[0].pose.heading_deg = 0.0;

        let shoot = MoveCommand { dir_to_go: Vec2::ZERO, turn: 0.0, laser_on: true };
        arena.step([shoot, still()]);

        let clock = arena.time_remaining;
        assert!(arena.agents[1].frozen(clock));
        assert_eq!(arena.agents[1].carrying, 0);
        assert!(arena.targets[0].carried_by.is_none());
        assert!(arena.agents[0].reward > 0.0);

        // The freeze lifts after its window on the countdown clock.
        for _ in 0..((FREEZE_SECONDS / TICK_SECONDS) as usize + 1) {
            arena.step([still(), still()]);
        }
        assert!(!arena.agents[1].frozen(arena.time_remaining));
    }

    #[test]
    fn walking_over_a_target_and_home_banks_it() {
        let mut arena = Arena::new(3);
        arena.targets.truncate(1);
        arena.targets[0].position = Vec2::new(0.0, -21.0);
        // Agent 0 starts at (0, -20) facing +y; walk backward onto the
        // target, then keep backing into the base.
        let back = MoveCommand {
            dir_to_go: Vec2::new(0.0, -1.0),
            turn: 0.0,
            laser_on: false,
        };
        arena.step([back, still()]);
        assert_eq!(arena.agents[0].carrying, 1);

        for _ in 0..400 {
            if arena.agents[0].captured > 0 {
                break;
            }
            arena.step([back, still()]);
        }
        assert_eq!(arena.agents[0].captured, 1);
        assert_eq!(arena.targets[0].in_base, Some(0));
        let snap = arena.snapshot_for(0);
        assert_eq!(snap.my_captured, 1);
        assert_eq!(snap.targets[0].in_base, Some(Side::Mine));
    }

    #[test]
    fn walls_clamp_movement_and_cost_reward() {
        let mut arena = Arena::new(4);
        arena.agents[0].pose.position = Vec2::new(0.0, HALF_FIELD - 0.1);
        let cmd = forward_for(&arena, 0);
        arena.step([cmd, still()]);
        assert!(arena.agents[0].pose.position.y <= HALF_FIELD);
        assert!(arena.agents[0].reward < 0.0);
    }

    #[test]
    fn snapshots_mirror_sides() {
        let arena = Arena::new(5);
        let zero = arena.snapshot_for(0);
        let one = arena.snapshot_for(1);
        assert_eq!(zero.my_base, one.their_base);
        assert_eq!(zero.me.pose.position, one.enemy.pose.position);
    }
}
