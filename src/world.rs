//! Per-agent view of the arena at one tick. Every mode and sensor reads
//! from a [`WorldSnapshot`] instead of touching the simulation directly,
//! so decision code stays deterministic and testable.

use crate::geom::{Pose, Vec2, wrap_deg};

/// Maximum distance considered when picking the nearest target.
pub const TARGET_SEARCH_RADIUS: f32 = 200.0;

/// Collision radius used by raycasts for agents and loose targets.
pub const ENTITY_RADIUS: f32 = 1.0;

/// Which side of the match an entity belongs to, from the perspective of
/// the agent holding the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Mine,
    Theirs,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentState {
    pub pose: Pose,
    pub velocity: Vec2,
    pub frozen: bool,
    pub laser_on: bool,
    pub carrying: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetState {
    pub position: Vec2,
    pub carried_by: Option<Side>,
    pub in_base: Option<Side>,
}

impl TargetState {
    /// A target is free when nobody carries it and it is not already
    /// banked in this agent's base.
    pub fn is_free(&self) -> bool {
        self.carried_by.is_none() && self.in_base != Some(Side::Mine)
    }
}

/// Axis-aligned playable area. Rays that leave it report a wall hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldBounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl FieldBounds {
    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn clamp(&self, p: Vec2) -> Vec2 {
        Vec2 {
            x: p.x.clamp(self.min.x, self.max.x),
            y: p.y.clamp(self.min.y, self.max.y),
        }
    }
}

/// What a perception ray can report hitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTag {
    Wall,
    Enemy,
    Target,
    MyBase,
    TheirBase,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub tag: HitTag,
    /// Distance to the hit divided by the ray length, in [0, 1].
    pub fraction: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorldSnapshot {
    pub tick: u64,
    /// Seconds left on the match clock.
    pub time_remaining: f32,
    pub me: AgentState,
    pub enemy: AgentState,
    pub my_base: Vec2,
    pub their_base: Vec2,
    /// Targets banked in this agent's base.
    pub my_captured: usize,
    /// Targets banked in the opposing base.
    pub their_captured: usize,
    pub targets: Vec<TargetState>,
    pub field: FieldBounds,
}

impl WorldSnapshot {
    /// Signed heading error from this agent to `point`, in degrees.
    /// Negative means the point lies to the right.
    pub fn yaw_to(&self, point: Vec2) -> f32 {
        self.me.pose.yaw_to(point)
    }

    /// Nearest target that is neither carried nor already in this agent's
    /// base. `None` when every target is taken, which callers must treat
    /// as "stand still", not an error.
    pub fn nearest_free_target(&self) -> Option<&TargetState> {
        let mut best: Option<&TargetState> = None;
        let mut best_distance = TARGET_SEARCH_RADIUS;
        for target in &self.targets {
            if !target.is_free() {
                continue;
            }
            let d = self.me.pose.position.distance(target.position);
            if d < best_distance {
                best_distance = d;
                best = Some(target);
            }
        }
        best
    }

    /// True when the enemy's facing points more than 90 degrees away from
    /// this agent, i.e. chasing from behind is currently safe.
    pub fn enemy_is_facing_away(&self) -> bool {
        let to_me = self.me.pose.position.sub(self.enemy.pose.position);
        self.enemy.pose.forward().dot(to_me) < 0.0
    }

    /// Point `dist` units directly behind the enemy's current facing.
    pub fn point_behind_enemy(&self, dist: f32) -> Vec2 {
        self.enemy
            .pose
            .position
            .sub(self.enemy.pose.forward().scaled(dist))
    }

    pub fn distance_to_enemy(&self) -> f32 {
        self.me.pose.position.distance(self.enemy.pose.position)
    }

    /// Casts a ray from this agent and reports the closest hit within
    /// `max_len`, if any. The agent itself is never reported.
    pub fn raycast(&self, heading_deg: f32, max_len: f32) -> Option<RayHit> {
        let origin = self.me.pose.position;
        let dir = Pose {
            position: origin,
            heading_deg: wrap_deg(heading_deg),
        }
        .forward();

        let mut nearest: Option<(f32, HitTag)> = None;
        let mut consider = |distance: f32, tag: HitTag| {
            if distance < 0.0 || distance > max_len {
                return;
            }
            if nearest.map(|(d, _)| distance < d).unwrap_or(true) {
                nearest = Some((distance, tag));
            }
        };

        if let Some(d) = ray_circle(origin, dir, self.enemy.pose.position, ENTITY_RADIUS) {
            consider(d, HitTag::Enemy);
        }
        for target in &self.targets {
            if target.carried_by.is_some() {
                continue;
            }
            if let Some(d) = ray_circle(origin, dir, target.position, ENTITY_RADIUS) {
                consider(d, HitTag::Target);
            }
        }
        if let Some(d) = ray_circle(origin, dir, self.my_base, ENTITY_RADIUS * 2.0) {
            consider(d, HitTag::MyBase);
        }
        if let Some(d) = ray_circle(origin, dir, self.their_base, ENTITY_RADIUS * 2.0) {
            consider(d, HitTag::TheirBase);
        }
        if let Some(d) = ray_bounds_exit(origin, dir, self.field) {
            consider(d, HitTag::Wall);
        }

        nearest.map(|(distance, tag)| RayHit {
            tag,
            fraction: (distance / max_len).clamp(0.0, 1.0),
        })
    }
}

/// Distance along the ray to the first intersection with a circle, if the
/// ray starts outside it.
fn ray_circle(origin: Vec2, dir: Vec2, center: Vec2, radius: f32) -> Option<f32> {
    let to_center = center.sub(origin);
    let proj = to_center.dot(dir);
    if proj < 0.0 {
        return None;
    }
    let closest_sq = to_center.dot(to_center) - proj * proj;
    let radius_sq = radius * radius;
    if closest_sq > radius_sq {
        return None;
    }
    let back = (radius_sq - closest_sq).sqrt();
    let d = proj - back;
    if d < 0.0 { None } else { Some(d) }
}

/// Distance along the ray until it leaves the field bounds.
fn ray_bounds_exit(origin: Vec2, dir: Vec2, field: FieldBounds) -> Option<f32> {
    let mut exit = f32::INFINITY;
    if dir.x > 1e-6 {
        exit = exit.min((field.max.x - origin.x) / dir.x);
    } else if dir.x < -1e-6 {
        exit = exit.min((field.min.x - origin.x) / dir.x);
    }
    if dir.y > 1e-6 {
        exit = exit.min((field.max.y - origin.y) / dir.y);
    } else if dir.y < -1e-6 {
        exit = exit.min((field.min.y - origin.y) / dir.y);
    }
    if exit.is_finite() && exit >= 0.0 {
        Some(exit)
    } else {
        None
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// A snapshot with both agents at rest on an empty 100x100 field,
    /// facing each other along the y axis.
    pub fn snapshot() -> WorldSnapshot {
        WorldSnapshot {
            tick: 0,
            time_remaining: 120.0,
            me: AgentState {
                pose: Pose { position: Vec2 { x: 0.0, y: -20.0 }, heading_deg: 0.0 },
                velocity: Vec2::ZERO,
                frozen: false,
                laser_on: false,
                carrying: 0,
            },
            enemy: AgentState {
                pose: Pose { position: Vec2 { x: 0.0, y: 20.0 }, heading_deg: 180.0 },
                velocity: Vec2::ZERO,
                frozen: false,
                laser_on: false,
                carrying: 0,
            },
            my_base: Vec2 { x: 0.0, y: -45.0 },
            their_base: Vec2 { x: 0.0, y: 45.0 },
            my_captured: 0,
            their_captured: 0,
            targets: Vec::new(),
            field: FieldBounds {
                min: Vec2 { x: -50.0, y: -50.0 },
                max: Vec2 { x: 50.0, y: 50.0 },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_free_target_skips_carried_and_banked() {
        let mut snap = testutil::snapshot();
        snap.targets = vec![
            TargetState {
                position: Vec2 { x: 0.0, y: -18.0 },
                carried_by: Some(Side::Theirs),
                in_base: None,
            },
            TargetState {
                position: Vec2 { x: 0.0, y: -44.0 },
                carried_by: None,
                in_base: Some(Side::Mine),
            },
            TargetState {
                position: Vec2 { x: 10.0, y: -20.0 },
                carried_by: None,
                in_base: None,
            },
        ];
        let nearest = snap.nearest_free_target().unwrap();
        assert_eq!(nearest.position, Vec2 { x: 10.0, y: -20.0 });
    }

    #[test]
    fn nearest_free_target_is_none_when_all_taken() {
        let mut snap = testutil::snapshot();
        snap.targets = vec![TargetState {
            position: Vec2 { x: 1.0, y: 1.0 },
            carried_by: Some(Side::Mine),
            in_base: None,
        }];
        assert!(snap.nearest_free_target().is_none());
    }

    #[test]
    fn enemy_facing_toward_and_away() {
        let mut snap = testutil::snapshot();
        // Enemy at heading 180 faces -y, straight at us.
        assert!(!snap.enemy_is_facing_away());
        snap.enemy.pose.heading_deg = 0.0;
        assert!(snap.enemy_is_facing_away());
    }

    #[test]
    fn point_behind_enemy_is_opposite_its_facing() {
        let snap = testutil::snapshot();
        // Enemy faces -y, so behind it is +y.
        let p = snap.point_behind_enemy(5.0);
        assert!((p.y - 25.0).abs() < 1e-4);
        assert!(p.x.abs() < 1e-4);
    }

    #[test]
    fn raycast_hits_enemy_before_wall() {
        let snap = testutil::snapshot();
        let hit = snap.raycast(0.0, 80.0).unwrap();
        assert_eq!(hit.tag, HitTag::Enemy);
        assert!(hit.fraction < 0.5);
    }

    #[test]
    fn raycast_reports_wall_on_empty_bearing() {
        let snap = testutil::snapshot();
        // Facing -x from (0, -20): nothing there but the boundary at -50.
        let hit = snap.raycast(-90.0, 80.0).unwrap();
        assert_eq!(hit.tag, HitTag::Wall);
        assert!((hit.fraction - 50.0 / 80.0).abs() < 1e-3);
    }

    #[test]
    fn raycast_misses_within_short_range() {
        let snap = testutil::snapshot();
        assert!(snap.raycast(0.0, 10.0).is_none());
    }
}
