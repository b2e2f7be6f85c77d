//! Planar geometry shared by the heuristics and the arena.

/// A 2D vector on the arena floor plane.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Vec2) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn normalized(self) -> Vec2 {
        let len = self.length();
        if len <= f32::EPSILON {
            Vec2::ZERO
        } else {
            Vec2::new(self.x / len, self.y / len)
        }
    }

    pub fn dot(self, other: Vec2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    /// Rotates the vector clockwise by `degrees` (matching the arena's
    /// clockwise-positive heading convention).
    pub fn rotated_deg(self, degrees: f32) -> Vec2 {
        let rad = degrees.to_radians();
        let (sin, cos) = rad.sin_cos();
        Vec2::new(self.x * cos + self.y * sin, -self.x * sin + self.y * cos)
    }

    pub fn scaled(self, factor: f32) -> Vec2 {
        Vec2::new(self.x * factor, self.y * factor)
    }

    pub fn add(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x + other.x, self.y + other.y)
    }

    pub fn sub(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x - other.x, self.y - other.y)
    }
}

/// Position plus facing direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec2,
    /// Heading in degrees; 0 points along +y, positive turns clockwise.
    pub heading_deg: f32,
}

impl Pose {
    pub fn new(position: Vec2, heading_deg: f32) -> Self {
        Self { position, heading_deg }
    }

    /// Unit vector the pose is facing.
    pub fn forward(&self) -> Vec2 {
        Vec2::new(0.0, 1.0).rotated_deg(self.heading_deg)
    }

    /// Signed yaw delta from this pose's forward to `point`, in degrees.
    /// Negative means the point lies to the right (a clockwise turn faces
    /// it); range (-180, 180].
    pub fn yaw_to(&self, point: Vec2) -> f32 {
        let to_point = point.sub(self.position);
        signed_angle_deg(self.forward(), to_point)
    }
}

/// Signed angle from `from` to `to`, counter-clockwise positive, in
/// (-180, 180].
pub fn signed_angle_deg(from: Vec2, to: Vec2) -> f32 {
    let cross = from.x * to.y - from.y * to.x;
    let dot = from.dot(to);
    cross.atan2(dot).to_degrees()
}

/// Normalizes any angle in degrees into (-180, 180].
pub fn wrap_deg(angle: f32) -> f32 {
    let mut a = angle % 360.0;
    if a > 180.0 {
        a -= 360.0;
    } else if a <= -180.0 {
        a += 360.0;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f32, b: f32) {
        assert!((a - b).abs() < 1e-3, "{a} != {b}");
    }

    #[test]
    fn forward_follows_heading() {
        let pose = Pose::new(Vec2::ZERO, 0.0);
        assert_close(pose.forward().y, 1.0);

        let pose = Pose::new(Vec2::ZERO, 90.0);
        assert_close(pose.forward().x, 1.0);
        assert_close(pose.forward().y, 0.0);
    }

    #[test]
    fn yaw_to_is_negative_toward_the_right() {
        let pose = Pose::new(Vec2::ZERO, 0.0);
        assert_close(pose.yaw_to(Vec2::new(1.0, 0.0)), -90.0);
        assert_close(pose.yaw_to(Vec2::new(-1.0, 0.0)), 90.0);
        // Straight ahead -> zero.
        assert_close(pose.yaw_to(Vec2::new(0.0, 5.0)), 0.0);
        // Straight behind -> 180.
        assert_close(pose.yaw_to(Vec2::new(0.0, -5.0)).abs(), 180.0);
    }

    #[test]
    fn wrap_deg_stays_in_range() {
        assert_close(wrap_deg(190.0), -170.0);
        assert_close(wrap_deg(-190.0), 170.0);
        assert_close(wrap_deg(360.0), 0.0);
        assert_close(wrap_deg(180.0), 180.0);
    }

    #[test]
    fn rotated_deg_is_clockwise() {
        let v = Vec2::new(0.0, 1.0).rotated_deg(90.0);
        assert_close(v.x, 1.0);
        assert_close(v.y, 0.0);
    }
}
