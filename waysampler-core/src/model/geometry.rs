//! World-space positions and orientations.
//!
//! The world frame is right-handed with `x` pointing east, `y` north and `z`
//! up. Angles are in degrees; yaw is measured counter-clockwise from `+x`.

use std::ops::{Add, AddAssign, Div, Mul, Sub};

use serde::{Deserialize, Serialize};

/// Point or vector in world space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldPos {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl WorldPos {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);
    pub const UP: Self = Self::new(0.0, 0.0, 1.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn length(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn distance(self, other: Self) -> f64 {
        (other - self).length()
    }

    /// Unit vector in the same direction, or zero for a (near) zero vector
    pub fn normalized_or_zero(self) -> Self {
        let length = self.length();
        if length <= f64::EPSILON {
            Self::ZERO
        } else {
            self / length
        }
    }

    pub fn lerp(self, other: Self, alpha: f64) -> Self {
        self + (other - self) * alpha
    }

    pub fn with_z(self, z: f64) -> Self {
        Self { z, ..self }
    }
}

impl Add for WorldPos {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for WorldPos {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for WorldPos {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for WorldPos {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Div<f64> for WorldPos {
    type Output = Self;

    fn div(self, rhs: f64) -> Self {
        Self::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

/// Wraps an angle into `[0, 360)`
pub fn clamp_axis(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Camera orientation in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rotation {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

impl Rotation {
    pub const fn new(yaw: f64, pitch: f64, roll: f64) -> Self {
        Self { yaw, pitch, roll }
    }

    /// Orientation looking along `direction` with zero roll.
    /// A zero vector yields the identity rotation.
    pub fn from_direction(direction: WorldPos) -> Self {
        if direction.length() <= f64::EPSILON {
            return Self::default();
        }
        let horizontal = direction.x.hypot(direction.y);
        Self {
            yaw: direction.y.atan2(direction.x).to_degrees(),
            pitch: direction.z.atan2(horizontal).to_degrees(),
            roll: 0.0,
        }
    }

    /// Builds a rotation from a compass heading (clockwise from north)
    pub fn from_compass(heading: f64, pitch: f64, roll: f64) -> Self {
        Self {
            yaw: clamp_axis(90.0 - heading),
            pitch,
            roll,
        }
    }

    /// Unit forward vector
    pub fn forward(&self) -> WorldPos {
        let (yaw_sin, yaw_cos) = self.yaw.to_radians().sin_cos();
        let (pitch_sin, pitch_cos) = self.pitch.to_radians().sin_cos();
        WorldPos::new(pitch_cos * yaw_cos, pitch_cos * yaw_sin, pitch_sin)
    }

    /// Compass heading in `[0, 360)`, clockwise from north
    pub fn compass_heading(&self) -> f64 {
        clamp_axis(90.0 - self.yaw)
    }
}

/// Camera location plus orientation
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub location: WorldPos,
    pub rotation: Rotation,
}

impl Pose {
    pub const fn new(location: WorldPos, rotation: Rotation) -> Self {
        Self { location, rotation }
    }
}
