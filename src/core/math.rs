//! Mathematical primitives for sweep-to-sweep motion estimation.
//!
//! The angle wrapper and the two fixed rotation orders used everywhere in
//! this crate. Every rotation in the odometry pipeline is either
//! `rotate_zxy` (the forward convention) or `rotate_yxz` (its inverse);
//! mixing the two orders silently flips cross-coupled terms in the solver
//! Jacobians, so no other composition is exposed.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// An angle that always carries its sine and cosine.
///
/// The solver evaluates the same trigonometric terms for every
/// correspondence row, so `sin`/`cos` are computed once at construction
/// and handed out from the cache. `rad()`, `deg()`, `sin()` and `cos()`
/// are guaranteed consistent with each other.
///
/// # Example
/// ```
/// use gati_odom::Angle;
/// use std::f32::consts::FRAC_PI_2;
///
/// let a = Angle::from(FRAC_PI_2);
/// assert!((a.sin() - 1.0).abs() < 1e-6);
/// assert!((a.deg() - 90.0).abs() < 1e-4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "f32", into = "f32")]
pub struct Angle {
    rad: f32,
    sin: f32,
    cos: f32,
}

impl Angle {
    /// Angle value in radians.
    #[inline]
    pub fn rad(&self) -> f32 {
        self.rad
    }

    /// Angle value in degrees.
    #[inline]
    pub fn deg(&self) -> f32 {
        self.rad.to_degrees()
    }

    /// Cached sine.
    #[inline]
    pub fn sin(&self) -> f32 {
        self.sin
    }

    /// Cached cosine.
    #[inline]
    pub fn cos(&self) -> f32 {
        self.cos
    }
}

impl Default for Angle {
    fn default() -> Self {
        Self {
            rad: 0.0,
            sin: 0.0,
            cos: 1.0,
        }
    }
}

impl From<f32> for Angle {
    #[inline]
    fn from(rad: f32) -> Self {
        Self {
            rad,
            sin: rad.sin(),
            cos: rad.cos(),
        }
    }
}

impl From<Angle> for f32 {
    #[inline]
    fn from(angle: Angle) -> f32 {
        angle.rad
    }
}

impl std::ops::Neg for Angle {
    type Output = Angle;

    /// Negation reuses the cache: sin flips sign, cos is even.
    #[inline]
    fn neg(self) -> Angle {
        Angle {
            rad: -self.rad,
            sin: -self.sin,
            cos: self.cos,
        }
    }
}

impl std::ops::Add for Angle {
    type Output = Angle;

    #[inline]
    fn add(self, other: Angle) -> Angle {
        Angle::from(self.rad + other.rad)
    }
}

impl std::ops::AddAssign for Angle {
    #[inline]
    fn add_assign(&mut self, other: Angle) {
        *self = Angle::from(self.rad + other.rad);
    }
}

/// Rotate about the X axis.
#[inline]
pub fn rot_x(v: &mut Vector3<f32>, ang: Angle) {
    let y = v.y;
    v.y = ang.cos() * y - ang.sin() * v.z;
    v.z = ang.sin() * y + ang.cos() * v.z;
}

/// Rotate about the Y axis.
#[inline]
pub fn rot_y(v: &mut Vector3<f32>, ang: Angle) {
    let x = v.x;
    v.x = ang.cos() * x + ang.sin() * v.z;
    v.z = ang.cos() * v.z - ang.sin() * x;
}

/// Rotate about the Z axis.
#[inline]
pub fn rot_z(v: &mut Vector3<f32>, ang: Angle) {
    let x = v.x;
    v.x = ang.cos() * x - ang.sin() * v.y;
    v.y = ang.sin() * x + ang.cos() * v.y;
}

/// Intrinsic rotation in the order Z, then X, then Y.
#[inline]
pub fn rotate_zxy(v: &mut Vector3<f32>, rz: Angle, rx: Angle, ry: Angle) {
    rot_z(v, rz);
    rot_x(v, rx);
    rot_y(v, ry);
}

/// Intrinsic rotation in the order Y, then X, then Z.
///
/// With the same angles this is the exact inverse of [`rotate_zxy`] with
/// each angle negated.
#[inline]
pub fn rotate_yxz(v: &mut Vector3<f32>, ry: Angle, rx: Angle, rz: Angle) {
    rot_y(v, ry);
    rot_x(v, rx);
    rot_z(v, rz);
}
