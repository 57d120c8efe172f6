//! Six-degree-of-freedom rigid motion.

use crate::core::math::Angle;
use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// A rigid-body motion: three Euler angles and a translation.
///
/// The rotation convention is fixed for the whole crate: applying the
/// pose to a point means `rotate_yxz(p, rot_y, rot_x, rot_z)` followed by
/// adding `pos`; undoing it means subtracting `pos` and applying
/// `rotate_zxy` with the negated angles.
///
/// For composing rotations the authoritative form is the affine one
/// returned by [`Pose6D::rotation`]; see `accumulate_rotation` in the
/// engine. Hand-expanded trigonometric compositions disagree with it on
/// wrap-around and are not used.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose6D {
    /// Rotation about the X axis
    pub rot_x: Angle,
    /// Rotation about the Y axis
    pub rot_y: Angle,
    /// Rotation about the Z axis
    pub rot_z: Angle,
    /// Translation in meters
    pub pos: Vector3<f32>,
}

impl Pose6D {
    /// Identity motion.
    #[inline]
    pub fn identity() -> Self {
        Self::default()
    }

    /// Rotation matrix in the crate's affine convention.
    ///
    /// Equivalent to building the 4x4 transform from
    /// `(0, 0, 0, rot_y, rot_x, rot_z)` and taking the linear part:
    /// `R = Rz(rot_z) * Ry(rot_x) * Rx(rot_y)` in nalgebra's
    /// roll-pitch-yaw ordering.
    #[inline]
    pub fn rotation(&self) -> Rotation3<f32> {
        Rotation3::from_euler_angles(self.rot_y.rad(), self.rot_x.rad(), self.rot_z.rad())
    }

    /// Recover the Euler angles from an affine rotation, inverse of
    /// [`Pose6D::rotation`].
    #[inline]
    pub fn from_rotation(rotation: &Rotation3<f32>, pos: Vector3<f32>) -> Self {
        let (roll, pitch, yaw) = rotation.euler_angles();
        Self {
            rot_x: Angle::from(pitch),
            rot_y: Angle::from(roll),
            rot_z: Angle::from(yaw),
            pos,
        }
    }
}
