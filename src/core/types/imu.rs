//! Inertial pre-integration hints for one sweep.

use crate::core::math::Angle;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// IMU state sampled at the boundaries of a sweep.
///
/// Produced by an external pre-integration stage and installed once per
/// sweep. The start/end attitudes correct rotational drift accumulated
/// during the sweep; the velocity delta seeds the solver's translation
/// prior; the shift is the translation the IMU integrated within the
/// sweep and is removed before re-projecting points to sweep end.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImuTrans {
    /// Roll at sweep start
    pub roll_start: Angle,
    /// Pitch at sweep start
    pub pitch_start: Angle,
    /// Yaw at sweep start
    pub yaw_start: Angle,
    /// Roll at sweep end
    pub roll_end: Angle,
    /// Pitch at sweep end
    pub pitch_end: Angle,
    /// Yaw at sweep end
    pub yaw_end: Angle,
    /// Translation drift integrated across the sweep, meters
    pub shift_from_start: Vector3<f32>,
    /// Velocity change across the sweep, meters/second
    pub velo_from_start: Vector3<f32>,
}
