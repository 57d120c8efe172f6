//! Motion compensation (de-skew) of sweep points.
//!
//! The sensor moves continuously while a sweep is acquired, so each point
//! lives in the frame of its own acquisition instant. The incremental
//! transform is interpolated by the point's sweep fraction to re-project
//! points either to the start-of-sweep frame (for matching against the
//! previous sweep) or to the end-of-sweep frame (for export downstream).

use crate::core::math::{Angle, rotate_yxz, rotate_zxy};
use crate::core::types::{ImuTrans, Point3D, PointCloud3D, Pose6D};

/// Re-project a point to the start-of-sweep frame.
///
/// The incremental transform is scaled by the point's sweep fraction and
/// inverted: translation is subtracted first, then the inverse rotation
/// `rotate_zxy` with the negated, scaled angles. The channel value is
/// preserved.
pub fn transform_to_start(point: &Point3D, transform: &Pose6D) -> Point3D {
    let s = point.sweep_fraction();

    let mut v = point.xyz() - s * transform.pos;
    rotate_zxy(
        &mut v,
        Angle::from(-s * transform.rot_z.rad()),
        Angle::from(-s * transform.rot_x.rad()),
        Angle::from(-s * transform.rot_y.rad()),
    );

    let mut out = *point;
    out.set_xyz(v);
    out
}

/// Re-project every point of a cloud to the end-of-sweep frame, in place.
///
/// Each point is first brought to the start frame by undoing its partial
/// transform, then carried to the sweep end by the full forward transform,
/// and finally corrected by the IMU attitudes at the sweep boundaries.
/// The channel's fractional part is stripped, marking the point as
/// canonical at sweep end.
pub fn transform_to_end(cloud: &mut PointCloud3D, transform: &Pose6D, imu: &ImuTrans) {
    for point in &mut cloud.points {
        let s = point.sweep_fraction();

        let mut v = point.xyz() - s * transform.pos;
        point.channel = (point.channel as i32) as f32;

        rotate_zxy(
            &mut v,
            Angle::from(-s * transform.rot_z.rad()),
            Angle::from(-s * transform.rot_x.rad()),
            Angle::from(-s * transform.rot_y.rad()),
        );
        rotate_yxz(&mut v, transform.rot_y, transform.rot_x, transform.rot_z);

        v += transform.pos - imu.shift_from_start;
        rotate_zxy(&mut v, imu.roll_start, imu.pitch_start, imu.yaw_start);
        rotate_yxz(&mut v, -imu.yaw_end, -imu.pitch_end, -imu.roll_end);

        point.set_xyz(v);
    }
}
