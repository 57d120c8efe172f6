//! End-to-End Odometry Scenarios
//!
//! Synthetic sweep sequences exercising the full tick pipeline:
//! - Cold start seeding of the previous-sweep buffers
//! - Stationary sensor convergence
//! - Pure translation recovery
//! - Degenerate corridor handling
//! - Non-finite input rejection
//! - Registered-cloud decimation
//!
//! Run with: `cargo test --test odometry_scenarios`

use approx::assert_relative_eq;
use gati_odom::{
    Angle, ImuTrans, LaserOdometry, OdometryConfig, Point3D, PointCloud3D,
};
use nalgebra::Vector3;

// ============================================================================
// Scene builders
// ============================================================================

/// Deterministic sub-millimeter jitter; keeps synthetic walls off exact
/// planes so residual gates and the k-d tree behave like they do on real
/// data.
fn jitter(i: usize) -> f32 {
    (i % 17) as f32 * 1e-4
}

/// Room-like surface cloud: a floor and two perpendicular walls, stored
/// ring-sorted. 144 points across 18 rings.
fn room_surfaces(offset: Vector3<f32>, frac: f32) -> PointCloud3D {
    let mut cloud = PointCloud3D::new();
    let mut n = 0;

    // Floor z = 0, rings 0..6 laid out along x.
    for r in 0..6 {
        for j in 0..8 {
            let p = Vector3::new(0.5 * j as f32, 0.5 * r as f32, jitter(n)) + offset;
            cloud.push(Point3D::new(p.x, p.y, p.z, r as f32 + frac));
            n += 1;
        }
    }
    // Wall x = 4, rings 6..12 laid out along y.
    for r in 6..12 {
        for j in 0..8 {
            let p = Vector3::new(
                4.0 + jitter(n),
                0.5 * j as f32,
                0.2 + 0.4 * (r - 6) as f32,
            ) + offset;
            cloud.push(Point3D::new(p.x, p.y, p.z, r as f32 + frac));
            n += 1;
        }
    }
    // Wall y = 4, rings 12..18 laid out along x.
    for r in 12..18 {
        for j in 0..8 {
            let p = Vector3::new(
                0.5 * j as f32,
                4.0 + jitter(n),
                0.2 + 0.4 * (r - 12) as f32,
            ) + offset;
            cloud.push(Point3D::new(p.x, p.y, p.z, r as f32 + frac));
            n += 1;
        }
    }

    cloud
}

/// Vertical edge at the room corner (4, 4): one point per ring climbing
/// in z. 14 points.
fn room_corners(offset: Vector3<f32>, frac: f32) -> PointCloud3D {
    let mut cloud = PointCloud3D::new();
    for r in 0..14 {
        let p = Vector3::new(4.0 + jitter(r), 4.0 - jitter(r), 0.25 * r as f32) + offset;
        cloud.push(Point3D::new(p.x, p.y, p.z, r as f32 + frac));
    }
    cloud
}

/// Install one synchronized sweep built from the room scene.
fn install_room_sweep(
    odom: &mut LaserOdometry,
    offset: Vector3<f32>,
    frac: f32,
    timestamp_us: u64,
) {
    let corners = room_corners(offset, frac);
    let surfaces = room_surfaces(offset, frac);

    odom.set_corner_sharp(corners.clone(), timestamp_us);
    odom.set_corner_less_sharp(corners, timestamp_us);
    odom.set_surf_flat(surfaces.clone(), timestamp_us);
    odom.set_surf_less_flat(surfaces.clone(), timestamp_us);
    odom.set_full_cloud(surfaces, timestamp_us);
    odom.set_imu_trans(ImuTrans::default(), timestamp_us);
}

/// Config with tight aborts and enough iterations for the damped solver
/// to settle on synthetic scenes.
fn settling_config() -> OdometryConfig {
    OdometryConfig {
        max_iterations: 200,
        delta_r_abort: 0.005,
        delta_t_abort: 0.005,
        ..OdometryConfig::default()
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn cold_start_seeds_buffers_and_biases_pose() {
    let mut odom = LaserOdometry::new(OdometryConfig::default());

    install_room_sweep(&mut odom, Vector3::zeros(), 0.05, 0);
    odom.set_imu_trans(
        ImuTrans {
            pitch_start: Angle::from(0.03),
            roll_start: Angle::from(-0.02),
            ..ImuTrans::default()
        },
        0,
    );

    // First tick seeds state and reports no motion estimate.
    assert!(!odom.process());
    assert!(odom.is_initialized());

    assert_eq!(odom.last_corner_cloud(), &room_corners(Vector3::zeros(), 0.05));
    assert_eq!(odom.last_surface_cloud(), &room_surfaces(Vector3::zeros(), 0.05));

    let pose = odom.pose();
    assert_relative_eq!(pose.rot_x.rad(), 0.03, epsilon = 1e-6);
    assert_relative_eq!(pose.rot_y.rad(), 0.0, epsilon = 1e-6);
    assert_relative_eq!(pose.rot_z.rad(), -0.02, epsilon = 1e-6);
    assert_eq!(pose.pos, Vector3::zeros());

    assert!(!odom.has_new_data());
}

#[test]
fn stationary_sensor_converges_immediately() {
    let mut odom = LaserOdometry::new(OdometryConfig::default());

    install_room_sweep(&mut odom, Vector3::zeros(), 0.1, 0);
    assert!(!odom.process());

    // Second sweep almost exactly in place (half a millimeter).
    install_room_sweep(&mut odom, Vector3::new(5e-4, 0.0, 0.0), 0.1, 100_000);
    assert!(odom.process());

    let diag = odom.diagnostics();
    assert!(diag.converged, "stationary tick must converge: {diag:?}");
    assert!(diag.iterations <= 3, "took {} iterations", diag.iterations);

    let inc = odom.incremental();
    assert!(inc.pos.norm() < 1e-3);
    assert!(inc.rot_x.rad().abs() < 1e-3);
    assert!(inc.rot_y.rad().abs() < 1e-3);
    assert!(inc.rot_z.rad().abs() < 1e-3);

    // The accumulated pose stays at its cold-start value.
    let pose = odom.pose();
    assert!(pose.pos.norm() < 1e-3, "pose drifted: {:?}", pose.pos);
    assert!(pose.rot_x.rad().abs() < 1e-3);
    assert!(pose.rot_z.rad().abs() < 1e-3);
}

#[test]
fn pure_translation_is_recovered() {
    let mut odom = LaserOdometry::new(settling_config());

    install_room_sweep(&mut odom, Vector3::zeros(), 0.1, 0);
    assert!(!odom.process());

    // The whole scene appears shifted by -0.1 m in x: points captured at
    // sweep end after the sensor advanced +0.1 m.
    install_room_sweep(&mut odom, Vector3::new(-0.1, 0.0, 0.0), 0.1, 100_000);
    assert!(odom.process());

    let diag = odom.diagnostics();
    assert!(diag.converged, "solver did not settle: {diag:?}");
    assert!(!diag.degenerate);

    let inc = odom.incremental();
    assert_relative_eq!(inc.pos.x, -0.1, epsilon = 5e-3);
    assert!(inc.pos.y.abs() < 5e-3, "pos.y = {}", inc.pos.y);
    assert!(inc.pos.z.abs() < 5e-3, "pos.z = {}", inc.pos.z);
    assert!(inc.rot_x.rad().abs() < 0.01);
    assert!(inc.rot_y.rad().abs() < 0.01);
    assert!(inc.rot_z.rad().abs() < 0.01);

    // The accumulated pose moves the opposite way: the sensor advanced.
    assert_relative_eq!(odom.pose().pos.x, 0.1, epsilon = 5e-3);
}

#[test]
fn degenerate_corridor_confines_updates() {
    let mut odom = LaserOdometry::new(settling_config());

    // Previous sweep: all surfaces on the plane z = 0, all corners on a
    // single line along +x. Translation along x is unobservable.
    let corridor_surfaces = |offset: Vector3<f32>, frac: f32| {
        let mut cloud = PointCloud3D::new();
        let mut n = 0;
        for r in 0..12 {
            for j in 0..12 {
                let p = Vector3::new(0.4 * j as f32, 0.4 * r as f32, jitter(n)) + offset;
                cloud.push(Point3D::new(p.x, p.y, p.z, r as f32 + frac));
                n += 1;
            }
        }
        cloud
    };
    let corridor_corners = |offset: Vector3<f32>, frac: f32| {
        let mut cloud = PointCloud3D::new();
        for r in 0..14 {
            let p = Vector3::new(0.3 * r as f32, 2.0 + jitter(r), 1.0 - jitter(r)) + offset;
            cloud.push(Point3D::new(p.x, p.y, p.z, r as f32 + frac));
        }
        cloud
    };

    let install = |odom: &mut LaserOdometry, offset: Vector3<f32>, ts: u64| {
        let corners = corridor_corners(offset, 0.1);
        let surfaces = corridor_surfaces(offset, 0.1);
        odom.set_corner_sharp(corners.clone(), ts);
        odom.set_corner_less_sharp(corners, ts);
        odom.set_surf_flat(surfaces.clone(), ts);
        odom.set_surf_less_flat(surfaces.clone(), ts);
        odom.set_full_cloud(surfaces, ts);
        odom.set_imu_trans(ImuTrans::default(), ts);
    };

    install(&mut odom, Vector3::zeros(), 0);
    assert!(!odom.process());

    // True motion has both an in-plane (x) and an out-of-plane (z)
    // component; only the latter is observable.
    install(&mut odom, Vector3::new(-0.05, 0.0, -0.05), 100_000);
    assert!(odom.process());

    let diag = odom.diagnostics();
    assert!(diag.degenerate, "corridor geometry must be degenerate");

    let inc = odom.incremental();
    assert_relative_eq!(inc.pos.z, -0.05, epsilon = 5e-3);
    assert!(
        inc.pos.x.abs() < 5e-3,
        "in-plane update not confined: {}",
        inc.pos.x
    );
}

#[test]
fn non_finite_points_are_dropped() {
    let mut odom = LaserOdometry::new(settling_config());

    let poison = Point3D::new(f32::NAN, 1.0, 1.0, 3.05);

    let mut corners = room_corners(Vector3::zeros(), 0.1);
    let mut surfaces = room_surfaces(Vector3::zeros(), 0.1);
    corners.push(poison);
    surfaces.push(poison);

    odom.set_corner_sharp(corners.clone(), 0);
    odom.set_corner_less_sharp(corners, 0);
    odom.set_surf_flat(surfaces.clone(), 0);
    odom.set_surf_less_flat(surfaces.clone(), 0);
    odom.set_full_cloud(surfaces, 0);
    odom.set_imu_trans(ImuTrans::default(), 0);
    assert!(!odom.process());

    // Seeded buffers are already clean.
    assert!(odom.last_corner_cloud().iter().all(|p| p.is_finite()));
    assert!(odom.last_surface_cloud().iter().all(|p| p.is_finite()));

    let mut corners = room_corners(Vector3::new(-0.02, 0.0, 0.0), 0.1);
    let mut surfaces = room_surfaces(Vector3::new(-0.02, 0.0, 0.0), 0.1);
    corners.push(poison);
    surfaces.push(poison);

    odom.set_corner_sharp(corners.clone(), 100_000);
    odom.set_corner_less_sharp(corners, 100_000);
    odom.set_surf_flat(surfaces.clone(), 100_000);
    odom.set_surf_less_flat(surfaces.clone(), 100_000);
    odom.set_full_cloud(surfaces, 100_000);
    odom.set_imu_trans(ImuTrans::default(), 100_000);
    assert!(odom.process());

    let pose = odom.pose();
    assert!(pose.rot_x.rad().is_finite());
    assert!(pose.rot_y.rad().is_finite());
    assert!(pose.rot_z.rad().is_finite());
    assert!(pose.pos.iter().all(|v| v.is_finite()));

    let inc = odom.incremental();
    assert_relative_eq!(inc.pos.x, -0.02, epsilon = 5e-3);
}

#[test]
fn registered_cloud_decimation_pattern() {
    let config = OdometryConfig {
        io_ratio: 3,
        ..OdometryConfig::default()
    };
    let mut odom = LaserOdometry::new(config);

    let mut exported = Vec::new();
    for tick in 0..10u64 {
        install_room_sweep(&mut odom, Vector3::zeros(), 0.1, tick * 100_000);
        odom.process();
        if odom.frame_count() > 0 && odom.registered_cloud().is_some() {
            exported.push(odom.frame_count());
        }
    }

    assert_eq!(exported, vec![1, 4, 7]);
}

#[test]
fn identical_repeated_inputs_stay_below_thresholds() {
    // Feeding byte-identical sweeps (modulo timestamps) keeps the
    // incremental estimate under the abort thresholds tick after tick.
    let mut odom = LaserOdometry::new(OdometryConfig::default());

    for tick in 0..4u64 {
        install_room_sweep(&mut odom, Vector3::zeros(), 0.1, tick * 100_000);
        odom.process();
    }

    let inc = odom.incremental();
    let rot_deg = (inc.rot_x.deg().powi(2) + inc.rot_y.deg().powi(2) + inc.rot_z.deg().powi(2))
        .sqrt();
    let trans_cm = inc.pos.norm() * 100.0;
    assert!(rot_deg < 0.1, "rotation magnitude {rot_deg} deg");
    assert!(trans_cm < 0.1, "translation magnitude {trans_cm} cm");
}
