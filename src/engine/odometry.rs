//! The frame-to-frame odometry state machine.
//!
//! A host installs the per-sweep inputs (four feature clouds, the
//! full-resolution cloud, and the IMU bundle) between ticks and calls
//! [`LaserOdometry::process`] at roughly the sweep rate. Each admitted
//! tick estimates the incremental motion since the previous sweep,
//! folds it into the accumulated pose, re-projects the current feature
//! clouds to the sweep end, and promotes them to previous-sweep status
//! for the next tick.

use nalgebra::{Rotation3, Vector3};

use crate::algorithms::correspondence::{
    EdgePair, FeatureIndex, PlaneTriple, build_index, find_edge_pair, find_plane_triple,
};
use crate::algorithms::deskew::{transform_to_end, transform_to_start};
use crate::algorithms::residual::{edge_residual, plane_residual};
use crate::algorithms::solver::{
    DegeneracyProjector, EIGENVALUE_THRESHOLD, NormalEquations, update_norms,
};
use crate::core::math::{Angle, rotate_zxy};
use crate::core::types::{ImuTrans, PointCloud3D, Pose6D};

/// Streams are synchronized when their timestamps agree within this.
const STREAM_SYNC_TOLERANCE_US: u64 = 5_000;

/// The solve runs only when the previous sweep kept more corner points
/// than this.
const MIN_CORNER_POINTS: usize = 10;

/// The solve runs only when the previous sweep kept more surface points
/// than this.
const MIN_SURFACE_POINTS: usize = 100;

/// Iterations with fewer accepted correspondences than this are skipped.
const MIN_CORRESPONDENCES: usize = 10;

/// Cached correspondences are refreshed every this many iterations.
const MATCH_CADENCE: usize = 5;

/// Tuning knobs for the odometry core.
#[derive(Debug, Clone)]
pub struct OdometryConfig {
    /// Nominal sweep duration in seconds.
    pub scan_period: f32,

    /// Upper bound on solver iterations per tick.
    pub max_iterations: usize,

    /// Rotation-update convergence threshold, degrees.
    pub delta_r_abort: f32,

    /// Translation-update convergence threshold, centimeters.
    pub delta_t_abort: f32,

    /// Export every Nth full-resolution cloud; values below 2 export all.
    pub io_ratio: usize,

    /// Re-project query points to the start-of-sweep frame before
    /// correspondence search and residual evaluation.
    ///
    /// With `false`, matching runs on the raw points as captured, which
    /// keeps numerical compatibility with pipelines that skip the
    /// per-query de-skew and tolerate the extra drift.
    pub deskew_queries: bool,
}

impl Default for OdometryConfig {
    fn default() -> Self {
        Self {
            scan_period: 0.1,
            max_iterations: 25,
            delta_r_abort: 0.1,
            delta_t_abort: 0.1,
            io_ratio: 2,
            deskew_queries: true,
        }
    }
}

/// Outcome of the last solve, queryable after a tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct SolveDiagnostics {
    /// Iterations actually run (0 when the solve was skipped).
    pub iterations: usize,
    /// Whether the update norms fell below the abort thresholds.
    pub converged: bool,
    /// Whether the normal matrix had unobservable directions.
    pub degenerate: bool,
    /// Accepted correspondence rows in the last solved iteration.
    pub correspondences: usize,
}

/// Frame-to-frame LiDAR odometry core.
///
/// Single-threaded and synchronous: `process()` is the only mutator and
/// self-terminates via the iteration bound or the convergence
/// thresholds. Failed ticks leave the state consistent for the next one.
pub struct LaserOdometry {
    config: OdometryConfig,

    system_inited: bool,
    frame_count: usize,

    corner_sharp: PointCloud3D,
    corner_less_sharp: PointCloud3D,
    surf_flat: PointCloud3D,
    surf_less_flat: PointCloud3D,
    full_cloud: PointCloud3D,
    imu_trans: ImuTrans,

    time_corner_sharp: u64,
    time_corner_less_sharp: u64,
    time_surf_flat: u64,
    time_surf_less_flat: u64,
    time_full_cloud: u64,
    time_imu_trans: u64,

    new_corner_sharp: bool,
    new_corner_less_sharp: bool,
    new_surf_flat: bool,
    new_surf_less_flat: bool,
    new_full_cloud: bool,
    new_imu_trans: bool,

    last_corner_cloud: PointCloud3D,
    last_surface_cloud: PointCloud3D,
    last_corner_index: FeatureIndex,
    last_surface_index: FeatureIndex,

    edge_cache: Vec<Option<EdgePair>>,
    plane_cache: Vec<Option<PlaneTriple>>,

    /// Incremental motion from the end of the previous sweep to the end
    /// of the current one; reset to the IMU prior each tick.
    transform: Pose6D,
    /// Accumulated global pose.
    transform_sum: Pose6D,

    diagnostics: SolveDiagnostics,
}

impl LaserOdometry {
    /// Create a core with the given configuration.
    pub fn new(config: OdometryConfig) -> Self {
        Self {
            config,
            system_inited: false,
            frame_count: 0,
            corner_sharp: PointCloud3D::new(),
            corner_less_sharp: PointCloud3D::new(),
            surf_flat: PointCloud3D::new(),
            surf_less_flat: PointCloud3D::new(),
            full_cloud: PointCloud3D::new(),
            imu_trans: ImuTrans::default(),
            time_corner_sharp: 0,
            time_corner_less_sharp: 0,
            time_surf_flat: 0,
            time_surf_less_flat: 0,
            time_full_cloud: 0,
            time_imu_trans: 0,
            new_corner_sharp: false,
            new_corner_less_sharp: false,
            new_surf_flat: false,
            new_surf_less_flat: false,
            new_full_cloud: false,
            new_imu_trans: false,
            last_corner_cloud: PointCloud3D::new(),
            last_surface_cloud: PointCloud3D::new(),
            last_corner_index: FeatureIndex::new(),
            last_surface_index: FeatureIndex::new(),
            edge_cache: Vec::new(),
            plane_cache: Vec::new(),
            transform: Pose6D::identity(),
            transform_sum: Pose6D::identity(),
            diagnostics: SolveDiagnostics::default(),
        }
    }

    /// Get the current configuration.
    pub fn config(&self) -> &OdometryConfig {
        &self.config
    }

    /// Install the sharp edge cloud for the pending sweep.
    pub fn set_corner_sharp(&mut self, cloud: PointCloud3D, timestamp_us: u64) {
        self.corner_sharp = cloud;
        self.time_corner_sharp = timestamp_us;
        self.new_corner_sharp = true;
    }

    /// Install the less-sharp edge cloud for the pending sweep.
    pub fn set_corner_less_sharp(&mut self, cloud: PointCloud3D, timestamp_us: u64) {
        self.corner_less_sharp = cloud;
        self.time_corner_less_sharp = timestamp_us;
        self.new_corner_less_sharp = true;
    }

    /// Install the flat surface cloud for the pending sweep.
    pub fn set_surf_flat(&mut self, cloud: PointCloud3D, timestamp_us: u64) {
        self.surf_flat = cloud;
        self.time_surf_flat = timestamp_us;
        self.new_surf_flat = true;
    }

    /// Install the less-flat surface cloud for the pending sweep.
    pub fn set_surf_less_flat(&mut self, cloud: PointCloud3D, timestamp_us: u64) {
        self.surf_less_flat = cloud;
        self.time_surf_less_flat = timestamp_us;
        self.new_surf_less_flat = true;
    }

    /// Install the full-resolution cloud for the pending sweep.
    pub fn set_full_cloud(&mut self, cloud: PointCloud3D, timestamp_us: u64) {
        self.full_cloud = cloud;
        self.time_full_cloud = timestamp_us;
        self.new_full_cloud = true;
    }

    /// Install the IMU bundle for the pending sweep.
    pub fn set_imu_trans(&mut self, imu: ImuTrans, timestamp_us: u64) {
        self.imu_trans = imu;
        self.time_imu_trans = timestamp_us;
        self.new_imu_trans = true;
    }

    /// Whether every stream has been refreshed and all timestamps agree
    /// with the less-flat stream within the synchronization tolerance.
    pub fn has_new_data(&self) -> bool {
        let reference = self.time_surf_less_flat;
        let in_sync = |t: u64| t.abs_diff(reference) < STREAM_SYNC_TOLERANCE_US;

        self.new_corner_sharp
            && self.new_corner_less_sharp
            && self.new_surf_flat
            && self.new_surf_less_flat
            && self.new_full_cloud
            && self.new_imu_trans
            && in_sync(self.time_corner_sharp)
            && in_sync(self.time_corner_less_sharp)
            && in_sync(self.time_surf_flat)
            && in_sync(self.time_full_cloud)
            && in_sync(self.time_imu_trans)
    }

    /// Clear all fresh-data flags.
    pub fn reset(&mut self) {
        self.new_corner_sharp = false;
        self.new_corner_less_sharp = false;
        self.new_surf_flat = false;
        self.new_surf_less_flat = false;
        self.new_full_cloud = false;
        self.new_imu_trans = false;
    }

    /// Run one odometry tick.
    ///
    /// Returns `false` when the inputs are not ready or when this tick
    /// only seeded the previous-sweep buffers; returns `true` once the
    /// state has advanced by a sweep (even if the solve was skipped for
    /// lack of previous-sweep features, in which case the pose carries
    /// the IMU prior only).
    pub fn process(&mut self) -> bool {
        if !self.has_new_data() {
            return false;
        }
        self.reset();

        if !self.system_inited {
            std::mem::swap(&mut self.corner_less_sharp, &mut self.last_corner_cloud);
            std::mem::swap(&mut self.surf_less_flat, &mut self.last_surface_cloud);

            self.last_corner_cloud.retain_finite();
            self.last_surface_cloud.retain_finite();
            self.last_corner_index = build_index(&self.last_corner_cloud);
            self.last_surface_index = build_index(&self.last_surface_cloud);

            self.transform_sum.rot_x += self.imu_trans.pitch_start;
            self.transform_sum.rot_z += self.imu_trans.roll_start;

            self.system_inited = true;
            return false;
        }

        self.frame_count += 1;

        // Seed the incremental transform with the IMU translation prior.
        self.transform = Pose6D {
            pos: -self.imu_trans.velo_from_start * self.config.scan_period,
            ..Pose6D::identity()
        };
        self.diagnostics = SolveDiagnostics::default();

        if self.last_corner_cloud.len() > MIN_CORNER_POINTS
            && self.last_surface_cloud.len() > MIN_SURFACE_POINTS
        {
            self.solve();
        }

        if self.transform.rot_x.deg() > 1.0
            || self.transform.rot_y.deg() > 1.0
            || self.transform.rot_z.deg() > 1.0
        {
            log::warn!(
                "large incremental rotation: {:.3}, {:.3}, {:.3} deg",
                self.transform.rot_x.deg(),
                self.transform.rot_y.deg(),
                self.transform.rot_z.deg()
            );
        }

        self.accumulate_pose();

        transform_to_end(&mut self.corner_less_sharp, &self.transform, &self.imu_trans);
        transform_to_end(&mut self.surf_less_flat, &self.transform, &self.imu_trans);

        std::mem::swap(&mut self.corner_less_sharp, &mut self.last_corner_cloud);
        std::mem::swap(&mut self.surf_less_flat, &mut self.last_surface_cloud);

        if self.last_corner_cloud.len() > MIN_CORNER_POINTS
            && self.last_surface_cloud.len() > MIN_SURFACE_POINTS
        {
            self.last_corner_cloud.retain_finite();
            self.last_surface_cloud.retain_finite();
            self.last_corner_index = build_index(&self.last_corner_cloud);
            self.last_surface_index = build_index(&self.last_surface_cloud);
        }

        true
    }

    /// The iterative non-linear solve for the incremental transform.
    fn solve(&mut self) {
        self.corner_sharp.retain_finite();
        self.surf_flat.retain_finite();

        let sharp_count = self.corner_sharp.len();
        let flat_count = self.surf_flat.len();

        self.edge_cache.clear();
        self.edge_cache.resize(sharp_count, None);
        self.plane_cache.clear();
        self.plane_cache.resize(flat_count, None);

        let mut projector = DegeneracyProjector::identity();
        let mut system = NormalEquations::new();
        let mut converged = false;
        let mut iterations = 0;

        for iter in 0..self.config.max_iterations {
            iterations = iter + 1;
            system.clear();

            for i in 0..sharp_count {
                let raw = self.corner_sharp.points[i];
                let query = if self.config.deskew_queries {
                    transform_to_start(&raw, &self.transform)
                } else {
                    raw
                };

                if iter % MATCH_CADENCE == 0 {
                    self.edge_cache[i] =
                        find_edge_pair(&query, &self.last_corner_cloud, &self.last_corner_index);
                }

                if let Some(pair) = self.edge_cache[i] {
                    let a = &self.last_corner_cloud.points[pair.closest];
                    let b = &self.last_corner_cloud.points[pair.second];
                    if let Some(coeff) = edge_residual(&query, a, b, iter) {
                        system.add_row(&raw, &coeff, &self.transform);
                    }
                }
            }

            for i in 0..flat_count {
                let raw = self.surf_flat.points[i];
                let query = if self.config.deskew_queries {
                    transform_to_start(&raw, &self.transform)
                } else {
                    raw
                };

                if iter % MATCH_CADENCE == 0 {
                    self.plane_cache[i] = find_plane_triple(
                        &query,
                        &self.last_surface_cloud,
                        &self.last_surface_index,
                    );
                }

                if let Some(triple) = self.plane_cache[i] {
                    let a = &self.last_surface_cloud.points[triple.closest];
                    let b = &self.last_surface_cloud.points[triple.same_band];
                    let c = &self.last_surface_cloud.points[triple.cross_band];
                    if let Some(coeff) = plane_residual(&query, a, b, c, iter) {
                        system.add_row(&raw, &coeff, &self.transform);
                    }
                }
            }

            if system.rows() < MIN_CORRESPONDENCES {
                continue;
            }
            self.diagnostics.correspondences = system.rows();

            let x = system.solve();

            if iter == 0 {
                projector =
                    DegeneracyProjector::analyze(system.normal_matrix(), EIGENVALUE_THRESHOLD);
                self.diagnostics.degenerate = projector.is_degenerate();
            }
            let x = projector.apply(x);

            self.transform.rot_x += Angle::from(x[0]);
            self.transform.rot_y += Angle::from(x[1]);
            self.transform.rot_z += Angle::from(x[2]);
            self.transform.pos += Vector3::new(x[3], x[4], x[5]);
            self.sanitize_transform();

            let (delta_r, delta_t) = update_norms(&x);
            if delta_r < self.config.delta_r_abort && delta_t < self.config.delta_t_abort {
                log::debug!(
                    "optimization done: {} rows, {} iterations, dR {:.4} deg, dT {:.4} cm",
                    system.rows(),
                    iterations,
                    delta_r,
                    delta_t
                );
                converged = true;
                break;
            }
        }

        if !converged {
            log::warn!("optimization incomplete after {iterations} iterations");
        }

        self.diagnostics.iterations = iterations;
        self.diagnostics.converged = converged;
    }

    /// Replace non-finite pose components with zero.
    fn sanitize_transform(&mut self) {
        if !self.transform.rot_x.rad().is_finite() {
            self.transform.rot_x = Angle::default();
        }
        if !self.transform.rot_y.rad().is_finite() {
            self.transform.rot_y = Angle::default();
        }
        if !self.transform.rot_z.rad().is_finite() {
            self.transform.rot_z = Angle::default();
        }
        for k in 0..3 {
            if !self.transform.pos[k].is_finite() {
                self.transform.pos[k] = 0.0;
            }
        }
    }

    /// Fold the incremental transform into the accumulated pose and
    /// apply the IMU attitude correction.
    fn accumulate_pose(&mut self) {
        let (rx, ry, rz) = accumulate_rotation(
            self.transform_sum.rot_x,
            self.transform_sum.rot_y,
            self.transform_sum.rot_z,
            -self.transform.rot_x,
            -self.transform.rot_y,
            -self.transform.rot_z,
        );

        let mut v = self.transform.pos - self.imu_trans.shift_from_start;
        rotate_zxy(&mut v, rz, rx, ry);
        let trans = self.transform_sum.pos - v;

        let (rx, ry, rz) = plugin_imu_rotation(
            rx,
            ry,
            rz,
            self.imu_trans.pitch_start,
            self.imu_trans.yaw_start,
            self.imu_trans.roll_start,
            self.imu_trans.pitch_end,
            self.imu_trans.yaw_end,
            self.imu_trans.roll_end,
        );

        self.transform_sum = Pose6D {
            rot_x: rx,
            rot_y: ry,
            rot_z: rz,
            pos: trans,
        };
    }

    /// The full-resolution cloud de-skewed to sweep end.
    ///
    /// Returns `None` on decimated frames: the cloud is exported when
    /// `io_ratio < 2` or `frame_count % io_ratio == 1`.
    pub fn registered_cloud(&mut self) -> Option<&PointCloud3D> {
        if self.config.io_ratio < 2 || self.frame_count % self.config.io_ratio == 1 {
            transform_to_end(&mut self.full_cloud, &self.transform, &self.imu_trans);
            Some(&self.full_cloud)
        } else {
            None
        }
    }

    /// Accumulated global pose.
    pub fn pose(&self) -> &Pose6D {
        &self.transform_sum
    }

    /// Incremental transform estimated by the last tick.
    pub fn incremental(&self) -> &Pose6D {
        &self.transform
    }

    /// Previous-sweep corner cloud (de-skewed to its sweep end).
    pub fn last_corner_cloud(&self) -> &PointCloud3D {
        &self.last_corner_cloud
    }

    /// Previous-sweep surface cloud (de-skewed to its sweep end).
    pub fn last_surface_cloud(&self) -> &PointCloud3D {
        &self.last_surface_cloud
    }

    /// Diagnostics of the last tick's solve.
    pub fn diagnostics(&self) -> SolveDiagnostics {
        self.diagnostics
    }

    /// Whether the first sweep has seeded the previous-sweep buffers.
    pub fn is_initialized(&self) -> bool {
        self.system_inited
    }

    /// Number of solved ticks since startup.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }
}

/// Matrix form of the `rotate_yxz` convention.
fn rot_yxz_matrix(x: Angle, y: Angle, z: Angle) -> Rotation3<f32> {
    Rotation3::from_axis_angle(&Vector3::y_axis(), y.rad())
        * Rotation3::from_axis_angle(&Vector3::x_axis(), x.rad())
        * Rotation3::from_axis_angle(&Vector3::z_axis(), z.rad())
}

/// Compose the accumulated rotation with an incremental one.
///
/// Both rotations go through the affine form and the result's Euler
/// angles are re-extracted in the same convention; this is authoritative
/// over any hand-expanded trigonometric composition, which disagrees on
/// wrap-around.
fn accumulate_rotation(
    cx: Angle,
    cy: Angle,
    cz: Angle,
    lx: Angle,
    ly: Angle,
    lz: Angle,
) -> (Angle, Angle, Angle) {
    let current = Rotation3::from_euler_angles(cy.rad(), cx.rad(), cz.rad());
    let last = Rotation3::from_euler_angles(ly.rad(), lx.rad(), lz.rad());

    let (roll, pitch, yaw) = (last * current).euler_angles();
    (Angle::from(pitch), Angle::from(roll), Angle::from(yaw))
}

/// Correct a body rotation for the IMU drift between sweep start and
/// end: `R(bc) * R(bl)^-1 * R(al)` in the `rotate_yxz` factorization,
/// with the Euler angles extracted back in the same convention.
fn plugin_imu_rotation(
    bcx: Angle,
    bcy: Angle,
    bcz: Angle,
    blx: Angle,
    bly: Angle,
    blz: Angle,
    alx: Angle,
    aly: Angle,
    alz: Angle,
) -> (Angle, Angle, Angle) {
    let combined =
        rot_yxz_matrix(bcx, bcy, bcz) * rot_yxz_matrix(blx, bly, blz).inverse() * rot_yxz_matrix(alx, aly, alz);
    let m = combined.matrix();

    let acx = (-m[(1, 2)]).asin();
    let cos_acx = acx.cos();
    let acy = (m[(0, 2)] / cos_acx).atan2(m[(2, 2)] / cos_acx);
    let acz = (m[(1, 0)] / cos_acx).atan2(m[(1, 1)] / cos_acx);

    (Angle::from(acx), Angle::from(acy), Angle::from(acz))
}
