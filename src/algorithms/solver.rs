//! Damped normal-equation solver over the correspondence residuals.
//!
//! Accepted residuals are linearized against the incremental pose with
//! the analytic partial derivatives of the composed `rotate_zxy`
//! rotation, accumulated into 6x6 normal equations, and solved by
//! column-pivoted QR. The normal matrix is eigen-analyzed once per tick
//! to detect rank-deficient geometry; in that case updates are confined
//! to the well-observed subspace by a projector.

use nalgebra::{Matrix6, Vector6};

use super::residual::Coefficient;
use crate::core::types::{Point3D, Pose6D};

/// Fixed step-size damping applied to every residual on the right-hand
/// side. Tied to the eigenvalue threshold and to meter units; changing
/// one without the others shifts what counts as degenerate.
const RESIDUAL_DAMPING: f32 = 0.05;

/// Eigenvalues of the normal matrix below this are treated as
/// unobservable directions of the pose.
pub const EIGENVALUE_THRESHOLD: f32 = 10.0;

/// One row of the Jacobian of a weighted residual with respect to
/// `(rot_x, rot_y, rot_z, t_x, t_y, t_z)`.
///
/// `point` must be the raw query point in the current sweep's own frame;
/// the partials differentiate the de-skew model around the current
/// incremental pose estimate.
pub fn jacobian_row(point: &Point3D, coeff: &Coefficient, pose: &Pose6D) -> Vector6<f32> {
    let srx = pose.rot_x.sin();
    let crx = pose.rot_x.cos();
    let sry = pose.rot_y.sin();
    let cry = pose.rot_y.cos();
    let srz = pose.rot_z.sin();
    let crz = pose.rot_z.cos();
    let (tx, ty, tz) = (pose.pos.x, pose.pos.y, pose.pos.z);

    let (px, py, pz) = (point.x, point.y, point.z);
    let (cx, cy, cz) = (coeff.dir.x, coeff.dir.y, coeff.dir.z);

    let arx = (-px * (crx * sry * srz) + py * (crx * crz * sry) + pz * (srx * sry)
        + tx * (crx * sry * srz)
        - ty * (crx * crz * sry)
        - tz * (srx * sry))
        * cx
        + (px * (srx * srz) - py * (crz * srx) + pz * crx + ty * (crz * srx)
            - tx * (srx * srz)
            - tz * crx)
            * cy
        + (px * (crx * cry * srz) - py * (crx * cry * crz) - pz * (cry * srx)
            + ty * (crx * cry * crz)
            + tz * (cry * srx)
            - tx * (crx * cry * srz))
            * cz;

    let ary = (-px * (crz * sry + cry * srx * srz) - py * (sry * srz - cry * crz * srx)
        - pz * (crx * cry)
        + tx * (crz * sry + cry * srx * srz)
        + ty * (sry * srz - cry * crz * srx)
        + tz * (crx * cry))
        * cx
        + (px * (cry * crz - srx * sry * srz) + py * (cry * srz + crz * srx * sry)
            - pz * (crx * sry)
            - tx * (cry * crz - srx * sry * srz)
            - ty * (cry * srz + crz * srx * sry)
            + tz * (crx * sry))
            * cz;

    let arz = (-px * (cry * srz + crz * srx * sry) + py * (cry * crz - srx * sry * srz)
        + tx * (cry * srz + crz * srx * sry)
        - ty * (cry * crz - srx * sry * srz))
        * cx
        + (-px * (crx * crz) - py * (crx * srz) + tx * (crx * crz) + ty * (crx * srz)) * cy
        + (px * (cry * crz * srx - sry * srz) + py * (crz * sry + cry * srx * srz)
            + tx * (sry * srz - cry * crz * srx)
            - ty * (crz * sry + cry * srx * srz))
            * cz;

    let atx = -(cry * crz - srx * sry * srz) * cx + (crx * srz) * cy
        - (crz * sry + cry * srx * srz) * cz;

    let aty = -(cry * srz + crz * srx * sry) * cx - (crx * crz) * cy
        - (sry * srz - cry * crz * srx) * cz;

    let atz = (crx * sry) * cx - srx * cy - (crx * cry) * cz;

    Vector6::new(arx, ary, arz, atx, aty, atz)
}

/// Accumulated 6x6 normal equations `(A^T A) x = A^T b`.
#[derive(Debug, Clone)]
pub struct NormalEquations {
    ata: Matrix6<f32>,
    atb: Vector6<f32>,
    rows: usize,
}

impl Default for NormalEquations {
    fn default() -> Self {
        Self::new()
    }
}

impl NormalEquations {
    /// Empty system.
    pub fn new() -> Self {
        Self {
            ata: Matrix6::zeros(),
            atb: Vector6::zeros(),
            rows: 0,
        }
    }

    /// Reset for the next iteration.
    pub fn clear(&mut self) {
        self.ata = Matrix6::zeros();
        self.atb = Vector6::zeros();
        self.rows = 0;
    }

    /// Add one correspondence row.
    pub fn add_row(&mut self, point: &Point3D, coeff: &Coefficient, pose: &Pose6D) {
        let row = jacobian_row(point, coeff, pose);
        let rhs = -RESIDUAL_DAMPING * coeff.d;
        self.ata += row * row.transpose();
        self.atb += row * rhs;
        self.rows += 1;
    }

    /// Number of accumulated rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// The normal matrix, for degeneracy analysis.
    #[inline]
    pub fn normal_matrix(&self) -> &Matrix6<f32> {
        &self.ata
    }

    /// Solve for the pose update by column-pivoted QR.
    ///
    /// A singular normal matrix (exactly degenerate geometry) defeats the
    /// QR back-substitution; in that case the update falls back to an SVD
    /// least-squares solve, whose minimum-norm solution already zeroes
    /// the unobservable directions.
    pub fn solve(&self) -> Vector6<f32> {
        self.ata
            .col_piv_qr()
            .solve(&self.atb)
            .unwrap_or_else(|| {
                self.ata
                    .svd(true, true)
                    .solve(&self.atb, 1e-10)
                    .unwrap_or_else(|_| Vector6::zeros())
            })
    }
}

/// Norms of a pose update split into rotation (degrees) and translation
/// (centimeters), the units of the convergence thresholds.
pub fn update_norms(x: &Vector6<f32>) -> (f32, f32) {
    let delta_r = (x[0].to_degrees().powi(2) + x[1].to_degrees().powi(2)
        + x[2].to_degrees().powi(2))
    .sqrt();
    let delta_t =
        ((x[3] * 100.0).powi(2) + (x[4] * 100.0).powi(2) + (x[5] * 100.0).powi(2)).sqrt();
    (delta_r, delta_t)
}

/// Projector onto the observable subspace of the pose.
///
/// Built from the eigendecomposition of the normal matrix on the first
/// solver iteration and applied to every subsequent update while the
/// tick remains degenerate.
#[derive(Debug, Clone)]
pub struct DegeneracyProjector {
    projection: Matrix6<f32>,
    degenerate: bool,
}

impl Default for DegeneracyProjector {
    fn default() -> Self {
        Self::identity()
    }
}

impl DegeneracyProjector {
    /// Pass-through projector for fully observable geometry.
    pub fn identity() -> Self {
        Self {
            projection: Matrix6::identity(),
            degenerate: false,
        }
    }

    /// Eigen-analyze a normal matrix.
    ///
    /// Eigenvalues are visited in ascending order; every eigenvector
    /// whose eigenvalue falls below the threshold is zeroed out of the
    /// modified eigenvector matrix, stopping at the first eigenvalue at
    /// or above it. The projector is `V^-1 * V'`, with `V` holding the
    /// eigenvectors as rows; `V` is orthogonal, so its inverse is its
    /// transpose.
    pub fn analyze(normal_matrix: &Matrix6<f32>, threshold: f32) -> Self {
        let eigen = normal_matrix.symmetric_eigen();

        let mut order = [0usize, 1, 2, 3, 4, 5];
        order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));

        let mut basis = Matrix6::zeros();
        for (row, &col) in order.iter().enumerate() {
            basis
                .row_mut(row)
                .copy_from(&eigen.eigenvectors.column(col).transpose());
        }

        let mut masked = basis;
        let mut degenerate = false;
        for (row, &col) in order.iter().enumerate() {
            if eigen.eigenvalues[col] >= threshold {
                break;
            }
            masked.row_mut(row).fill(0.0);
            degenerate = true;
        }

        if !degenerate {
            return Self::identity();
        }

        Self {
            projection: basis.transpose() * masked,
            degenerate: true,
        }
    }

    /// Whether any pose direction was unobservable.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    /// Confine an update to the observable subspace.
    #[inline]
    pub fn apply(&self, x: Vector6<f32>) -> Vector6<f32> {
        if self.degenerate {
            self.projection * x
        } else {
            x
        }
    }
}
