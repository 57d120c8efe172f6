//! Point-to-line and point-to-plane residuals.
//!
//! Each accepted correspondence yields a unit direction (the gradient of
//! the distance with respect to the query point) and the signed distance
//! itself, both scaled by a robustness weight that down-weights large
//! residuals once the solver has had a few iterations to settle.

use nalgebra::Vector3;

use crate::core::types::Point3D;

/// Number of solver iterations run at full weight before the robustness
/// weighting engages.
const FULL_WEIGHT_ITERATIONS: usize = 5;

/// Correspondences whose weight falls to this level or below are dropped.
const MIN_WEIGHT: f32 = 0.1;

/// A weighted residual: gradient direction and distance along it.
///
/// `dir . q - d` is the linearized distance of the query point `q` along
/// the gradient; both members already carry the robustness weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficient {
    /// Weighted gradient of the distance wrt the query position
    pub dir: Vector3<f32>,
    /// Weighted residual distance
    pub d: f32,
}

/// Residual of a query point against the edge line through `a` and `b`.
///
/// The distance is the perpendicular distance from the query to the
/// line; the gradient direction is `(a - b) x ((q - a) x (q - b))`
/// normalized by the same product of norms. Returns `None` for
/// degenerate geometry, a zero residual, or a rejected weight.
pub fn edge_residual(query: &Point3D, a: &Point3D, b: &Point3D, iteration: usize) -> Option<Coefficient> {
    let q = query.xyz();
    let pa = a.xyz();
    let pb = b.xyz();

    let cross = (q - pa).cross(&(q - pb));
    let cross_norm = cross.norm();
    let ab = pa - pb;
    let ab_norm = ab.norm();
    if cross_norm == 0.0 || ab_norm == 0.0 {
        return None;
    }

    let d = cross_norm / ab_norm;

    let weight = if iteration >= FULL_WEIGHT_ITERATIONS {
        1.0 - 1.8 * d.abs()
    } else {
        1.0
    };
    if weight <= MIN_WEIGHT || d == 0.0 {
        return None;
    }

    let dir = ab.cross(&cross) / (cross_norm * ab_norm);
    Some(Coefficient {
        dir: weight * dir,
        d: weight * d,
    })
}

/// Residual of a query point against the plane through `a`, `b` and `c`.
///
/// The plane normal is `(b - a) x (c - a)`, normalized; the distance is
/// signed. Far-range queries are down-weighted less aggressively: the
/// weight divides the residual by the square root of the query's range.
pub fn plane_residual(
    query: &Point3D,
    a: &Point3D,
    b: &Point3D,
    c: &Point3D,
    iteration: usize,
) -> Option<Coefficient> {
    let q = query.xyz();
    let pa = a.xyz();

    let normal = (b.xyz() - pa).cross(&(c.xyz() - pa));
    let normal_norm = normal.norm();
    if normal_norm == 0.0 {
        return None;
    }
    let normal = normal / normal_norm;

    let pd = -normal.dot(&pa);
    let d = normal.dot(&q) + pd;

    let weight = if iteration >= FULL_WEIGHT_ITERATIONS {
        1.0 - 1.8 * d.abs() / query.norm().sqrt()
    } else {
        1.0
    };
    if weight <= MIN_WEIGHT || d == 0.0 {
        return None;
    }

    Some(Coefficient {
        dir: weight * normal,
        d: weight * d,
    })
}
