//! Correspondence search against the previous sweep.
//!
//! Each sharp query point is matched to an edge line through two points
//! of the previous less-sharp cloud; each flat query point to a plane
//! through three points of the previous less-flat cloud. The single
//! nearest neighbor comes from a k-d tree; the remaining neighbors come
//! from a linear scan outward from the seed's array position, which is
//! bounded because the clouds are stored in approximately ring-sorted
//! order and the scan stops once the ring delta exceeds the window.

use kiddo::{KdTree, SquaredEuclidean};

use crate::core::types::{Point3D, PointCloud3D};

/// Static nearest-neighbor index over one previous-sweep cloud.
pub type FeatureIndex = KdTree<f32, 3>;

/// Maximum admissible squared distance for any correspondence neighbor,
/// meters squared.
pub const MAX_NEIGHBOR_SQ_DIST: f32 = 25.0;

/// Half-width of the scan-ring band searched around the seed neighbor.
const RING_WINDOW: f32 = 2.5;

/// Build a nearest-neighbor index over a cloud's 3D positions.
///
/// The channel scalar is ignored; queries see coordinates only.
pub fn build_index(cloud: &PointCloud3D) -> FeatureIndex {
    let mut tree = FeatureIndex::new();
    for (i, p) in cloud.iter().enumerate() {
        tree.add(&[p.x, p.y, p.z], i as u64);
    }
    tree
}

/// Indices into the previous less-sharp cloud defining an edge line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgePair {
    /// Closest neighbor to the query
    pub closest: usize,
    /// Nearest neighbor on a different scan ring
    pub second: usize,
}

/// Indices into the previous less-flat cloud defining a plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneTriple {
    /// Closest neighbor to the query
    pub closest: usize,
    /// Nearest neighbor on the seed's own ring band
    pub same_band: usize,
    /// Nearest neighbor on the opposite ring band
    pub cross_band: usize,
}

/// Find the two points of the previous less-sharp cloud that define the
/// edge line for a sharp query point.
///
/// Returns `None` when the nearest neighbor is farther than the gate or
/// when no second point exists on a different ring within the ring
/// window.
pub fn find_edge_pair(
    query: &Point3D,
    cloud: &PointCloud3D,
    index: &FeatureIndex,
) -> Option<EdgePair> {
    if cloud.is_empty() {
        return None;
    }

    let nearest = index.nearest_one::<SquaredEuclidean>(&[query.x, query.y, query.z]);
    if nearest.distance >= MAX_NEIGHBOR_SQ_DIST {
        return None;
    }

    let closest = nearest.item as usize;
    let closest_ring = cloud.points[closest].ring();

    let mut second = None;
    let mut min_sq_dist = MAX_NEIGHBOR_SQ_DIST;

    // Scan toward higher rings; only points above the seed ring qualify.
    for j in (closest + 1)..cloud.len() {
        let candidate = &cloud.points[j];
        if candidate.ring() as f32 > closest_ring as f32 + RING_WINDOW {
            break;
        }

        let sq_dist = candidate.squared_diff(query);
        if candidate.ring() > closest_ring && sq_dist < min_sq_dist {
            min_sq_dist = sq_dist;
            second = Some(j);
        }
    }

    // Scan toward lower rings; only points below the seed ring qualify.
    for j in (0..closest).rev() {
        let candidate = &cloud.points[j];
        if (candidate.ring() as f32) < closest_ring as f32 - RING_WINDOW {
            break;
        }

        let sq_dist = candidate.squared_diff(query);
        if candidate.ring() < closest_ring && sq_dist < min_sq_dist {
            min_sq_dist = sq_dist;
            second = Some(j);
        }
    }

    second.map(|second| EdgePair { closest, second })
}

/// Find the three points of the previous less-flat cloud that define the
/// plane for a flat query point.
///
/// The ascending scan routes same-or-lower rings to the same-band slot
/// and higher rings to the cross-band slot; the descending scan routes
/// same-or-higher rings to the same-band slot and lower rings to the
/// cross-band slot. Both slots must fill for a valid correspondence.
pub fn find_plane_triple(
    query: &Point3D,
    cloud: &PointCloud3D,
    index: &FeatureIndex,
) -> Option<PlaneTriple> {
    if cloud.is_empty() {
        return None;
    }

    let nearest = index.nearest_one::<SquaredEuclidean>(&[query.x, query.y, query.z]);
    if nearest.distance >= MAX_NEIGHBOR_SQ_DIST {
        return None;
    }

    let closest = nearest.item as usize;
    let closest_ring = cloud.points[closest].ring();

    let mut same_band = None;
    let mut cross_band = None;
    let mut min_sq_same = MAX_NEIGHBOR_SQ_DIST;
    let mut min_sq_cross = MAX_NEIGHBOR_SQ_DIST;

    for j in (closest + 1)..cloud.len() {
        let candidate = &cloud.points[j];
        if candidate.ring() as f32 > closest_ring as f32 + RING_WINDOW {
            break;
        }

        let sq_dist = candidate.squared_diff(query);
        if candidate.ring() <= closest_ring {
            if sq_dist < min_sq_same {
                min_sq_same = sq_dist;
                same_band = Some(j);
            }
        } else if sq_dist < min_sq_cross {
            min_sq_cross = sq_dist;
            cross_band = Some(j);
        }
    }

    for j in (0..closest).rev() {
        let candidate = &cloud.points[j];
        if (candidate.ring() as f32) < closest_ring as f32 - RING_WINDOW {
            break;
        }

        let sq_dist = candidate.squared_diff(query);
        if candidate.ring() >= closest_ring {
            if sq_dist < min_sq_same {
                min_sq_same = sq_dist;
                same_band = Some(j);
            }
        } else if sq_dist < min_sq_cross {
            min_sq_cross = sq_dist;
            cross_band = Some(j);
        }
    }

    match (same_band, cross_band) {
        (Some(same_band), Some(cross_band)) => Some(PlaneTriple {
            closest,
            same_band,
            cross_band,
        }),
        _ => None,
    }
}
