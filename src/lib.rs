//! GatiOdom - frame-to-frame LiDAR odometry core
//!
//! # Architecture
//!
//! The crate is organized into 4 logical layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                      io/                            │  ← Trajectory sink
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                    engine/                          │  ← Tick state machine
//! │       (gating, solve loop, pose accumulation)       │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                  algorithms/                        │  ← Core algorithms
//! │    (de-skew, correspondence, residuals, solver)     │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │                 (types, math)                       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Operation
//!
//! For each sweep of a rotating 3D laser, a host installs four
//! pre-extracted feature clouds (sharp/less-sharp edges, flat/less-flat
//! surfaces), the full-resolution cloud, and an IMU pre-integration
//! bundle, then calls [`LaserOdometry::process`]. The core:
//!
//! 1. Gates the six input streams on freshness and timestamp agreement.
//! 2. Matches sharp points to edge lines and flat points to planes in
//!    the previous sweep, through static k-d indices.
//! 3. Minimizes the point-to-line and point-to-plane distances over the
//!    6-DoF incremental motion with damped normal-equation iterations,
//!    confining updates to observable directions when the geometry is
//!    degenerate (e.g. a long corridor).
//! 4. Accumulates the increment into the global pose, correcting with
//!    the IMU attitudes at the sweep boundaries.
//! 5. Re-projects the current feature clouds to the sweep end and
//!    promotes them to previous-sweep status.
//!
//! Feature extraction, IMU pre-integration, transport, visualization,
//! and map optimization are external collaborators; the core only
//! consumes and produces their data.

// ============================================================================
// Layer 1: Core foundation (no internal deps)
// ============================================================================
pub mod core;

// ============================================================================
// Layer 2: Algorithms (depends on core)
// ============================================================================
pub mod algorithms;

// ============================================================================
// Layer 3: Engine (depends on core, algorithms)
// ============================================================================
pub mod engine;

// ============================================================================
// Layer 4: I/O infrastructure
// ============================================================================
pub mod io;

// ============================================================================
// Convenience re-exports (flat namespace for common use)
// ============================================================================

// Core types
pub use crate::core::math::{Angle, rotate_yxz, rotate_zxy};
pub use crate::core::types::{ImuTrans, Point3D, PointCloud3D, Pose6D};

// Algorithms
pub use crate::algorithms::correspondence::{
    EdgePair, FeatureIndex, PlaneTriple, build_index, find_edge_pair, find_plane_triple,
};
pub use crate::algorithms::deskew::{transform_to_end, transform_to_start};
pub use crate::algorithms::residual::{Coefficient, edge_residual, plane_residual};
pub use crate::algorithms::solver::{DegeneracyProjector, NormalEquations};

// Engine
pub use crate::engine::odometry::{LaserOdometry, OdometryConfig, SolveDiagnostics};

// I/O
pub use crate::io::trajectory::{TrajectoryError, TrajectoryWriter};
