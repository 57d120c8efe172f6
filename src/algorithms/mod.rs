//! Core algorithms: de-skew, correspondence search, residuals, solver.

pub mod correspondence;
pub mod deskew;
pub mod residual;
pub mod solver;

pub use correspondence::{EdgePair, FeatureIndex, PlaneTriple, build_index, find_edge_pair, find_plane_triple};
pub use deskew::{transform_to_end, transform_to_start};
pub use residual::{Coefficient, edge_residual, plane_residual};
pub use solver::{DegeneracyProjector, NormalEquations, jacobian_row, update_norms};
