//! Odometry engine: input gating, the per-tick state machine, pose
//! accumulation.

pub mod odometry;

pub use odometry::{LaserOdometry, OdometryConfig, SolveDiagnostics};
