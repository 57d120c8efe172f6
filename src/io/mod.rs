//! I/O infrastructure: the trajectory file sink.

pub mod trajectory;

pub use trajectory::{TrajectoryError, TrajectoryWriter};
