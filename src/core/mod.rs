//! Foundation layer: math primitives and data types, no internal deps.

pub mod math;
pub mod types;
