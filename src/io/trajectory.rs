//! Append-only trajectory sink.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use nalgebra::{Matrix3, Vector3};
use thiserror::Error;

/// Trajectory sink errors.
#[derive(Error, Debug)]
pub enum TrajectoryError {
    #[error("trajectory write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Appends poses to a file, one 3x4 row-major line per pose.
///
/// The line holds the nine rotation entries and the three translation
/// entries interleaved row by row (`r00 r01 r02 t0 r10 ... t2`),
/// space-separated and newline-terminated, the layout consumed by
/// common trajectory evaluation tools.
#[derive(Debug, Clone)]
pub struct TrajectoryWriter {
    path: PathBuf,
}

impl TrajectoryWriter {
    /// Create a writer targeting the given file; the file is created on
    /// first append.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Append one pose line.
    pub fn append(&self, rot: &Matrix3<f32>, trans: &Vector3<f32>) -> Result<(), TrajectoryError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        writeln!(
            file,
            "{} {} {} {} {} {} {} {} {} {} {} {}",
            rot[(0, 0)],
            rot[(0, 1)],
            rot[(0, 2)],
            trans[0],
            rot[(1, 0)],
            rot[(1, 1)],
            rot[(1, 2)],
            trans[1],
            rot[(2, 0)],
            rot[(2, 1)],
            rot[(2, 2)],
            trans[2],
        )?;
        Ok(())
    }
}
