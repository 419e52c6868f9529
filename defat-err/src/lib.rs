//! Error types shared across the FAT32 defragmentation engine.

use std::fmt;

/// Top-level error returned by the fallible operations of the engine.
///
/// Chain anomalies (cycles, out-of-range successors, unresolved paths) are
/// recoverable: callers log them via [`ChainError`]'s `Display` and continue
/// rather than producing one of these variants.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("geometry: {0}")]
    Geometry(#[from] GeometryError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("allocation: {0}")]
    Allocation(#[from] AllocationError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("too small: {0}")]
    TooSmall(String),
    #[error("path mismatch: {0}")]
    PathMismatch(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure decoding the Boot Parameter Block.
#[derive(thiserror::Error, Debug)]
pub enum GeometryError {
    #[error("boot sector could not be read in full ({expected} bytes expected)")]
    ShortRead { expected: usize },
    #[error("inconsistent geometry: {0}")]
    Inconsistent(String),
}

/// A cluster-chain anomaly. Never returned from a `Result` — these are
/// recoverable by truncating the chain, so callers log them with
/// [`log::warn!`] and keep going.
#[derive(Debug)]
pub enum ChainError {
    Cycle { cluster: u32 },
    OutOfRange { cluster: u32 },
    InvalidStartCluster { cluster: u32, path: String },
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::Cycle { cluster } => {
                write!(f, "cluster chain revisits cluster {cluster}, truncating")
            }
            ChainError::OutOfRange { cluster } => {
                write!(f, "cluster chain references out-of-range cluster {cluster}")
            }
            ChainError::InvalidStartCluster { cluster, path } => {
                write!(f, "entry {path} has invalid starting cluster {cluster}, skipping")
            }
        }
    }
}

/// Best-Fit could not find a contiguous run long enough to satisfy a request.
#[derive(thiserror::Error, Debug)]
#[error("no free run of {requested} contiguous clusters available (largest free run: {largest})")]
pub struct AllocationError {
    pub requested: usize,
    pub largest: usize,
}
