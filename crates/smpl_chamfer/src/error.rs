use thiserror::Error;

/// Validation failures of the neighbour search and the Chamfer distance.
/// They are raised before any numeric work.
#[derive(Debug, Error)]
pub enum ChamferError {
    #[error("point clouds have different batch sizes: {0} vs {1}")]
    BatchSizeMismatch(usize, usize),

    #[error("point clouds have different point dimensions: {0} vs {1}")]
    DimMismatch(usize, usize),

    #[error("point clouds live on different devices: {0} vs {1}")]
    DeviceMismatch(String, String),

    #[error("invalid reduction '{0}', expected one of sum, mean, none")]
    InvalidReduction(String),

    #[error("point cloud '{0}' has no points")]
    EmptyPointCloud(&'static str),

    #[error("K must be at least 1")]
    InvalidK,

    #[error("invalid lengths for '{what}': {reason}")]
    InvalidLength { what: &'static str, reason: String },

    #[error("{what}: expected shape {expected:?}, got {got:?}")]
    PointCountMismatch {
        what: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("tensor data error: {0}")]
    Data(String),
}

pub type ChamferResult<T> = Result<T, ChamferError>;
