//! Error types for body model construction and evaluation.

use thiserror::Error;

/// Errors raised while building or evaluating a body model. All of them are
/// configuration errors detected before any numeric work.
#[derive(Debug, Error)]
pub enum SmplError {
    /// A required buffer is absent from the model archive.
    #[error("missing tensor in npz: '{0}'")]
    MissingBuffer(String),

    /// The archive could not be opened or listed.
    #[error("failed to read model archive")]
    Archive(#[source] ndarray_npy::ReadNpzError),

    /// A buffer exists but could not be decoded.
    #[error("failed to load tensor '{name}'")]
    Npz {
        /// Name of the buffer inside the archive.
        name: String,
        /// Underlying decoding error.
        #[source]
        source: ndarray_npy::ReadNpzError,
    },

    /// Filesystem error while opening a model or configuration file.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The model file does not have the expected extension.
    #[error("invalid extension for {0}, expected .{1}")]
    InvalidExtension(String, &'static str),

    /// A buffer or parameter does not have the expected shape.
    #[error("{what}: expected shape {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Which buffer or parameter.
        what: String,
        /// Expected shape.
        expected: Vec<usize>,
        /// Actual shape.
        got: Vec<usize>,
    },

    /// A parameter batch cannot be broadcast to the common batch size.
    #[error("{what} has batch size {got} which cannot be broadcast to {expected}")]
    BatchMismatch {
        /// Which parameter.
        what: String,
        /// Common batch size of the call.
        expected: usize,
        /// Batch size of the offending parameter.
        got: usize,
    },

    /// The parent array does not describe a topologically ordered tree.
    #[error("invalid skeleton: {0}")]
    InvalidSkeleton(String),

    /// The pose basis does not match the `root + body joints` layout.
    #[error("unsupported skeleton layout: {0}")]
    UnsupportedSkeleton(String),

    /// Inconsistent configuration record.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed.
    #[error("invalid json configuration")]
    Json(#[from] serde_json::Error),
}

/// Result type for body model operations.
pub type SmplResult<T> = Result<T, SmplError>;
