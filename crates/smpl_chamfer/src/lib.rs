pub mod chamfer;
pub mod error;
pub mod knn;

pub mod prelude {
    pub use crate::chamfer::{ChamferDistance, ChamferOptions, Reduction};
    pub use crate::error::{ChamferError, ChamferResult};
    pub use crate::knn::{knn_backward, knn_gather, knn_points, KnnOptions, KnnOutput, INVALID_INDEX};
}
