// Dual regression and weighted seed-to-voxel connectivity for resting state fMRI.
// Matrices follow the (voxels, time) / (voxels, components) orientation unless noted.

pub mod linalg;
pub mod preprocess;
pub mod regression;

pub use linalg::{matrix_rank, pinv};
pub use preprocess::{detrend_rows, normalise_columns, prepare_time_series, standardize_columns};
pub use regression::{dual_regression, extract_connectivity, fsl_glm, orient_tall, weighted_seed2voxel};

#[derive(Debug, thiserror::Error)]
pub enum DualRegError {
    #[error("{what}: {left:?} is incompatible with {right:?}")]
    ShapeMismatch {
        what:&'static str,
        left:(usize,usize),
        right:(usize,usize),
    },
    #[error("empty input matrix")]
    Empty,
    #[error("singular value decomposition failed: {0}")]
    Svd(&'static str),
}

pub type Result<T> = std::result::Result<T,DualRegError>;
