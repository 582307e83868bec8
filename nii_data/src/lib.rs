pub mod volume;
pub mod mask;
pub mod npy;

use std::path::PathBuf;

pub use volume::{concat_volumes, write_nifti, Affine, NiiVolume};
pub use mask::{apply_mask, resample_nearest};
pub use npy::{read_npy, write_npy};
pub use nifti::NiftiHeader;

/// tolerance used when comparing voxel-to-world transforms of two images
pub const AFFINE_TOLERANCE:f64 = 1e-3;

#[derive(Debug, thiserror::Error)]
pub enum NiiError {
    #[error("io error on {path:?}: {source}")]
    Io {
        path:PathBuf,
        #[source]
        source:std::io::Error,
    },
    #[error("cannot read nifti {path:?}: {source}")]
    Nifti {
        path:PathBuf,
        #[source]
        source:nifti::NiftiError,
    },
    #[error("cannot read npy {path:?}: {source}")]
    ReadNpy {
        path:PathBuf,
        #[source]
        source:ndarray_npy::ReadNpyError,
    },
    #[error("cannot write npy {path:?}: {source}")]
    WriteNpy {
        path:PathBuf,
        #[source]
        source:ndarray_npy::WriteNpyError,
    },
    #[error("expected a {expected} volume, found {found} dimensions")]
    Dimensionality {
        expected:&'static str,
        found:usize,
    },
    #[error("spatial shape mismatch: {left:?} vs {right:?}")]
    ShapeMismatch {
        left:Vec<usize>,
        right:Vec<usize>,
    },
    #[error("voxel-to-world transforms differ between images")]
    AffineMismatch,
    #[error("voxel-to-world transform is singular")]
    SingularAffine,
    #[error("nothing to concatenate")]
    NoVolumes,
    #[error("cannot reshape array: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

pub type Result<T> = std::result::Result<T,NiiError>;
