pub mod settings;
pub mod remote;
pub mod concat;
pub mod melodic;
pub mod masking;
pub mod metadata;
pub mod features;

use std::path::PathBuf;

pub use melodic::MelodicError;
pub use metadata::MetadataError;

#[derive(Debug, thiserror::Error)]
pub enum RsfmriError {
    #[error(transparent)]
    Utils(#[from] utils::UtilsError),
    #[error(transparent)]
    Nii(#[from] nii_data::NiiError),
    #[error(transparent)]
    DualReg(#[from] dual_reg::DualRegError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Melodic(#[from] MelodicError),
    #[error("settings file is corrupt: {0}")]
    SettingsRead(#[from] toml::de::Error),
    #[error("cannot serialize settings: {0}")]
    SettingsWrite(#[from] toml::ser::Error),
    #[error("{0:?} is not a directory")]
    NotADirectory(PathBuf),
    #[error("no .nii.gz files found in {0:?}")]
    NoInputs(PathBuf),
    #[error("failed to run {command}: {source}")]
    Spawn {
        command:String,
        #[source]
        source:std::io::Error,
    },
    #[error("{command} failed: {stderr}")]
    Remote {
        command:String,
        stderr:String,
    },
    #[error("no {0} were successfully loaded")]
    NothingLoaded(&'static str),
    #[error("no mask or group map loaded for gestational age {0}")]
    NoDataForAge(u32),
}

pub type Result<T> = std::result::Result<T,RsfmriError>;
