use std::path::{Path, PathBuf};
use log::info;
use nii_data::volume::write_4d;
use nii_data::{concat_volumes, NiiVolume};
use crate::{Result, RsfmriError};

pub const CONCAT_FILE:&str = "all_subjects.nii.gz";

/// sorted .nii.gz inputs of a directory, leaving out a previous concatenation
pub fn concat_inputs(dir:&Path) -> Result<Vec<PathBuf>> {
    let matches = utils::get_all_matches(dir,"*.nii.gz")?.unwrap_or_default();
    Ok(matches.into_iter()
        .filter(|p| p.file_name().map_or(true,|n| n != CONCAT_FILE))
        .collect())
}

/// joins every volume in `dir` along time into dir/all_subjects.nii.gz
pub fn concat_directory(dir:&Path) -> Result<PathBuf> {
    if !dir.is_dir() {
        return Err(RsfmriError::NotADirectory(dir.to_owned()))
    }
    let files = concat_inputs(dir)?;
    if files.is_empty() {
        return Err(RsfmriError::NoInputs(dir.to_owned()))
    }
    let mut volumes = Vec::with_capacity(files.len());
    for (i,f) in files.iter().enumerate() {
        info!("Concatenating files: {}/{} {:?}",i+1,files.len(),f.file_name().unwrap_or_default());
        volumes.push(NiiVolume::open(f)?);
    }
    let stacked = concat_volumes(&volumes)?;
    let output = dir.join(CONCAT_FILE);
    info!("Saving concatenated image to {:?}",output);
    write_4d(&output,stacked,&volumes[0].header)?;
    info!("Successfully concatenated all .nii.gz files into {:?}",output);
    Ok(output)
}
