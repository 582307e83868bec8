use std::path::{Path, PathBuf};
use log::{info, warn};
use ndarray::Array2;
use nii_data::{apply_mask, resample_nearest, write_npy, NiiVolume};
use crate::settings::MaskSettings;
use crate::Result;

pub const GROUP_IC_FILE:&str = "melodic_IC.nii.gz";
pub const MASKED_GROUP_IC_FILE:&str = "melodic_IC_masked.npy";

pub fn mask_file_name(ga:u32) -> String {
    format!("mask_ga_{}.nii.gz",ga)
}

/// <dir>/<GA dir>/output
pub fn group_ica_output_dir(group_ica_dir:&Path,ga:u32) -> PathBuf {
    group_ica_dir.join(format!("ga_{}",ga)).join("output")
}

/// mask.nii.gz -> mask_preprocessed.nii.gz next to the input mask
pub fn preprocessed_mask_path(mask:&Path) -> PathBuf {
    let name = mask.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    let stem = name.strip_suffix(".nii.gz")
        .or_else(|| name.strip_suffix(".nii"))
        .unwrap_or(&name);
    mask.with_file_name(format!("{}_preprocessed.nii.gz",stem))
}

/// gestational age from a ga_<GA> directory name
pub fn parse_ga_dir(name:&str) -> Option<u32> {
    name.split('_').nth(1)?.parse().ok()
}

/// resamples the mask onto the grid of the group maps and applies it, giving (components, voxels)
pub fn fit_mask(mask:&NiiVolume,group_ic:&NiiVolume) -> Result<(Array2<f64>,NiiVolume)> {
    let resampled = resample_nearest(mask,group_ic)?;
    info!("Applying transformed mask {:?} to image {:?}...",resampled.shape(),group_ic.shape());
    let masked = apply_mask(group_ic,&resampled)?;
    info!("Shape of masked image: {:?}",masked.dim());
    Ok((masked,resampled))
}

/// masks one group ICA map. Writes the resampled mask beside the input mask and the
/// masked map to `output`. Returns the path of the resampled mask.
pub fn mask_group_ica(input:&Path,mask:&Path,output:&Path) -> Result<PathBuf> {
    let group_ic = NiiVolume::open(input)?;
    let mask_vol = NiiVolume::open(mask)?;
    info!("Shape of mask: {:?}",mask_vol.shape());
    let (masked,resampled) = fit_mask(&mask_vol,&group_ic)?;
    let preprocessed = preprocessed_mask_path(mask);
    resampled.to_file(&preprocessed)?;
    write_npy(output,&masked)?;
    info!("Shape of masked group ICA map: {:?}",masked.dim());
    Ok(preprocessed)
}

/// builds the per-age masks and masked group maps for every ga_<GA> directory.
/// Returns the ages that were processed.
pub fn create_masks(settings:&MaskSettings,assume_yes:bool) -> Result<Vec<u32>> {
    utils::ensure_dir(&settings.out_mask_dir,assume_yes)?;
    let mut names = utils::list_dir_names(&settings.group_ica_dir)?;
    names.sort();
    let mut done = vec![];
    for name in names {
        let dir = settings.group_ica_dir.join(&name);
        if !dir.is_dir() {
            continue
        }
        let ga = match parse_ga_dir(&name) {
            Some(ga) => ga,
            None => {
                warn!("skipping {:?}, no gestational age in its name",dir);
                continue
            }
        };
        info!("Processing {:?}...",dir);
        let mask = NiiVolume::open(&settings.mask_dir.join(mask_file_name(ga)))?;
        let out_dir = group_ica_output_dir(&settings.group_ica_dir,ga);
        let group_ic = NiiVolume::open(&out_dir.join(GROUP_IC_FILE))?;
        let (masked,resampled) = fit_mask(&mask,&group_ic)?;
        write_npy(&out_dir.join(MASKED_GROUP_IC_FILE),&masked)?;
        resampled.to_file(&settings.out_mask_dir.join(mask_file_name(ga)))?;
        info!("Finished processing {:?}.",dir);
        done.push(ga);
    }
    info!("Finished processing all group ICA directories.");
    Ok(done)
}
