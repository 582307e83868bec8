use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::process::Command;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use crate::Result;

#[derive(Clone,Debug,Serialize,Deserialize,PartialEq)]
pub struct RemoteSettings {
    /// host alias from ~/.ssh/config
    pub ssh_alias:String,
    pub remote_image_dir:PathBuf,
    pub local_image_dir:PathBuf,
    pub subject_ids_file:PathBuf,
}

impl Config for RemoteSettings {
    fn default() -> Self {
        Self {
            ssh_alias: String::from("connectome"),
            remote_image_dir: PathBuf::from("/storage/bigdata/dHCP/fmriprep/1.rs_fmri/4.cleaned_image"),
            local_image_dir: PathBuf::from("./img/"),
            subject_ids_file: PathBuf::from("healthy_subjects_ids.txt"),
        }
    }
}

impl RemoteSystem for RemoteSettings {
    fn destination(&self) -> String {
        self.ssh_alias.clone()
    }
}

#[derive(Clone,Debug,Serialize,Deserialize,PartialEq)]
pub struct MelodicSettings {
    pub melodic_binary:PathBuf,
    /// repetition time in seconds
    pub tr:f32,
    pub no_bet:bool,
    pub report:bool,
    pub verbose:bool,
}

impl Config for MelodicSettings {
    fn default() -> Self {
        Self {
            melodic_binary: PathBuf::from("melodic"),
            tr: 0.392,
            no_bet: true,
            report: true,
            verbose: true,
        }
    }
}

#[derive(Clone,Debug,Serialize,Deserialize,PartialEq)]
pub struct MaskSettings {
    /// age specific brain masks (mask_ga_<GA>.nii.gz)
    pub mask_dir:PathBuf,
    /// masks resampled onto the group ICA grid
    pub out_mask_dir:PathBuf,
    /// holds one ga_<GA>/output/melodic_IC.nii.gz per gestational age
    pub group_ica_dir:PathBuf,
    pub ga_min:u32,
    pub ga_max:u32,
}

impl MaskSettings {
    pub fn ga_range(&self) -> RangeInclusive<u32> {
        self.ga_min..=self.ga_max
    }
}

impl Config for MaskSettings {
    fn default() -> Self {
        Self {
            mask_dir: PathBuf::from("metadata/masks"),
            out_mask_dir: PathBuf::from("metadata/ica_masks"),
            group_ica_dir: PathBuf::from("registered_input-test"),
            ga_min: 36,
            ga_max: 44,
        }
    }
}

#[derive(Clone,Debug,Serialize,Deserialize,PartialEq)]
pub struct FeatureSettings {
    pub rs_data_dir:PathBuf,
    pub out_dir:PathBuf,
    /// tab separated file with columns ses, id, ga
    pub metadata_tsv:PathBuf,
    pub output_suffix:String,
    pub failure_log:PathBuf,
}

impl Config for FeatureSettings {
    fn default() -> Self {
        Self {
            rs_data_dir: PathBuf::from("rs_data"),
            out_dir: PathBuf::from("out-features"),
            metadata_tsv: PathBuf::from("metadata/ga.tsv"),
            output_suffix: String::from("features_7_comps"),
            failure_log: PathBuf::from("corrupted_files.txt"),
        }
    }
}

/// feature extraction against a single unmasked group ICA volume
#[derive(Clone,Debug,Serialize,Deserialize,PartialEq)]
pub struct WholeVolumeSettings {
    pub group_ica_file:PathBuf,
    pub rs_data_dir:PathBuf,
    pub out_dir:PathBuf,
    pub output_suffix:String,
}

impl Config for WholeVolumeSettings {
    fn default() -> Self {
        Self {
            group_ica_file: PathBuf::from("output/melodic_IC.nii.gz"),
            rs_data_dir: PathBuf::from("img"),
            out_dir: PathBuf::from("out/features"),
            output_suffix: String::from("features_42_comps"),
        }
    }
}

#[derive(Clone,Debug,Serialize,Deserialize,PartialEq)]
pub struct ProjectSettings {
    pub project_name:String,
    pub remote:RemoteSettings,
    pub melodic:MelodicSettings,
    pub masks:MaskSettings,
    pub features:FeatureSettings,
    pub whole_volume:WholeVolumeSettings,
}

impl Config for ProjectSettings {
    fn default() -> Self {
        Self {
            project_name: String::from("dhcp_rsfmri"),
            remote: RemoteSettings::default(),
            melodic: MelodicSettings::default(),
            masks: MaskSettings::default(),
            features: FeatureSettings::default(),
            whole_volume: WholeVolumeSettings::default(),
        }
    }
}

impl ConfigFile for ProjectSettings {

    fn to_file(&self, filename: &Path) -> Result<PathBuf> {
        let t = toml::to_string_pretty(&self)?;
        Ok(utils::write_to_file(filename,&Self::file_ext(),&t)?)
    }
    fn from_file(filename: &Path) -> Result<Self> {
        let t = utils::read_to_string(filename,&Self::file_ext())?;
        Ok(toml::from_str(&t)?)
    }
    fn file_ext() -> String {
        String::from("rsfmri_settings")
    }

}

impl ProjectSettings {
    /// settings from a file, or the defaults when none is given
    pub fn load(filename:Option<&Path>) -> Result<Self> {
        match filename {
            Some(f) => {
                info!("loading project settings from {:?}",f.with_extension(Self::file_ext()));
                Self::from_file(f)
            }
            None => Ok(<Self as Config>::default())
        }
    }
}

pub trait Config {
    fn default() -> Self;
}

pub trait ConfigFile: Sized {
    fn to_file(&self, filename:&Path) -> Result<PathBuf>;
    fn from_file(filename:&Path) -> Result<Self>;
    fn file_ext() -> String;
}

pub trait RemoteSystem {
    /// anything ssh accepts as a destination (alias or user@host)
    fn destination(&self) -> String;
    fn test_connection(&self) -> bool {
        info!("testing connection to {}",self.destination());
        let mut cmd = Command::new("ssh");
        cmd.arg("-o").arg("BatchMode=yes");
        cmd.arg(self.destination());
        cmd.arg("exit");
        match cmd.output().map(|o| o.status.success()) {
            Ok(true) => {
                info!("connection successful");
                true
            }
            Ok(false) => {
                warn!("passwordless connection failed for {}. try running ssh-copy-id to fix the connection",self.destination());
                false
            }
            Err(e) => {
                warn!("failed to launch ssh: {}",e);
                false
            }
        }
    }
}
