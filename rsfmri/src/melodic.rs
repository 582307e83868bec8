use std::path::{Path, PathBuf};
use std::process::Command;
use log::{error, info};
use crate::concat::CONCAT_FILE;
use crate::settings::MelodicSettings;

#[derive(Debug, thiserror::Error)]
pub enum MelodicError {
    #[error("input directory {0:?} does not exist")]
    MissingInput(PathBuf),
    #[error("cannot create output directory {path:?}: {source}")]
    OutputDir {
        path:PathBuf,
        #[source]
        source:std::io::Error,
    },
    #[error("failed to launch melodic: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("MELODIC command failed with {status}: {stderr}")]
    Failed {
        status:std::process::ExitStatus,
        stderr:String,
    },
}

pub fn melodic_command(input:&Path,output_dir:&Path,n_components:usize,settings:&MelodicSettings) -> Command {
    let mut cmd = Command::new(&settings.melodic_binary);
    cmd.arg(format!("--in={}",input.display()));
    cmd.arg(format!("--outdir={}",output_dir.display()));
    if settings.no_bet {
        cmd.arg("--nobet");
    }
    cmd.arg(format!("--dim={}",n_components));
    cmd.arg(format!("--tr={}",settings.tr));
    if settings.report {
        cmd.arg("--report");
    }
    if settings.verbose {
        cmd.arg("--verbose");
    }
    cmd
}

/// group ICA of input_dir/all_subjects.nii.gz into input_dir/output
pub fn run_group_ica(input_dir:&Path,n_components:usize,settings:&MelodicSettings) -> Result<PathBuf,MelodicError> {
    if !input_dir.is_dir() {
        return Err(MelodicError::MissingInput(input_dir.to_owned()))
    }
    let output_dir = input_dir.join("output");
    std::fs::create_dir_all(&output_dir).map_err(|source| MelodicError::OutputDir { path: output_dir.clone(), source })?;

    let mut cmd = melodic_command(&input_dir.join(CONCAT_FILE),&output_dir,n_components,settings);
    info!("{:?}",cmd);
    let results = cmd.output().map_err(MelodicError::Spawn)?;
    if !results.status.success() {
        let stderr = String::from_utf8_lossy(&results.stderr).trim().to_string();
        error!("Error: MELODIC command failed. {}",stderr);
        return Err(MelodicError::Failed { status: results.status, stderr })
    }
    info!("Successfully ran group ICA.");
    Ok(output_dir)
}
