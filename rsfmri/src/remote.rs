use std::path::{Path, PathBuf};
use std::process::Command;
use log::{info, warn};
use crate::settings::{RemoteSettings, RemoteSystem};
use crate::{Result, RsfmriError};

/// where subject images are fetched from
pub trait ImageSource {
    fn list_files(&self) -> Result<Vec<String>>;
    fn fetch(&self,file_name:&str,local_dir:&Path) -> Result<()>;
}

/// a host reached through ssh and scp
pub struct ScpSource<'a> {
    settings:&'a RemoteSettings,
}

impl<'a> ScpSource<'a> {
    pub fn new(settings:&'a RemoteSettings) -> Self {
        Self { settings }
    }
}

fn run(mut cmd:Command) -> Result<String> {
    info!("attempting to run {:?}",cmd);
    let command = format!("{:?}",cmd);
    let o = cmd.output().map_err(|source| RsfmriError::Spawn { command: command.clone(), source })?;
    match o.status.success() {
        true => Ok(String::from_utf8_lossy(&o.stdout).to_string()),
        false => Err(RsfmriError::Remote { command, stderr: String::from_utf8_lossy(&o.stderr).trim().to_string() })
    }
}

/// names in a remote directory, as printed by `ls`
pub fn list_remote_files(alias:&str,remote_dir:&Path) -> Result<Vec<String>> {
    let mut cmd = Command::new("ssh");
    cmd.arg(alias).arg("ls").arg(remote_dir);
    let out = run(cmd)?;
    Ok(out.lines().map(|l| l.trim()).filter(|l| !l.is_empty()).map(String::from).collect())
}

pub fn list_local_files(local_dir:&Path) -> Result<Vec<String>> {
    Ok(utils::list_dir_names(local_dir)?)
}

impl<'a> ImageSource for ScpSource<'a> {
    fn list_files(&self) -> Result<Vec<String>> {
        list_remote_files(&self.settings.destination(),&self.settings.remote_image_dir)
    }

    fn fetch(&self,file_name:&str,local_dir:&Path) -> Result<()> {
        let remote = self.settings.remote_image_dir.join(file_name);
        let mut cmd = Command::new("scp");
        cmd.arg(format!("{}:{}",self.settings.destination(),remote.display()));
        cmd.arg(format!("{}/",local_dir.display()));
        run(cmd)?;
        Ok(())
    }
}

#[derive(Debug,Default,Clone)]
pub struct DownloadReport {
    pub downloaded:Vec<PathBuf>,
    pub skipped:Vec<String>,
    pub missing:Vec<String>,
    pub failed:Vec<String>,
}

pub fn subject_pattern(subject_id:&str) -> String {
    format!("{}_*.nii.gz",subject_id)
}

/// fetches the first image of every subject that has nothing locally yet
pub fn download_subjects<S:ImageSource>(source:&S,subject_ids:&[String],local_dir:&Path) -> Result<DownloadReport> {
    if !local_dir.exists() {
        std::fs::create_dir_all(local_dir).map_err(|e| utils::UtilsError::io(local_dir,e))?;
    }
    let remote_files = source.list_files()?;
    let local_files = list_local_files(local_dir)?;
    info!("{} files on remote, {} local",remote_files.len(),local_files.len());

    let mut report = DownloadReport::default();
    for (i,subject_id) in subject_ids.iter().enumerate() {
        let pattern = subject_pattern(subject_id);
        if !utils::filter_pattern(&local_files,&pattern)?.is_empty() {
            info!("Files for {} already exist in the local directory. Skipping download.",subject_id);
            report.skipped.push(subject_id.clone());
            continue
        }
        let matching = utils::filter_pattern(&remote_files,&pattern)?;
        match matching.first() {
            Some(file) => {
                info!("[{}/{}] downloading {}",i+1,subject_ids.len(),file);
                match source.fetch(file,local_dir) {
                    Ok(_) => report.downloaded.push(local_dir.join(file.as_str())),
                    Err(e) => {
                        warn!("Failed to download {}: {}",file,e);
                        report.failed.push(file.to_string());
                    }
                }
            }
            None => {
                warn!("No files found for {}",subject_id);
                report.missing.push(subject_id.clone());
            }
        }
    }
    Ok(report)
}

/// download step driven by the project settings
pub fn download(settings:&RemoteSettings) -> Result<DownloadReport> {
    let ids = utils::read_subject_ids(&settings.subject_ids_file)?;
    info!("{} subject ids read from {:?}",ids.len(),settings.subject_ids_file);
    if !settings.test_connection() {
        warn!("ssh connection test to {} failed, attempting download anyway",settings.destination());
    }
    download_subjects(&ScpSource::new(settings),&ids,&settings.local_image_dir)
}
