use std::collections::HashMap;
use std::path::{Path, PathBuf};
use log::{debug, info};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("cannot read metadata {path:?}: {source}")]
    Csv {
        path:PathBuf,
        #[source]
        source:csv::Error,
    },
    #[error("no gestational age for {subject} session {session}")]
    NotFound {
        subject:String,
        session:u32,
    },
    #[error("file name {0} is not of the form sub-<id>_ses-<n>_...")]
    MalformedName(String),
}

#[derive(Debug,Deserialize)]
struct GaRecord {
    ses:u32,
    id:String,
    ga:f64,
}

/// gestational age at scan, keyed by subject and session
#[derive(Debug,Clone,Default)]
pub struct GestationalAges {
    ages:HashMap<(String,u32),f64>,
}

impl GestationalAges {

    pub fn from_tsv(path:&Path) -> Result<Self,MetadataError> {
        info!("Loading metadata from {:?}...",path);
        let to_err = |source:csv::Error| MetadataError::Csv { path: path.to_owned(), source };
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(to_err)?;
        let mut ages = HashMap::new();
        for record in reader.deserialize() {
            let r:GaRecord = record.map_err(to_err)?;
            // first entry wins
            ages.entry((r.id,r.ses)).or_insert(r.ga);
        }
        debug!("{} gestational ages loaded",ages.len());
        Ok(Self { ages })
    }

    /// age in whole weeks, truncated
    pub fn lookup(&self,subject:&str,session:u32) -> Result<u32,MetadataError> {
        match self.ages.get(&(subject.to_string(),session)) {
            Some(ga) => Ok(ga.trunc() as u32),
            None => Err(MetadataError::NotFound { subject: subject.to_string(), session })
        }
    }
}

/// subject id and session number from a name like sub-X_ses-N_task-rest_bold.nii.gz
pub fn parse_subject_file(file_name:&str) -> Result<(String,u32),MetadataError> {
    let malformed = || MetadataError::MalformedName(file_name.to_string());
    let mut parts = file_name.split('_');
    let subject = parts.next().filter(|s| !s.is_empty()).ok_or_else(malformed)?;
    let session = parts.next()
        .and_then(|s| s.split('-').nth(1))
        .and_then(|n| n.parse::<u32>().ok())
        .ok_or_else(malformed)?;
    Ok((subject.to_string(),session))
}
