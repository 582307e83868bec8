use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use glob::{glob, Pattern};
use log::info;

/// number of leading characters of a dHCP file name that make up the subject label
/// (sub-CC00050XX01)
pub const SUBJECT_PREFIX_LEN:usize = 15;

#[derive(Debug, thiserror::Error)]
pub enum UtilsError {
    #[error("io error on {path:?}: {source}")]
    Io {
        path:PathBuf,
        #[source]
        source:io::Error,
    },
    #[error("invalid glob pattern {pattern}: {source}")]
    Pattern {
        pattern:String,
        #[source]
        source:glob::PatternError,
    },
    #[error("path is not valid utf-8: {0:?}")]
    NonUtf8Path(PathBuf),
    #[error("directory {0:?} does not exist and was not created")]
    DirDeclined(PathBuf),
}

impl UtilsError {
    pub fn io(path:&Path,source:io::Error) -> Self {
        UtilsError::Io { path: path.to_owned(), source }
    }
}

pub type Result<T> = std::result::Result<T,UtilsError>;

pub fn read_to_string(filepath:&Path,extension:&str) -> Result<String> {
    let p = filepath.with_extension(extension);
    let mut f = File::open(&p).map_err(|e| UtilsError::io(&p,e))?;
    let mut s = String::new();
    f.read_to_string(&mut s).map_err(|e| UtilsError::io(&p,e))?;
    Ok(s)
}

pub fn write_to_file(filepath:&Path,extension:&str,string:&str) -> Result<PathBuf> {
    let p = filepath.with_extension(extension);
    let mut f = File::create(&p).map_err(|e| UtilsError::io(&p,e))?;
    f.write_all(string.as_bytes()).map_err(|e| UtilsError::io(&p,e))?;
    Ok(p)
}

fn glob_in(dir:&Path,pattern:&str) -> Result<Vec<PathBuf>> {
    let pat = dir.join(pattern);
    let pat = pat.to_str().ok_or_else(|| UtilsError::NonUtf8Path(pat.clone()))?;
    let paths = glob(pat).map_err(|source| UtilsError::Pattern { pattern: pat.to_string(), source })?;
    let mut matches:Vec<PathBuf> = paths.flat_map(|m| m).collect();
    matches.sort();
    Ok(matches)
}

// single depth search
pub fn get_all_matches(dir:&Path,pattern:&str) -> Result<Option<Vec<PathBuf>>> {
    let matches = glob_in(dir,pattern)?;
    match matches.is_empty() {
        true => Ok(None),
        false => Ok(Some(matches))
    }
}

/// names of the entries in a directory, unsorted
pub fn list_dir_names(dir:&Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(dir).map_err(|e| UtilsError::io(dir,e))?;
    let mut names = vec![];
    for entry in entries {
        let entry = entry.map_err(|e| UtilsError::io(dir,e))?;
        names.push(entry.file_name().to_string_lossy().to_string());
    }
    Ok(names)
}

/// returns the names matching pattern, preserving their order
pub fn filter_pattern<'a>(names:&'a [String],pattern:&str) -> Result<Vec<&'a String>> {
    let p = Pattern::new(pattern).map_err(|source| UtilsError::Pattern { pattern: pattern.to_string(), source })?;
    Ok(names.iter().filter(|n| p.matches(n)).collect())
}

pub fn read_subject_ids(path:&Path) -> Result<Vec<String>> {
    let mut f = File::open(path).map_err(|e| UtilsError::io(path,e))?;
    let mut s = String::new();
    f.read_to_string(&mut s).map_err(|e| UtilsError::io(path,e))?;
    Ok(s.lines().map(|l| l.trim()).filter(|l| !l.is_empty()).map(String::from).collect())
}

/// the subject label at the head of a file name. Names shorter than the label are returned whole.
pub fn subject_prefix(name:&str) -> &str {
    match name.char_indices().nth(SUBJECT_PREFIX_LEN) {
        Some((idx,_)) => &name[..idx],
        None => name
    }
}

pub fn trim_newline(s: &mut String) {
    if s.ends_with('\n') {
        s.pop();
        if s.ends_with('\r') {
            s.pop();
        }
    }
}

/// append-only record of input files that could not be processed
#[derive(Debug,Clone)]
pub struct FailureLog {
    file:PathBuf
}

impl FailureLog {
    pub fn new(file:&Path) -> Self {
        Self {
            file:file.to_owned()
        }
    }

    pub fn append(&self,entry:&str) -> Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file)
            .map_err(|e| UtilsError::io(&self.file,e))?;
        writeln!(f,"{}",entry).map_err(|e| UtilsError::io(&self.file,e))
    }

    pub fn entries(&self) -> Result<Vec<String>> {
        if !self.file.exists() {
            return Ok(vec![])
        }
        read_subject_ids(&self.file)
    }
}

/// make sure an output directory exists, asking the user before creating it
pub fn ensure_dir(dir:&Path,assume_yes:bool) -> Result<()> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    ensure_dir_with(dir,assume_yes,&mut input)
}

pub fn ensure_dir_with<R:BufRead>(dir:&Path,assume_yes:bool,input:&mut R) -> Result<()> {
    if dir.is_dir() {
        return Ok(())
    }
    if !assume_yes {
        print!("Output directory does not exist. Do you want to create it? (y/n): ");
        io::stdout().flush().map_err(|e| UtilsError::io(dir,e))?;
        let mut answer = String::new();
        input.read_line(&mut answer).map_err(|e| UtilsError::io(dir,e))?;
        trim_newline(&mut answer);
        if !answer.trim().eq_ignore_ascii_case("y") {
            return Err(UtilsError::DirDeclined(dir.to_owned()))
        }
    }
    create_dir_all(dir).map_err(|e| UtilsError::io(dir,e))?;
    info!("output directory {:?} created",dir);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn subject_prefix_takes_dhcp_label() {
        assert_eq!(subject_prefix("sub-CC00050XX01_ses-7201_bold.nii.gz"),"sub-CC00050XX01");
        assert_eq!(subject_prefix("short.nii"),"short.nii");
    }

    #[test]
    fn pattern_matching_is_fnmatch_like() {
        let names = vec!["CC001_run1.nii.gz".to_string(),"CC0012_run1.nii.gz".to_string(),
            "CC001_run1.nii".to_string(),"CC001_run2.nii.gz".to_string()];
        let hits = filter_pattern(&names,"CC001_*.nii.gz").unwrap();
        assert_eq!(hits,vec![&names[0],&names[3]]);
    }

    #[test]
    fn subject_ids_are_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("ids.txt");
        std::fs::write(&f,"CC001 \n\nCC002\r\n").unwrap();
        assert_eq!(read_subject_ids(&f).unwrap(),vec!["CC001","CC002"]);
    }

    #[test]
    fn failure_log_appends() {
        let dir = tempfile::tempdir().unwrap();
        let log = FailureLog::new(&dir.path().join("corrupted_files.txt"));
        assert!(log.entries().unwrap().is_empty());
        log.append("a.nii.gz").unwrap();
        log.append("b.nii.gz").unwrap();
        assert_eq!(log.entries().unwrap(),vec!["a.nii.gz","b.nii.gz"]);
    }

    #[test]
    fn ensure_dir_respects_answer() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out");

        let mut no = Cursor::new(b"n\n".to_vec());
        assert!(matches!(ensure_dir_with(&target,false,&mut no),Err(UtilsError::DirDeclined(_))));
        assert!(!target.exists());

        let mut yes = Cursor::new(b"Y\n".to_vec());
        ensure_dir_with(&target,false,&mut yes).unwrap();
        assert!(target.is_dir());

        let other = dir.path().join("other");
        ensure_dir_with(&other,true,&mut Cursor::new(vec![])).unwrap();
        assert!(other.is_dir());
    }

    #[test]
    fn glob_helpers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.npy"),"").unwrap();
        std::fs::write(dir.path().join("a.npy"),"").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("c.npy"),"").unwrap();

        // sorted, and only one directory deep
        let all = get_all_matches(dir.path(),"*.npy").unwrap().unwrap();
        let names:Vec<_> = all.iter().map(|p| p.file_name().unwrap().to_owned()).collect();
        assert_eq!(names,vec!["a.npy","b.npy"]);
        assert!(get_all_matches(dir.path(),"*.nii").unwrap().is_none());

        let p = write_to_file(&dir.path().join("settings"),"toml","x = 1").unwrap();
        assert!(p.ends_with("settings.toml"));
        assert_eq!(read_to_string(&dir.path().join("settings"),"toml").unwrap(),"x = 1");
    }
}
